//! Media URL resolution for Reddit Archiver
//!
//! Turns a candidate URL into a concrete set of downloadable media URLs:
//! single media links resolve to themselves, album/gallery links expand to
//! an ordered list of constituent media plus a filesystem-safe album name.
//! Hosts with no extraction rule fail with `UnsupportedDomain`; the pipeline
//! records those for manual review.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::Url;
use serde_json::Value;
use thiserror::Error;

use crate::archiver::config::Http;

/// Error types for media resolution
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("domain not supported: {0}")]
    UnsupportedDomain(String),

    #[error("malformed URL: {0}")]
    Malformed(String),

    #[error("request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no media found in album: {0}")]
    EmptyAlbum(String),
}

/// Result type for resolution operations
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Broad media class, used to select thumbnailing behavior downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Image,
    Video,
    Audio,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::Audio => "audio",
        }
    }
}

/// Result of resolving one candidate URL.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub media_type: MediaType,
    /// Filesystem-safe album name; `None` for single-media URLs.
    pub album: Option<String>,
    /// Constituent media URLs in origin order. Order is stable across
    /// retries of the same URL; downstream file numbering depends on it.
    pub media_urls: Vec<String>,
}

/// Resolves candidate URLs to downloadable media.
pub trait Resolver {
    fn resolve(&self, url: &str) -> ResolveResult<Resolution>;
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mov", "mkv"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "ogg", "wav", "flac", "m4a"];

/// Classify a lowercase file extension into a media type.
pub fn classify_extension(ext: &str) -> Option<MediaType> {
    if IMAGE_EXTENSIONS.contains(&ext) {
        Some(MediaType::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext) {
        Some(MediaType::Video)
    } else if AUDIO_EXTENSIONS.contains(&ext) {
        Some(MediaType::Audio)
    } else {
        None
    }
}

fn extension_of(path: &str) -> Option<String> {
    let segment = path.rsplit('/').next()?;
    let (_, ext) = segment.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

/// Keep only characters safe in a path component.
pub fn sanitize_component(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .take(80)
        .collect()
}

/// Derive the origin filename from a media URL, query stripped, sanitized.
pub fn filename_from_url(url: &str) -> String {
    let path = url
        .split_once('?')
        .map(|(head, _)| head)
        .unwrap_or(url)
        .trim_end_matches('/');
    let segment = path.rsplit('/').next().unwrap_or(path);
    let name = sanitize_component(segment);
    if name.is_empty() {
        "media".to_string()
    } else {
        name
    }
}

static IMGUR_HASH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""hash":"([A-Za-z0-9]{5,8})""#).expect("imgur hash regex"));
static IMGUR_LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"i\.imgur\.com/([A-Za-z0-9]{5,8})\.(?:jpe?g|png|gif|mp4|webm)")
        .expect("imgur link regex")
});

/// Pull constituent image ids out of an imgur album page, order preserved,
/// first occurrence wins.
pub fn parse_imgur_album(html: &str) -> Vec<String> {
    let mut seen = Vec::new();
    let hashes = IMGUR_HASH_RE
        .captures_iter(html)
        .map(|c| c[1].to_string())
        .collect::<Vec<_>>();
    let candidates = if hashes.is_empty() {
        IMGUR_LINK_RE
            .captures_iter(html)
            .map(|c| c[1].to_string())
            .collect::<Vec<_>>()
    } else {
        hashes
    };
    for id in candidates {
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen.into_iter()
        .map(|id| format!("https://i.imgur.com/{id}.jpg"))
        .collect()
}

/// Resolver backed by live page/API fetches for album expansion.
pub struct WebResolver {
    client: Client,
}

impl WebResolver {
    pub fn new(http: &Http) -> ResolveResult<Self> {
        let client = Client::builder()
            .user_agent(&http.user_agent)
            .timeout(Duration::from_secs(http.timeout_secs))
            .gzip(true)
            .build()?;
        Ok(Self { client })
    }

    fn get_text(&self, url: &str) -> ResolveResult<String> {
        Ok(self.client.get(url).send()?.error_for_status()?.text()?)
    }

    fn get_json(&self, url: &str) -> ResolveResult<Value> {
        Ok(self.client.get(url).send()?.error_for_status()?.json()?)
    }

    fn resolve_imgur_album(&self, url: &str, slug: &str) -> ResolveResult<Resolution> {
        let html = self.get_text(url)?;
        let media_urls = parse_imgur_album(&html);
        if media_urls.is_empty() {
            return Err(ResolveError::EmptyAlbum(url.to_string()));
        }
        Ok(Resolution {
            media_type: MediaType::Image,
            album: Some(sanitize_component(slug)),
            media_urls,
        })
    }

    /// Expand a reddit gallery through the post's JSON: `gallery_data` gives
    /// the order, `media_metadata` the mime type of each entry.
    fn resolve_reddit_gallery(&self, url: &str, id: &str) -> ResolveResult<Resolution> {
        let api_url = format!("https://www.reddit.com/comments/{id}.json?raw_json=1");
        let body = self.get_json(&api_url)?;
        let post = &body[0]["data"]["children"][0]["data"];

        let items = post["gallery_data"]["items"]
            .as_array()
            .ok_or_else(|| ResolveError::EmptyAlbum(url.to_string()))?;
        let metadata = &post["media_metadata"];

        let mut media_urls = Vec::new();
        for item in items {
            let Some(media_id) = item["media_id"].as_str() else {
                continue;
            };
            let ext = metadata[media_id]["m"]
                .as_str()
                .and_then(|mime| mime.rsplit('/').next())
                .unwrap_or("jpg");
            media_urls.push(format!("https://i.redd.it/{media_id}.{ext}"));
        }
        if media_urls.is_empty() {
            return Err(ResolveError::EmptyAlbum(url.to_string()));
        }
        Ok(Resolution {
            media_type: MediaType::Image,
            album: Some(sanitize_component(id)),
            media_urls,
        })
    }
}

fn single(media_type: MediaType, url: &str) -> Resolution {
    Resolution {
        media_type,
        album: None,
        media_urls: vec![url.to_string()],
    }
}

impl Resolver for WebResolver {
    fn resolve(&self, url: &str) -> ResolveResult<Resolution> {
        let parsed =
            Url::parse(url).map_err(|_| ResolveError::Malformed(url.to_string()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| ResolveError::Malformed(url.to_string()))?
            .to_ascii_lowercase();
        let path = parsed.path().to_string();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        // Direct media on any host, classified by extension.
        if let Some(media_type) = extension_of(&path).as_deref().and_then(classify_extension) {
            return Ok(single(media_type, url));
        }

        match host.as_str() {
            "imgur.com" | "www.imgur.com" | "m.imgur.com" => match segments.as_slice() {
                ["a" | "gallery", slug, ..] => self.resolve_imgur_album(url, slug),
                [id] => Ok(single(
                    MediaType::Image,
                    &format!("https://i.imgur.com/{id}.jpg"),
                )),
                _ => Err(ResolveError::UnsupportedDomain(url.to_string())),
            },
            "reddit.com" | "www.reddit.com" | "old.reddit.com" => match segments.as_slice() {
                ["gallery", id] => self.resolve_reddit_gallery(url, id),
                _ => Err(ResolveError::UnsupportedDomain(url.to_string())),
            },
            "v.redd.it" => match segments.as_slice() {
                [id] => Ok(single(
                    MediaType::Video,
                    &format!("https://v.redd.it/{id}/DASH_720.mp4"),
                )),
                _ => Err(ResolveError::UnsupportedDomain(url.to_string())),
            },
            "gfycat.com" | "www.gfycat.com" => match segments.as_slice() {
                [name] => Ok(single(
                    MediaType::Video,
                    &format!("https://giant.gfycat.com/{name}.mp4"),
                )),
                _ => Err(ResolveError::UnsupportedDomain(url.to_string())),
            },
            "soundcloud.com" | "www.soundcloud.com" => Ok(single(MediaType::Audio, url)),
            _ => Err(ResolveError::UnsupportedDomain(url.to_string())),
        }
    }
}
