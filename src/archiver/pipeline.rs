//! Ingestion pipeline for Reddit Archiver
//!
//! `poll_user` fetches everything a user wrote since the last watermark,
//! persists the items, and hands every extracted URL to `process_url`,
//! which resolves, downloads, thumbnails, and records the media. Failures
//! are isolated per item and per URL: one bad link never aborts a batch.

use std::fs;
use std::path::Path;

use log::{info, warn};
use thiserror::Error;

use crate::archiver::config::Fetch;
use crate::archiver::download::{self, Fetcher, REMOVED_SENTINEL_BYTES};
use crate::archiver::extract::extract_urls;
use crate::archiver::layout::{Layout, UserLog};
use crate::archiver::reddit::{ContentItem, ItemSource, RedditError};
use crate::archiver::resolve::{filename_from_url, MediaType, ResolveError, Resolver};
use crate::archiver::store::{NewMediaAsset, Store, StoreError};

/// Error types for the pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Per-user ingestion pipeline, generic over its collaborator seams.
pub struct IngestPipeline<'a, S, R, F> {
    store: &'a Store,
    source: &'a S,
    resolver: &'a R,
    fetcher: &'a F,
    layout: &'a Layout,
    limits: &'a Fetch,
}

impl<'a, S: ItemSource, R: Resolver, F: Fetcher> IngestPipeline<'a, S, R, F> {
    pub fn new(
        store: &'a Store,
        source: &'a S,
        resolver: &'a R,
        fetcher: &'a F,
        layout: &'a Layout,
        limits: &'a Fetch,
    ) -> Self {
        Self {
            store,
            source,
            resolver,
            fetcher,
            layout,
            limits,
        }
    }

    /// Poll one user: fetch new items since the watermark, persist them,
    /// and archive their media. Fetch failures are absorbed here; storage
    /// failures propagate to the scheduler, which logs and moves on.
    pub fn poll_user(&self, handle: &str) -> PipelineResult<()> {
        let user_dir = self.layout.ensure_user_dirs(handle)?;
        let mut ulog = self.layout.open_user_log(handle)?;

        let since = self.store.get_watermark(handle)?;
        note(
            &mut ulog,
            &format!("{handle}: poll_user: since {:?}", since.as_deref()),
        );

        // A user never polled before gets a shallow recent window instead of
        // a full-history crawl.
        let max_pages = if since.is_some() {
            self.limits.pages_with_watermark
        } else {
            self.limits.pages_without_watermark
        };

        let items = match self
            .source
            .fetch_user_items(handle, since.as_deref(), max_pages)
        {
            Ok(items) => items,
            Err(RedditError::NotFound) => {
                note(
                    &mut ulog,
                    &format!("{handle}: poll_user: account is gone, marking as deleted"),
                );
                self.store.mark_deleted(handle)?;
                self.store.clear_new(handle)?;
                return Ok(());
            }
            Err(e) => {
                note_warn(&mut ulog, &format!("{handle}: poll_user: fetch failed: {e}"));
                return Ok(());
            }
        };

        if items.is_empty() {
            self.store.clear_new(handle)?;
            return Ok(());
        }
        note(
            &mut ulog,
            &format!("{handle}: poll_user: {} new posts and comments", items.len()),
        );

        // The watermark advances to the newest item before any of the batch
        // is processed. A crash mid-batch drops the remainder of this batch;
        // it is never reprocessed.
        let newest = items[0].id().to_string();
        self.store.set_watermark(handle, &newest)?;
        note(
            &mut ulog,
            &format!("{handle}: poll_user: watermark advanced to \"{newest}\""),
        );

        let excluded = self.store.excluded_subreddits()?;
        for item in &items {
            if excluded.contains(&item.subreddit().to_ascii_lowercase()) {
                note(
                    &mut ulog,
                    &format!(
                        "{handle}: poll_user: skipping item in excluded subreddit \"{}\": {}",
                        item.subreddit(),
                        item.permalink()
                    ),
                );
                continue;
            }

            let persisted = match item {
                ContentItem::Post(post) => self.store.add_post(post),
                ContentItem::Comment(comment) => self.store.add_comment(comment),
            };
            if let Err(e) = persisted {
                match e {
                    StoreError::Duplicate { .. } => note(
                        &mut ulog,
                        &format!("{handle}: poll_user: already stored, skipping: {e}"),
                    ),
                    other => note_warn(
                        &mut ulog,
                        &format!("{handle}: poll_user: could not store item: {other}"),
                    ),
                }
                continue;
            }

            let urls = extract_urls(item);
            if urls.is_empty() {
                continue;
            }
            note(
                &mut ulog,
                &format!(
                    "{handle}: poll_user: {} url(s) in {}",
                    urls.len(),
                    item.permalink()
                ),
            );
            for (url_index, url) in urls.iter().enumerate() {
                self.process_url(url, url_index, item, &user_dir, &mut ulog);
            }
        }

        self.store.touch_user(handle)?;
        self.store.clear_new(handle)?;
        note(&mut ulog, &format!("{handle}: poll_user: done"));
        Ok(())
    }

    /// Archive the media behind one URL. Never propagates an error past its
    /// own boundary: every failure is logged and the caller moves on to the
    /// next URL.
    fn process_url(
        &self,
        url: &str,
        url_index: usize,
        item: &ContentItem,
        user_dir: &Path,
        ulog: &mut UserLog,
    ) {
        let handle = item.author();
        note(ulog, &format!("{handle}: process_url: {url}"));

        let resolution = match self.resolver.resolve(url) {
            Ok(resolution) => resolution,
            Err(ResolveError::UnsupportedDomain(_)) => {
                note(
                    ulog,
                    &format!("{handle}: process_url: no rule for {url}, recording"),
                );
                if let Err(e) = self.layout.record_unsupported(handle, url) {
                    note_warn(
                        ulog,
                        &format!("{handle}: process_url: could not record {url}: {e}"),
                    );
                }
                return;
            }
            Err(e) => {
                note_warn(
                    ulog,
                    &format!("{handle}: process_url: cannot resolve {url}: {e}"),
                );
                return;
            }
        };

        let (base, post_id, comment_id) = match item {
            ContentItem::Post(post) => (format!("{}-{}", post.id, url_index), post.id.as_str(), None),
            ContentItem::Comment(comment) => (
                format!("{}-{}-{}", comment.post_id, comment.id, url_index),
                comment.post_id.as_str(),
                Some(comment.id.as_str()),
            ),
        };

        let mut working_dir = user_dir.to_path_buf();
        let album_id = match &resolution.album {
            Some(album_name) => {
                match self.store.album_exists(url) {
                    Ok(true) => {
                        note(
                            ulog,
                            &format!(
                                "{handle}: process_url: album {url} already archived: {}",
                                item.permalink()
                            ),
                        );
                        return;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        note_warn(
                            ulog,
                            &format!("{handle}: process_url: album check failed for {url}: {e}"),
                        );
                        return;
                    }
                }
                working_dir = user_dir.join(format!("{base}-{album_name}"));
                // The album row goes in before any download so partially
                // populated albums still have their parent record.
                match self
                    .store
                    .add_album(&working_dir, handle, url, post_id, comment_id)
                {
                    Ok(id) => Some(id),
                    Err(e) => {
                        note_warn(
                            ulog,
                            &format!("{handle}: process_url: could not store album {url}: {e}"),
                        );
                        return;
                    }
                }
            }
            None => None,
        };

        if let Err(e) = fs::create_dir_all(working_dir.join("thumbs")) {
            note_warn(
                ulog,
                &format!("{handle}: process_url: cannot create directories: {e}"),
            );
            return;
        }

        for (media_index, media_url) in resolution.media_urls.iter().enumerate() {
            let fname = format!("{base}-{media_index:02}-{}", filename_from_url(media_url));
            let dest = working_dir.join(&fname);

            let size = match self.fetcher.fetch(media_url, &dest) {
                Ok(size) => size,
                Err(e) => {
                    note_warn(
                        ulog,
                        &format!(
                            "{handle}: process_url: download #{} failed ({media_url}): {e}",
                            media_index + 1
                        ),
                    );
                    continue;
                }
            };
            if size == REMOVED_SENTINEL_BYTES {
                note(
                    ulog,
                    &format!(
                        "{handle}: process_url: #{} served the removed-content body, skipping",
                        media_index + 1
                    ),
                );
                let _ = fs::remove_file(&dest);
                continue;
            }

            let (width, height, thumb_path) = match resolution.media_type {
                // Audio has no dimensions and is never thumbnailed.
                MediaType::Audio => (0, 0, self.layout.audio_icon()),
                MediaType::Video => (0, 0, self.layout.nothumb()),
                MediaType::Image => {
                    let (width, height) = match download::dimensions(&dest) {
                        Ok(dims) => dims,
                        Err(e) => {
                            // An unreadable file must not leave a broken record.
                            note_warn(
                                ulog,
                                &format!(
                                    "{handle}: process_url: #{} unreadable ({fname}): {e}, skipping",
                                    media_index + 1
                                ),
                            );
                            continue;
                        }
                    };
                    let thumb_dest = working_dir.join("thumbs").join(&fname);
                    let thumb_path = match download::make_thumbnail(&dest, &thumb_dest) {
                        Ok(path) => path,
                        Err(e) => {
                            note_warn(
                                ulog,
                                &format!(
                                    "{handle}: process_url: thumbnail #{} failed: {e}, using default",
                                    media_index + 1
                                ),
                            );
                            self.layout.nothumb()
                        }
                    };
                    (width, height, thumb_path)
                }
            };

            let asset = NewMediaAsset {
                path: &dest,
                owner: handle,
                source_url: media_url,
                width,
                height,
                size_bytes: size,
                thumbnail_path: &thumb_path,
                media_type: resolution.media_type,
                album_id,
                post_id,
                comment_id,
            };
            if let Err(e) = self.store.add_media_asset(&asset) {
                note_warn(
                    ulog,
                    &format!("{handle}: process_url: could not store asset {fname}: {e}"),
                );
            }
        }
    }
}

fn note(ulog: &mut UserLog, msg: &str) {
    info!("{msg}");
    ulog.line(msg);
}

fn note_warn(ulog: &mut UserLog, msg: &str) {
    warn!("{msg}");
    ulog.line(msg);
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    use super::*;
    use crate::archiver::config::AppConfig;
    use crate::archiver::download::DownloadError;
    use crate::archiver::reddit::{Comment, Post, RedditResult};
    use crate::archiver::resolve::{Resolution, ResolveResult};

    fn link_post(id: &str, subreddit: &str, url: &str) -> ContentItem {
        ContentItem::Post(Post {
            id: id.to_string(),
            author: "alice".to_string(),
            subreddit: subreddit.to_string(),
            permalink: format!("https://www.reddit.com/r/{subreddit}/comments/{id}/"),
            created_utc: 1_400_000_000,
            title: "a title".to_string(),
            selftext: None,
            url: Some(url.to_string()),
        })
    }

    fn comment(id: &str, post_id: &str, body: &str) -> ContentItem {
        ContentItem::Comment(Comment {
            id: id.to_string(),
            author: "alice".to_string(),
            subreddit: "pics".to_string(),
            permalink: format!("https://www.reddit.com/r/pics/comments/{post_id}/_/{id}"),
            created_utc: 1_400_000_000,
            body: body.to_string(),
            post_id: post_id.to_string(),
        })
    }

    /// Hands out canned batches in order; empty once exhausted.
    struct StubSource {
        batches: RefCell<VecDeque<RedditResult<Vec<ContentItem>>>>,
        calls: RefCell<Vec<(String, Option<String>, usize)>>,
    }

    impl StubSource {
        fn new(batches: Vec<RedditResult<Vec<ContentItem>>>) -> Self {
            Self {
                batches: RefCell::new(batches.into()),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl ItemSource for StubSource {
        fn fetch_user_items(
            &self,
            handle: &str,
            since: Option<&str>,
            max_pages: usize,
        ) -> RedditResult<Vec<ContentItem>> {
            self.calls.borrow_mut().push((
                handle.to_string(),
                since.map(str::to_string),
                max_pages,
            ));
            self.batches
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        fn fetch_top(&self, _subreddit: &str, _window: &str) -> RedditResult<Vec<ContentItem>> {
            Ok(Vec::new())
        }
    }

    /// Album URLs (containing "/a/") expand to two images; ".mp3" is audio;
    /// "unsupported" has no rule; everything else is a single image.
    struct StubResolver;

    impl Resolver for StubResolver {
        fn resolve(&self, url: &str) -> ResolveResult<Resolution> {
            if url.contains("unsupported") {
                return Err(ResolveError::UnsupportedDomain(url.to_string()));
            }
            if url.contains("/a/") {
                return Ok(Resolution {
                    media_type: MediaType::Image,
                    album: Some("album".to_string()),
                    media_urls: vec![format!("{url}/one.png"), format!("{url}/two.png")],
                });
            }
            if url.ends_with(".mp3") {
                return Ok(Resolution {
                    media_type: MediaType::Audio,
                    album: None,
                    media_urls: vec![url.to_string()],
                });
            }
            Ok(Resolution {
                media_type: MediaType::Image,
                album: None,
                media_urls: vec![url.to_string()],
            })
        }
    }

    /// Writes a real image in whatever format the destination extension
    /// implies; URLs containing "bad" fail the transfer.
    struct ImageFetcher;

    impl Fetcher for ImageFetcher {
        fn fetch(&self, url: &str, dest: &Path) -> crate::archiver::DownloadResult<u64> {
            if url.contains("bad") {
                return Err(DownloadError::Status {
                    status: 404,
                    url: url.to_string(),
                });
            }
            RgbImage::from_pixel(4, 4, Rgb([7, 7, 7]))
                .save(dest)
                .expect("write test image");
            Ok(fs::metadata(dest).unwrap().len())
        }
    }

    /// Writes fixed raw bytes, whatever they are.
    struct RawFetcher(Vec<u8>);

    impl Fetcher for RawFetcher {
        fn fetch(&self, _url: &str, dest: &Path) -> crate::archiver::DownloadResult<u64> {
            fs::write(dest, &self.0)?;
            Ok(self.0.len() as u64)
        }
    }

    /// A BMP header that declares 8x8 pixels but carries no pixel data:
    /// dimension probing succeeds, full decoding fails.
    fn header_only_bmp() -> Vec<u8> {
        let mut bytes = Vec::with_capacity(54);
        bytes.extend_from_slice(b"BM");
        bytes.extend_from_slice(&54u32.to_le_bytes());
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        bytes.extend_from_slice(&54u32.to_le_bytes());
        bytes.extend_from_slice(&40u32.to_le_bytes());
        bytes.extend_from_slice(&8i32.to_le_bytes());
        bytes.extend_from_slice(&8i32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&24u16.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 24]);
        bytes
    }

    struct Fixture {
        _dir: TempDir,
        store: Store,
        layout: Layout,
        limits: Fetch,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let store = Store::open_in_memory().unwrap();
            store.add_user("alice", true).unwrap();
            let layout = Layout::new(dir.path().join("content")).unwrap();
            Self {
                _dir: dir,
                store,
                layout,
                limits: AppConfig::default().fetch,
            }
        }

        fn poll<S: ItemSource, F: Fetcher>(&self, source: &S, fetcher: &F) {
            IngestPipeline::new(
                &self.store,
                source,
                &StubResolver,
                fetcher,
                &self.layout,
                &self.limits,
            )
            .poll_user("alice")
            .unwrap();
        }
    }

    #[test]
    fn single_image_post_persists_one_asset() {
        let fx = Fixture::new();
        let source = StubSource::new(vec![Ok(vec![link_post(
            "p1",
            "gonewild",
            "http://img.example/x.jpg",
        )])]);

        fx.poll(&source, &ImageFetcher);

        assert_eq!(fx.store.count("posts"), 1);
        let assets = fx.store.media_assets();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].album_id, None);
        assert_eq!(assets[0].post_id, "p1");
        assert_eq!(assets[0].comment_id, None);
        assert_eq!(assets[0].media_type, "image");
        assert_eq!((assets[0].width, assets[0].height), (4, 4));
        assert!(assets[0].path.ends_with("p1-0-00-x.jpg"));
        assert!(assets[0].thumbnail_path.contains("thumbs"));
        assert!(Path::new(&assets[0].path).exists());
        assert!(Path::new(&assets[0].thumbnail_path).exists());
        assert_eq!(
            fx.store.get_watermark("alice").unwrap(),
            Some("p1".to_string())
        );
        // First successful poll takes the user out of the new set.
        assert!(fx.store.list_users(true).unwrap().is_empty());
    }

    #[test]
    fn re_polling_a_processed_batch_creates_nothing_new() {
        let fx = Fixture::new();
        let batch = vec![link_post("p1", "pics", "http://img.example/x.jpg")];
        let source = StubSource::new(vec![Ok(batch.clone()), Ok(batch)]);

        fx.poll(&source, &ImageFetcher);
        fx.poll(&source, &ImageFetcher);

        assert_eq!(fx.store.count("posts"), 1);
        assert_eq!(fx.store.count("media_assets"), 1);
        assert_eq!(fx.store.count("albums"), 0);
        assert_eq!(
            fx.store.get_watermark("alice").unwrap(),
            Some("p1".to_string())
        );
    }

    #[test]
    fn excluded_subreddit_produces_no_rows() {
        let fx = Fixture::new();
        fx.store.add_excluded("GoneWild").unwrap();
        let source = StubSource::new(vec![Ok(vec![link_post(
            "p1",
            "gonewild",
            "http://img.example/x.jpg",
        )])]);

        fx.poll(&source, &ImageFetcher);

        assert_eq!(fx.store.count("posts"), 0);
        assert_eq!(fx.store.count("media_assets"), 0);
        // The watermark still advances past the skipped batch.
        assert_eq!(
            fx.store.get_watermark("alice").unwrap(),
            Some("p1".to_string())
        );
    }

    #[test]
    fn exclusion_check_ignores_case() {
        let fx = Fixture::new();
        fx.store.add_excluded("gonewild").unwrap();
        let source = StubSource::new(vec![Ok(vec![link_post(
            "p1",
            "GoneWild",
            "http://img.example/x.jpg",
        )])]);

        fx.poll(&source, &ImageFetcher);
        assert_eq!(fx.store.count("posts"), 0);
    }

    #[test]
    fn album_is_archived_exactly_once() {
        let fx = Fixture::new();
        let album_url = "http://imgur.example/a/slug";
        let source = StubSource::new(vec![
            Ok(vec![link_post("p1", "pics", album_url)]),
            // A different post resubmits the same album.
            Ok(vec![link_post("p2", "pics", album_url)]),
        ]);

        fx.poll(&source, &ImageFetcher);
        assert_eq!(fx.store.count("albums"), 1);
        assert_eq!(fx.store.count("media_assets"), 2);

        fx.poll(&source, &ImageFetcher);
        assert_eq!(fx.store.count("albums"), 1);
        assert_eq!(fx.store.count("media_assets"), 2);
        assert_eq!(fx.store.count("posts"), 2);
        // Watermark moved forward with the second batch.
        assert_eq!(
            fx.store.get_watermark("alice").unwrap(),
            Some("p2".to_string())
        );

        let assets = fx.store.media_assets();
        let album_id = assets[0].album_id.unwrap();
        assert!(assets.iter().all(|a| a.album_id == Some(album_id)));
        assert!(assets[0].path.ends_with("p1-0-album/p1-0-00-one.png"));
        assert!(assets[1].path.ends_with("p1-0-album/p1-0-01-two.png"));
    }

    #[test]
    fn non_album_urls_are_not_deduped_across_posts() {
        let fx = Fixture::new();
        let source = StubSource::new(vec![Ok(vec![
            link_post("p2", "pics", "http://img.example/x.jpg"),
            link_post("p1", "pics", "http://img.example/x.jpg"),
        ])]);

        fx.poll(&source, &ImageFetcher);

        assert_eq!(fx.store.count("media_assets"), 2);
        assert_eq!(fx.store.count("albums"), 0);
    }

    #[test]
    fn account_not_found_marks_user_deleted() {
        let fx = Fixture::new();
        let source = StubSource::new(vec![Err(RedditError::NotFound)]);

        fx.poll(&source, &ImageFetcher);

        assert!(fx.store.is_deleted("alice"));
        assert_eq!(fx.store.count("posts"), 0);
    }

    #[test]
    fn fetch_failure_is_absorbed_and_leaves_state_alone() {
        let fx = Fixture::new();
        let source = StubSource::new(vec![Err(RedditError::Status(500))]);

        fx.poll(&source, &ImageFetcher);

        assert!(!fx.store.is_deleted("alice"));
        assert_eq!(fx.store.get_watermark("alice").unwrap(), None);
        // Not successfully polled, so the user stays in the new set.
        assert_eq!(fx.store.list_users(true).unwrap(), vec!["alice".to_string()]);
    }

    #[test]
    fn removed_content_sentinel_yields_no_asset() {
        let fx = Fixture::new();
        let source = StubSource::new(vec![Ok(vec![link_post(
            "p1",
            "pics",
            "http://img.example/x.jpg",
        )])]);

        fx.poll(&source, &RawFetcher(vec![0u8; 503]));

        assert_eq!(fx.store.count("posts"), 1);
        assert_eq!(fx.store.count("media_assets"), 0);
        // The sentinel body does not linger on disk.
        assert!(!fx.layout.user_dir("alice").join("p1-0-00-x.jpg").exists());
    }

    #[test]
    fn unreadable_image_is_skipped_entirely() {
        let fx = Fixture::new();
        let source = StubSource::new(vec![Ok(vec![link_post(
            "p1",
            "pics",
            "http://img.example/x.jpg",
        )])]);

        fx.poll(&source, &RawFetcher(b"not an image at all".to_vec()));

        assert_eq!(fx.store.count("media_assets"), 0);
    }

    #[test]
    fn thumbnail_failure_falls_back_to_placeholder() {
        let fx = Fixture::new();
        let source = StubSource::new(vec![Ok(vec![link_post(
            "p1",
            "pics",
            "http://img.example/h.bmp",
        )])]);

        // Header-only BMP: dimensions probe fine, thumbnail decode fails.
        fx.poll(&source, &RawFetcher(header_only_bmp()));

        let assets = fx.store.media_assets();
        assert_eq!(assets.len(), 1);
        assert_eq!((assets[0].width, assets[0].height), (8, 8));
        assert_eq!(
            assets[0].thumbnail_path,
            fx.layout.nothumb().to_string_lossy()
        );
    }

    #[test]
    fn audio_uses_icon_and_zero_dimensions() {
        let fx = Fixture::new();
        let source = StubSource::new(vec![Ok(vec![comment(
            "c1",
            "p1",
            "listen: http://sound.example/track.mp3",
        )])]);

        fx.poll(&source, &RawFetcher(b"pretend audio bytes".to_vec()));

        let assets = fx.store.media_assets();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].media_type, "audio");
        assert_eq!((assets[0].width, assets[0].height), (0, 0));
        assert_eq!(
            assets[0].thumbnail_path,
            fx.layout.audio_icon().to_string_lossy()
        );
        assert_eq!(assets[0].post_id, "p1");
        assert_eq!(assets[0].comment_id.as_deref(), Some("c1"));
        assert!(assets[0].path.ends_with("p1-c1-0-00-track.mp3"));
    }

    #[test]
    fn unsupported_domain_is_recorded_for_review() {
        let fx = Fixture::new();
        let source = StubSource::new(vec![Ok(vec![link_post(
            "p1",
            "pics",
            "http://unsupported.example/page",
        )])]);

        fx.poll(&source, &ImageFetcher);

        assert_eq!(fx.store.count("posts"), 1);
        assert_eq!(fx.store.count("media_assets"), 0);
        let recorded =
            fs::read_to_string(fx.layout.user_dir("alice").join("unsupported.txt")).unwrap();
        assert_eq!(recorded, "http://unsupported.example/page\n");
    }

    #[test]
    fn one_failed_download_does_not_abort_the_rest() {
        let fx = Fixture::new();
        let item = ContentItem::Post(Post {
            id: "p1".to_string(),
            author: "alice".to_string(),
            subreddit: "pics".to_string(),
            permalink: "https://www.reddit.com/r/pics/comments/p1/".to_string(),
            created_utc: 1_400_000_000,
            title: "t".to_string(),
            selftext: Some(
                "http://img.example/bad.jpg and http://img.example/good.jpg".to_string(),
            ),
            url: None,
        });
        let source = StubSource::new(vec![Ok(vec![item])]);

        fx.poll(&source, &ImageFetcher);

        let assets = fx.store.media_assets();
        assert_eq!(assets.len(), 1);
        assert!(assets[0].path.ends_with("p1-1-00-good.jpg"));
    }

    #[test]
    fn fresh_user_gets_shallow_fetch_window() {
        let fx = Fixture::new();
        let source = StubSource::new(vec![
            Ok(vec![link_post("p1", "pics", "http://img.example/x.jpg")]),
            Ok(vec![]),
        ]);

        fx.poll(&source, &ImageFetcher);
        fx.poll(&source, &ImageFetcher);

        let calls = source.calls.borrow();
        assert_eq!(calls[0], ("alice".to_string(), None, 1));
        assert_eq!(
            calls[1],
            ("alice".to_string(), Some("p1".to_string()), 10)
        );
    }
}
