//! Media download and thumbnailing for Reddit Archiver
//!
//! Streams media files to disk with bounded retries, probes image
//! dimensions, and generates thumbnails. Thumbnails always come out as
//! JPEG regardless of the source format, so the returned path is the
//! authoritative one.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use image::ImageError;
use log::warn;
use reqwest::blocking::Client;
use thiserror::Error;

use crate::archiver::config::Http;

/// File size of the body served in place of removed content. A transfer of
/// exactly this many bytes is treated as a failed download.
pub const REMOVED_SENTINEL_BYTES: u64 = 503;

/// Maximum thumbnail edge in pixels.
pub const THUMB_MAX_DIM: u32 = 200;

/// Error types for downloads
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP status {status} for {url}")]
    Status { status: u16, url: String },
}

/// Result type for download operations
pub type DownloadResult<T> = Result<T, DownloadError>;

/// Error types for thumbnailing and dimension probing
#[derive(Error, Debug)]
pub enum ThumbError {
    #[error("image error: {0}")]
    Image(#[from] ImageError),
}

/// Result type for thumbnail operations
pub type ThumbResult<T> = Result<T, ThumbError>;

/// Fetches a media URL to a destination path, returning the bytes written.
/// The pipeline is generic over this seam so tests can run without a
/// network.
pub trait Fetcher {
    fn fetch(&self, url: &str, dest: &Path) -> DownloadResult<u64>;
}

/// Blocking HTTP fetcher with bounded retries and a fixed backoff.
pub struct HttpFetcher {
    client: Client,
    retries: usize,
    retry_delay: Duration,
}

impl HttpFetcher {
    pub fn new(http: &Http) -> DownloadResult<Self> {
        let client = Client::builder()
            .user_agent(&http.user_agent)
            .timeout(Duration::from_secs(http.timeout_secs))
            .gzip(true)
            .build()?;
        Ok(Self {
            client,
            retries: http.download_retries.max(1),
            retry_delay: Duration::from_millis(http.retry_delay_ms),
        })
    }

    fn try_fetch(&self, url: &str, dest: &Path) -> DownloadResult<u64> {
        let mut response = self.client.get(url).send()?;
        if !response.status().is_success() {
            return Err(DownloadError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        let mut file = File::create(dest)?;
        Ok(response.copy_to(&mut file)?)
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> DownloadResult<u64> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_fetch(url, dest) {
                Ok(size) => return Ok(size),
                Err(e) if attempt < self.retries => {
                    warn!(
                        "download attempt {attempt}/{} failed for {url}: {e}",
                        self.retries
                    );
                    thread::sleep(self.retry_delay);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Probe image dimensions without decoding the full file.
pub fn dimensions(path: &Path) -> ThumbResult<(u32, u32)> {
    Ok(image::image_dimensions(path)?)
}

/// Write a thumbnail of `src` next to `dest`, returning the actual path
/// written. Output is always JPEG, so the path comes back with a `.jpg`
/// extension regardless of what `dest` carried.
pub fn make_thumbnail(src: &Path, dest: &Path) -> ThumbResult<PathBuf> {
    let img = image::open(src)?;
    let thumb = img.thumbnail(THUMB_MAX_DIM, THUMB_MAX_DIM);
    let out = dest.with_extension("jpg");
    thumb.to_rgb8().save(&out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn thumbnail_shrinks_and_reports_actual_path() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("big.png");
        RgbImage::from_pixel(400, 300, Rgb([10, 20, 30]))
            .save(&src)
            .unwrap();

        let out = make_thumbnail(&src, &dir.path().join("thumbs").join("big.png"));
        // Parent directory missing: the save fails, caller falls back.
        assert!(out.is_err());

        std::fs::create_dir_all(dir.path().join("thumbs")).unwrap();
        let out = make_thumbnail(&src, &dir.path().join("thumbs").join("big.png")).unwrap();
        assert_eq!(out.extension().unwrap(), "jpg");
        let (w, h) = image::image_dimensions(&out).unwrap();
        assert!(w <= THUMB_MAX_DIM && h <= THUMB_MAX_DIM);
    }

    #[test]
    fn thumbnail_of_non_image_fails() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("junk.jpg");
        std::fs::write(&src, b"this is not an image").unwrap();

        assert!(make_thumbnail(&src, &dir.path().join("t.jpg")).is_err());
        assert!(dimensions(&src).is_err());
    }

    #[test]
    fn dimensions_probe() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("img.png");
        RgbImage::from_pixel(17, 9, Rgb([0, 0, 0])).save(&src).unwrap();
        assert_eq!(dimensions(&src).unwrap(), (17, 9));
    }
}
