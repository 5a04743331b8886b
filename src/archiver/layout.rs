//! On-disk layout of the content archive
//!
//! The content root holds one directory per tracked user, each with its own
//! `history.log`, an `unsupported.txt` of URLs no resolver rule matched, a
//! `thumbs/` directory, and the downloaded media files. Album media lives in
//! a per-album subdirectory with its own `thumbs/`. Shared placeholder
//! images live under `<root>/images/`.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use image::{Rgb, RgbImage};

const PLACEHOLDER_DIM: u32 = 64;

/// Filesystem layout rooted at the configured content directory.
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    /// Opens the layout, creating the root, the shared `images/` directory,
    /// and the placeholder assets if they are missing.
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("images"))?;
        let layout = Self { root };
        layout.ensure_placeholder(&layout.nothumb())?;
        layout.ensure_placeholder(&layout.audio_icon())?;
        Ok(layout)
    }

    pub fn user_dir(&self, handle: &str) -> PathBuf {
        self.root.join(handle)
    }

    /// Creates the user's directory and its `thumbs/` subdirectory.
    pub fn ensure_user_dirs(&self, handle: &str) -> io::Result<PathBuf> {
        let dir = self.user_dir(handle);
        fs::create_dir_all(dir.join("thumbs"))?;
        Ok(dir)
    }

    /// Fixed thumbnail substituted when real thumbnail generation fails.
    pub fn nothumb(&self) -> PathBuf {
        self.root.join("images").join("nothumb.png")
    }

    /// Fixed icon used for audio media, which is never thumbnailed.
    pub fn audio_icon(&self) -> PathBuf {
        self.root.join("images").join("audio.png")
    }

    /// Appends a raw URL to the user's `unsupported.txt` for manual review.
    pub fn record_unsupported(&self, handle: &str, url: &str) -> io::Result<()> {
        let dir = self.ensure_user_dirs(handle)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("unsupported.txt"))?;
        writeln!(file, "{url}")?;
        file.flush()
    }

    /// Opens the user's append-only history log.
    pub fn open_user_log(&self, handle: &str) -> io::Result<UserLog> {
        let dir = self.ensure_user_dirs(handle)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("history.log"))?;
        Ok(UserLog { file })
    }

    fn ensure_placeholder(&self, path: &Path) -> io::Result<()> {
        if path.exists() {
            return Ok(());
        }
        let image = RgbImage::from_pixel(PLACEHOLDER_DIM, PLACEHOLDER_DIM, Rgb([96, 96, 96]));
        image
            .save(path)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

/// Per-user log sink, passed explicitly into each pipeline call rather than
/// swapped into a shared logger.
pub struct UserLog {
    file: File,
}

impl UserLog {
    /// Writes one timestamped line. Log-sink failures are swallowed so a
    /// full disk cannot abort a poll.
    pub fn line(&mut self, text: &str) {
        let stamp = Utc::now().format("[%Y-%m-%dT%H:%M:%SZ]");
        let _ = writeln!(self.file, "{stamp} {text}");
        let _ = self.file.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_root_and_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path().join("content")).unwrap();

        assert!(layout.nothumb().exists());
        assert!(layout.audio_icon().exists());
        assert_eq!(image::image_dimensions(layout.nothumb()).unwrap(), (64, 64));
    }

    #[test]
    fn user_dirs_and_unsupported_log() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path().join("content")).unwrap();

        let user_dir = layout.ensure_user_dirs("alice").unwrap();
        assert!(user_dir.join("thumbs").is_dir());

        layout.record_unsupported("alice", "http://weird.example/a").unwrap();
        layout.record_unsupported("alice", "http://weird.example/b").unwrap();
        let contents = fs::read_to_string(user_dir.join("unsupported.txt")).unwrap();
        assert_eq!(contents, "http://weird.example/a\nhttp://weird.example/b\n");
    }

    #[test]
    fn user_log_appends_timestamped_lines() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path().join("content")).unwrap();

        let mut log = layout.open_user_log("alice").unwrap();
        log.line("poll_user: since \"abc\"");
        drop(log);

        let contents =
            fs::read_to_string(layout.user_dir("alice").join("history.log")).unwrap();
        assert!(contents.contains("poll_user: since \"abc\""));
        assert!(contents.starts_with('['));
    }
}
