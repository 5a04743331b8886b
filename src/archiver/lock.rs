//! Single-instance guard for the archiver daemon
//!
//! Two schedulers racing on the same store would double-poll users and
//! corrupt watermark state, so the daemon acquires an exclusive lock file
//! before entering its loop.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::info;
use thiserror::Error;

/// Error types for instance locking
#[derive(Error, Debug)]
pub enum LockError {
    #[error("another instance is already running")]
    AlreadyRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Exclusive lock file held for the lifetime of the daemon.
///
/// Acquisition is a single atomic `create_new`, so two processes starting at
/// the same moment cannot both win. The PID is written into the file for
/// manual inspection; the file is removed on drop. A lock left behind by a
/// crashed process must be removed by hand.
pub struct InstanceLock {
    path: PathBuf,
}

impl InstanceLock {
    /// Acquire the global lock, failing with `AlreadyRunning` if another
    /// process holds it.
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(LockError::AlreadyRunning);
            }
            Err(e) => return Err(LockError::Io(e)),
        };

        let pid = std::process::id().to_string();
        file.write_all(pid.as_bytes())?;
        file.flush()?;

        info!("Acquired global lock: {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
