//! Scratch files for in-flight audio
//!
//! Every scratch file belongs to exactly one operation. The handle removes
//! its file when released or dropped, so the file disappears on success,
//! on error and when the owning future is cancelled. A periodic reaper
//! deletes anything left behind by a crashed process.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};

use crate::Result;

/// Directory holding scratch files
#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    /// Create a manager for `root`; the directory is created on first use
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Scratch directory path
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocate a uniquely named file `<prefix>-<uuid>.<suffix>`
    ///
    /// The file is not created; the caller writes it.
    ///
    /// # Errors
    ///
    /// Returns error if the scratch directory cannot be created
    pub fn acquire(&self, prefix: &str, suffix: &str) -> Result<ScratchFile> {
        std::fs::create_dir_all(&self.root)?;

        let suffix = suffix.trim_start_matches('.');
        let name = if suffix.is_empty() {
            format!("{prefix}-{}", uuid::Uuid::new_v4())
        } else {
            format!("{prefix}-{}.{suffix}", uuid::Uuid::new_v4())
        };
        let path = self.root.join(name);

        tracing::trace!(path = %path.display(), "scratch file acquired");
        Ok(ScratchFile {
            path,
            created_at: Utc::now(),
        })
    }

    /// Delete a scratch file; releasing an already-removed file is a no-op
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be removed
    pub fn release(&self, file: &ScratchFile) -> Result<()> {
        file.remove()?;
        Ok(())
    }

    /// Remove files in the scratch directory older than `max_age`
    ///
    /// Returns the number of files removed. A missing directory counts as empty.
    ///
    /// # Errors
    ///
    /// Returns error if the directory exists but cannot be listed
    pub fn reap_stale(&self, max_age: Duration) -> Result<usize> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let now = SystemTime::now();
        let mut removed = 0;

        for entry in entries.flatten() {
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }

            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age <= max_age {
                continue;
            }

            match std::fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "failed to reap scratch file");
                }
            }
        }

        if removed > 0 {
            tracing::info!(removed, dir = %self.root.display(), "reaped stale scratch files");
        }
        Ok(removed)
    }

    /// Run [`ScratchDir::reap_stale`] every `interval` in a background task
    #[must_use]
    pub fn spawn_reaper(
        self: &Arc<Self>,
        interval: Duration,
        max_age: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let dir = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let dir = Arc::clone(&dir);
                let result = tokio::task::spawn_blocking(move || dir.reap_stale(max_age)).await;
                match result {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::warn!(error = %e, "scratch reaper failed"),
                    Err(e) => tracing::warn!(error = %e, "scratch reaper task panicked"),
                }
            }
        })
    }
}

/// A scratch file owned by one operation; removed on release or drop
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    created_at: DateTime<Utc>,
}

impl ScratchFile {
    /// Absolute path of the file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// When the handle was acquired
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Write the whole file
    ///
    /// # Errors
    ///
    /// Returns error if writing fails
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        std::fs::write(&self.path, bytes)?;
        Ok(())
    }

    fn remove(&self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::trace!(path = %self.path.display(), "scratch file released");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove scratch file");
        }
    }
}
