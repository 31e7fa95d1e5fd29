use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use {
    tempfile::TempDir,
    tracing::{debug, warn},
};

/// A fetched file in the download directory.
///
/// The file is removed when the value is dropped, on every exit path of the
/// delivery step. Files fetched by [`crate::PlatformFetcher`] also own the
/// scratch directory the extractor wrote into, so partial and fragment files
/// go with it.
#[derive(Debug)]
pub struct DownloadedFile {
    path: PathBuf,
    scratch: Option<TempDir>,
}

impl DownloadedFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            scratch: None,
        }
    }

    pub(crate) fn in_scratch(path: impl Into<PathBuf>, scratch: TempDir) -> Self {
        Self {
            path: path.into(),
            scratch: Some(scratch),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DownloadedFile {
    fn drop(&mut self) {
        cleanup(&self.path);
        if let Some(scratch) = self.scratch.take() {
            let dir = scratch.path().to_path_buf();
            if let Err(e) = scratch.close() {
                warn!(path = %dir.display(), error = %e, "failed to remove scratch directory");
            }
        }
    }
}

/// Remove a file if present. A missing file is fine; other failures are logged.
pub fn cleanup(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed downloaded file"),
        Err(e) if e.kind() == ErrorKind::NotFound => {},
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove downloaded file"),
    }
}
