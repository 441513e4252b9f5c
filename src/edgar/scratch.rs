use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// A downloaded or extracted artifact that is deleted when the guard drops,
/// whichever way the surrounding work ends.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if !self.path.exists() {
            return;
        }
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), %err, "failed to remove scratch file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ScratchFile;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn file_is_removed_on_drop() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("log20170101.zip");
        fs::write(&path, b"zip").unwrap();
        {
            let guard = ScratchFile::new(&path);
            assert!(guard.path().exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn file_is_removed_during_unwind() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("log20170101.csv");
        fs::write(&path, b"csv").unwrap();
        let moved = path.clone();
        let outcome = std::panic::catch_unwind(move || {
            let _guard = ScratchFile::new(moved);
            panic!("processing failed");
        });
        assert!(outcome.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn missing_file_is_fine() {
        let tmp = tempdir().unwrap();
        drop(ScratchFile::new(tmp.path().join("never-written")));
    }
}
