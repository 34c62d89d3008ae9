use std::fs;
use std::path::PathBuf;

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Counts reported by a mirroring run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SyncReport {
    pub copied: u64,
    pub skipped: u64,
}

/// Mirrors one directory tree into another, copying only files that are
/// absent at the destination. Existing files are never overwritten.
#[derive(Clone, Debug)]
pub struct FolderSync {
    source: PathBuf,
    destination: PathBuf,
}

impl FolderSync {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }

    /// Checks both roots up front. The destination must already exist,
    /// even if empty, so a typo cannot silently create a new tree.
    pub fn verify_roots(&self) -> Result<()> {
        if !self.source.is_dir() {
            return Err(Error::InvalidConfig(format!(
                "sync source '{}' does not exist",
                self.source.display()
            )));
        }
        if !self.destination.is_dir() {
            return Err(Error::InvalidConfig(format!(
                "sync destination '{}' must already exist, even if empty",
                self.destination.display()
            )));
        }
        Ok(())
    }

    /// Walks the source tree, creating missing directories and copying
    /// missing files into the destination.
    pub fn sync(&self) -> Result<SyncReport> {
        self.verify_roots()?;

        let mut report = SyncReport::default();

        for entry in WalkDir::new(&self.source).min_depth(1) {
            let entry = entry.map_err(std::io::Error::from)?;
            let Ok(relative) = entry.path().strip_prefix(&self.source) else {
                continue;
            };
            let target = self.destination.join(relative);

            if entry.file_type().is_dir() {
                if !target.is_dir() {
                    debug!("creating dir {}", target.display());
                    fs::create_dir_all(&target)?;
                }
            } else if target.is_file() {
                report.skipped += 1;
            } else {
                debug!("copying missing file to {}", target.display());
                fs::copy(entry.path(), &target)?;
                report.copied += 1;
            }
        }

        info!(
            "sync {} -> {}: copied {}, skipped {}",
            self.source.display(),
            self.destination.display(),
            report.copied,
            report.skipped
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_only_missing_files() {
        let source = tempfile::tempdir().unwrap();
        let destination = tempfile::tempdir().unwrap();

        fs::create_dir_all(source.path().join("a/b")).unwrap();
        fs::write(source.path().join("a/b/new.png"), b"new").unwrap();
        fs::write(source.path().join("existing.png"), b"from-source").unwrap();
        fs::write(destination.path().join("existing.png"), b"original").unwrap();

        let report = FolderSync::new(source.path(), destination.path())
            .sync()
            .unwrap();

        assert_eq!(report, SyncReport { copied: 1, skipped: 1 });
        assert_eq!(
            fs::read(destination.path().join("a/b/new.png")).unwrap(),
            b"new"
        );
        // Never overwritten.
        assert_eq!(
            fs::read(destination.path().join("existing.png")).unwrap(),
            b"original"
        );
    }

    #[test]
    fn sync_is_idempotent() {
        let source = tempfile::tempdir().unwrap();
        let destination = tempfile::tempdir().unwrap();
        fs::write(source.path().join("tile.png"), b"x").unwrap();

        let syncer = FolderSync::new(source.path(), destination.path());
        assert_eq!(syncer.sync().unwrap(), SyncReport { copied: 1, skipped: 0 });
        assert_eq!(syncer.sync().unwrap(), SyncReport { copied: 0, skipped: 1 });
    }

    #[test]
    fn missing_destination_is_an_error() {
        let source = tempfile::tempdir().unwrap();
        let destination = source.path().join("nope");

        let err = FolderSync::new(source.path(), &destination).sync().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
