use std::path::Path;

use cardsync_core::collaborators::Filesystem;
use cardsync_core::types::ByteSize;
use cardsync_core::CoreError;

/// [`Filesystem`] over the local disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFilesystem;

impl Filesystem for LocalFilesystem {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn size(&self, path: &Path) -> Result<ByteSize, CoreError> {
        std::fs::metadata(path)
            .map(|m| m.len())
            .map_err(|e| CoreError::io(path.display().to_string(), e))
    }

    fn delete(&self, path: &Path) -> Result<(), CoreError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::io(path.display().to_string(), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn exists_size_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("card.jpg");
        std::fs::write(&path, b"12345").unwrap();

        let fs = LocalFilesystem;
        assert!(fs.exists(&path));
        assert_eq!(fs.size(&path).unwrap(), 5);

        fs.delete(&path).unwrap();
        assert!(!fs.exists(&path));
        // Deleting again is fine.
        fs.delete(&path).unwrap();
    }

    #[test]
    fn directories_are_not_cards() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!LocalFilesystem.exists(dir.path()));
    }

    #[test]
    fn size_of_missing_file_is_io_error() {
        let err = LocalFilesystem.size(Path::new("/nonexistent/card.jpg")).unwrap_err();
        assert_matches!(err, CoreError::Io { .. });
    }
}
