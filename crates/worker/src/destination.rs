use std::path::{Path, PathBuf};

use cardsync_core::delivery::Destination;
use cardsync_core::collaborators::DeliveryChannel;

/// Delivers cards by copying them into each destination's `location`
/// directory, keeping the card's file name.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryDestination;

impl DirectoryDestination {
    /// Where `artifact_path` lands for `destination`.
    pub fn target_path(artifact_path: &Path, destination: &Destination) -> Option<PathBuf> {
        if destination.location.trim().is_empty() {
            return None;
        }
        artifact_path
            .file_name()
            .map(|name| Path::new(&destination.location).join(name))
    }
}

impl DeliveryChannel for DirectoryDestination {
    fn deliver(&self, artifact_path: &Path, destination: &Destination) -> bool {
        let Some(target) = Self::target_path(artifact_path, destination) else {
            tracing::warn!(destination = %destination.name, "Destination has no location");
            return false;
        };
        let result = std::fs::create_dir_all(&destination.location)
            .and_then(|()| std::fs::copy(artifact_path, &target));
        match result {
            Ok(bytes) => {
                tracing::info!(
                    destination = %destination.name,
                    target = %target.display(),
                    bytes,
                    "Card delivered"
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    destination = %destination.name,
                    target = %target.display(),
                    error = %e,
                    "Card delivery failed"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn destination(location: &Path) -> Destination {
        Destination {
            id: 1,
            name: "Library".into(),
            location: location.display().to_string(),
        }
    }

    #[test]
    fn copies_card_into_location() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let card = src.path().join("Dark - S01E01.jpg");
        std::fs::write(&card, b"card").unwrap();

        let target_dir = dst.path().join("nested");
        assert!(DirectoryDestination.deliver(&card, &destination(&target_dir)));
        assert_eq!(
            std::fs::read(target_dir.join("Dark - S01E01.jpg")).unwrap(),
            b"card"
        );
    }

    #[test]
    fn missing_card_fails_delivery() {
        let dst = tempfile::tempdir().unwrap();
        assert!(!DirectoryDestination.deliver(Path::new("/nonexistent/card.jpg"), &destination(dst.path())));
    }

    #[test]
    fn empty_location_fails_delivery() {
        let dest = Destination {
            id: 2,
            name: "Nowhere".into(),
            location: String::new(),
        };
        assert!(!DirectoryDestination.deliver(Path::new("/tmp/card.jpg"), &dest));
    }
}
