#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde_json::json;
use tempfile::TempDir;

use cardsync_core::collaborators::{Filesystem, RenderResult, Renderer};
use cardsync_core::delivery::Destination;
use cardsync_core::render::RenderSpec;
use cardsync_core::settings::{ConfigLayer, LayerSource};
use cardsync_core::types::ByteSize;
use cardsync_core::{CoreError, Engine, MemoryStore};

/// [`Filesystem`] over the real disk.
pub struct DiskFs;

impl Filesystem for DiskFs {
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
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                Err(CoreError::io(path.display().to_string(), e))
            }
            _ => Ok(()),
        }
    }
}

/// Renderer that writes `output_size` bytes to the card path.
///
/// With `write_output` off it reports success without writing anything,
/// like a raster tool that exits 0 but fails silently.
pub struct FakeRenderer {
    pub output_size: AtomicU64,
    pub write_output: bool,
    /// Path reported back instead of the real card path.
    pub reported_path: Option<PathBuf>,
    pub calls: AtomicUsize,
}

impl FakeRenderer {
    pub fn new(output_size: ByteSize) -> Self {
        Self {
            output_size: AtomicU64::new(output_size),
            write_output: true,
            reported_path: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn silent() -> Self {
        Self {
            write_output: false,
            ..Self::new(0)
        }
    }

    pub fn reporting(path: impl Into<PathBuf>) -> Self {
        Self {
            reported_path: Some(path.into()),
            ..Self::new(100)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Renderer for FakeRenderer {
    fn render(&self, spec: &RenderSpec) -> Result<RenderResult, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let path = PathBuf::from(&spec.card_file);
        let size = self.output_size.load(Ordering::SeqCst);
        if self.write_output {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| CoreError::io("mkdir", e))?;
            }
            std::fs::write(&path, vec![0u8; size as usize])
                .map_err(|e| CoreError::io(spec.card_file.clone(), e))?;
        }
        Ok(RenderResult {
            success: true,
            output_path: self.reported_path.clone().unwrap_or(path),
            byte_size: size,
            detail: None,
        })
    }
}

/// A temp directory holding one source image and a card directory, plus a
/// store seeded with one series and one episode (id 10).
pub struct Fixture {
    pub dir: TempDir,
    pub store: MemoryStore,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("sources").join("s1e1.jpg");
        std::fs::create_dir_all(source.parent().expect("parent")).expect("mkdir");
        std::fs::write(&source, b"source").expect("write source");

        let store = MemoryStore::new();
        store
            .set_global_defaults(
                ConfigLayer::new(LayerSource::GlobalDefaults)
                    .with("card_type", "standard")
                    .with("card_directory", dir.path().join("cards").display().to_string())
                    .with("source_directory", dir.path().join("sources").display().to_string()),
            )
            .expect("defaults");
        store
            .insert_series(
                serde_json::from_value(json!({"id": 1, "name": "Dark", "year": 2017}))
                    .expect("series"),
            )
            .expect("insert series");
        store
            .insert_episode(
                serde_json::from_value(json!({
                    "id": 10,
                    "series_id": 1,
                    "season_number": 1,
                    "episode_number": 1,
                    "title": "Secrets",
                    "watched": false
                }))
                .expect("episode"),
            )
            .expect("insert episode");
        store
            .add_destination(Destination {
                id: 1,
                name: "Living Room".into(),
                location: dir.path().join("dest").display().to_string(),
            })
            .expect("destination");

        Self { dir, store }
    }

    pub fn engine(
        self,
        renderer: FakeRenderer,
    ) -> (TempDir, Engine<MemoryStore, FakeRenderer, DiskFs>) {
        (self.dir, Engine::new(self.store, renderer, DiskFs))
    }
}

/// Replace episode 10 with `patch` merged over the fixture's fields.
pub fn update_episode(store: &MemoryStore, patch: serde_json::Value) {
    let mut base = json!({
        "id": 10,
        "series_id": 1,
        "season_number": 1,
        "episode_number": 1,
        "title": "Secrets",
        "watched": false
    });
    if let (Some(obj), serde_json::Value::Object(more)) = (base.as_object_mut(), patch) {
        obj.extend(more);
    }
    store
        .insert_episode(serde_json::from_value(base).expect("episode"))
        .expect("update episode");
}
