//! Batch file: everything one worker run reconciles.
//!
//! ```json
//! {
//!   "global_defaults": {"card_type": "standard", "card_directory": "/cards"},
//!   "global_templates": [1],
//!   "templates": [{"id": 1, "name": "Specials", "filters": [...], "settings": {...}}],
//!   "series": [{"id": 1, "name": "Dark", "year": 2017}],
//!   "episodes": [{"id": 10, "series_id": 1, "season_number": 1, "episode_number": 1, "title": "Secrets"}],
//!   "destinations": [{"id": 1, "name": "Living Room", "location": "/srv/plex/cards"}]
//! }
//! ```

use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};

use cardsync_core::delivery::Destination;
use cardsync_core::facts::{Episode, Series};
use cardsync_core::settings::{ConfigLayer, LayerSource};
use cardsync_core::template::TemplateCandidate;
use cardsync_core::types::DbId;
use cardsync_core::MemoryStore;

use crate::error::WorkerError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Batch {
    /// Lowest-priority configuration layer. `null` members are unset.
    #[serde(default)]
    pub global_defaults: Map<String, Value>,
    /// Global default template list, in priority order.
    #[serde(default)]
    pub global_templates: Vec<DbId>,
    #[serde(default)]
    pub templates: Vec<TemplateCandidate>,
    #[serde(default)]
    pub series: Vec<Series>,
    #[serde(default)]
    pub episodes: Vec<Episode>,
    #[serde(default)]
    pub destinations: Vec<Destination>,
}

impl Batch {
    /// Read and parse a batch file.
    ///
    /// Parsed straight from text so that label and season title tables keep
    /// their declaration order.
    pub fn load(path: &Path) -> Result<Self, WorkerError> {
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| WorkerError::BatchRead {
            path: display.clone(),
            source,
        })?;
        Self::parse(&text).map_err(|source| WorkerError::BatchParse {
            path: display,
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Episode ids in batch order.
    pub fn episode_ids(&self) -> Vec<DbId> {
        self.episodes.iter().map(|e| e.id).collect()
    }

    /// Seed an in-memory store with every entity of the batch.
    pub fn into_store(self) -> Result<MemoryStore, WorkerError> {
        let store = MemoryStore::new();
        store.set_global_defaults(ConfigLayer::from_map(
            LayerSource::GlobalDefaults,
            &self.global_defaults,
        ))?;
        store.set_global_templates(self.global_templates)?;
        for template in self.templates {
            store.insert_template(template)?;
        }
        for series in self.series {
            store.insert_series(series)?;
        }
        for episode in self.episodes {
            store.insert_episode(episode)?;
        }
        for destination in self.destinations {
            store.add_destination(destination)?;
        }
        Ok(store)
    }
}
