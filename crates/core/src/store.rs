//! In-memory [`EntityStore`], used by the worker's batch mode and by tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::collaborators::EntityStore;
use crate::delivery::{DeliveryRecord, Destination};
use crate::error::CoreError;
use crate::facts::{Episode, Series};
use crate::reconcile::ArtifactRecord;
use crate::settings::{ConfigLayer, LayerSource};
use crate::template::{TemplateCandidate, TemplateScope};
use crate::types::DbId;

pub struct MemoryStore {
    series: RwLock<HashMap<DbId, Series>>,
    episodes: RwLock<HashMap<DbId, Episode>>,
    templates: RwLock<HashMap<DbId, TemplateCandidate>>,
    global_template_ids: RwLock<Vec<DbId>>,
    global_defaults: RwLock<ConfigLayer>,
    destinations: RwLock<Vec<Destination>>,
    artifacts: Mutex<HashMap<DbId, ArtifactRecord>>,
    deliveries: Mutex<HashMap<(DbId, DbId), DeliveryRecord>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            series: RwLock::default(),
            episodes: RwLock::default(),
            templates: RwLock::default(),
            global_template_ids: RwLock::default(),
            global_defaults: RwLock::new(ConfigLayer::new(LayerSource::GlobalDefaults)),
            destinations: RwLock::default(),
            artifacts: Mutex::default(),
            deliveries: Mutex::default(),
        }
    }
}

fn poisoned() -> CoreError {
    CoreError::Internal("entity store lock poisoned".to_string())
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, CoreError> {
    lock.read().map_err(|_| poisoned())
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, CoreError> {
    lock.write().map_err(|_| poisoned())
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, CoreError> {
    mutex.lock().map_err(|_| poisoned())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Seeding --

    pub fn insert_series(&self, series: Series) -> Result<(), CoreError> {
        write(&self.series)?.insert(series.id, series);
        Ok(())
    }

    pub fn insert_episode(&self, episode: Episode) -> Result<(), CoreError> {
        write(&self.episodes)?.insert(episode.id, episode);
        Ok(())
    }

    pub fn insert_template(&self, template: TemplateCandidate) -> Result<(), CoreError> {
        write(&self.templates)?.insert(template.id, template);
        Ok(())
    }

    /// Global default template list, in priority order.
    pub fn set_global_templates(&self, ids: Vec<DbId>) -> Result<(), CoreError> {
        *write(&self.global_template_ids)? = ids;
        Ok(())
    }

    pub fn set_global_defaults(&self, defaults: ConfigLayer) -> Result<(), CoreError> {
        *write(&self.global_defaults)? = defaults;
        Ok(())
    }

    pub fn add_destination(&self, destination: Destination) -> Result<(), CoreError> {
        write(&self.destinations)?.push(destination);
        Ok(())
    }

    pub fn episode_ids(&self) -> Result<Vec<DbId>, CoreError> {
        let mut ids: Vec<DbId> = read(&self.episodes)?.keys().copied().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn templates_by_id(&self, ids: &[DbId]) -> Result<Vec<TemplateCandidate>, CoreError> {
        let templates = read(&self.templates)?;
        ids.iter()
            .map(|id| {
                templates.get(id).cloned().ok_or(CoreError::NotFound {
                    entity: "Template",
                    id: *id,
                })
            })
            .collect()
    }
}

impl EntityStore for MemoryStore {
    fn get_series(&self, id: DbId) -> Result<Series, CoreError> {
        read(&self.series)?
            .get(&id)
            .cloned()
            .ok_or(CoreError::NotFound {
                entity: "Series",
                id,
            })
    }

    fn get_episode(&self, id: DbId) -> Result<Episode, CoreError> {
        read(&self.episodes)?
            .get(&id)
            .cloned()
            .ok_or(CoreError::NotFound {
                entity: "Episode",
                id,
            })
    }

    fn get_template_candidates(
        &self,
        scope: TemplateScope,
    ) -> Result<Vec<TemplateCandidate>, CoreError> {
        let ids = match scope {
            TemplateScope::Episode(id) => self.get_episode(id)?.template_ids,
            TemplateScope::Series(id) => self.get_series(id)?.template_ids,
            TemplateScope::Global => read(&self.global_template_ids)?.clone(),
        };
        self.templates_by_id(&ids)
    }

    fn get_global_defaults(&self) -> Result<ConfigLayer, CoreError> {
        Ok(read(&self.global_defaults)?.clone())
    }

    fn get_destinations(&self) -> Result<Vec<Destination>, CoreError> {
        Ok(read(&self.destinations)?.clone())
    }

    fn get_artifact_record(&self, episode_id: DbId) -> Result<Option<ArtifactRecord>, CoreError> {
        Ok(lock(&self.artifacts)?.get(&episode_id).cloned())
    }

    fn put_artifact_record(&self, record: ArtifactRecord) -> Result<(), CoreError> {
        let mut artifacts = lock(&self.artifacts)?;
        if artifacts.contains_key(&record.episode_id) {
            return Err(CoreError::Conflict(format!(
                "Artifact record for episode {} already exists",
                record.episode_id
            )));
        }
        artifacts.insert(record.episode_id, record);
        Ok(())
    }

    fn delete_artifact_record(&self, episode_id: DbId) -> Result<(), CoreError> {
        lock(&self.artifacts)?.remove(&episode_id);
        Ok(())
    }

    fn get_delivery_records(&self, episode_id: DbId) -> Result<Vec<DeliveryRecord>, CoreError> {
        let mut records: Vec<DeliveryRecord> = lock(&self.deliveries)?
            .values()
            .filter(|r| r.episode_id == episode_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.destination_id);
        Ok(records)
    }

    fn put_delivery_record(&self, record: DeliveryRecord) -> Result<(), CoreError> {
        let key = (record.episode_id, record.destination_id);
        let mut deliveries = lock(&self.deliveries)?;
        if deliveries.contains_key(&key) {
            return Err(CoreError::Conflict(format!(
                "Delivery record for episode {} at destination {} already exists",
                key.0, key.1
            )));
        }
        deliveries.insert(key, record);
        Ok(())
    }

    fn delete_delivery_record(
        &self,
        episode_id: DbId,
        destination_id: DbId,
    ) -> Result<(), CoreError> {
        lock(&self.deliveries)?.remove(&(episode_id, destination_id));
        Ok(())
    }
}
