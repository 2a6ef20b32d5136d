//! Per-episode orchestration over the entity store.

use std::path::Path;

use crate::collaborators::{load_template_tiers, EntityStore, Filesystem, Renderer};
use crate::delivery::{plan_delivery, replace_delivery_record, DeliveryDecision, DeliveryRecord};
use crate::error::CoreError;
use crate::facts::{Episode, Series};
use crate::reconcile::{ReconcileOutcome, ReconcilePlan, Reconciler};
use crate::resolve::{resolve_config, ResolvedConfig};
use crate::types::DbId;

/// Owns the collaborators and runs reconciliation and delivery planning by
/// episode id.
pub struct Engine<S, R, F> {
    store: S,
    renderer: R,
    fs: F,
}

impl<S, R, F> Engine<S, R, F>
where
    S: EntityStore,
    R: Renderer,
    F: Filesystem,
{
    pub fn new(store: S, renderer: R, fs: F) -> Self {
        Self {
            store,
            renderer,
            fs,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn filesystem(&self) -> &F {
        &self.fs
    }

    fn reconciler(&self) -> Reconciler<'_> {
        Reconciler::new(&self.store, &self.renderer, &self.fs)
    }

    /// Load the episode, its series, all template tiers and the global
    /// defaults, then merge them.
    pub fn resolve(&self, episode_id: DbId) -> Result<(Series, Episode, ResolvedConfig), CoreError> {
        let episode = self.store.get_episode(episode_id)?;
        let series = self.store.get_series(episode.series_id)?;
        let tiers = load_template_tiers(&self.store, series.id, episode.id)?;
        let defaults = self.store.get_global_defaults()?;
        let resolved = resolve_config(&series, &episode, &tiers, &defaults)?;
        Ok((series, episode, resolved))
    }

    /// Decide without rendering or writing anything.
    pub fn plan_episode(&self, episode_id: DbId) -> Result<ReconcilePlan, CoreError> {
        let (series, episode, resolved) = self.resolve(episode_id)?;
        self.reconciler().plan(&series, &episode, &resolved)
    }

    /// Bring the card of `episode_id` up to date. Errors become a blocked
    /// outcome.
    pub fn reconcile_episode(&self, episode_id: DbId) -> ReconcileOutcome {
        match self.resolve(episode_id) {
            Ok((series, episode, resolved)) => {
                self.reconciler().reconcile(&series, &episode, &resolved)
            }
            Err(e) => ReconcileOutcome::blocked(episode_id, &e),
        }
    }

    /// Delivery decisions for every destination. Empty when the episode has
    /// no card yet.
    pub fn plan_episode_delivery(
        &self,
        episode_id: DbId,
        force: bool,
    ) -> Result<Vec<DeliveryDecision>, CoreError> {
        let Some(artifact) = self.store.get_artifact_record(episode_id)? else {
            return Ok(Vec::new());
        };
        let destinations = self.store.get_destinations()?;
        let existing = self.store.get_delivery_records(episode_id)?;
        Ok(plan_delivery(
            episode_id,
            &artifact,
            &destinations,
            &existing,
            force,
        ))
    }

    /// Record a completed delivery, replacing any earlier record for the
    /// same destination.
    pub fn record_delivery(&self, decision: &DeliveryDecision) -> Result<(), CoreError> {
        let record = DeliveryRecord {
            episode_id: decision.episode_id,
            destination_id: decision.destination.id,
            byte_size: decision.artifact_size,
            delivered_at: chrono::Utc::now(),
        };
        replace_delivery_record(&self.store, record)?;
        tracing::info!(
            episode_id = decision.episode_id,
            destination = %decision.destination.name,
            action = %decision.action,
            byte_size = decision.artifact_size,
            "Delivery recorded"
        );
        Ok(())
    }

    /// Delete the card file and its record. Returns whether a card existed.
    pub fn remove_card(&self, episode_id: DbId) -> Result<bool, CoreError> {
        let Some(record) = self.store.get_artifact_record(episode_id)? else {
            return Ok(false);
        };
        self.fs.delete(Path::new(&record.card_file))?;
        self.store.delete_artifact_record(episode_id)?;
        tracing::info!(episode_id, card_file = %record.card_file, "Card removed");
        Ok(true)
    }
}
