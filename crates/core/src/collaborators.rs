//! Interfaces to the systems this crate drives but does not own.
//!
//! All calls are synchronous and expected to be bounded; implementations
//! must be shareable across threads since different episodes are reconciled
//! concurrently.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::delivery::{DeliveryRecord, Destination};
use crate::error::CoreError;
use crate::facts::{Episode, Series};
use crate::reconcile::ArtifactRecord;
use crate::render::RenderSpec;
use crate::settings::ConfigLayer;
use crate::template::{TemplateCandidate, TemplateScope, TemplateTiers};
use crate::types::{ByteSize, DbId};

/// Read access to entities and read/write access to artifact and delivery
/// records.
///
/// Records are never updated in place: callers delete then put.
pub trait EntityStore: Send + Sync {
    fn get_series(&self, id: DbId) -> Result<Series, CoreError>;

    fn get_episode(&self, id: DbId) -> Result<Episode, CoreError>;

    /// Candidates declared for `scope`, in declared order.
    fn get_template_candidates(
        &self,
        scope: TemplateScope,
    ) -> Result<Vec<TemplateCandidate>, CoreError>;

    fn get_global_defaults(&self) -> Result<ConfigLayer, CoreError>;

    fn get_destinations(&self) -> Result<Vec<Destination>, CoreError>;

    fn get_artifact_record(&self, episode_id: DbId) -> Result<Option<ArtifactRecord>, CoreError>;

    /// Fails with [`CoreError::Conflict`] if a record already exists.
    fn put_artifact_record(&self, record: ArtifactRecord) -> Result<(), CoreError>;

    fn delete_artifact_record(&self, episode_id: DbId) -> Result<(), CoreError>;

    fn get_delivery_records(&self, episode_id: DbId) -> Result<Vec<DeliveryRecord>, CoreError>;

    /// Fails with [`CoreError::Conflict`] if a record already exists for the
    /// same `(episode, destination)` pair.
    fn put_delivery_record(&self, record: DeliveryRecord) -> Result<(), CoreError>;

    fn delete_delivery_record(&self, episode_id: DbId, destination_id: DbId)
        -> Result<(), CoreError>;
}

/// Load all three template tiers for one episode.
pub fn load_template_tiers(
    store: &dyn EntityStore,
    series_id: DbId,
    episode_id: DbId,
) -> Result<TemplateTiers, CoreError> {
    Ok(TemplateTiers {
        episode: store.get_template_candidates(TemplateScope::Episode(episode_id))?,
        series: store.get_template_candidates(TemplateScope::Series(series_id))?,
        global: store.get_template_candidates(TemplateScope::Global)?,
    })
}

/// What the rendering collaborator reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderResult {
    pub success: bool,
    /// Must be the card path of the rendered spec.
    pub output_path: PathBuf,
    /// Size as seen by the renderer. The recorded size is re-read through
    /// the filesystem collaborator.
    pub byte_size: ByteSize,
    /// Diagnostic output on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Produces a card image from a [`RenderSpec`].
///
/// `Err` means the renderer could not be invoked at all; a renderer that ran
/// but failed reports `success: false`.
pub trait Renderer: Send + Sync {
    fn render(&self, spec: &RenderSpec) -> Result<RenderResult, CoreError>;
}

/// File operations on rendered cards and source images.
pub trait Filesystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    fn size(&self, path: &Path) -> Result<ByteSize, CoreError>;

    /// Deleting a missing file is not an error.
    fn delete(&self, path: &Path) -> Result<(), CoreError>;
}

/// Pushes a card to one destination. Returns whether the delivery succeeded.
pub trait DeliveryChannel: Send + Sync {
    fn deliver(&self, artifact_path: &Path, destination: &Destination) -> bool;
}
