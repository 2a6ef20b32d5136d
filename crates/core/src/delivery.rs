//! Per-destination delivery tracking.
//!
//! Each `(episode, destination)` pair has at most one [`DeliveryRecord`]
//! holding the byte size of the card last delivered there. A size that no
//! longer matches the current artifact marks the remote copy as stale.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::collaborators::EntityStore;
use crate::error::CoreError;
use crate::reconcile::ArtifactRecord;
use crate::types::{ByteSize, DbId, Timestamp};

/// An external media library the card is pushed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub id: DbId,
    pub name: String,
    /// Connection target understood by the delivery channel (a URL or a
    /// directory).
    #[serde(default)]
    pub location: String,
}

/// The card last delivered to one destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub episode_id: DbId,
    pub destination_id: DbId,
    pub byte_size: ByteSize,
    pub delivered_at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryAction {
    /// Never delivered to this destination.
    Deliver,
    /// Delivered before, but stale or forced.
    Redeliver,
    Skip,
}

impl DeliveryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deliver => "deliver",
            Self::Redeliver => "redeliver",
            Self::Skip => "skip",
        }
    }

    /// Whether the outer layer should push the card.
    pub fn needs_delivery(&self) -> bool {
        !matches!(self, Self::Skip)
    }
}

impl std::fmt::Display for DeliveryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do for one destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryDecision {
    pub episode_id: DbId,
    pub destination: Destination,
    pub action: DeliveryAction,
    pub artifact_size: ByteSize,
    /// Size recorded by the previous delivery, if any.
    pub previous_size: Option<ByteSize>,
}

/// Decide, per destination, whether `artifact` must be delivered.
///
/// `force` redelivers everywhere. Otherwise a destination without a record
/// gets `Deliver`, one whose recorded size differs gets `Redeliver`, and
/// the rest `Skip`. Destinations listed twice are planned once.
pub fn plan_delivery(
    episode_id: DbId,
    artifact: &ArtifactRecord,
    destinations: &[Destination],
    existing: &[DeliveryRecord],
    force: bool,
) -> Vec<DeliveryDecision> {
    let mut seen = HashSet::new();
    destinations
        .iter()
        .filter(|d| seen.insert(d.id))
        .map(|destination| {
            let previous = existing
                .iter()
                .find(|r| r.episode_id == episode_id && r.destination_id == destination.id);
            let action = match previous {
                _ if force => DeliveryAction::Redeliver,
                None => DeliveryAction::Deliver,
                Some(r) if r.byte_size != artifact.byte_size => DeliveryAction::Redeliver,
                Some(_) => DeliveryAction::Skip,
            };
            tracing::debug!(
                episode_id,
                destination_id = destination.id,
                action = %action,
                "Planned delivery"
            );
            DeliveryDecision {
                episode_id,
                destination: destination.clone(),
                action,
                artifact_size: artifact.byte_size,
                previous_size: previous.map(|r| r.byte_size),
            }
        })
        .collect()
}

/// Store a fresh record for a completed delivery, removing any previous one
/// first. Records are never updated in place.
pub fn replace_delivery_record(
    store: &dyn EntityStore,
    record: DeliveryRecord,
) -> Result<(), CoreError> {
    store.delete_delivery_record(record.episode_id, record.destination_id)?;
    store.put_delivery_record(record)
}
