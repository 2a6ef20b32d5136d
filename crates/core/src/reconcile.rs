//! Card reconciliation: decide whether a card must be created, recreated or
//! left alone, and carry the decision out.
//!
//! The decision is recomputed from ground truth on every call (stored record
//! plus file existence), so an interrupted render is repaired by the next
//! run rather than trusted.

use serde::{Deserialize, Serialize};

use crate::collaborators::{EntityStore, Filesystem, Renderer};
use crate::error::{BlockReason, CoreError};
use crate::facts::{Episode, Series};
use crate::hashing::short_digest;
use crate::labels::LabelWarning;
use crate::render::{build_render_spec, Fingerprint, RenderSpec, ResolvedCard};
use crate::resolve::ResolvedConfig;
use crate::types::{ByteSize, DbId, Timestamp};

/// Descriptor of the last card successfully rendered for an episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub episode_id: DbId,
    pub card_file: String,
    pub byte_size: ByteSize,
    pub fingerprint: Fingerprint,
    pub created_at: Timestamp,
}

/// Terminal action of one reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Skip,
    Create,
    Recreate,
    Blocked,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Create => "create",
            Self::Recreate => "recreate",
            Self::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pure decision over the fresh fingerprint, the stored record and whether
/// the recorded file still exists.
pub fn decide(fresh: &Fingerprint, record: Option<&ArtifactRecord>, file_present: bool) -> Action {
    match record {
        None => Action::Create,
        Some(r) if r.fingerprint == *fresh && file_present => Action::Skip,
        Some(_) => Action::Recreate,
    }
}

/// A decided but not yet executed reconciliation.
#[derive(Debug, Clone)]
pub struct ReconcilePlan {
    pub episode_id: DbId,
    pub action: Action,
    pub card: ResolvedCard,
    pub fingerprint: Fingerprint,
    pub existing: Option<ArtifactRecord>,
    /// Fingerprint fields that changed since `existing` was recorded.
    pub changed_fields: Vec<String>,
    pub file_present: bool,
}

/// Result of one reconciliation, suitable for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    pub episode_id: DbId,
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<BlockReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changed_fields: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<LabelWarning>,
}

impl ReconcileOutcome {
    /// Convert an error that stopped reconciliation into a blocked outcome.
    pub fn blocked(episode_id: DbId, error: &CoreError) -> Self {
        let reason = error.block_reason();
        tracing::warn!(episode_id, reason = %reason, error = %error, "Card reconciliation blocked");
        Self {
            episode_id,
            action: Action::Blocked,
            reason: Some(reason),
            message: Some(error.to_string()),
            artifact: None,
            changed_fields: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.action == Action::Blocked
    }
}

/// Drives the store, renderer and filesystem for one episode at a time.
///
/// Holds no state between calls. The caller must ensure at most one
/// reconciliation per episode runs at a time.
pub struct Reconciler<'a> {
    store: &'a dyn EntityStore,
    renderer: &'a dyn Renderer,
    fs: &'a dyn Filesystem,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        store: &'a dyn EntityStore,
        renderer: &'a dyn Renderer,
        fs: &'a dyn Filesystem,
    ) -> Self {
        Self {
            store,
            renderer,
            fs,
        }
    }

    /// Build the render spec and decide the action without side effects.
    pub fn plan(
        &self,
        series: &Series,
        episode: &Episode,
        resolved: &ResolvedConfig,
    ) -> Result<ReconcilePlan, CoreError> {
        let card = build_render_spec(series, episode, resolved, self.fs)?;
        let fingerprint = card.spec.fingerprint();
        let existing = self.store.get_artifact_record(episode.id)?;
        let file_present = existing
            .as_ref()
            .is_some_and(|r| self.fs.exists(std::path::Path::new(&r.card_file)));
        let action = decide(&fingerprint, existing.as_ref(), file_present);
        let changed_fields = existing
            .as_ref()
            .map(|r| {
                r.fingerprint
                    .changed_fields(&fingerprint)
                    .into_iter()
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(ReconcilePlan {
            episode_id: episode.id,
            action,
            card,
            fingerprint,
            existing,
            changed_fields,
            file_present,
        })
    }

    /// Plan and execute. Never fails: any error becomes a blocked outcome.
    pub fn reconcile(
        &self,
        series: &Series,
        episode: &Episode,
        resolved: &ResolvedConfig,
    ) -> ReconcileOutcome {
        match self
            .plan(series, episode, resolved)
            .and_then(|plan| self.execute(plan))
        {
            Ok(outcome) => outcome,
            Err(e) => ReconcileOutcome::blocked(episode.id, &e),
        }
    }

    /// Carry out a plan produced by [`Reconciler::plan`].
    pub fn execute(&self, plan: ReconcilePlan) -> Result<ReconcileOutcome, CoreError> {
        let ReconcilePlan {
            episode_id,
            action,
            card,
            fingerprint,
            existing,
            changed_fields,
            file_present,
        } = plan;

        let artifact = match action {
            Action::Skip => {
                tracing::info!(episode_id, card_file = %card.spec.card_file, "Card is current");
                existing
            }
            Action::Create => Some(self.render(episode_id, &card.spec, fingerprint)?),
            Action::Recreate => {
                if let Some(old) = &existing {
                    tracing::info!(
                        episode_id,
                        card_file = %old.card_file,
                        file_present,
                        changed = ?changed_fields,
                        "Removing stale card"
                    );
                    self.fs.delete(std::path::Path::new(&old.card_file))?;
                    self.store.delete_artifact_record(episode_id)?;
                }
                Some(self.render(episode_id, &card.spec, fingerprint)?)
            }
            Action::Blocked => {
                return Err(CoreError::Internal(
                    "A plan never carries the blocked action".to_string(),
                ))
            }
        };

        Ok(ReconcileOutcome {
            episode_id,
            action,
            reason: None,
            message: None,
            artifact,
            changed_fields,
            warnings: card.warnings,
        })
    }

    /// Render, confirm the file exists, then record it.
    fn render(
        &self,
        episode_id: DbId,
        spec: &RenderSpec,
        fingerprint: Fingerprint,
    ) -> Result<ArtifactRecord, CoreError> {
        let result = self.renderer.render(spec)?;
        if !result.success {
            return Err(CoreError::RenderFailure {
                path: spec.card_file.clone(),
                reason: result
                    .detail
                    .unwrap_or_else(|| "renderer reported failure".to_string()),
            });
        }
        if result.output_path != spec.card_path() {
            return Err(CoreError::RenderFailure {
                path: spec.card_file.clone(),
                reason: format!(
                    "renderer reported output at {}",
                    result.output_path.display()
                ),
            });
        }
        if !self.fs.exists(spec.card_path()) {
            return Err(CoreError::RenderFailure {
                path: spec.card_file.clone(),
                reason: "output file not found after render".to_string(),
            });
        }

        let byte_size = self.fs.size(spec.card_path())?;
        if byte_size != result.byte_size {
            tracing::warn!(
                episode_id,
                reported = result.byte_size,
                observed = byte_size,
                "Renderer reported a different card size; recording the observed size"
            );
        }
        let record = ArtifactRecord {
            episode_id,
            card_file: spec.card_file.clone(),
            byte_size,
            fingerprint,
            created_at: chrono::Utc::now(),
        };
        tracing::info!(
            episode_id,
            card_file = %record.card_file,
            byte_size = record.byte_size,
            fingerprint = short_digest(&record.fingerprint.digest()),
            "Card rendered"
        );
        self.store.put_artifact_record(record.clone())?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fingerprint(color: &str) -> Fingerprint {
        serde_json::from_value(json!([["font_color", color]])).unwrap()
    }

    fn record(color: &str) -> ArtifactRecord {
        ArtifactRecord {
            episode_id: 1,
            card_file: "/cards/a.jpg".into(),
            byte_size: 10,
            fingerprint: fingerprint(color),
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn no_record_creates() {
        assert_eq!(decide(&fingerprint("#FFF"), None, false), Action::Create);
        assert_eq!(decide(&fingerprint("#FFF"), None, true), Action::Create);
    }

    #[test]
    fn matching_record_with_file_skips() {
        assert_eq!(
            decide(&fingerprint("#FFF"), Some(&record("#FFF")), true),
            Action::Skip
        );
    }

    #[test]
    fn changed_fingerprint_recreates() {
        assert_eq!(
            decide(&fingerprint("#000"), Some(&record("#FFF")), true),
            Action::Recreate
        );
    }

    #[test]
    fn missing_file_recreates() {
        assert_eq!(
            decide(&fingerprint("#FFF"), Some(&record("#FFF")), false),
            Action::Recreate
        );
    }

    #[test]
    fn decision_is_deterministic() {
        let fresh = fingerprint("#FFF");
        let rec = record("#FFF");
        let first = decide(&fresh, Some(&rec), true);
        for _ in 0..10 {
            assert_eq!(decide(&fresh, Some(&rec), true), first);
        }
    }

    #[test]
    fn blocked_outcome_carries_reason() {
        let outcome =
            ReconcileOutcome::blocked(3, &CoreError::MissingSourceImage("/src/x.jpg".into()));
        assert!(outcome.is_blocked());
        assert_eq!(outcome.reason, Some(BlockReason::MissingSourceImage));
        assert!(outcome.artifact.is_none());
    }
}
