//! Batch runner: reconcile every episode, then deliver its card.
//!
//! Episodes run concurrently up to `max_concurrency`, each on a blocking
//! thread since the engine's collaborators are synchronous. The per-episode
//! lock keeps repeated ids in one batch from overlapping.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;

use cardsync_core::collaborators::{DeliveryChannel, EntityStore, Filesystem, Renderer};
use cardsync_core::delivery::{DeliveryAction, DeliveryDecision};
use cardsync_core::reconcile::{Action, ReconcileOutcome};
use cardsync_core::types::DbId;
use cardsync_core::Engine;

use crate::error::WorkerError;
use crate::locks::EpisodeLocks;

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub max_concurrency: usize,
    pub force_redelivery: bool,
    pub dry_run: bool,
}

/// Delivery result for one destination.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryReport {
    pub destination_id: DbId,
    pub destination: String,
    pub action: DeliveryAction,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything that happened to one episode.
#[derive(Debug, Clone, Serialize)]
pub struct EpisodeReport {
    #[serde(flatten)]
    pub outcome: ReconcileOutcome,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deliveries: Vec<DeliveryReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_error: Option<String>,
}

/// Printed at the end of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub dry_run: bool,
    pub episodes: usize,
    /// Episode count per reconciliation action.
    pub actions: BTreeMap<&'static str, usize>,
    pub delivered: usize,
    pub delivery_failures: usize,
    pub reports: Vec<EpisodeReport>,
}

impl RunSummary {
    pub fn from_reports(reports: Vec<EpisodeReport>, dry_run: bool) -> Self {
        let mut actions = BTreeMap::new();
        let mut delivered = 0;
        let mut delivery_failures = 0;
        for report in &reports {
            *actions.entry(report.outcome.action.as_str()).or_insert(0) += 1;
            for d in &report.deliveries {
                if d.delivered {
                    delivered += 1;
                } else if d.action.needs_delivery() && !dry_run {
                    delivery_failures += 1;
                }
            }
            if report.delivery_error.is_some() {
                delivery_failures += 1;
            }
        }
        Self {
            dry_run,
            episodes: reports.len(),
            actions,
            delivered,
            delivery_failures,
            reports,
        }
    }

    pub fn count(&self, action: Action) -> usize {
        self.actions.get(action.as_str()).copied().unwrap_or(0)
    }
}

/// Reconcile and deliver `episode_ids`, returning reports in input order.
pub async fn run_episodes<S, R, F, D>(
    engine: Arc<Engine<S, R, F>>,
    channel: Arc<D>,
    episode_ids: Vec<DbId>,
    options: RunOptions,
) -> Result<RunSummary, WorkerError>
where
    S: EntityStore + 'static,
    R: Renderer + 'static,
    F: Filesystem + 'static,
    D: DeliveryChannel + 'static,
{
    let locks = Arc::new(EpisodeLocks::new());
    run_episodes_with_locks(engine, channel, episode_ids, options, locks).await
}

/// [`run_episodes`] sharing `locks` with other runs. Lock entries are pruned
/// as each episode finishes.
pub async fn run_episodes_with_locks<S, R, F, D>(
    engine: Arc<Engine<S, R, F>>,
    channel: Arc<D>,
    episode_ids: Vec<DbId>,
    options: RunOptions,
    locks: Arc<EpisodeLocks>,
) -> Result<RunSummary, WorkerError>
where
    S: EntityStore + 'static,
    R: Renderer + 'static,
    F: Filesystem + 'static,
    D: DeliveryChannel + 'static,
{
    let semaphore = Arc::new(Semaphore::new(options.max_concurrency.max(1)));

    let mut handles = Vec::with_capacity(episode_ids.len());
    for episode_id in episode_ids {
        let engine = Arc::clone(&engine);
        let channel = Arc::clone(&channel);
        let semaphore = Arc::clone(&semaphore);
        let locks = Arc::clone(&locks);

        handles.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| WorkerError::Task(e.to_string()))?;
            let guard = locks.acquire(episode_id).await;
            let report = tokio::task::spawn_blocking(move || {
                process_episode(&engine, channel.as_ref(), episode_id, options)
            })
            .await
            .map_err(|e| WorkerError::Task(format!("Episode {episode_id}: {e}")));
            drop(guard);
            locks.prune().await;
            report
        }));
    }

    let mut reports = Vec::with_capacity(handles.len());
    for handle in handles {
        let report = handle
            .await
            .map_err(|e| WorkerError::Task(e.to_string()))??;
        reports.push(report);
    }
    Ok(RunSummary::from_reports(reports, options.dry_run))
}

/// Reconcile one episode and, unless blocked, deliver its card.
pub fn process_episode<S, R, F>(
    engine: &Engine<S, R, F>,
    channel: &dyn DeliveryChannel,
    episode_id: DbId,
    options: RunOptions,
) -> EpisodeReport
where
    S: EntityStore,
    R: Renderer,
    F: Filesystem,
{
    let outcome = if options.dry_run {
        match engine.plan_episode(episode_id) {
            Ok(plan) => ReconcileOutcome {
                episode_id,
                action: plan.action,
                reason: None,
                message: Some("dry run".to_string()),
                artifact: plan.existing,
                changed_fields: plan.changed_fields,
                warnings: plan.card.warnings,
            },
            Err(e) => ReconcileOutcome::blocked(episode_id, &e),
        }
    } else {
        engine.reconcile_episode(episode_id)
    };

    if outcome.is_blocked() {
        return EpisodeReport {
            outcome,
            deliveries: Vec::new(),
            delivery_error: None,
        };
    }

    match engine.plan_episode_delivery(episode_id, options.force_redelivery) {
        Ok(decisions) => {
            let deliveries = decisions
                .iter()
                .map(|d| deliver(engine, channel, d, options.dry_run))
                .collect();
            EpisodeReport {
                outcome,
                deliveries,
                delivery_error: None,
            }
        }
        Err(e) => {
            tracing::error!(episode_id, error = %e, "Delivery planning failed");
            EpisodeReport {
                outcome,
                deliveries: Vec::new(),
                delivery_error: Some(e.to_string()),
            }
        }
    }
}

fn deliver<S, R, F>(
    engine: &Engine<S, R, F>,
    channel: &dyn DeliveryChannel,
    decision: &DeliveryDecision,
    dry_run: bool,
) -> DeliveryReport
where
    S: EntityStore,
    R: Renderer,
    F: Filesystem,
{
    let mut report = DeliveryReport {
        destination_id: decision.destination.id,
        destination: decision.destination.name.clone(),
        action: decision.action,
        delivered: false,
        error: None,
    };
    if dry_run || !decision.action.needs_delivery() {
        return report;
    }

    let card_file = match engine.store().get_artifact_record(decision.episode_id) {
        Ok(Some(record)) => record.card_file,
        Ok(None) => {
            report.error = Some("card record disappeared before delivery".to_string());
            return report;
        }
        Err(e) => {
            report.error = Some(e.to_string());
            return report;
        }
    };

    if !channel.deliver(Path::new(&card_file), &decision.destination) {
        report.error = Some("delivery channel reported failure".to_string());
        return report;
    }
    match engine.record_delivery(decision) {
        Ok(()) => report.delivered = true,
        Err(e) => {
            tracing::error!(
                episode_id = decision.episode_id,
                destination_id = decision.destination.id,
                error = %e,
                "Failed to record delivery"
            );
            report.error = Some(e.to_string());
        }
    }
    report
}
