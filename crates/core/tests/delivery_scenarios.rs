//! Delivery planning and recording through [`Engine`].

mod common;

use std::sync::atomic::Ordering;

use serde_json::json;

use cardsync_core::collaborators::EntityStore;
use cardsync_core::delivery::{DeliveryAction, Destination};
use cardsync_core::Action;

use common::{update_episode, FakeRenderer, Fixture};

fn actions(decisions: &[cardsync_core::delivery::DeliveryDecision]) -> Vec<DeliveryAction> {
    decisions.iter().map(|d| d.action).collect()
}

// ---------------------------------------------------------------------------
// Test: deliver, skip, redeliver on size change, force
// ---------------------------------------------------------------------------

/// Delivery follows the card's byte size per destination.
#[test]
fn delivery_tracks_card_size() {
    let (_dir, engine) = Fixture::new().engine(FakeRenderer::new(1000));

    // No card yet: nothing to deliver.
    assert!(engine.plan_episode_delivery(10, false).expect("plan").is_empty());

    assert_eq!(engine.reconcile_episode(10).action, Action::Create);
    let decisions = engine.plan_episode_delivery(10, false).expect("plan");
    assert_eq!(actions(&decisions), vec![DeliveryAction::Deliver]);
    assert_eq!(decisions[0].artifact_size, 1000);
    assert_eq!(decisions[0].previous_size, None);
    engine.record_delivery(&decisions[0]).expect("record");

    let decisions = engine.plan_episode_delivery(10, false).expect("plan");
    assert_eq!(actions(&decisions), vec![DeliveryAction::Skip]);

    // Rerender to a different size.
    update_episode(engine.store(), json!({"overrides": {"blur": true}}));
    renderer_size(&engine, 1200);
    assert_eq!(engine.reconcile_episode(10).action, Action::Recreate);

    let decisions = engine.plan_episode_delivery(10, false).expect("plan");
    assert_eq!(actions(&decisions), vec![DeliveryAction::Redeliver]);
    assert_eq!(decisions[0].previous_size, Some(1000));
    engine.record_delivery(&decisions[0]).expect("record");

    let decisions = engine.plan_episode_delivery(10, false).expect("plan");
    assert_eq!(actions(&decisions), vec![DeliveryAction::Skip]);

    // Force redelivers even when sizes match.
    let decisions = engine.plan_episode_delivery(10, true).expect("plan");
    assert_eq!(actions(&decisions), vec![DeliveryAction::Redeliver]);
}

fn renderer_size(
    engine: &cardsync_core::Engine<cardsync_core::MemoryStore, FakeRenderer, common::DiskFs>,
    size: u64,
) {
    engine.renderer().output_size.store(size, Ordering::SeqCst);
}

// ---------------------------------------------------------------------------
// Test: records are replaced, destinations are independent
// ---------------------------------------------------------------------------

/// Recording twice for one destination leaves a single record.
#[test]
fn record_delivery_replaces_previous_record() {
    let (_dir, engine) = Fixture::new().engine(FakeRenderer::new(1000));
    engine.reconcile_episode(10);

    let decisions = engine.plan_episode_delivery(10, true).expect("plan");
    engine.record_delivery(&decisions[0]).expect("first");
    engine.record_delivery(&decisions[0]).expect("second");

    let records = engine.store().get_delivery_records(10).expect("records");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].destination_id, 1);
    assert_eq!(records[0].byte_size, 1000);
}

/// A second destination is planned independently of the first.
#[test]
fn destinations_are_independent() {
    let fixture = Fixture::new();
    fixture
        .store
        .add_destination(Destination {
            id: 2,
            name: "Bedroom".into(),
            location: String::new(),
        })
        .expect("destination");
    let (_dir, engine) = fixture.engine(FakeRenderer::new(1000));
    engine.reconcile_episode(10);

    let decisions = engine.plan_episode_delivery(10, false).expect("plan");
    engine.record_delivery(&decisions[0]).expect("record first");

    let decisions = engine.plan_episode_delivery(10, false).expect("plan");
    let by_destination: Vec<(i64, DeliveryAction)> = decisions
        .iter()
        .map(|d| (d.destination.id, d.action))
        .collect();
    assert_eq!(
        by_destination,
        vec![(1, DeliveryAction::Skip), (2, DeliveryAction::Deliver)]
    );
}
