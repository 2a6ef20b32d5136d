//! End-to-end reconciliation through [`Engine`] with an in-memory store, a
//! file-writing renderer and the real filesystem under a temp directory.

mod common;

use std::path::Path;

use assert_matches::assert_matches;
use serde_json::json;

use cardsync_core::collaborators::EntityStore;
use cardsync_core::template::{TemplateCandidate, TemplateTier};
use cardsync_core::{Action, BlockReason};

use common::{update_episode, FakeRenderer, Fixture};

// ---------------------------------------------------------------------------
// Test: create, skip, recreate on change, recreate on missing file
// ---------------------------------------------------------------------------

/// A card moves through its whole lifecycle: first render, no-op rerun,
/// rerender after a setting change and rerender after the file vanished.
#[test]
fn card_lifecycle() {
    let (_dir, engine) = Fixture::new().engine(FakeRenderer::new(1000));

    // First run renders.
    let first = engine.reconcile_episode(10);
    assert_eq!(first.action, Action::Create);
    let record = first.artifact.expect("record after create");
    assert_eq!(record.byte_size, 1000);
    assert!(Path::new(&record.card_file).is_file());
    assert!(record.card_file.ends_with(".jpg"));
    assert_eq!(engine.store().get_artifact_record(10).expect("get"), Some(record.clone()));

    // Nothing changed: no render.
    let second = engine.reconcile_episode(10);
    assert_eq!(second.action, Action::Skip);
    assert_eq!(second.artifact.as_ref(), Some(&record));

    // A font colour override changes the fingerprint.
    update_episode(engine.store(), json!({"overrides": {"font_color": "#FF0000"}}));
    let third = engine.reconcile_episode(10);
    assert_eq!(third.action, Action::Recreate);
    assert_eq!(third.changed_fields, vec!["font_color".to_string()]);
    let recreated = third.artifact.expect("record after recreate");
    assert_ne!(recreated.fingerprint, record.fingerprint);
    assert!(Path::new(&recreated.card_file).is_file());

    // The card file disappears without the record changing.
    std::fs::remove_file(&recreated.card_file).expect("remove card");
    let fourth = engine.reconcile_episode(10);
    assert_eq!(fourth.action, Action::Recreate);
    assert!(fourth.changed_fields.is_empty());
    assert!(Path::new(&recreated.card_file).is_file());

    let fifth = engine.reconcile_episode(10);
    assert_eq!(fifth.action, Action::Skip);
}

/// Only one artifact record exists after repeated recreation.
#[test]
fn recreate_replaces_the_record() {
    let (_dir, engine) = Fixture::new().engine(FakeRenderer::new(500));
    assert_eq!(engine.reconcile_episode(10).action, Action::Create);

    update_episode(engine.store(), json!({"title": "Lies"}));
    let outcome = engine.reconcile_episode(10);
    assert_eq!(outcome.action, Action::Recreate);
    assert!(outcome.changed_fields.contains(&"title_text".to_string()));

    let stored = engine.store().get_artifact_record(10).expect("get").expect("record");
    assert_eq!(Some(stored), outcome.artifact);
}

// ---------------------------------------------------------------------------
// Test: renderer failures block without recording
// ---------------------------------------------------------------------------

/// A renderer that reports success but writes nothing blocks the episode.
#[test]
fn missing_render_output_blocks() {
    let (_dir, engine) = Fixture::new().engine(FakeRenderer::silent());

    let outcome = engine.reconcile_episode(10);
    assert_eq!(outcome.action, Action::Blocked);
    assert_eq!(outcome.reason, Some(BlockReason::RenderFailure));
    assert!(outcome.artifact.is_none());
    assert_eq!(engine.store().get_artifact_record(10).expect("get"), None);
}

/// A renderer claiming a different output path blocks without a record.
#[test]
fn mismatched_output_path_blocks() {
    let (_dir, engine) = Fixture::new().engine(FakeRenderer::reporting("/elsewhere/card.jpg"));

    let outcome = engine.reconcile_episode(10);
    assert_eq!(outcome.reason, Some(BlockReason::RenderFailure));
    assert!(outcome
        .message
        .as_deref()
        .is_some_and(|m| m.contains("/elsewhere/card.jpg")));
    assert_eq!(engine.store().get_artifact_record(10).expect("get"), None);
}

/// Unknown episodes block with an entity reason instead of failing the run.
#[test]
fn unknown_episode_blocks() {
    let (_dir, engine) = Fixture::new().engine(FakeRenderer::new(10));
    let outcome = engine.reconcile_episode(999);
    assert_eq!(outcome.action, Action::Blocked);
    assert_eq!(outcome.reason, Some(BlockReason::EntityNotFound));
}

/// An episode without any source image blocks before the renderer runs.
#[test]
fn missing_source_blocks_before_render() {
    let fixture = Fixture::new();
    update_episode(&fixture.store, json!({"season_number": 2}));
    let (_dir, engine) = fixture.engine(FakeRenderer::new(10));

    let outcome = engine.reconcile_episode(10);
    assert_eq!(outcome.reason, Some(BlockReason::MissingSourceImage));
}

// ---------------------------------------------------------------------------
// Test: template tiers end to end
// ---------------------------------------------------------------------------

fn template(id: i64, color: &str, filters: serde_json::Value) -> TemplateCandidate {
    serde_json::from_value(json!({
        "id": id,
        "name": format!("Template {id}"),
        "filters": filters,
        "settings": {"font_color": color}
    }))
    .expect("template")
}

/// An episode-level template list shadows the series list even when none
/// of its candidates match.
#[test]
fn episode_tier_shadows_series_tier() {
    let fixture = Fixture::new();
    fixture
        .store
        .insert_template(template(100, "#FF0000", json!([])))
        .expect("insert");
    fixture
        .store
        .insert_template(template(
            200,
            "#00FF00",
            json!([{"argument": "Season Number", "operation": "equals", "reference": "5"}]),
        ))
        .expect("insert");
    fixture
        .store
        .insert_series(
            serde_json::from_value(json!({
                "id": 1, "name": "Dark", "year": 2017, "template_ids": [100]
            }))
            .expect("series"),
        )
        .expect("insert series");
    update_episode(&fixture.store, json!({"template_ids": [200]}));
    let (_dir, engine) = fixture.engine(FakeRenderer::new(10));

    let (_, _, resolved) = engine.resolve(10).expect("resolve");
    assert_eq!(resolved.template, None);
    assert_eq!(resolved.config.str("font_color"), Some("#EBEBEB"));

    update_episode(engine.store(), json!({"template_ids": []}));
    let (_, _, resolved) = engine.resolve(10).expect("resolve");
    assert_eq!(resolved.template, Some((TemplateTier::Series, 100)));
    assert_eq!(resolved.config.str("font_color"), Some("#FF0000"));
}

/// Episode overrides beat the selected template.
#[test]
fn episode_override_beats_template() {
    let fixture = Fixture::new();
    fixture
        .store
        .insert_template(template(100, "#FF0000", json!([])))
        .expect("insert");
    fixture.store.set_global_templates(vec![100]).expect("globals");
    update_episode(&fixture.store, json!({"overrides": {"font_color": "blue"}}));
    let (_dir, engine) = fixture.engine(FakeRenderer::new(10));

    let (_, _, resolved) = engine.resolve(10).expect("resolve");
    assert_eq!(resolved.template, Some((TemplateTier::Global, 100)));
    assert_eq!(resolved.config.str("font_color"), Some("blue"));
}

/// A template id that does not exist blocks resolution.
#[test]
fn dangling_template_id_blocks() {
    let fixture = Fixture::new();
    update_episode(&fixture.store, json!({"template_ids": [404]}));
    let (_dir, engine) = fixture.engine(FakeRenderer::new(10));

    let outcome = engine.reconcile_episode(10);
    assert_eq!(outcome.reason, Some(BlockReason::EntityNotFound));
}

// ---------------------------------------------------------------------------
// Test: planning and removal
// ---------------------------------------------------------------------------

/// Planning never renders or records.
#[test]
fn plan_has_no_side_effects() {
    let (_dir, engine) = Fixture::new().engine(FakeRenderer::new(10));

    let plan = engine.plan_episode(10).expect("plan");
    assert_eq!(plan.action, Action::Create);
    assert!(plan.existing.is_none());
    assert!(!Path::new(&plan.card.spec.card_file).exists());
    assert_eq!(engine.store().get_artifact_record(10).expect("get"), None);
}

/// Removing a card deletes both the file and the record.
#[test]
fn remove_card_deletes_file_and_record() {
    let (_dir, engine) = Fixture::new().engine(FakeRenderer::new(10));
    let record = engine.reconcile_episode(10).artifact.expect("created");

    assert!(engine.remove_card(10).expect("remove"));
    assert!(!Path::new(&record.card_file).exists());
    assert_matches!(engine.store().get_artifact_record(10), Ok(None));
    assert!(!engine.remove_card(10).expect("remove again"));

    assert_eq!(engine.reconcile_episode(10).action, Action::Create);
}
