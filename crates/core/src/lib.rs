//! Configuration resolution and card reconciliation engine.
//!
//! This crate provides the decision logic behind title card generation:
//!
//! - [`settings`]: N-way merge of sparse configuration layers.
//! - [`template`]: tiered template selection over filter conditions.
//! - [`labels`]: season/episode label overrides and range tables.
//! - [`title`]: title casing, replacements and line splitting.
//! - [`reconcile`]: create / recreate / skip / blocked decisions per card.
//! - [`delivery`]: per-destination delivery tracking.
//!
//! Storage, rendering and file access are reached through the traits in
//! [`collaborators`]; [`Engine`] ties them together by episode id.

pub mod card_type;
pub mod collaborators;
pub mod delivery;
pub mod engine;
pub mod error;
pub mod facts;
pub mod filter;
pub mod hashing;
pub mod labels;
pub mod naming;
pub mod numerals;
pub mod reconcile;
pub mod render;
pub mod resolve;
pub mod settings;
pub mod store;
pub mod template;
pub mod title;
pub mod types;

pub use engine::Engine;
pub use error::{BlockReason, CoreError};
pub use reconcile::{Action, ArtifactRecord, ReconcileOutcome};
pub use store::MemoryStore;
