//! `cardsync-worker` library crate.
//!
//! Reference outer layer for the card engine: environment configuration,
//! batch loading, local collaborators and the concurrent batch runner.
//! The binary entrypoint lives in `main.rs`.

pub mod batch;
pub mod config;
pub mod destination;
pub mod error;
pub mod fs;
pub mod locks;
pub mod renderer;
pub mod runner;
