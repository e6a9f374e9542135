//! Standalone runner for the kiln pipeline.
//!
//! Wires a [`SimulatedEngine`](kiln_engine::SimulatedEngine) and the
//! in-memory host collaborators in [`host`] to an
//! [`Orchestrator`](kiln_pipeline::Orchestrator).

pub mod config;
pub mod host;
