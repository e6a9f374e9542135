//! Compute engine seam.
//!
//! The geometry work of slicing and toolpath preparation happens behind
//! [`ComputeEngine`]: one logical session that accepts one item at a
//! time and streams progress back over a channel. [`SimulatedEngine`] is
//! an in-process implementation with timed progress, used by the runner
//! binary and by tests.

pub mod engine;
pub mod error;
pub mod simulated;

pub use engine::{ComputeEngine, FinalizeEvent, FinalizeReply, ItemEvent, ItemOutput, LayerData};
pub use error::EngineError;
pub use simulated::{SimulatedEngine, SimulatedEngineConfig};
