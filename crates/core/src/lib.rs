//! Pure domain logic for the kiln slice/preview/export pipeline.
//!
//! Everything in this crate is synchronous and free of I/O: stage and
//! item identifiers, the immutable [`settings::RunSettings`] snapshot,
//! the [`completion::StageCompletionRecord`], work-set construction,
//! progress arithmetic, stage dependency planning, and run timing.
//! The async orchestration built on top of it lives in `kiln-pipeline`.

pub mod completion;
pub mod config;
pub mod error;
pub mod progress;
pub mod resolver;
pub mod settings;
pub mod timing;
pub mod types;
pub mod workset;
