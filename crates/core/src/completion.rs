//! Stage completion memo.
//!
//! [`StageCompletionRecord`] remembers which stages hold a valid result for
//! the current inputs. Every mutation goes through a named transition so
//! the chain `export => preview => slice` holds after each call.

use serde::Serialize;

use crate::error::CoreError;
use crate::types::{PreviewMode, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StageCompletionRecord {
    slice: bool,
    preview: Option<PreviewMode>,
    export: bool,
}

impl StageCompletionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slice(&self) -> bool {
        self.slice
    }

    /// The preview variant currently valid, if any.
    pub fn preview(&self) -> Option<PreviewMode> {
        self.preview
    }

    pub fn export(&self) -> bool {
        self.export
    }

    /// Whether `stage` holds a valid result.
    ///
    /// For [`Stage::Preview`] a `mode` restricts the check to that variant;
    /// `None` accepts any valid variant.
    pub fn is_valid(&self, stage: Stage, mode: Option<PreviewMode>) -> bool {
        match stage {
            Stage::Slice => self.slice,
            Stage::Preview => match (self.preview, mode) {
                (Some(done), Some(wanted)) => done == wanted,
                (Some(_), None) => true,
                (None, _) => false,
            },
            Stage::Export => self.export,
        }
    }

    /// Forget everything (new model load, explicit clear).
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Invalidate `stage` and everything downstream of it before it runs,
    /// so an interrupted run leaves its own entry false.
    ///
    /// A Slice run resets the whole record.
    pub fn begin(&mut self, stage: Stage) {
        match stage {
            Stage::Slice => self.clear(),
            Stage::Preview => {
                self.preview = None;
                self.export = false;
            }
            Stage::Export => self.export = false,
        }
    }

    /// A Slice run finished without error. Downstream results are stale.
    pub fn mark_sliced(&mut self) {
        self.slice = true;
        self.preview = None;
        self.export = false;
    }

    /// A Preview run for `mode` finished without error.
    pub fn mark_previewed(&mut self, mode: PreviewMode) -> Result<(), CoreError> {
        if !self.slice {
            return Err(CoreError::Validation(
                "Preview cannot complete before Slice".to_string(),
            ));
        }
        self.preview = Some(mode);
        self.export = false;
        Ok(())
    }

    /// An Export run finished.
    pub fn mark_exported(&mut self) -> Result<(), CoreError> {
        if self.preview.is_none() {
            return Err(CoreError::Validation(
                "Export cannot complete before Preview".to_string(),
            ));
        }
        self.export = true;
        Ok(())
    }

    /// `export => preview => slice`.
    pub fn holds_invariant(&self) -> bool {
        (!self.export || self.preview.is_some()) && (self.preview.is_none() || self.slice)
    }
}
