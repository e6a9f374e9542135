//! Shared identifiers and small value types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Stable identity of a work item, unique within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ItemId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// One ordered phase of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Slice,
    Preview,
    Export,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Self; 3] = [Self::Slice, Self::Preview, Self::Export];

    /// Lowercase name used as the event key prefix (`"slice.begin"`).
    pub const fn name(self) -> &'static str {
        match self {
            Self::Slice => "slice",
            Self::Preview => "preview",
            Self::Export => "export",
        }
    }

    /// The stage that must hold a valid result before this one can run.
    pub const fn prerequisite(self) -> Option<Self> {
        match self {
            Self::Slice => None,
            Self::Preview => Some(Self::Slice),
            Self::Export => Some(Self::Preview),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// PreviewMode
// ---------------------------------------------------------------------------

/// Render/analysis variant of the Preview stage.
///
/// Distinct variants invalidate each other's completion flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewMode {
    /// Colour by feed rate; the engine reports a speed range.
    Speed,
    /// Colour by feature (perimeter, infill, support).
    Feature,
    /// Colour by tool / extruder.
    Tool,
}

impl PreviewMode {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Speed => "speed",
            Self::Feature => "feature",
            Self::Tool => "tool",
        }
    }

    /// The variant following `self` in `modes`, wrapping to the first.
    ///
    /// Returns `self` when it is not listed or `modes` has fewer than two
    /// entries.
    pub fn next_in(self, modes: &[PreviewMode]) -> PreviewMode {
        if modes.len() < 2 {
            return self;
        }
        match modes.iter().position(|m| *m == self) {
            Some(i) => modes[(i + 1) % modes.len()],
            None => self,
        }
    }
}

impl fmt::Display for PreviewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// ProgressRange
// ---------------------------------------------------------------------------

/// The sub-range of the global `[0, 1]` progress bar a stage may report into.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressRange {
    pub scale: f64,
    pub offset: f64,
}

impl ProgressRange {
    /// The whole bar, used by top-level requests.
    pub const FULL: Self = Self {
        scale: 1.0,
        offset: 0.0,
    };

    /// Build a range, validating `scale ∈ (0,1]`, `offset ∈ [0,1)` and
    /// `scale + offset <= 1`.
    pub fn new(scale: f64, offset: f64) -> Result<Self, CoreError> {
        if !(scale > 0.0 && scale <= 1.0) {
            return Err(CoreError::Validation(format!(
                "Progress scale must be in (0, 1], got {scale}"
            )));
        }
        if !(0.0..1.0).contains(&offset) {
            return Err(CoreError::Validation(format!(
                "Progress offset must be in [0, 1), got {offset}"
            )));
        }
        if scale + offset > 1.0 + f64::EPSILON {
            return Err(CoreError::Validation(format!(
                "Progress scale + offset must not exceed 1, got {}",
                scale + offset
            )));
        }
        Ok(Self { scale, offset })
    }

    /// Re-check a range built directly from its public fields.
    pub fn validate(&self) -> Result<(), CoreError> {
        Self::new(self.scale, self.offset).map(|_| ())
    }

    /// Map a local fraction in `[0, 1]` into this range.
    pub fn map(&self, fraction: f64) -> f64 {
        self.offset + fraction.clamp(0.0, 1.0) * self.scale
    }

    /// The upper bound of this range.
    pub fn end(&self) -> f64 {
        self.offset + self.scale
    }

    /// Split into a leading range (`share` of the scale) for a prerequisite
    /// stage and the trailing remainder for the caller.
    pub fn split(&self, share: f64) -> (Self, Self) {
        let lead = self.scale * share;
        (
            Self {
                scale: lead,
                offset: self.offset,
            },
            Self {
                scale: self.scale - lead,
                offset: self.offset + lead,
            },
        )
    }
}

impl Default for ProgressRange {
    fn default() -> Self {
        Self::FULL
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn stage_prerequisites_chain_back_to_slice() {
        assert_eq!(Stage::Export.prerequisite(), Some(Stage::Preview));
        assert_eq!(Stage::Preview.prerequisite(), Some(Stage::Slice));
        assert_eq!(Stage::Slice.prerequisite(), None);
    }

    #[test]
    fn next_mode_wraps_around() {
        let modes = [PreviewMode::Speed, PreviewMode::Tool];
        assert_eq!(PreviewMode::Speed.next_in(&modes), PreviewMode::Tool);
        assert_eq!(PreviewMode::Tool.next_in(&modes), PreviewMode::Speed);
    }

    #[test]
    fn next_mode_single_variant_is_identity() {
        assert_eq!(
            PreviewMode::Speed.next_in(&[PreviewMode::Speed]),
            PreviewMode::Speed
        );
    }

    #[test]
    fn range_rejects_overflowing_sum() {
        assert_matches!(ProgressRange::new(0.5, 0.6), Err(CoreError::Validation(_)));
        assert_matches!(ProgressRange::new(0.0, 0.0), Err(CoreError::Validation(_)));
        assert_matches!(ProgressRange::new(0.5, 1.0), Err(CoreError::Validation(_)));
        assert!(ProgressRange::new(0.25, 0.75).is_ok());
    }

    #[test]
    fn literal_range_is_revalidated() {
        let range = ProgressRange {
            scale: 1.5,
            offset: 0.0,
        };
        assert_matches!(range.validate(), Err(CoreError::Validation(_)));
        assert!(ProgressRange::FULL.validate().is_ok());
    }

    #[test]
    fn split_is_disjoint_and_covers_range() {
        let (lead, rest) = ProgressRange::FULL.split(0.75);
        assert_eq!(lead.offset, 0.0);
        assert_eq!(lead.end(), 0.75);
        assert_eq!(rest.offset, 0.75);
        assert_eq!(rest.end(), 1.0);
    }

    #[test]
    fn map_clamps_fraction() {
        let range = ProgressRange::new(0.25, 0.75).unwrap();
        assert_eq!(range.map(0.0), 0.75);
        assert_eq!(range.map(2.0), 1.0);
        assert_eq!(range.map(-1.0), 0.75);
    }
}
