//! Progress arithmetic.
//!
//! [`ProgressAggregator`] blends per-item fractions into one run fraction
//! using the item weights; [`ProgressMeter`] guards the value published
//! to the progress sink so it never decreases within a request and never
//! repeats.

use std::collections::HashMap;

use crate::error::CoreError;
use crate::types::ItemId;
use crate::workset::WorkSet;

/// Values this close to 1 are reported as exactly 1.
const COMPLETE_EPSILON: f64 = 1e-9;

/// Weighted per-item progress table for one Slice run.
#[derive(Debug, Clone)]
pub struct ProgressAggregator {
    weights: HashMap<ItemId, f64>,
    table: HashMap<ItemId, f64>,
    count: usize,
}

impl ProgressAggregator {
    pub fn new(work: &WorkSet) -> Self {
        Self {
            weights: work
                .items()
                .iter()
                .map(|item| (item.id.clone(), item.weight))
                .collect(),
            table: HashMap::with_capacity(work.len()),
            count: work.len(),
        }
    }

    /// Record `fraction` for `id` and return the new run fraction:
    /// `sum(weight * fraction) / item_count`.
    pub fn update(&mut self, id: &ItemId, fraction: f64) -> Result<f64, CoreError> {
        let weight = self
            .weights
            .get(id)
            .copied()
            .ok_or_else(|| CoreError::UnknownItem(id.clone()))?;
        self.table
            .insert(id.clone(), weight * fraction.clamp(0.0, 1.0));
        Ok(self.global_fraction())
    }

    pub fn global_fraction(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.table.values().sum::<f64>() / self.count as f64
    }
}

/// Monotonic filter in front of the progress sink.
///
/// Values are clamped to `[0, 1]` and only passed through when strictly
/// greater than the last one passed, so `1.0` is reported at most once
/// per request.
#[derive(Debug, Clone, Default)]
pub struct ProgressMeter {
    last: Option<f64>,
}

impl ProgressMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value to publish, or `None` if it would not advance.
    pub fn observe(&mut self, value: f64) -> Option<f64> {
        let mut value = value.clamp(0.0, 1.0);
        if value >= 1.0 - COMPLETE_EPSILON {
            value = 1.0;
        }
        match self.last {
            Some(last) if value <= last => None,
            _ => {
                self.last = Some(value);
                Some(value)
            }
        }
    }

    pub fn last(&self) -> Option<f64> {
        self.last
    }

    /// Back to zero (error, cancellation, or a new request).
    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::workset::{build_work_set, ItemRecord};

    fn two_items() -> WorkSet {
        build_work_set(&[ItemRecord::new("a", 100), ItemRecord::new("b", 300)]).unwrap()
    }

    #[test]
    fn weighted_blend_matches_hand_calculation() {
        let mut agg = ProgressAggregator::new(&two_items());
        assert_eq!(agg.update(&"a".into(), 1.0).unwrap(), 0.25);
        assert_eq!(agg.update(&"b".into(), 0.5).unwrap(), 0.625);
    }

    #[test]
    fn all_items_complete_reaches_one() {
        let mut agg = ProgressAggregator::new(&two_items());
        agg.update(&"a".into(), 1.0).unwrap();
        let total = agg.update(&"b".into(), 1.0).unwrap();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn later_update_replaces_earlier_for_same_item() {
        let mut agg = ProgressAggregator::new(&two_items());
        agg.update(&"b".into(), 0.2).unwrap();
        let total = agg.update(&"b".into(), 0.4).unwrap();
        assert!((total - 0.3).abs() < 1e-12);
    }

    #[test]
    fn unknown_item_is_rejected() {
        let mut agg = ProgressAggregator::new(&two_items());
        assert_matches!(agg.update(&"zzz".into(), 0.5), Err(CoreError::UnknownItem(_)));
    }

    #[test]
    fn meter_drops_regressions_and_repeats() {
        let mut meter = ProgressMeter::new();
        assert_eq!(meter.observe(0.0), Some(0.0));
        assert_eq!(meter.observe(0.4), Some(0.4));
        assert_eq!(meter.observe(0.3), None);
        assert_eq!(meter.observe(0.4), None);
        assert_eq!(meter.observe(1.0), Some(1.0));
        assert_eq!(meter.observe(1.0), None);
    }

    #[test]
    fn meter_snaps_and_clamps_near_one() {
        let mut meter = ProgressMeter::new();
        assert_eq!(meter.observe(0.999_999_999_999), Some(1.0));
        let mut meter = ProgressMeter::new();
        assert_eq!(meter.observe(1.7), Some(1.0));
    }

    #[test]
    fn meter_reset_starts_over() {
        let mut meter = ProgressMeter::new();
        meter.observe(0.8);
        meter.reset();
        assert_eq!(meter.last(), None);
        assert_eq!(meter.observe(0.1), Some(0.1));
    }
}
