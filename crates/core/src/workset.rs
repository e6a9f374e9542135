//! Work-set construction for a Slice run.
//!
//! Pure functions that turn the workspace's item registry into the
//! ordered, weighted list of items to dispatch. Eligibility is evaluated
//! fresh on every call and never cached.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::settings::{DeviceSettings, RunSettings};
use crate::types::ItemId;

/// One item as registered in the workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: ItemId,
    /// Relative computational cost, typically the vertex count.
    pub cost: u64,
    /// Excluded by tracking (e.g. a helper object).
    pub ignore: bool,
    /// Excluded by the user.
    pub disabled: bool,
    /// Extent along the bed's Y axis in millimetres.
    pub depth_span: f64,
    /// Extruder assigned to the item, if any.
    pub extruder: Option<u32>,
}

impl ItemRecord {
    pub fn new(id: impl Into<ItemId>, cost: u64) -> Self {
        Self {
            id: id.into(),
            cost,
            ignore: false,
            disabled: false,
            depth_span: 0.0,
            extruder: None,
        }
    }

    pub fn is_eligible(&self) -> bool {
        !self.ignore && !self.disabled
    }
}

/// An eligible item annotated with its weight for this run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkItem {
    pub id: ItemId,
    /// `cost / mean_cost`; the mean weight across a run is 1.
    pub weight: f64,
    pub extruder: Option<u32>,
}

/// The ordered, weighted items of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkSet {
    items: Vec<WorkItem>,
    mean_cost: f64,
}

impl WorkSet {
    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn mean_cost(&self) -> f64 {
        self.mean_cost
    }

    /// Distinct extruders used by the items, in ascending order.
    pub fn extruders(&self) -> Vec<u32> {
        self.items
            .iter()
            .filter_map(|item| item.extruder)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Whether a belt bed must be re-laid out before slicing: any item
/// deeper than the bed.
pub fn needs_relayout(records: &[ItemRecord], device: &DeviceSettings) -> bool {
    device.belt && records.iter().any(|r| r.depth_span > device.bed_depth)
}

/// Select the eligible items in registration order and weight them by
/// cost relative to the set's mean.
///
/// A zero cost counts as 1 so every weight stays positive.
pub fn build_work_set(records: &[ItemRecord]) -> Result<WorkSet, CoreError> {
    let eligible: Vec<&ItemRecord> = records.iter().filter(|r| r.is_eligible()).collect();
    if eligible.is_empty() {
        return Err(CoreError::EmptyWorkSet);
    }

    let total: f64 = eligible.iter().map(|r| effective_cost(r)).sum();
    let mean_cost = total / eligible.len() as f64;

    let items = eligible
        .into_iter()
        .map(|r| WorkItem {
            id: r.id.clone(),
            weight: effective_cost(r) / mean_cost,
            extruder: r.extruder,
        })
        .collect();

    Ok(WorkSet { items, mean_cost })
}

fn effective_cost(record: &ItemRecord) -> f64 {
    record.cost.max(1) as f64
}

/// Belt anchor for a run.
///
/// Multi-extruder belt runs with a purge tower need room for the tower
/// in front of the first layer; other belt runs use the configured lead.
/// Returns `None` off-belt.
pub fn belt_anchor(work: &WorkSet, settings: &RunSettings) -> Option<f64> {
    if !settings.device.belt {
        return None;
    }
    let lead = settings.process.first_layer_belt_lead;
    let extruders = work.extruders().len();
    if extruders > 1 && settings.process.purge_tower > 0.0 {
        let tower = settings.process.purge_tower.sqrt()
            * extruders as f64
            * std::f64::consts::FRAC_1_SQRT_2;
        Some(lead.max(tower))
    } else {
        Some(lead)
    }
}
