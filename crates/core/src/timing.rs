//! Per-run phase timing.
//!
//! The engine reports a human-readable phase label with its progress
//! updates ("layer", "support", ...). [`SegmentLog`] turns label
//! transitions into [`ProgressSegment`]s for the diagnostic summary
//! printed at the end of a run. Nothing here drives control flow.
//!
//! Durations are serialized as fractional seconds.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::types::ItemId;

/// Label of the segment recording result materialisation.
pub const DRAW_LABEL: &str = "draw";

mod duration_secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }
}

/// Time spent in one named phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSegment {
    /// `"<item>_<seq>_<label>"`, or `"<seq>_<label>"` for run-wide phases.
    pub key: String,
    pub label: String,
    /// Offset from run start.
    #[serde(with = "duration_secs")]
    pub start: Duration,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

/// Timing summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunTiming {
    pub segments: Vec<ProgressSegment>,
    #[serde(with = "duration_secs")]
    pub total: Duration,
}

impl RunTiming {
    pub fn segment(&self, key: &str) -> Option<&ProgressSegment> {
        self.segments.iter().find(|s| s.key == key)
    }

    /// Total time across segments carrying `label`.
    pub fn time_in(&self, label: &str) -> Duration {
        self.segments
            .iter()
            .filter(|s| s.label == label)
            .map(|s| s.duration)
            .sum()
    }
}

/// Collects phase segments for one run.
#[derive(Debug, Clone)]
pub struct SegmentLog {
    started: Instant,
    mark: Instant,
    seq: u32,
    current: Option<String>,
    segments: Vec<ProgressSegment>,
}

impl SegmentLog {
    pub fn start(now: Instant) -> Self {
        Self {
            started: now,
            mark: now,
            seq: 0,
            current: None,
            segments: Vec::new(),
        }
    }

    /// Feed a phase label seen at `now`. A label different from the
    /// current one closes the current phase and opens a new one.
    pub fn observe(&mut self, scope: Option<&ItemId>, label: Option<&str>, now: Instant) {
        let Some(label) = label else {
            return;
        };
        if self.current.as_deref() == Some(label) {
            return;
        }
        self.close(scope, now);
        self.current = Some(label.to_string());
        self.mark = now;
    }

    /// Close the open phase, if any (end of an item's update stream).
    pub fn close(&mut self, scope: Option<&ItemId>, now: Instant) {
        if let Some(previous) = self.current.take() {
            let duration = now.saturating_duration_since(self.mark);
            let start = self.mark.saturating_duration_since(self.started);
            self.push(scope, previous, start, duration);
            self.mark = now;
        }
    }

    /// Record an externally measured segment, e.g. [`DRAW_LABEL`].
    pub fn record(
        &mut self,
        scope: Option<&ItemId>,
        label: &str,
        duration: Duration,
        now: Instant,
    ) {
        let start = now
            .saturating_duration_since(self.started)
            .saturating_sub(duration);
        self.push(scope, label.to_string(), start, duration);
    }

    pub fn finish(mut self, now: Instant) -> RunTiming {
        self.close(None, now);
        RunTiming {
            segments: self.segments,
            total: now.saturating_duration_since(self.started),
        }
    }

    fn push(&mut self, scope: Option<&ItemId>, label: String, start: Duration, duration: Duration) {
        let key = match scope {
            Some(item) => format!("{item}_{}_{label}", self.seq),
            None => format!("{}_{label}", self.seq),
        };
        self.seq += 1;
        self.segments.push(ProgressSegment {
            key,
            label,
            start,
            duration,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn label_transitions_produce_keyed_segments() {
        let t0 = Instant::now();
        let item = ItemId::new("a");
        let mut log = SegmentLog::start(t0);

        log.observe(Some(&item), Some("layer"), t0);
        log.observe(Some(&item), Some("layer"), t0 + ms(5));
        log.observe(Some(&item), Some("support"), t0 + ms(10));
        log.close(Some(&item), t0 + ms(25));
        let timing = log.finish(t0 + ms(30));

        let keys: Vec<&str> = timing.segments.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, ["a_0_layer", "a_1_support"]);
        assert_eq!(timing.segments[0].duration, ms(10));
        assert_eq!(timing.segments[1].start, ms(10));
        assert_eq!(timing.segments[1].duration, ms(15));
        assert_eq!(timing.total, ms(30));
    }

    #[test]
    fn missing_label_is_ignored() {
        let t0 = Instant::now();
        let mut log = SegmentLog::start(t0);
        log.observe(None, None, t0 + ms(1));
        assert!(log.finish(t0 + ms(2)).segments.is_empty());
    }

    #[test]
    fn draw_segments_are_summed_by_label() {
        let t0 = Instant::now();
        let mut log = SegmentLog::start(t0);
        log.record(Some(&"a".into()), DRAW_LABEL, ms(4), t0 + ms(10));
        log.record(Some(&"b".into()), DRAW_LABEL, ms(6), t0 + ms(20));
        let timing = log.finish(t0 + ms(20));
        assert_eq!(timing.time_in(DRAW_LABEL), ms(10));
        assert_eq!(timing.segment("b_1_draw").map(|s| s.start), Some(ms(14)));
    }

    #[test]
    fn run_wide_segments_have_no_item_prefix() {
        let t0 = Instant::now();
        let mut log = SegmentLog::start(t0);
        log.observe(None, Some("prepare"), t0);
        let timing = log.finish(t0 + ms(3));
        assert_eq!(timing.segments[0].key, "0_prepare");
    }
}
