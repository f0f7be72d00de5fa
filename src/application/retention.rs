// Bounded retention window used by quick analysis
use crate::domain::sample::{DecodedSample, TimeWindow};
use serde::Serialize;
use std::collections::VecDeque;

pub const DEFAULT_RETENTION_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone)]
pub struct RetentionWindow {
    samples: VecDeque<DecodedSample>,
    retention_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub first_timestamp: i64,
    pub last_timestamp: i64,
}

impl RetentionWindow {
    pub fn new(retention_ms: i64) -> Self {
        Self {
            samples: VecDeque::new(),
            retention_ms: retention_ms.max(0),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn push(&mut self, sample: DecodedSample) {
        let t = sample.timestamp();
        match self.samples.back() {
            Some(back) if back.timestamp() > t => {
                let idx = self.samples.partition_point(|s| s.timestamp() <= t);
                self.samples.insert(idx, sample);
            }
            _ => self.samples.push_back(sample),
        }

        if let Some(newest) = self.samples.back().map(|s| s.timestamp()) {
            let oldest_kept = newest.saturating_sub(self.retention_ms);
            while self.samples.front().is_some_and(|s| s.timestamp() < oldest_kept) {
                self.samples.pop_front();
            }
        }
    }

    pub fn range(&self, window: TimeWindow) -> impl Iterator<Item = &DecodedSample> {
        self.samples.iter().filter(move |s| window.contains(s.timestamp()))
    }

    /// Min / max / mean over the usable values inside `window`.
    pub fn summarize(&self, window: TimeWindow) -> Option<RangeSummary> {
        let mut summary: Option<RangeSummary> = None;
        let mut sum = 0.0;

        for sample in self.range(window) {
            let v = sample.value();
            if sample.quality.has_no_value() || !v.is_finite() {
                continue;
            }
            sum += v;
            let t = sample.timestamp();
            summary = Some(match summary {
                None => RangeSummary {
                    count: 1,
                    min: v,
                    max: v,
                    mean: v,
                    first_timestamp: t,
                    last_timestamp: t,
                },
                Some(s) => RangeSummary {
                    count: s.count + 1,
                    min: s.min.min(v),
                    max: s.max.max(v),
                    mean: 0.0,
                    first_timestamp: s.first_timestamp,
                    last_timestamp: t,
                },
            });
        }

        summary.map(|mut s| {
            s.mean = sum / s.count as f64;
            s
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::quality::NO_VALUE_OTHER;
    use crate::domain::sample::Sample;

    #[test]
    fn test_old_samples_are_evicted() {
        let mut window = RetentionWindow::new(100);
        for t in [0, 50, 100, 150, 220] {
            window.push(Sample::good(t, 1.0).decode().unwrap());
        }
        let kept: Vec<i64> = window.range(TimeWindow::new(0, 1_000)).map(|s| s.timestamp()).collect();
        assert_eq!(kept, vec![150, 220]);
    }

    #[test]
    fn test_late_sample_is_inserted_in_order() {
        let mut window = RetentionWindow::new(DEFAULT_RETENTION_MS);
        window.push(Sample::good(10, 1.0).decode().unwrap());
        window.push(Sample::good(30, 3.0).decode().unwrap());
        window.push(Sample::good(20, 2.0).decode().unwrap());
        let kept: Vec<i64> = window.range(TimeWindow::new(0, 100)).map(|s| s.timestamp()).collect();
        assert_eq!(kept, vec![10, 20, 30]);
    }

    #[test]
    fn test_eviction_near_start_of_time() {
        let mut window = RetentionWindow::new(DEFAULT_RETENTION_MS);
        window.push(Sample::good(i64::MIN, 1.0).decode().unwrap());
        window.push(Sample::good(i64::MIN + 5, 2.0).decode().unwrap());
        let kept = window.range(TimeWindow::new(i64::MIN, i64::MIN + 10)).count();
        assert_eq!(kept, 2);
    }

    #[test]
    fn test_summarize_skips_gaps() {
        let mut window = RetentionWindow::new(DEFAULT_RETENTION_MS);
        window.push(Sample::good(10, 4.0).decode().unwrap());
        window.push(Sample::new(20, 100.0, NO_VALUE_OTHER.to_string(), false).decode().unwrap());
        window.push(Sample::good(30, 2.0).decode().unwrap());
        window.push(Sample::good(40, 6.0).decode().unwrap());
        window.push(Sample::good(50, 9.0).decode().unwrap());

        let summary = window.summarize(TimeWindow::new(0, 45)).unwrap();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.min, 2.0);
        assert_eq!(summary.max, 6.0);
        assert_eq!(summary.mean, 4.0);
        assert_eq!((summary.first_timestamp, summary.last_timestamp), (10, 40));

        assert_eq!(window.summarize(TimeWindow::new(1_000, 2_000)), None);
    }
}
