// Live buffer manager - per-series buffering and reduction on each live tick
use crate::application::retention::RetentionWindow;
use crate::domain::error::TickError;
use crate::domain::quality::DecodedQuality;
use crate::domain::reducer::{self, ReductionCursor};
use crate::domain::sample::{DecodedSample, Sample};
use crate::domain::series::SeriesMode;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AppendOutcome {
    Buffered,
    /// Same value and quality as the previous notification.
    Duplicate,
    /// Older than the part of the timeline that was already reduced.
    Stale,
    /// Quality mask did not parse; the sample is held back as a gap.
    Malformed,
}

#[derive(Debug, Clone)]
pub struct LiveBuffer {
    mode: SeriesMode,
    buffer: Vec<DecodedSample>,
    cursor: ReductionCursor,
    generation: u64,
    /// History loads started but not yet finished or aborted.
    outstanding_loads: u32,
    last_displayed: Option<DecodedSample>,
    /// Newest timestamp already handed to the chart.
    drawn_through: Option<i64>,
    last_notification: Option<(f64, String)>,
    pending_gaps: Vec<DecodedSample>,
    retention: RetentionWindow,
}

impl LiveBuffer {
    pub fn new(mode: SeriesMode, cursor: ReductionCursor, retention_ms: i64) -> Self {
        Self {
            mode,
            buffer: Vec::new(),
            cursor,
            generation: 0,
            outstanding_loads: 0,
            last_displayed: None,
            drawn_through: None,
            last_notification: None,
            pending_gaps: Vec::new(),
            retention: RetentionWindow::new(retention_ms),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cursor(&self) -> ReductionCursor {
        self.cursor
    }

    pub fn is_suspended(&self) -> bool {
        self.outstanding_loads > 0
    }

    pub fn buffered(&self) -> &[DecodedSample] {
        &self.buffer
    }

    pub fn last_displayed(&self) -> Option<&DecodedSample> {
        self.last_displayed.as_ref()
    }

    pub fn retention(&self) -> &RetentionWindow {
        &self.retention
    }

    pub fn append(&mut self, sample: Sample) -> AppendOutcome {
        let key = (sample.value, sample.quality_raw.clone());
        if self.last_notification.as_ref() == Some(&key) {
            tracing::debug!("Dropping repeated notification at {}", sample.timestamp);
            return AppendOutcome::Duplicate;
        }

        if sample.timestamp < self.cursor.right_border {
            tracing::debug!(
                "Dropping sample at {} behind right border {}",
                sample.timestamp,
                self.cursor.right_border
            );
            return AppendOutcome::Stale;
        }

        self.last_notification = Some(key);
        let decoded = match sample.clone().decode() {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!("Excluding sample at {} from reduction: {}", sample.timestamp, e);
                self.pending_gaps.push(DecodedSample {
                    sample,
                    quality: DecodedQuality::unknown(),
                });
                return AppendOutcome::Malformed;
            }
        };

        let t = decoded.timestamp();
        let idx = self.buffer.partition_point(|s| s.timestamp() <= t);
        self.buffer.insert(idx, decoded.clone());
        self.retention.push(decoded);
        AppendOutcome::Buffered
    }

    /// Start a history load. Live ticks stay suspended until every
    /// outstanding load has finished or aborted. Returns the load's token.
    pub fn begin_load(&mut self) -> u64 {
        self.outstanding_loads += 1;
        self.generation += 1;
        self.generation
    }

    /// Give up on a load, e.g. after a failed fetch. The cursor is untouched.
    pub fn abort_load(&mut self) {
        self.outstanding_loads = self.outstanding_loads.saturating_sub(1);
    }

    /// Install the cursor a history load produced. A load that another load
    /// started after it is rejected and its cursor discarded.
    pub fn finish_load(
        &mut self,
        token: u64,
        cursor: ReductionCursor,
        last_displayed: Option<DecodedSample>,
    ) -> Result<(), TickError> {
        self.outstanding_loads = self.outstanding_loads.saturating_sub(1);
        if token != self.generation {
            tracing::debug!(
                "Discarding superseded history load {} (current generation {})",
                token,
                self.generation
            );
            return Err(TickError::StaleGeneration {
                requested: token,
                current: self.generation,
            });
        }
        self.drawn_through = last_displayed.as_ref().map(|s| s.timestamp());
        self.install(cursor, last_displayed);
        Ok(())
    }

    /// Install a cursor derived from the store's borders. Refused while a
    /// history load is outstanding, since that load will reseed on its own.
    pub fn reseed(&mut self, cursor: ReductionCursor) -> Result<(), TickError> {
        if self.is_suspended() {
            return Err(TickError::Suspended);
        }
        self.drawn_through = None;
        self.install(cursor, None);
        Ok(())
    }

    /// Buffered samples the new cursor has already covered are dropped.
    fn install(&mut self, cursor: ReductionCursor, last_displayed: Option<DecodedSample>) {
        self.buffer.retain(|s| s.timestamp() >= cursor.right_border);
        self.cursor = cursor;
        self.last_displayed = last_displayed;
        self.generation += 1;
        tracing::debug!(
            "Reseeded live cursor at {} (generation {})",
            cursor.right_border,
            self.generation
        );
    }

    /// One live tick. Returns the samples to draw, ascending by timestamp.
    pub fn tick(&mut self, generation: u64, now: i64) -> Result<Vec<DecodedSample>, TickError> {
        if self.is_suspended() {
            return Err(TickError::Suspended);
        }
        if generation != self.generation {
            tracing::warn!(
                "Discarding live tick for generation {} (current {})",
                generation,
                self.generation
            );
            return Err(TickError::StaleGeneration {
                requested: generation,
                current: self.generation,
            });
        }

        let reduction = reducer::reduce(&self.buffer, self.cursor, now);
        self.cursor = reduction.cursor;
        self.buffer.drain(..reduction.consumed);

        let reduced = reduction.retained();
        let previous = match reduced.last() {
            Some(newest) => self.last_displayed.replace(newest.clone()),
            None => None,
        };

        // points an earlier fallback already drew are not drawn again
        let mut out: Vec<DecodedSample> = reduced
            .into_iter()
            .filter(|s| self.drawn_through.is_none_or(|drawn| s.timestamp() > drawn))
            .collect();
        if out.is_empty() {
            if self.mode == SeriesMode::Online {
                out = self.raw_fallback();
            }
        } else if let Some(previous) = previous {
            out.insert(0, previous);
        }
        if let Some(newest) = out.last().map(|s| s.timestamp()) {
            self.drawn_through = Some(self.drawn_through.map_or(newest, |d| d.max(newest)));
        }

        out.append(&mut self.pending_gaps);
        out.sort_by_key(|s| s.timestamp());
        Ok(out)
    }

    /// Min and max of the still-buffered samples, unless that would repeat
    /// what the chart already shows.
    fn raw_fallback(&self) -> Vec<DecodedSample> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        let candidates: Vec<DecodedSample> = reducer::extrema(&self.buffer)
            .into_iter()
            .map(|i| self.buffer[i].clone())
            .collect();
        if candidates
            .iter()
            .all(|c| self.drawn_through.is_some_and(|drawn| c.timestamp() <= drawn))
        {
            return Vec::new();
        }

        if let Some(last) = &self.last_displayed {
            if candidates.iter().any(|c| c.timestamp() == last.timestamp()) {
                return Vec::new();
            }
            if let [only] = candidates.as_slice() {
                if only.value() == last.value() {
                    return Vec::new();
                }
            }
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::retention::DEFAULT_RETENTION_MS;
    use crate::domain::quality::NO_VALUE_OTHER;

    fn online(start: i64, slice: i64) -> LiveBuffer {
        LiveBuffer::new(SeriesMode::Online, ReductionCursor::new(start, slice), DEFAULT_RETENTION_MS)
    }

    fn pairs(points: &[DecodedSample]) -> Vec<(i64, f64)> {
        points.iter().map(|s| (s.timestamp(), s.value())).collect()
    }

    #[test]
    fn test_idle_tick_falls_back_to_raw_min_max() {
        let mut live = online(0, 100);
        live.append(Sample::good(10, 3.0));
        live.append(Sample::good(20, 7.0));
        live.append(Sample::good(30, 5.0));

        let out = live.tick(0, 50).unwrap();
        assert_eq!(pairs(&out), vec![(10, 3.0), (20, 7.0)]);
        assert_eq!(live.buffered().len(), 3);

        // nothing new: the same fallback is not drawn twice
        assert!(live.tick(0, 60).unwrap().is_empty());
    }

    #[test]
    fn test_offline_idle_tick_emits_nothing() {
        let mut live = LiveBuffer::new(
            SeriesMode::Offline,
            ReductionCursor::new(0, 100),
            DEFAULT_RETENTION_MS,
        );
        live.append(Sample::good(10, 3.0));
        live.append(Sample::good(20, 7.0));
        assert!(live.tick(0, 50).unwrap().is_empty());
    }

    #[test]
    fn test_tick_prunes_and_bridges_with_last_point() {
        let mut live = online(0, 10);
        for (t, v) in [(1, 1.0), (4, 8.0), (6, 2.0), (12, 5.0)] {
            live.append(Sample::good(t, v));
        }
        let out = live.tick(0, 11).unwrap();
        assert_eq!(pairs(&out), vec![(1, 1.0), (4, 8.0)]);
        assert_eq!(pairs(live.buffered()), vec![(12, 5.0)]);
        assert_eq!(live.cursor().right_border, 10);

        live.append(Sample::good(15, 9.0));
        live.append(Sample::good(22, 0.0));
        let out = live.tick(0, 23).unwrap();
        // previous last point leads, then the extrema of [10, 20]
        assert_eq!(pairs(&out), vec![(4, 8.0), (12, 5.0), (15, 9.0)]);
        assert_eq!(live.last_displayed().map(|s| s.timestamp()), Some(15));
    }

    #[test]
    fn test_repeated_notification_is_dropped() {
        let mut live = online(0, 100);
        assert_eq!(live.append(Sample::good(10, 3.0)), AppendOutcome::Buffered);
        assert_eq!(live.append(Sample::good(11, 3.0)), AppendOutcome::Duplicate);
        assert_eq!(live.append(Sample::good(12, 4.0)), AppendOutcome::Buffered);
        assert_eq!(live.buffered().len(), 2);
    }

    #[test]
    fn test_out_of_order_sample_is_inserted_sorted() {
        let mut live = online(0, 100);
        live.append(Sample::good(30, 1.0));
        live.append(Sample::good(10, 2.0));
        live.append(Sample::good(20, 3.0));
        let ts: Vec<i64> = live.buffered().iter().map(|s| s.timestamp()).collect();
        assert_eq!(ts, vec![10, 20, 30]);
    }

    #[test]
    fn test_sample_behind_cursor_is_stale() {
        let mut live = online(1_000, 100);
        assert_eq!(live.append(Sample::good(500, 1.0)), AppendOutcome::Stale);
        assert!(live.buffered().is_empty());
    }

    #[test]
    fn test_malformed_sample_becomes_gap() {
        let mut live = online(0, 100);
        assert_eq!(
            live.append(Sample::new(10, 1.0, "not-a-mask", true)),
            AppendOutcome::Malformed
        );
        assert!(live.buffered().is_empty());

        let out = live.tick(0, 50).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].quality.is_unknown());
    }

    #[test]
    fn test_stale_generation_is_rejected() {
        let mut live = online(0, 100);
        live.append(Sample::good(10, 1.0));
        live.reseed(ReductionCursor::new(0, 100)).unwrap();
        assert_eq!(
            live.tick(0, 50),
            Err(TickError::StaleGeneration { requested: 0, current: 1 })
        );
        assert_eq!(live.buffered().len(), 1);
        assert!(live.tick(1, 50).is_ok());
    }

    #[test]
    fn test_suspended_series_rejects_ticks() {
        let mut live = online(0, 100);
        let generation = live.begin_load();
        assert_eq!(live.tick(generation, 50), Err(TickError::Suspended));
        live.abort_load();
        assert!(live.tick(generation, 50).is_ok());
    }

    #[test]
    fn test_reseed_drops_covered_samples() {
        let mut live = online(0, 100);
        live.append(Sample::good(10, 1.0));
        live.append(Sample::good(200, 2.0));
        let mut cursor = ReductionCursor::new(150, 100);
        cursor.max_timestamp_seen = Some(150);
        live.reseed(cursor).unwrap();
        assert_eq!(pairs(live.buffered()), vec![(200, 2.0)]);
        assert_eq!(live.cursor(), cursor);
    }

    #[test]
    fn test_gap_quality_is_buffered() {
        let mut live = online(0, 100);
        let outcome = live.append(Sample::new(10, 1.0, NO_VALUE_OTHER.to_string(), false));
        assert_eq!(outcome, AppendOutcome::Buffered);
        assert!(live.buffered()[0].quality.has_no_value());
    }

    #[test]
    fn test_fallback_points_are_not_redrawn_when_slice_closes() {
        let mut live = online(0, 100);
        for (t, v) in [(10, 3.0), (20, 7.0), (30, 5.0)] {
            live.append(Sample::good(t, v));
        }
        assert_eq!(pairs(&live.tick(0, 50).unwrap()), vec![(10, 3.0), (20, 7.0)]);

        live.append(Sample::good(150, 1.0));
        let out = live.tick(0, 500).unwrap();
        // the closed slice reduces to the points already on the chart
        assert_eq!(pairs(&out), vec![(150, 1.0)]);
        assert_eq!(live.last_displayed().map(|s| s.timestamp()), Some(20));

        live.append(Sample::good(160, 4.0));
        live.append(Sample::good(250, 2.0));
        let out = live.tick(0, 500).unwrap();
        let ts: Vec<i64> = out.iter().map(|s| s.timestamp()).collect();
        let mut unique = ts.clone();
        unique.dedup();
        assert_eq!(ts, unique);
        assert!(ts.iter().all(|&t| t != 10 && t != 150));
    }

    #[test]
    fn test_overlapping_loads_keep_ticks_suspended() {
        let mut live = online(0, 100);
        let first = live.begin_load();
        let second = live.begin_load();

        // the newer load finishes first and owns the cursor
        live.finish_load(second, ReductionCursor::new(500, 100), None).unwrap();
        assert!(live.is_suspended());
        assert_eq!(live.tick(live.generation(), 600), Err(TickError::Suspended));

        let superseded = live.finish_load(first, ReductionCursor::new(200, 100), None);
        assert!(matches!(superseded, Err(TickError::StaleGeneration { .. })));
        assert!(!live.is_suspended());
        assert_eq!(live.cursor().right_border, 500);
        assert!(live.tick(live.generation(), 600).is_ok());
    }

    #[test]
    fn test_border_reseed_refused_during_load() {
        let mut live = online(0, 100);
        let token = live.begin_load();
        assert_eq!(live.reseed(ReductionCursor::new(900, 100)), Err(TickError::Suspended));
        assert!(live.is_suspended());

        live.finish_load(token, ReductionCursor::new(300, 100), None).unwrap();
        assert_eq!(live.cursor().right_border, 300);
        assert!(live.reseed(ReductionCursor::new(900, 100)).is_ok());
    }

    #[test]
    fn test_stale_sample_does_not_arm_dedup() {
        let mut live = online(1_000, 100);
        assert_eq!(live.append(Sample::good(500, 1.0)), AppendOutcome::Stale);
        assert_eq!(live.append(Sample::good(1_500, 1.0)), AppendOutcome::Buffered);
        assert_eq!(live.append(Sample::good(1_510, 1.0)), AppendOutcome::Duplicate);
    }
}
