// Time-bucket min/max decimation
use super::quality::QualityFlag;
use super::sample::DecodedSample;
use serde::Serialize;

/// Cross-call slicing state for one series.
///
/// After every reduction step `new_border == right_border + slice_duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReductionCursor {
    pub right_border: i64,
    pub new_border: i64,
    pub slice_duration: i64,
    pub max_timestamp_seen: Option<i64>,
}

impl ReductionCursor {
    pub fn new(start: i64, slice_duration: i64) -> Self {
        let slice_duration = slice_duration.max(1);
        Self {
            right_border: start,
            new_border: start.saturating_add(slice_duration),
            slice_duration,
            max_timestamp_seen: None,
        }
    }

    fn advance(&mut self) {
        self.right_border = self.new_border;
        self.new_border = self.right_border.saturating_add(self.slice_duration);
    }

    fn snap_to(&mut self, t: i64) {
        self.right_border = t;
        self.new_border = t.saturating_add(self.slice_duration);
    }

    fn observe(&mut self, t: i64) {
        self.max_timestamp_seen = Some(self.max_timestamp_seen.map_or(t, |m| m.max(t)));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    /// Extrema (plus retained driver-failure samples) of every closed slice
    /// holding two or more samples, in timestamp order.
    pub points: Vec<DecodedSample>,
    /// Lone samples of closed slices. Not part of the reduced set; callers
    /// merge them back so sparse data stays visible.
    pub singletons: Vec<DecodedSample>,
    pub cursor: ReductionCursor,
    /// Length of the buffer prefix that belongs to closed slices or lies
    /// before the window. Everything after it is the still-open slice.
    pub consumed: usize,
    pub slices_closed: usize,
}

impl Reduction {
    fn unchanged(cursor: ReductionCursor) -> Self {
        Self {
            points: Vec::new(),
            singletons: Vec::new(),
            cursor,
            consumed: 0,
            slices_closed: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.singletons.is_empty()
    }

    /// Reduced points and singletons merged in timestamp order.
    pub fn retained(&self) -> Vec<DecodedSample> {
        let mut all: Vec<DecodedSample> = self
            .points
            .iter()
            .chain(self.singletons.iter())
            .cloned()
            .collect();
        all.sort_by_key(|s| s.timestamp());
        all
    }
}

/// Reduce a live buffer. `now` decides whether a trailing slice whose end
/// already lies in the past may be closed early.
pub fn reduce(buffer: &[DecodedSample], cursor: ReductionCursor, now: i64) -> Reduction {
    reduce_inner(buffer, cursor, now, false)
}

/// Reduce a finalized (historical) buffer: nothing is withheld for later.
pub fn reduce_finalized(buffer: &[DecodedSample], cursor: ReductionCursor) -> Reduction {
    reduce_inner(buffer, cursor, i64::MAX, true)
}

fn reduce_inner(
    buffer: &[DecodedSample],
    cursor: ReductionCursor,
    now: i64,
    finalize: bool,
) -> Reduction {
    if buffer.is_empty() {
        return Reduction::unchanged(cursor);
    }
    if !buffer.windows(2).all(|w| w[0].timestamp() <= w[1].timestamp()) {
        tracing::debug!("Skipping reduction of out-of-order buffer ({} samples)", buffer.len());
        return Reduction::unchanged(cursor);
    }

    let mut out = Reduction::unchanged(cursor);
    let mut open: Option<usize> = None;
    let last = buffer.len() - 1;

    for (i, sample) in buffer.iter().enumerate() {
        let t = sample.timestamp();
        let cur = out.cursor;

        if t < cur.right_border {
            continue;
        }

        let mut force_close = false;
        if t <= cur.new_border {
            open.get_or_insert(i);
            force_close = i == last && (t == cur.new_border || cur.new_border < now);
        } else if open.is_some() && t <= cur.new_border.saturating_add(cur.slice_duration) {
            if let Some(start) = open {
                close_slice(&buffer[start..i], &mut out);
            }
            out.cursor.advance();
            open = Some(i);
        } else if t >= cur.new_border.saturating_add(cur.slice_duration) {
            // gap longer than a slice: restart the grid at t
            if let Some(start) = open {
                close_slice(&buffer[start..i], &mut out);
            }
            out.cursor.snap_to(t);
            open = Some(i);
        } else {
            out.cursor.advance();
            open = Some(i);
            force_close = i == last;
        }

        if force_close {
            if let Some(start) = open.take() {
                close_slice(&buffer[start..=i], &mut out);
            }
            out.cursor.advance();
        }
    }

    if finalize {
        if let Some(start) = open.take() {
            close_slice(&buffer[start..], &mut out);
            out.cursor.advance();
        }
    }

    out.consumed = open.unwrap_or(buffer.len());
    out
}

fn close_slice(slice: &[DecodedSample], out: &mut Reduction) {
    out.slices_closed += 1;
    match slice.len() {
        0 => {}
        1 => {
            out.cursor.observe(slice[0].timestamp());
            out.singletons.push(slice[0].clone());
        }
        _ => {
            for index in extrema(slice) {
                out.cursor.observe(slice[index].timestamp());
                out.points.push(slice[index].clone());
            }
        }
    }
}

/// Indices of the samples a slice reduces to, in timestamp order.
///
/// The minimum keeps its first occurrence and the maximum its last. A
/// driver-failure sample survives even when it is neither.
pub fn extrema(slice: &[DecodedSample]) -> Vec<usize> {
    let mut min: Option<usize> = None;
    let mut max: Option<usize> = None;

    for (i, sample) in slice.iter().enumerate() {
        let v = sample.value();
        if v.is_nan() {
            continue;
        }
        match min {
            Some(m) if v >= slice[m].value() => {}
            _ => min = Some(i),
        }
        match max {
            Some(m) if v < slice[m].value() => {}
            _ => max = Some(i),
        }
    }

    let mut picked = Vec::with_capacity(3);
    if let (Some(min), Some(max)) = (min, max) {
        picked.push(min);
        if slice[min].timestamp() != slice[max].timestamp() {
            picked.push(max);
        }
    }

    let driver_failed = |i: &usize| slice[*i].quality.has(QualityFlag::DriverFailed);
    if !picked.iter().any(driver_failed) {
        if let Some(i) = (0..slice.len()).find(driver_failed) {
            picked.push(i);
        }
    }

    picked.sort_by_key(|&i| (slice[i].timestamp(), i));
    picked.dedup();
    picked
}
