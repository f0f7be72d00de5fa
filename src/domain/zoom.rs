// Zoom level and sample budget arithmetic for pan/zoom requests
use super::sample::TimeWindow;
use serde::{Deserialize, Serialize};

/// The historical store cannot resolve windows narrower than this.
pub const MIN_VISIBLE_WIDTH_MS: i64 = 1_000;
/// A budget of zero or less means "everything" to the store, so never go below this.
pub const MIN_SAMPLE_BUDGET: i64 = 2;
/// Each level is a 20% deeper zoom.
const ZOOM_STEP: f64 = 100.0 / 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ZoomLevel {
    /// The whole series span is visible.
    FullView,
    Zoomed(u32),
}

pub fn compute_zoom_level(visible_width: i64, total_span: i64) -> ZoomLevel {
    let visible = visible_width.max(MIN_VISIBLE_WIDTH_MS) as f64;
    if total_span <= 0 {
        return ZoomLevel::FullView;
    }
    let ratio = total_span as f64 / visible;
    // nudge so exact powers of the step do not fall one level short
    let level = (ratio.log10() / ZOOM_STEP.log10() + 1e-9).floor();
    if level < 1.0 {
        ZoomLevel::FullView
    } else {
        ZoomLevel::Zoomed(level as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewChange {
    Pan,
    Zoom,
}

/// Samples to request for `requested`.
///
/// Panning reuses half the base budget scaled by the width ratio against
/// `reference`; zooming scales the full budget by the share of `requested`
/// that overlaps the available `reference` window.
pub fn compute_sample_budget(
    base_samples: i64,
    requested: TimeWindow,
    reference: TimeWindow,
    change: ViewChange,
) -> i64 {
    let budget = match change {
        ViewChange::Pan => {
            let half = base_samples as f64 / 2.0;
            half * requested.width() as f64 / reference.width().max(1) as f64
        }
        ViewChange::Zoom => {
            let overlap = requested
                .intersection(&reference)
                .map(|w| w.width())
                .unwrap_or(0);
            base_samples as f64 * overlap as f64 / requested.width().max(1) as f64
        }
    };
    (budget.floor() as i64).max(MIN_SAMPLE_BUDGET)
}

/// Visible range reported by the chart widget, epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PanZoomRequest {
    pub range_start: i64,
    pub range_end: i64,
}

impl PanZoomRequest {
    /// Requested window, widened to the minimum resolvable width.
    pub fn window(&self) -> TimeWindow {
        let window = TimeWindow::new(self.range_start, self.range_end);
        if window.width() < MIN_VISIBLE_WIDTH_MS {
            TimeWindow::new(window.start, window.start.saturating_add(MIN_VISIBLE_WIDTH_MS))
        } else {
            window
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchPlan {
    pub from: i64,
    pub to: i64,
    pub sample_count: i64,
    pub change: ViewChange,
    pub zoom_level: ZoomLevel,
    /// Full window the chart will show once the fetch is merged.
    pub view: TimeWindow,
}

/// Turn a pan/zoom request into the next historical fetch.
///
/// A request with the same width as `current` is a pan and only fetches the
/// newly exposed strip; anything else is a zoom over the requested window.
pub fn plan_fetch(
    request: &PanZoomRequest,
    current: Option<TimeWindow>,
    available: TimeWindow,
    base_samples: i64,
) -> FetchPlan {
    let requested = request.window();
    let zoom_level = compute_zoom_level(requested.width(), available.width());

    match current {
        Some(cur) if cur.width() == requested.width() && cur != requested => {
            let exposed = if requested.start > cur.start {
                TimeWindow::new(cur.end.max(requested.start), requested.end)
            } else {
                TimeWindow::new(requested.start, cur.start.min(requested.end))
            };
            FetchPlan {
                from: exposed.start,
                to: exposed.end,
                sample_count: compute_sample_budget(base_samples, exposed, cur, ViewChange::Pan),
                change: ViewChange::Pan,
                zoom_level,
                view: requested,
            }
        }
        _ => {
            let window = requested.intersection(&available).unwrap_or(requested);
            FetchPlan {
                from: window.start,
                to: window.end,
                sample_count: compute_sample_budget(base_samples, requested, available, ViewChange::Zoom),
                change: ViewChange::Zoom,
                zoom_level,
                view: requested,
            }
        }
    }
}
