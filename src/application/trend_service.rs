// Trend service - Per-series orchestration of history loads, pan/zoom and live ticks
use crate::application::clock::Clock;
use crate::application::historical_store::HistoricalStore;
use crate::application::live_buffer::{AppendOutcome, LiveBuffer};
use crate::application::render::{self, RenderPass};
use crate::application::retention::RangeSummary;
use crate::domain::display::SynthesizerState;
use crate::domain::error::{DecodeError, TickError};
use crate::domain::reducer::{self, ReductionCursor};
use crate::domain::sample::{DecodedSample, LiveNotification, Sample, TimeWindow};
use crate::domain::series::SeriesProfile;
use crate::domain::zoom::{self, FetchPlan, PanZoomRequest, ViewChange};
use crate::infrastructure::config::EngineSettings;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Error)]
pub enum TrendError {
    #[error("unknown series {0:?}")]
    UnknownSeries(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Tick(#[from] TickError),
    #[error("historical store failure: {0:#}")]
    Store(anyhow::Error),
}

/// Everything one series owns. Nothing else mutates it.
#[derive(Debug)]
pub struct SeriesState {
    pub profile: SeriesProfile,
    pub live: LiveBuffer,
    pub synth: SynthesizerState,
    pub view: Option<TimeWindow>,
}

#[derive(Clone)]
pub struct TrendService {
    store: Arc<dyn HistoricalStore>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
    series: Arc<RwLock<HashMap<String, Arc<Mutex<SeriesState>>>>>,
}

impl TrendService {
    pub fn new(store: Arc<dyn HistoricalStore>, clock: Arc<dyn Clock>, settings: EngineSettings) -> Self {
        Self {
            store,
            clock,
            settings,
            series: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub async fn register(&self, profile: SeriesProfile) {
        let cursor = ReductionCursor::new(self.clock.now_ms(), self.settings.live_slice_ms);
        let state = SeriesState {
            live: LiveBuffer::new(profile.mode, cursor, self.settings.retention_ms),
            profile: profile.clone(),
            synth: SynthesizerState::default(),
            view: None,
        };
        tracing::info!("Registered series {} ({:?}, {:?})", profile.id, profile.mode, profile.kind);
        self.series
            .write()
            .await
            .insert(profile.id, Arc::new(Mutex::new(state)));
    }

    pub async fn series_profiles(&self) -> Vec<SeriesProfile> {
        let series = self.series.read().await;
        let mut profiles = Vec::with_capacity(series.len());
        for state in series.values() {
            profiles.push(state.lock().await.profile.clone());
        }
        profiles.sort_by(|a, b| a.id.cmp(&b.id));
        profiles
    }

    pub async fn profile(&self, series_id: &str) -> Result<SeriesProfile, TrendError> {
        let entry = self.entry(series_id).await?;
        let profile = entry.lock().await.profile.clone();
        Ok(profile)
    }

    async fn entry(&self, series_id: &str) -> Result<Arc<Mutex<SeriesState>>, TrendError> {
        self.series
            .read()
            .await
            .get(series_id)
            .cloned()
            .ok_or_else(|| TrendError::UnknownSeries(series_id.to_string()))
    }

    /// One-shot historical reduction of `window`. Live ticks for the series
    /// are suspended until the reduced history has reseeded the live cursor.
    /// A load overtaken by a newer one for the same series is discarded.
    pub async fn load_history(&self, series_id: &str, window: TimeWindow) -> Result<RenderPass, TrendError> {
        let entry = self.entry(series_id).await?;
        let token = entry.lock().await.live.begin_load();

        let fetched = self.fetch_window(series_id, window).await;

        let mut state = entry.lock().await;
        let samples = match fetched {
            Ok(samples) => samples,
            Err(e) => {
                state.live.abort_load();
                tracing::error!("History fetch for {} failed: {:#}", series_id, e);
                return Err(TrendError::Store(e));
            }
        };
        tracing::debug!(
            "Fetched {} samples for {} in [{}, {}]",
            samples.len(),
            series_id,
            window.start,
            window.end
        );

        let cursor = ReductionCursor::new(window.start, self.settings.slice_duration(window.width()));
        let (retained, reduced_cursor) = reduce_history(samples, cursor);

        // live data resumes at the window end, not at the last history border
        let mut live_cursor = ReductionCursor::new(
            reduced_cursor.right_border.min(window.end),
            self.settings.live_slice_ms,
        );
        live_cursor.max_timestamp_seen = reduced_cursor.max_timestamp_seen;

        let last_displayed = retained
            .iter()
            .rev()
            .find(|s| !s.quality.has_no_value())
            .cloned();
        state.live.finish_load(token, live_cursor, last_displayed)?;
        state.view = Some(window);
        state.synth = SynthesizerState::default();

        let SeriesState { profile, synth, .. } = &mut *state;
        Ok(render::render(profile, &retained, synth))
    }

    /// Fetch `window` with a budget scaled to how much of it the store covers.
    async fn fetch_window(&self, series_id: &str, window: TimeWindow) -> anyhow::Result<Vec<Sample>> {
        let available = self.store.get_borders(series_id).await?.unwrap_or(window);
        let budget = zoom::compute_sample_budget(self.settings.base_samples, window, available, ViewChange::Zoom);
        self.store.fetch(series_id, window.start, window.end, budget).await
    }

    /// Handle a pan or zoom from the chart: plan the fetch, reduce it and
    /// render it. The live cursor is left alone.
    pub async fn pan_zoom(
        &self,
        series_id: &str,
        request: PanZoomRequest,
    ) -> Result<(FetchPlan, RenderPass), TrendError> {
        let entry = self.entry(series_id).await?;
        let current = entry.lock().await.view;

        let available = self
            .store
            .get_borders(series_id)
            .await
            .map_err(TrendError::Store)?
            .unwrap_or_else(|| request.window());
        let plan = zoom::plan_fetch(&request, current, available, self.settings.base_samples);
        tracing::debug!(
            "{:?} on {} -> fetch [{}, {}] with {} samples, zoom {:?}",
            plan.change,
            series_id,
            plan.from,
            plan.to,
            plan.sample_count,
            plan.zoom_level
        );

        let samples = self
            .store
            .fetch(series_id, plan.from, plan.to, plan.sample_count)
            .await
            .map_err(TrendError::Store)?;

        let cursor = ReductionCursor::new(plan.from, self.settings.slice_duration(plan.view.width()));
        let (retained, _) = reduce_history(samples, cursor);

        let mut state = entry.lock().await;
        state.view = Some(plan.view);
        let mut synth = SynthesizerState::default();
        let pass = render::render(&state.profile, &retained, &mut synth);
        Ok((plan, pass))
    }

    pub async fn push_notification(
        &self,
        series_id: &str,
        notification: LiveNotification,
    ) -> Result<AppendOutcome, TrendError> {
        let sample = notification.into_sample()?;
        self.push_sample(series_id, sample).await
    }

    pub async fn push_sample(&self, series_id: &str, sample: Sample) -> Result<AppendOutcome, TrendError> {
        let entry = self.entry(series_id).await?;
        let outcome = entry.lock().await.live.append(sample);
        Ok(outcome)
    }

    pub async fn generation(&self, series_id: &str) -> Result<u64, TrendError> {
        let entry = self.entry(series_id).await?;
        let generation = entry.lock().await.live.generation();
        Ok(generation)
    }

    /// Run one live tick for the cursor generation the caller last saw.
    pub async fn live_tick(&self, series_id: &str, generation: u64) -> Result<RenderPass, TrendError> {
        let entry = self.entry(series_id).await?;
        let mut state = entry.lock().await;
        let samples = state.live.tick(generation, self.clock.now_ms())?;

        let SeriesState { profile, synth, .. } = &mut *state;
        Ok(render::render(profile, &samples, synth))
    }

    /// Re-seed the live cursor from the store's borders, e.g. after a reconnect.
    pub async fn reseed_from_borders(&self, series_id: &str) -> Result<Option<TimeWindow>, TrendError> {
        let entry = self.entry(series_id).await?;
        let borders = self
            .store
            .get_borders(series_id)
            .await
            .map_err(TrendError::Store)?;

        if let Some(borders) = borders {
            let mut state = entry.lock().await;
            let slice_duration = state.live.cursor().slice_duration;
            let mut cursor = ReductionCursor::new(borders.end, slice_duration);
            cursor.max_timestamp_seen = Some(borders.end);
            match state.live.reseed(cursor) {
                Ok(()) => tracing::info!(
                    "Reseeded {} from borders [{}, {}]",
                    series_id,
                    borders.start,
                    borders.end
                ),
                Err(e) => tracing::debug!("Leaving the live cursor of {} to its history load: {}", series_id, e),
            }
        } else {
            tracing::debug!("No stored data for {}, keeping live cursor", series_id);
        }
        Ok(borders)
    }

    pub async fn quick_analysis(
        &self,
        series_id: &str,
        window: TimeWindow,
    ) -> Result<Option<RangeSummary>, TrendError> {
        let entry = self.entry(series_id).await?;
        let summary = entry.lock().await.live.retention().summarize(window);
        Ok(summary)
    }
}

/// Decode and reduce a finalized sample list. Samples with a malformed mask
/// skip the reduction and come back as unknown-quality gaps.
fn reduce_history(samples: Vec<Sample>, cursor: ReductionCursor) -> (Vec<DecodedSample>, ReductionCursor) {
    let mut good = Vec::with_capacity(samples.len());
    let mut malformed = Vec::new();
    for sample in samples {
        let decoded = sample.decode_or_unknown();
        if decoded.quality.is_unknown() {
            malformed.push(decoded);
        } else {
            good.push(decoded);
        }
    }
    good.sort_by_key(|s| s.timestamp());

    let reduction = reducer::reduce_finalized(&good, cursor);
    let mut retained = reduction.retained();
    retained.extend(malformed);
    retained.sort_by_key(|s| s.timestamp());
    (retained, reduction.cursor)
}
