// Live trend stream - history first, then one render pass per live tick
use crate::application::render::RenderPass;
use crate::application::trend_service::{TrendError, TrendService};
use crate::domain::error::TickError;
use crate::domain::sample::TimeWindow;
use crate::domain::series::SeriesProfile;
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StreamMessage {
    Skeleton {
        series: SeriesProfile,
        window: Option<TimeWindow>,
    },
    History(RenderPass),
    Live(RenderPass),
    Error {
        message: String,
    },
}

#[derive(Clone)]
pub struct LiveStreamService {
    trend_service: TrendService,
    tick_interval: Duration,
}

impl LiveStreamService {
    pub fn new(trend_service: TrendService) -> Self {
        let tick_interval = Duration::from_millis(trend_service.settings().live_tick_ms.max(1));
        Self {
            trend_service,
            tick_interval,
        }
    }

    /// Open a stream for one series. With a `window` the history is loaded
    /// and sent first; without one the live cursor is seeded from the
    /// store's borders. The ticker stops once the receiver is dropped.
    pub async fn stream_series(
        &self,
        series_id: &str,
        window: Option<TimeWindow>,
    ) -> Result<mpsc::Receiver<StreamMessage>, TrendError> {
        let profile = self.trend_service.profile(series_id).await?;
        let (tx, rx) = mpsc::channel(100);

        let skeleton = StreamMessage::Skeleton {
            series: profile,
            window,
        };
        let _ = tx.send(skeleton).await;

        let service = self.trend_service.clone();
        let series_id = series_id.to_string();
        let tick_interval = self.tick_interval;

        tokio::spawn(async move {
            let start_time = Instant::now();
            let seeded = match window {
                Some(window) => service
                    .load_history(&series_id, window)
                    .await
                    .map(|pass| Some(StreamMessage::History(pass))),
                None => service.reseed_from_borders(&series_id).await.map(|_| None),
            };
            match seeded {
                Ok(Some(history)) => {
                    if tx.send(history).await.is_err() {
                        return;
                    }
                    tracing::debug!(
                        "History for {} sent in {} ms",
                        series_id,
                        start_time.elapsed().as_millis()
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    // live ticks still work off the previous cursor
                    tracing::warn!("Could not seed live stream for {}: {}", series_id, e);
                    let _ = tx.send(StreamMessage::Error { message: e.to_string() }).await;
                }
            }

            run_ticker(service, series_id, tick_interval, tx).await;
        });

        Ok(rx)
    }
}

async fn run_ticker(
    service: TrendService,
    series_id: String,
    tick_interval: Duration,
    tx: mpsc::Sender<StreamMessage>,
) {
    let mut generation = match service.generation(&series_id).await {
        Ok(generation) => generation,
        Err(e) => {
            let _ = tx.send(StreamMessage::Error { message: e.to_string() }).await;
            return;
        }
    };

    let mut interval = tokio::time::interval(tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut ticks = IntervalStream::new(interval);

    while ticks.next().await.is_some() {
        if tx.is_closed() {
            break;
        }
        match service.live_tick(&series_id, generation).await {
            Ok(pass) if pass.is_empty() => {}
            Ok(pass) => {
                if tx.send(StreamMessage::Live(pass)).await.is_err() {
                    break;
                }
            }
            Err(TrendError::Tick(TickError::Suspended)) => {}
            Err(TrendError::Tick(TickError::StaleGeneration { current, .. })) => {
                generation = current;
            }
            Err(e) => {
                tracing::error!("Live tick for {} failed: {}", series_id, e);
                let _ = tx.send(StreamMessage::Error { message: e.to_string() }).await;
                break;
            }
        }
    }
    tracing::debug!("Live stream for {} closed", series_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::clock::ManualClock;
    use crate::domain::sample::Sample;
    use crate::infrastructure::config::EngineSettings;
    use crate::infrastructure::memory_store::InMemoryStore;
    use std::sync::Arc;
    use tokio::time::timeout;

    async fn service(samples: Vec<Sample>, now: i64) -> (TrendService, Arc<ManualClock>) {
        let store = InMemoryStore::new();
        store.insert("s1", samples).await;
        let clock = Arc::new(ManualClock::new(now));
        let settings = EngineSettings {
            target_slices: 10,
            live_tick_ms: 5,
            live_slice_ms: 100,
            ..EngineSettings::default()
        };
        let service = TrendService::new(Arc::new(store), clock.clone(), settings);
        service.register(SeriesProfile::analog("s1")).await;
        (service, clock)
    }

    async fn next(rx: &mut mpsc::Receiver<StreamMessage>) -> StreamMessage {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("stream stalled")
            .expect("stream closed")
    }

    #[tokio::test]
    async fn test_stream_sends_skeleton_history_then_live() {
        let (trend, clock) = service(vec![Sample::good(10, 1.0), Sample::good(950, 2.0)], 1_000).await;
        // buffered before the stream opens; the history reseed keeps samples from the window end on
        for (t, v) in [(1_060, 5.0), (1_070, 8.0), (1_300, 1.0)] {
            trend.push_sample("s1", Sample::good(t, v)).await.unwrap();
        }
        clock.set(1_300);

        let live = LiveStreamService::new(trend.clone());
        let mut rx = live
            .stream_series("s1", Some(TimeWindow::new(0, 1_000)))
            .await
            .unwrap();

        assert!(matches!(next(&mut rx).await, StreamMessage::Skeleton { .. }));
        match next(&mut rx).await {
            StreamMessage::History(pass) => assert_eq!(pass.points.len(), 2),
            other => panic!("expected history, got {other:?}"),
        }

        match next(&mut rx).await {
            StreamMessage::Live(pass) => {
                let ts: Vec<i64> = pass.points.iter().map(|p| p.timestamp).collect();
                assert_eq!(ts, vec![950, 1_060, 1_070]);
            }
            other => panic!("expected live pass, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_series_is_rejected() {
        let (trend, _) = service(vec![], 0).await;
        let live = LiveStreamService::new(trend);
        assert!(matches!(
            live.stream_series("missing", None).await,
            Err(TrendError::UnknownSeries(_))
        ));
    }

    #[test]
    fn test_message_is_tagged() {
        let msg = StreamMessage::Live(RenderPass {
            series_id: "s1".to_string(),
            ..RenderPass::default()
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "live");
        assert_eq!(json["seriesId"], "s1");
    }
}
