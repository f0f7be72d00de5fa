// Historical store port - the backing store behind trend reads
use crate::domain::sample::{Sample, TimeWindow};
use async_trait::async_trait;

#[async_trait]
pub trait HistoricalStore: Send + Sync {
    /// Raw samples of `series_id` within `[from, to]`, ascending by timestamp.
    /// The store may return fewer than `max_samples` but never more.
    async fn fetch(
        &self,
        series_id: &str,
        from: i64,
        to: i64,
        max_samples: i64,
    ) -> anyhow::Result<Vec<Sample>>;

    /// Oldest and newest stored timestamps, or `None` for an empty series.
    async fn get_borders(&self, series_id: &str) -> anyhow::Result<Option<TimeWindow>>;
}
