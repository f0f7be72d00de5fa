// In-memory historical store for local runs and tests
use crate::application::historical_store::HistoricalStore;
use crate::domain::sample::{Sample, TimeWindow};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryStore {
    series: RwLock<HashMap<String, Vec<Sample>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add samples to a series, keeping it sorted by timestamp.
    pub async fn insert(&self, series_id: &str, samples: Vec<Sample>) {
        let mut series = self.series.write().await;
        let stored = series.entry(series_id.to_string()).or_default();
        stored.extend(samples);
        stored.sort_by_key(|s| s.timestamp);
    }
}

#[async_trait]
impl HistoricalStore for InMemoryStore {
    async fn fetch(&self, series_id: &str, from: i64, to: i64, max_samples: i64) -> Result<Vec<Sample>> {
        let series = self.series.read().await;
        let limit = usize::try_from(max_samples).unwrap_or(0);
        let window = TimeWindow::new(from, to);

        let samples = series
            .get(series_id)
            .map(|stored| {
                stored
                    .iter()
                    .filter(|s| window.contains(s.timestamp))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(samples)
    }

    async fn get_borders(&self, series_id: &str) -> Result<Option<TimeWindow>> {
        let series = self.series.read().await;
        let borders = series.get(series_id).and_then(|stored| {
            let first = stored.first()?;
            let last = stored.last()?;
            Some(TimeWindow::new(first.timestamp, last.timestamp))
        });
        Ok(borders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_is_inclusive_and_limited() {
        let store = InMemoryStore::new();
        store
            .insert("s1", (0..10).rev().map(|i| Sample::good(i * 10, i as f64)).collect())
            .await;

        let all = store.fetch("s1", 20, 50, 100).await.unwrap();
        let ts: Vec<i64> = all.iter().map(|s| s.timestamp).collect();
        assert_eq!(ts, vec![20, 30, 40, 50]);

        let limited = store.fetch("s1", 0, 90, 3).await.unwrap();
        assert_eq!(limited.len(), 3);
        assert_eq!(limited[0].timestamp, 0);
    }

    #[tokio::test]
    async fn test_borders() {
        let store = InMemoryStore::new();
        assert_eq!(store.get_borders("s1").await.unwrap(), None);

        store.insert("s1", vec![Sample::good(500, 1.0), Sample::good(100, 2.0)]).await;
        assert_eq!(
            store.get_borders("s1").await.unwrap(),
            Some(TimeWindow::new(100, 500))
        );
        assert!(store.fetch("other", 0, 1_000, 10).await.unwrap().is_empty());
    }
}
