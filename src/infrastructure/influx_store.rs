// InfluxDB historical store
use crate::application::historical_store::HistoricalStore;
use crate::domain::sample::{Sample, TimeWindow};
use crate::infrastructure::config::{prepare_query, InfluxSettings};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct InfluxHistoricalStore {
    client: reqwest::Client,
    host: String,
    token: String,
    database: String,
    retention_policy: String,
    fetch_query: String,
    border_query: String,
}

#[derive(Debug, Deserialize)]
struct InfluxQLResponse {
    results: Vec<InfluxQLResult>,
}

#[derive(Debug, Deserialize)]
struct InfluxQLResult {
    #[serde(default)]
    series: Option<Vec<InfluxQLSeries>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InfluxQLSeries {
    columns: Vec<String>,
    values: Vec<Vec<Value>>,
}

impl InfluxHistoricalStore {
    pub fn new(settings: &InfluxSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            host: settings.host.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            database: settings.database.clone(),
            retention_policy: settings.retention_policy.clone(),
            fetch_query: settings.fetch_query.clone(),
            border_query: settings.border_query.clone(),
        }
    }

    fn build_query_url(&self, query: &str) -> String {
        // epoch=ms makes the time column an integer in milliseconds
        format!(
            "{}/query?db={}&rp={}&epoch=ms&q={}",
            self.host,
            self.database,
            self.retention_policy,
            urlencoding::encode(query)
        )
    }

    async fn execute_query(&self, query: &str) -> Result<InfluxQLResponse> {
        let url = self.build_query_url(query);
        tracing::debug!("Executing InfluxQL: {}", query);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Token {}", self.token))
            .header("Accept", "application/json")
            .send()
            .await
            .context("Failed to send request to InfluxDB")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("InfluxDB query failed with status {}: {}", status, body);
        }

        let data = response
            .json::<InfluxQLResponse>()
            .await
            .context("Failed to parse InfluxDB response")?;

        if let Some(error) = data.results.first().and_then(|r| r.error.as_ref()) {
            anyhow::bail!("InfluxDB query error: {}", error);
        }

        Ok(data)
    }

    async fn border_time(&self, series_id: &str, selector: &str) -> Result<Option<i64>> {
        let mut vars = HashMap::new();
        vars.insert("series".to_string(), escape_literal(series_id));
        vars.insert("selector".to_string(), selector.to_string());
        let query = prepare_query(&self.border_query, &vars);

        let response = self.execute_query(&query).await?;
        let time = response
            .results
            .first()
            .and_then(|r| r.series.as_ref())
            .and_then(|series| series.first())
            .and_then(|s| {
                let time_idx = s.columns.iter().position(|c| c == "time").unwrap_or(0);
                s.values.first().and_then(|row| row.get(time_idx)).and_then(parse_time)
            });
        Ok(time)
    }
}

#[async_trait]
impl HistoricalStore for InfluxHistoricalStore {
    async fn fetch(&self, series_id: &str, from: i64, to: i64, max_samples: i64) -> Result<Vec<Sample>> {
        let mut vars = HashMap::new();
        vars.insert("series".to_string(), escape_literal(series_id));
        vars.insert("from".to_string(), from.to_string());
        vars.insert("to".to_string(), to.to_string());
        vars.insert("limit".to_string(), max_samples.max(1).to_string());
        let query = prepare_query(&self.fetch_query, &vars);

        let response = self.execute_query(&query).await?;
        let mut samples = samples_from_response(&response);
        samples.sort_by_key(|s| s.timestamp);
        samples.truncate(usize::try_from(max_samples).unwrap_or(0));

        tracing::debug!("InfluxDB returned {} samples for {}", samples.len(), series_id);
        Ok(samples)
    }

    async fn get_borders(&self, series_id: &str) -> Result<Option<TimeWindow>> {
        let first = self.border_time(series_id, "FIRST").await?;
        let last = self.border_time(series_id, "LAST").await?;
        Ok(first.zip(last).map(|(start, end)| TimeWindow::new(start, end)))
    }
}

fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn samples_from_response(response: &InfluxQLResponse) -> Vec<Sample> {
    let mut samples = Vec::new();
    let Some(series) = response.results.first().and_then(|r| r.series.as_ref()) else {
        return samples;
    };

    for s in series {
        let column = |name: &str| s.columns.iter().position(|c| c == name);
        let time_idx = column("time").unwrap_or(0);
        let value_idx = column("value").unwrap_or(1);
        let quality_idx = column("quality");
        let good_idx = column("quality_good");

        for row in &s.values {
            let Some(timestamp) = row.get(time_idx).and_then(parse_time) else {
                tracing::warn!("Skipping InfluxDB row without a usable time: {:?}", row);
                continue;
            };
            // null values come back as NaN and are skipped by the reducer
            let value = row.get(value_idx).and_then(Value::as_f64).unwrap_or(f64::NAN);
            let quality = quality_idx
                .and_then(|i| row.get(i))
                .and_then(mask_text)
                .unwrap_or_else(|| "0".to_string());
            let quality_good = good_idx
                .and_then(|i| row.get(i))
                .and_then(Value::as_bool)
                .unwrap_or(quality == "0");
            samples.push(Sample::new(timestamp, value, quality, quality_good));
        }
    }
    samples
}

fn parse_time(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(text) => chrono::DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|t| t.timestamp_millis()),
        _ => None,
    }
}

/// Masks are stored as decimal strings; integer columns are accepted too.
/// Floats are passed through as text and fail decoding downstream.
fn mask_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
