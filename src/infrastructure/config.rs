use crate::application::retention::DEFAULT_RETENTION_MS;
use crate::domain::series::SeriesProfile;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub influx: Option<InfluxSettings>,
    #[serde(default)]
    pub series: Vec<SeriesProfile>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineSettings {
    /// Slices per visible window for historical reduction.
    pub target_slices: i64,
    /// Per-request sample budget before pan/zoom scaling.
    pub base_samples: i64,
    pub live_tick_ms: u64,
    /// Slice duration for live series that have no history loaded yet.
    pub live_slice_ms: i64,
    pub retention_ms: i64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            target_slices: 150,
            base_samples: 2_000,
            live_tick_ms: 1_000,
            live_slice_ms: 5_000,
            retention_ms: DEFAULT_RETENTION_MS,
        }
    }
}

impl EngineSettings {
    pub fn slice_duration(&self, window_width: i64) -> i64 {
        (window_width / self.target_slices.max(1)).max(1)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct InfluxSettings {
    pub host: String,
    pub token: String,
    pub database: String,
    pub retention_policy: String,
    #[serde(default = "default_fetch_query")]
    pub fetch_query: String,
    #[serde(default = "default_border_query")]
    pub border_query: String,
}

fn default_fetch_query() -> String {
    "SELECT value, quality, quality_good FROM trend WHERE series = '${series}' \
     AND time >= ${from}ms AND time <= ${to}ms ORDER BY time ASC LIMIT ${limit}"
        .to_string()
}

fn default_border_query() -> String {
    "SELECT ${selector}(value) FROM trend WHERE series = '${series}'".to_string()
}

/// Load `config/trend.*` (optional) overlaid with `TREND__SECTION__KEY` variables.
pub fn load_config() -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/trend").required(false))
        .add_source(config::Environment::with_prefix("TREND").separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// Substitute `${name}` placeholders in an InfluxQL template.
/// Placeholders without a matching variable are left as they are.
pub fn prepare_query(template: &str, vars: &HashMap<String, String>) -> String {
    vars.iter().fold(template.to_string(), |query, (name, value)| {
        query.replace(&format!("${{{name}}}"), value)
    })
}
