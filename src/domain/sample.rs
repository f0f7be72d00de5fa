// Sample domain models
use super::error::DecodeError;
use super::quality::{self, DecodedQuality};
use serde::{Deserialize, Serialize};

/// One raw trend sample. `quality_raw` is the decimal-encoded 64-bit mask.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub timestamp: i64,
    pub value: f64,
    pub quality_raw: String,
    pub quality_good: bool,
}

impl Sample {
    pub fn new(timestamp: i64, value: f64, quality_raw: impl Into<String>, quality_good: bool) -> Self {
        Self {
            timestamp,
            value,
            quality_raw: quality_raw.into(),
            quality_good,
        }
    }

    /// A good-quality sample with an empty status mask.
    pub fn good(timestamp: i64, value: f64) -> Self {
        Self::new(timestamp, value, "0", true)
    }

    pub fn decode(self) -> Result<DecodedSample, DecodeError> {
        let quality = quality::decode(&self.quality_raw, self.value)?;
        Ok(DecodedSample { sample: self, quality })
    }

    /// Decode, falling back to an unknown quality when the mask is malformed.
    pub fn decode_or_unknown(self) -> DecodedSample {
        match quality::decode(&self.quality_raw, self.value) {
            Ok(quality) => DecodedSample { sample: self, quality },
            Err(e) => {
                tracing::warn!("Treating sample at {} as unknown quality: {}", self.timestamp, e);
                DecodedSample {
                    sample: self,
                    quality: DecodedQuality::unknown(),
                }
            }
        }
    }
}

/// A sample paired with its decoded quality.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSample {
    pub sample: Sample,
    pub quality: DecodedQuality,
}

impl DecodedSample {
    pub fn timestamp(&self) -> i64 {
        self.sample.timestamp
    }

    pub fn value(&self) -> f64 {
        self.sample.value
    }
}

/// Wire timestamp: epoch milliseconds or an RFC 3339 string.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    Millis(i64),
    Text(String),
}

impl WireTimestamp {
    pub fn to_millis(&self) -> Result<i64, DecodeError> {
        match self {
            WireTimestamp::Millis(ms) => Ok(*ms),
            WireTimestamp::Text(text) => chrono::DateTime::parse_from_rfc3339(text)
                .map(|t| t.timestamp_millis())
                .map_err(|_| DecodeError::MalformedTimestamp(text.clone())),
        }
    }
}

/// One change-of-value record as delivered by the live notification source.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveNotification {
    pub timestamp: WireTimestamp,
    pub value: f64,
    #[serde(default = "good_mask")]
    pub quality: String,
    #[serde(default = "default_quality_good")]
    pub quality_good: bool,
}

fn good_mask() -> String {
    "0".to_string()
}

fn default_quality_good() -> bool {
    true
}

impl LiveNotification {
    pub fn into_sample(self) -> Result<Sample, DecodeError> {
        let timestamp = self.timestamp.to_millis()?;
        Ok(Sample::new(timestamp, self.value, self.quality, self.quality_good))
    }
}

/// Closed time interval in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct TimeWindow {
    pub start: i64,
    pub end: i64,
}

impl TimeWindow {
    pub fn new(start: i64, end: i64) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    pub fn width(&self) -> i64 {
        self.end.saturating_sub(self.start)
    }

    pub fn contains(&self, t: i64) -> bool {
        self.start <= t && t <= self.end
    }

    pub fn intersection(&self, other: &TimeWindow) -> Option<TimeWindow> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start <= end).then_some(TimeWindow { start, end })
    }
}
