// Series profile domain model
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Online series get a raw min/max fallback on idle live ticks, offline ones do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SeriesMode {
    #[default]
    Online,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueKind {
    #[default]
    Analog,
    Binary,
    MultiState,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SeriesProfile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mode: SeriesMode,
    #[serde(default)]
    pub kind: ValueKind,
    /// Enumerated texts keyed by the integer state value.
    #[serde(default)]
    pub value_texts: BTreeMap<String, String>,
}

impl SeriesProfile {
    pub fn analog(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            mode: SeriesMode::Online,
            kind: ValueKind::Analog,
            value_texts: BTreeMap::new(),
        }
    }

    pub fn with_mode(mut self, mode: SeriesMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_texts(mut self, kind: ValueKind, texts: &[(i64, &str)]) -> Self {
        self.kind = kind;
        self.value_texts = texts
            .iter()
            .map(|(state, text)| (state.to_string(), text.to_string()))
            .collect();
        self
    }

    /// Text for an enumerated value; analog series never map.
    pub fn value_text(&self, value: f64) -> Option<String> {
        if self.kind == ValueKind::Analog || !value.is_finite() {
            return None;
        }
        let state = value.round() as i64;
        if let Some(text) = self.value_texts.get(&state.to_string()) {
            return Some(text.clone());
        }
        match (self.kind, state) {
            (ValueKind::Binary, 0) => Some("Off".to_string()),
            (ValueKind::Binary, _) => Some("On".to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_text() {
        let analog = SeriesProfile::analog("temp");
        assert_eq!(analog.value_text(1.0), None);

        let binary = SeriesProfile::analog("pump").with_texts(ValueKind::Binary, &[(1, "Running")]);
        assert_eq!(binary.value_text(1.0), Some("Running".to_string()));
        assert_eq!(binary.value_text(0.0), Some("Off".to_string()));

        let multi = SeriesProfile::analog("mode")
            .with_texts(ValueKind::MultiState, &[(1, "Comfort"), (2, "Eco")]);
        assert_eq!(multi.value_text(2.0), Some("Eco".to_string()));
        assert_eq!(multi.value_text(7.0), None);
    }
}
