// Display-point synthesis: one decoded sample in, chart points out
use super::quality::QualityFlag;
use super::sample::DecodedSample;
use super::series::SeriesProfile;
use serde::Serialize;

/// A chart point. `value == None` is a line break.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayPoint {
    pub timestamp: i64,
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<QualityFlag>,
}

impl DisplayPoint {
    pub fn gap(timestamp: i64) -> Self {
        Self {
            timestamp,
            value: None,
            label: None,
            flags: Vec::new(),
        }
    }

    pub fn is_gap(&self) -> bool {
        self.value.is_none()
    }
}

/// Side annotation: true value of a time-shifted sample, or a manual correction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationPoint {
    pub timestamp: i64,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub flag: QualityFlag,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingDataRegion {
    pub start: i64,
    pub end: Option<i64>,
}

impl MissingDataRegion {
    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }
}

/// Per-series state threaded through synthesis.
#[derive(Debug, Clone, Default)]
pub struct SynthesizerState {
    pub last_good_value: Option<f64>,
    pub regions: Vec<MissingDataRegion>,
}

impl SynthesizerState {
    /// Start a new render pass. Closed regions are dropped; an open one carries
    /// over so a later sample can close it.
    pub fn begin_pass(&mut self) {
        self.regions.retain(MissingDataRegion::is_open);
        self.regions.truncate(1);
    }

    fn open_region(&mut self, at: i64) {
        if self.regions.last().is_some_and(MissingDataRegion::is_open) {
            return;
        }
        self.regions.push(MissingDataRegion { start: at, end: None });
    }

    fn close_region(&mut self, at: i64) {
        if let Some(region) = self.regions.last_mut() {
            if region.is_open() {
                region.end = Some(at);
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Synthesized {
    pub points: Vec<DisplayPoint>,
    pub time_shifted: Vec<AnnotationPoint>,
    pub corrections: Vec<AnnotationPoint>,
}

struct GapRule {
    break_before: bool,
    break_after: bool,
    show_value: bool,
    annotate: bool,
}

fn gap_rule(sample: &DecodedSample) -> GapRule {
    let quality = &sample.quality;
    if quality.has(QualityFlag::NoValueTimeShifted) {
        GapRule { break_before: false, break_after: false, show_value: true, annotate: false }
    } else if quality.has(QualityFlag::NoValueLogInterrupted) {
        GapRule { break_before: false, break_after: false, show_value: false, annotate: true }
    } else if quality.has(QualityFlag::NoValueDriverFailed) {
        GapRule { break_before: false, break_after: true, show_value: true, annotate: true }
    } else {
        GapRule { break_before: true, break_after: true, show_value: false, annotate: false }
    }
}

pub fn synthesize(
    sample: &DecodedSample,
    profile: &SeriesProfile,
    state: &mut SynthesizerState,
) -> Synthesized {
    let mut out = Synthesized::default();
    let t = sample.timestamp();
    let value = sample.value();
    let quality = &sample.quality;
    let flags = quality.surfaced();

    if let Some(flag) = quality.manual_correction() {
        out.corrections.push(AnnotationPoint {
            timestamp: t,
            value,
            label: profile.value_text(value),
            flag,
        });
    }

    if quality.has(QualityFlag::TimeShifted) {
        out.time_shifted.push(AnnotationPoint {
            timestamp: t,
            value,
            label: profile.value_text(value),
            flag: QualityFlag::TimeShifted,
        });
        if let Some(last_good) = state.last_good_value {
            out.points.push(DisplayPoint {
                timestamp: t,
                value: Some(last_good),
                label: profile.value_text(last_good),
                flags,
            });
        }
        return out;
    }

    if !quality.has_no_value() {
        let annotate = flags.iter().any(|f| f.always_annotate());
        out.points.push(DisplayPoint {
            timestamp: t,
            value: Some(value),
            label: profile.value_text(value),
            flags,
        });
        state.last_good_value = Some(value);
        if annotate {
            state.open_region(t);
        } else {
            state.close_region(t);
        }
        return out;
    }

    let rule = gap_rule(sample);
    if rule.break_before {
        out.points.push(DisplayPoint::gap(t));
    }
    if rule.show_value && value.is_finite() {
        out.points.push(DisplayPoint {
            timestamp: t,
            value: Some(value),
            label: profile.value_text(value),
            flags: flags.clone(),
        });
    }
    if rule.break_after {
        out.points.push(DisplayPoint::gap(t));
    }
    if rule.annotate || flags.iter().any(|f| f.always_annotate()) {
        state.open_region(t);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::quality::*;
    use crate::domain::sample::Sample;
    use crate::domain::series::ValueKind;

    fn decoded(t: i64, v: f64, mask: u64) -> DecodedSample {
        Sample::new(t, v, mask.to_string(), mask == 0).decode().unwrap()
    }

    #[test]
    fn test_good_sample_emits_point_and_updates_last_good() {
        let profile = SeriesProfile::analog("s");
        let mut state = SynthesizerState::default();
        let out = synthesize(&decoded(10, 4.5, 0), &profile, &mut state);
        assert_eq!(
            out.points,
            vec![DisplayPoint { timestamp: 10, value: Some(4.5), label: None, flags: vec![] }]
        );
        assert_eq!(state.last_good_value, Some(4.5));
        assert!(state.regions.is_empty());
    }

    #[test]
    fn test_alarm_opens_region_and_good_sample_closes_it() {
        let profile = SeriesProfile::analog("s");
        let mut state = SynthesizerState::default();

        let out = synthesize(&decoded(10, 1.0, IN_ALARM), &profile, &mut state);
        assert_eq!(out.points[0].flags, vec![QualityFlag::InAlarm]);
        assert_eq!(state.regions, vec![MissingDataRegion { start: 10, end: None }]);

        // a second alarm keeps the same region open
        synthesize(&decoded(15, 1.0, IN_ALARM), &profile, &mut state);
        assert_eq!(state.regions.len(), 1);

        synthesize(&decoded(20, 2.0, 0), &profile, &mut state);
        assert_eq!(state.regions, vec![MissingDataRegion { start: 10, end: Some(20) }]);

        // already closed: nothing to close
        synthesize(&decoded(30, 2.0, 0), &profile, &mut state);
        assert_eq!(state.regions, vec![MissingDataRegion { start: 10, end: Some(20) }]);
    }

    #[test]
    fn test_time_shifted_shows_last_good_value() {
        let profile = SeriesProfile::analog("s");
        let mut state = SynthesizerState { last_good_value: Some(3.0), regions: vec![] };
        let out = synthesize(&decoded(10, 99.0, TIME_SHIFTED), &profile, &mut state);
        assert_eq!(out.points[0].value, Some(3.0));
        assert_eq!(out.time_shifted[0].value, 99.0);
        assert_eq!(state.last_good_value, Some(3.0));
        assert!(state.regions.is_empty());

        let mut empty = SynthesizerState::default();
        let out = synthesize(&decoded(10, 99.0, TIME_SHIFTED), &profile, &mut empty);
        assert!(out.points.is_empty());
        assert_eq!(out.time_shifted.len(), 1);
    }

    #[test]
    fn test_benign_gap_breaks_both_sides() {
        let profile = SeriesProfile::analog("s");
        let mut state = SynthesizerState::default();
        let out = synthesize(&decoded(10, 5.0, NO_VALUE_BUFFER_PURGED), &profile, &mut state);
        assert_eq!(out.points, vec![DisplayPoint::gap(10), DisplayPoint::gap(10)]);
        assert!(state.regions.is_empty());
        assert_eq!(state.last_good_value, None);
    }

    #[test]
    fn test_gap_rules() {
        let profile = SeriesProfile::analog("s");

        let mut state = SynthesizerState::default();
        let out = synthesize(&decoded(10, 5.0, NO_VALUE_TIME_SHIFTED), &profile, &mut state);
        assert_eq!(out.points.len(), 1);
        assert_eq!(out.points[0].value, Some(5.0));

        let mut state = SynthesizerState::default();
        let out = synthesize(&decoded(10, 5.0, NO_VALUE_LOG_INTERRUPTED), &profile, &mut state);
        assert!(out.points.is_empty());
        assert_eq!(state.regions, vec![MissingDataRegion { start: 10, end: None }]);

        let mut state = SynthesizerState::default();
        let out = synthesize(&decoded(10, 5.0, NO_VALUE_DRIVER_FAILED), &profile, &mut state);
        assert_eq!(out.points.len(), 2);
        assert_eq!(out.points[0].value, Some(5.0));
        assert!(out.points[1].is_gap());
        assert_eq!(state.regions.len(), 1);
    }

    #[test]
    fn test_manual_correction_with_enumerated_text() {
        let profile = SeriesProfile::analog("s").with_texts(ValueKind::MultiState, &[(2, "Eco")]);
        let mut state = SynthesizerState::default();
        let out = synthesize(&decoded(10, 2.0, MANUAL_CORRECTION_MODIFY), &profile, &mut state);
        assert_eq!(out.corrections.len(), 1);
        assert_eq!(out.corrections[0].flag, QualityFlag::ManualCorrectionModify);
        assert_eq!(out.corrections[0].label.as_deref(), Some("Eco"));
        assert_eq!(out.points[0].label.as_deref(), Some("Eco"));
    }

    #[test]
    fn test_begin_pass_keeps_only_open_region() {
        let mut state = SynthesizerState {
            last_good_value: Some(1.0),
            regions: vec![
                MissingDataRegion { start: 0, end: Some(5) },
                MissingDataRegion { start: 8, end: None },
            ],
        };
        state.begin_pass();
        assert_eq!(state.regions, vec![MissingDataRegion { start: 8, end: None }]);
        assert_eq!(state.last_good_value, Some(1.0));
    }
}
