// Render pass assembly - what the chart widget receives per update
use crate::domain::display::{self, AnnotationPoint, DisplayPoint, MissingDataRegion, SynthesizerState};
use crate::domain::sample::DecodedSample;
use crate::domain::series::SeriesProfile;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderPass {
    pub series_id: String,
    pub points: Vec<DisplayPoint>,
    pub missing_regions: Vec<MissingDataRegion>,
    pub time_shift_points: Vec<AnnotationPoint>,
    pub correction_points: Vec<AnnotationPoint>,
}

impl RenderPass {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
            && self.time_shift_points.is_empty()
            && self.correction_points.is_empty()
    }
}

/// Synthesize display points for `samples` (ascending) in one pass.
pub fn render(
    profile: &SeriesProfile,
    samples: &[DecodedSample],
    state: &mut SynthesizerState,
) -> RenderPass {
    state.begin_pass();
    let mut pass = RenderPass {
        series_id: profile.id.clone(),
        ..RenderPass::default()
    };

    for sample in samples {
        let out = display::synthesize(sample, profile, state);
        pass.points.extend(out.points);
        pass.time_shift_points.extend(out.time_shifted);
        pass.correction_points.extend(out.corrections);
    }

    pass.missing_regions = state.regions.clone();
    pass
}
