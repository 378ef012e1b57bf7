use serde::Deserialize;

use super::features::{FeatureChannels, Note};

/// Post-processing for one feature channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
pub struct FilterConfig {
    /// Block size for averaging, 0 disables
    #[serde(default)]
    pub average_split: usize,
    /// Target maximum after range fitting, <= 0 disables
    #[serde(default)]
    pub range: f32,
}

impl FilterConfig {
    pub fn is_passthrough(&self) -> bool {
        self.average_split == 0 && self.range <= 0.0
    }
}

/// Independent filter settings per channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
pub struct ChannelFilters {
    #[serde(default)]
    pub frequency: FilterConfig,
    #[serde(default)]
    pub volume: FilterConfig,
    #[serde(default)]
    pub pitch: FilterConfig,
}

/// Average then range-fit.
pub fn apply(values: &[f32], config: &FilterConfig) -> Vec<f32> {
    let mut out = values.to_vec();
    if config.average_split > 0 {
        average_blocks(&mut out, config.average_split);
    }
    if config.range > 0.0 {
        fit_range(&mut out, config.range);
    }
    out
}

/// Replace each completed block of `split` values with its mean. A trailing
/// block shorter than `split` keeps its original values.
fn average_blocks(values: &mut [f32], split: usize) {
    let mut offset = 0;
    let mut sum = 0.0f32;

    for i in 0..values.len() {
        sum += values[i];
        let counter = i + 1;

        if counter == offset + split {
            let mean = sum / split as f32;
            values[offset..counter].fill(mean);
            sum = 0.0;
            offset = counter;
        }
    }
}

/// Rescale so the largest value becomes `range`. A zero maximum divides by
/// zero and the resulting NaN/inf is left in place.
fn fit_range(values: &mut [f32], range: f32) {
    if values.is_empty() {
        return;
    }
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    for v in values.iter_mut() {
        *v = *v / max * range;
    }
}

/// Copy each feature out of the notes and filter it with its own settings.
pub fn apply_channels(notes: &[Note], filters: &ChannelFilters) -> FeatureChannels {
    let frequencies: Vec<f32> = notes.iter().map(|n| n.frequency).collect();
    let volumes: Vec<f32> = notes.iter().map(|n| n.volume).collect();
    let pitches: Vec<f32> = notes.iter().map(|n| n.pitch).collect();

    FeatureChannels {
        frequencies: apply(&frequencies, &filters.frequency),
        volumes: apply(&volumes, &filters.volume),
        pitches: apply(&pitches, &filters.pitch),
    }
}
