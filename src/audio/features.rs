use std::fmt;
use std::str::FromStr;

use crate::error::{AnalysisError, Result};

use super::segment::{FlattenedWave, SegmentedSignal};

/// Decoded PCM data for one clip, immutable once captured.
#[derive(Clone, Debug)]
pub struct RawSignal {
    /// Interleaved samples, any sign
    samples: Vec<f32>,
    info: ClipInfo,
}

/// Clip metadata carried from the raw signal into the analysis result.
#[derive(Clone, Debug, PartialEq)]
pub struct ClipInfo {
    pub channels: u16,
    pub sample_rate: u32,
    /// Frames per channel
    pub total_samples: usize,
    /// Seconds
    pub duration: f32,
    /// Largest absolute amplitude in the clip
    pub peak: f32,
}

impl RawSignal {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Result<Self> {
        if channels == 0 {
            return Err(AnalysisError::InvalidConfig("channel count must be positive".into()));
        }
        if sample_rate == 0 {
            return Err(AnalysisError::InvalidConfig("sample rate must be positive".into()));
        }

        let total_samples = samples.len() / channels as usize;
        let duration = total_samples as f32 / sample_rate as f32;
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        Ok(Self {
            samples,
            info: ClipInfo {
                channels,
                sample_rate,
                total_samples,
                duration,
                peak,
            },
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn info(&self) -> &ClipInfo {
        &self.info
    }
}

/// Per-wave feature triple.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Note {
    /// RMS-derived loudness, scaled by the clip peak
    pub volume: f32,
    /// Cycles per window from the quarter-phase counter, not true Hz
    pub frequency: f32,
    /// Semitones relative to A440, offset by 9
    pub pitch: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Frequency,
    Volume,
    Pitch,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Frequency, Channel::Volume, Channel::Pitch];

    pub fn name(self) -> &'static str {
        match self {
            Channel::Frequency => "frequency",
            Channel::Volume => "volume",
            Channel::Pitch => "pitch",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "frequency" | "freq" => Ok(Channel::Frequency),
            "volume" | "vol" => Ok(Channel::Volume),
            "pitch" => Ok(Channel::Pitch),
            other => Err(format!("unknown channel '{}'", other)),
        }
    }
}

/// Filtered per-window output, one sequence per feature.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeatureChannels {
    pub frequencies: Vec<f32>,
    pub volumes: Vec<f32>,
    pub pitches: Vec<f32>,
}

impl FeatureChannels {
    pub fn get(&self, channel: Channel) -> &[f32] {
        match channel {
            Channel::Frequency => &self.frequencies,
            Channel::Volume => &self.volumes,
            Channel::Pitch => &self.pitches,
        }
    }

    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }
}

/// Mean and extremes of one channel. NaN values are skipped for min/max but
/// poison the mean, matching plain float arithmetic. An all-NaN channel has
/// NaN extremes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChannelSummary {
    pub mean: f32,
    pub min: f32,
    pub max: f32,
}

impl ChannelSummary {
    pub fn of(values: &[f32]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mean = values.iter().sum::<f32>() / values.len() as f32;
        let comparable = || values.iter().copied().filter(|v| !v.is_nan());
        let min = comparable().reduce(f32::min).unwrap_or(f32::NAN);
        let max = comparable().reduce(f32::max).unwrap_or(f32::NAN);
        Some(Self { mean, min, max })
    }
}

/// Everything one analysis run produced.
#[derive(Clone, Debug)]
pub struct AnalysisResult {
    pub clip: String,
    pub info: ClipInfo,
    pub channels: FeatureChannels,
    /// Intermediates kept for inspection
    pub segmented: SegmentedSignal,
    pub waves: Vec<FlattenedWave>,
    pub notes: Vec<Note>,
}

impl AnalysisResult {
    pub fn window_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, channel: Channel) -> &[f32] {
        self.channels.get(channel)
    }

    pub fn summary(&self, channel: Channel) -> Option<ChannelSummary> {
        ChannelSummary::of(self.channel(channel))
    }

    /// Start time of a window in seconds.
    pub fn window_time(&self, index: usize) -> f32 {
        let count = self.window_count();
        if count == 0 {
            return 0.0;
        }
        index as f32 * self.info.duration / count as f32
    }

    /// Window covering a playback position, clamped to the last window.
    pub fn window_at(&self, time: f32) -> Option<usize> {
        let count = self.window_count();
        if count == 0 || self.info.duration <= 0.0 {
            return None;
        }
        let progress = (time / self.info.duration).clamp(0.0, 1.0);
        let index = (progress * count as f32).floor() as usize;
        Some(index.min(count - 1))
    }
}
