use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::audio::filter::{ChannelFilters, FilterConfig};
use crate::error::AnalysisError;

pub const DEFAULT_SAMPLE_DEPTH: usize = 1024;
pub const DEFAULT_LOWEST_HEARD_FREQUENCY: usize = 20;

/// Spectral window selector. Reserved: the pipeline never applies a window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowFunction {
    #[default]
    Rectangular,
    Triangle,
    Hamming,
    Hanning,
    Blackman,
    BlackmanHarris,
}

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub filters: ChannelFilters,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_sample_depth")]
    pub sample_depth: usize,
    #[serde(default = "default_lowest_heard_frequency")]
    pub lowest_heard_frequency: usize,
    #[serde(default)]
    pub window: WindowFunction,
    /// Per-task timeout in seconds (0 disables)
    #[serde(default)]
    pub timeout: Option<f64>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_depth: default_sample_depth(),
            lowest_heard_frequency: default_lowest_heard_frequency(),
            window: WindowFunction::default(),
            timeout: None,
        }
    }
}

fn default_sample_depth() -> usize { DEFAULT_SAMPLE_DEPTH }
fn default_lowest_heard_frequency() -> usize { DEFAULT_LOWEST_HEARD_FREQUENCY }

impl Config {
    pub fn settings(&self) -> std::result::Result<AnalysisSettings, AnalysisError> {
        let timeout = match self.analysis.timeout {
            Some(secs) => timeout_from_secs(secs)?,
            None => None,
        };
        Ok(AnalysisSettings::new(
            self.analysis.sample_depth,
            self.analysis.lowest_heard_frequency,
        )?
        .with_window(self.analysis.window)
        .with_filters(self.filters)
        .with_timeout(timeout))
    }
}

/// Seconds to a unit timeout. Zero disables the timeout; negative or
/// non-finite values are rejected.
pub fn timeout_from_secs(secs: f64) -> std::result::Result<Option<Duration>, AnalysisError> {
    if secs == 0.0 {
        return Ok(None);
    }
    Duration::try_from_secs_f64(secs)
        .map(Some)
        .map_err(|e| AnalysisError::InvalidConfig(format!("invalid timeout {}: {}", secs, e)))
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse config: {}", path.display()))
}

/// Validated settings for one analysis run.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisSettings {
    sample_depth: usize,
    lowest_heard_frequency: usize,
    window: WindowFunction,
    filters: ChannelFilters,
    timeout: Option<Duration>,
}

impl AnalysisSettings {
    /// Zero values are rejected. Values outside the usual ranges (power-of-two
    /// depth in 128..=2048, hearing floor in 20..=80) are only warned about.
    pub fn new(
        sample_depth: usize,
        lowest_heard_frequency: usize,
    ) -> std::result::Result<Self, AnalysisError> {
        if sample_depth == 0 {
            return Err(AnalysisError::InvalidConfig("sample_depth must be positive".into()));
        }
        if lowest_heard_frequency == 0 {
            return Err(AnalysisError::InvalidConfig(
                "lowest_heard_frequency must be positive".into(),
            ));
        }
        if sample_depth.checked_mul(lowest_heard_frequency).is_none() {
            return Err(AnalysisError::InvalidConfig("wave length overflows usize".into()));
        }

        if !sample_depth.is_power_of_two() || !(128..=2048).contains(&sample_depth) {
            log::warn!(
                "sample_depth {} is outside the usual power-of-two range 128..=2048",
                sample_depth
            );
        }
        if !(20..=80).contains(&lowest_heard_frequency) {
            log::warn!(
                "lowest_heard_frequency {} is outside the usual range 20..=80",
                lowest_heard_frequency
            );
        }

        Ok(Self {
            sample_depth,
            lowest_heard_frequency,
            window: WindowFunction::Rectangular,
            filters: ChannelFilters::default(),
            timeout: None,
        })
    }

    pub fn with_window(mut self, window: WindowFunction) -> Self {
        if window != WindowFunction::Rectangular {
            log::warn!("Window function {:?} is reserved and will not be applied", window);
        }
        self.window = window;
        self
    }

    pub fn with_filters(mut self, filters: ChannelFilters) -> Self {
        for (name, filter) in [
            ("frequency", &filters.frequency),
            ("volume", &filters.volume),
            ("pitch", &filters.pitch),
        ] {
            warn_unusual_split(name, filter);
        }
        self.filters = filters;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn sample_depth(&self) -> usize {
        self.sample_depth
    }

    pub fn lowest_heard_frequency(&self) -> usize {
        self.lowest_heard_frequency
    }

    /// Points per flattened wave.
    pub fn wave_len(&self) -> usize {
        self.sample_depth * self.lowest_heard_frequency
    }

    pub fn window(&self) -> WindowFunction {
        self.window
    }

    pub fn filters(&self) -> &ChannelFilters {
        &self.filters
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            sample_depth: DEFAULT_SAMPLE_DEPTH,
            lowest_heard_frequency: DEFAULT_LOWEST_HEARD_FREQUENCY,
            window: WindowFunction::Rectangular,
            filters: ChannelFilters::default(),
            timeout: None,
        }
    }
}

fn warn_unusual_split(channel: &str, filter: &FilterConfig) {
    if filter.average_split == 1 || filter.average_split > 16 {
        log::warn!(
            "{} average_split {} is outside the usual range (0 or 2..=16)",
            channel,
            filter.average_split
        );
    }
}
