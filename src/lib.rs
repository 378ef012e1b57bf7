//! Offline per-window audio feature extraction.
//!
//! A clip is split into fixed-size waves, each wave is reduced to a note
//! (volume, zero-crossing frequency, pitch) and the resulting channels are
//! optionally averaged and range-fitted. See [`audio::analysis::Analyser`].

pub mod audio;
pub mod config;
pub mod error;
pub mod scheduler;

pub use audio::analysis::{AnalysisHandle, Analyser};
pub use audio::features::{AnalysisResult, Channel, Note, RawSignal};
pub use config::AnalysisSettings;
pub use error::{AnalysisError, Result};
