use anyhow::Result;
use beatscan::Channel;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "beatscan", about = "Per-window volume, frequency and pitch analysis of audio clips")]
pub struct Cli {
    /// Input audio files (WAV, MP3, FLAC, OGG)
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Config file (defaults to ./beatscan.toml or the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Points per sample sub-block (power of two, 128-2048)
    #[arg(long, default_value_t = 1024)]
    pub sample_depth: usize,

    /// Sample sub-blocks per wave (20-80)
    #[arg(long, default_value_t = 20)]
    pub lowest_heard_frequency: usize,

    /// Channels to print (comma-separated: frequency, volume, pitch, or all)
    #[arg(long = "channel", value_delimiter = ',', default_value = "all")]
    pub channels: Vec<String>,

    /// Averaging block size for every channel (0 disables). Overrides the config file.
    #[arg(long, default_value_t = 0)]
    pub average_split: usize,

    /// Range-fit maximum for every channel (0 disables). Overrides the config file.
    #[arg(long, default_value_t = 0.0)]
    pub range: f32,

    /// Per-task timeout in seconds (0 disables)
    #[arg(long)]
    pub timeout: Option<f64>,

    /// Keep channels interleaved instead of downmixing to mono
    #[arg(long)]
    pub keep_channels: bool,

    /// Maximum table rows per clip (0 prints every window)
    #[arg(long, default_value_t = 0)]
    pub rows: usize,
}

impl Cli {
    pub fn selected_channels(&self) -> Result<Vec<Channel>> {
        if self.channels.iter().any(|c| c == "all") {
            return Ok(Channel::ALL.to_vec());
        }
        let mut selected = Vec::new();
        for name in &self.channels {
            let channel: Channel = name.parse().map_err(anyhow::Error::msg)?;
            if !selected.contains(&channel) {
                selected.push(channel);
            }
        }
        Ok(selected)
    }
}
