use anyhow::{Context, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::features::RawSignal;

/// Decoded clip as handed to the analyser.
pub struct AudioData {
    pub name: String,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioData {
    pub fn into_signal(self) -> Result<RawSignal> {
        RawSignal::new(self.samples, self.channels, self.sample_rate)
            .with_context(|| format!("Invalid audio data in '{}'", self.name))
    }
}

/// Decode a file. With `downmix` the channels are averaged into one,
/// otherwise samples stay interleaved.
pub fn decode_audio(path: &Path, downmix: bool) -> Result<AudioData> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .context("Failed to probe audio format")?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .context("No audio tracks found")?;

    let track_id = track.id;
    let channels = track.codec_params.channels.map_or(1, |c| c.count());
    let sample_rate = track.codec_params.sample_rate.context("Unknown sample rate")?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create audio decoder")?;

    let mut all_samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames();

        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        let samples = sample_buf.samples();

        if channels == 1 || !downmix {
            all_samples.extend_from_slice(samples);
        } else {
            all_samples.extend(downmix_frames(samples, channels));
        }
    }

    let out_channels = if downmix { 1 } else { channels.max(1) };
    let frames = all_samples.len() / out_channels;

    log::info!(
        "Decoded audio: {} frames, {}Hz, {} channel(s), {:.1}s",
        frames,
        sample_rate,
        out_channels,
        frames as f32 / sample_rate as f32
    );

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("clip")
        .to_string();

    Ok(AudioData {
        name,
        samples: all_samples,
        sample_rate,
        channels: u16::try_from(out_channels).context("Too many audio channels")?,
    })
}

fn downmix_frames(samples: &[f32], channels: usize) -> impl Iterator<Item = f32> + '_ {
    samples
        .chunks(channels)
        .map(move |frame| frame.iter().sum::<f32>() / channels as f32)
}
