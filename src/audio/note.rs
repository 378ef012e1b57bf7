use rayon::prelude::*;

use crate::error::{AnalysisError, Result};

use super::features::Note;
use super::segment::FlattenedWave;

/// Reference pitch, A4
const REFERENCE_HZ: f32 = 440.0;
/// Semitone offset applied to the A440-relative pitch
const PITCH_OFFSET: f32 = 9.0;

/// RMS-like loudness of a wave relative to the clip peak.
///
/// The "RMS" is the square root of the plain sum of absolute values, not of
/// squares.
pub fn volume(wave: &[f32], sample_depth: f32, peak: f32) -> f32 {
    let sum: f32 = wave.iter().sum();
    let rms = sum.sqrt() / sample_depth;
    let amplitude = rms / peak;
    let percentage = amplitude * sample_depth * 100.0;
    percentage / 20.0
}

/// Count up-down cycles with a four-state quarter phase counter.
///
/// Returns `(cycles, phase)` where phase is the 0-3 state left over after the
/// last complete cycle.
fn count_cycles(wave: &[f32]) -> (u32, u32) {
    let mut cycles = 0u32;
    let mut phase = 0u32;

    for pair in wave.windows(2) {
        let signal = pair[0].abs();
        let next = pair[1].abs();
        let falling = signal > next;
        let rising = signal < next;

        match phase {
            0 if falling => phase = 1,
            1 if rising => phase = 2,
            2 if falling => phase = 3,
            3 if rising => {
                cycles += 1;
                phase = 0;
            }
            _ => {}
        }
    }

    (cycles, phase)
}

/// Frequency-like value from zero-crossing style cycle counting.
///
/// Silence never advances the counter, so it reports
/// `0.25 / lowest_heard_frequency * 1000` rather than zero.
pub fn frequency(wave: &[f32], lowest_heard_frequency: f32) -> f32 {
    let (cycles, phase) = count_cycles(wave);
    (cycles as f32 + (phase as f32 + 1.0) / 4.0) / lowest_heard_frequency * 1000.0
}

/// Semitone scale referenced to A440. Non-positive input gives NaN or -inf.
pub fn pitch(frequency: f32) -> f32 {
    PITCH_OFFSET + 12.0 * (frequency / REFERENCE_HZ).log2()
}

pub fn build_note(
    wave: &FlattenedWave,
    sample_depth: f32,
    peak: f32,
    lowest_heard_frequency: f32,
) -> Note {
    let frequency = frequency(&wave.data, lowest_heard_frequency);
    Note {
        volume: volume(&wave.data, sample_depth, peak),
        frequency,
        pitch: pitch(frequency),
    }
}

/// Build one note per wave. Each wave is handled on its own, so the work is
/// spread across the rayon pool and every result lands in its own slot.
pub fn extract(
    waves: &[FlattenedWave],
    sample_depth: usize,
    lowest_heard_frequency: usize,
    peak: f32,
) -> Result<Vec<Note>> {
    let expected = sample_depth * lowest_heard_frequency;
    if let Some(bad) = waves.iter().find(|w| w.len() != expected) {
        return Err(AnalysisError::ShapeMismatch {
            context: "flattened wave length",
            expected,
            actual: bad.len(),
        });
    }

    if peak == 0.0 {
        log::warn!("Clip peak is zero; volumes will be NaN");
    }

    Ok(waves
        .par_iter()
        .map(|wave| {
            build_note(
                wave,
                sample_depth as f32,
                peak,
                lowest_heard_frequency as f32,
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(got: f32, expected: f32) {
        assert!((got - expected).abs() < 1e-4, "got {}, expected {}", got, expected);
    }

    fn wave(data: &[f32]) -> FlattenedWave {
        FlattenedWave {
            data: data.to_vec(),
        }
    }

    #[test]
    fn volume_matches_closed_form() {
        let v = 0.5f32;
        let len = 16usize;
        let data = vec![v; len];

        let l = len as f32;
        let rms = (v * l).sqrt() / l;
        let expected = rms / v * l * 100.0 / 20.0;

        assert_close(volume(&data, l, v), expected);
    }

    #[test]
    fn volume_of_silence_is_nan() {
        assert!(volume(&[0.0; 8], 8.0, 0.0).is_nan());
    }

    #[test]
    fn volume_with_zero_peak_is_infinite() {
        assert!(volume(&[0.5; 8], 8.0, 0.0).is_infinite());
    }

    #[test]
    fn counts_one_cycle_and_three_quarters() {
        // peak, trough, peak: one full pattern without the final rise
        let data = [0.0, 1.0, 2.0, 1.0, 0.0, 1.0, 2.0, 1.0, 0.0];
        assert_eq!(count_cycles(&data), (0, 3));
        // (0 + 4/4) / 20 * 1000
        assert_close(frequency(&data, 20.0), 50.0);
    }

    #[test]
    fn counts_completed_cycle() {
        let data = [0.0, 1.0, 2.0, 1.0, 0.0, 1.0, 2.0, 1.0, 0.0, 1.0];
        assert_eq!(count_cycles(&data), (1, 0));
        // (1 + 1/4) / 20 * 1000
        assert_close(frequency(&data, 20.0), 62.5);
    }

    #[test]
    fn counts_repeated_triangle_cycles() {
        let pattern = [2.0, 1.0, 0.0, 1.0];
        let k = 5;
        let data: Vec<f32> = pattern.iter().copied().cycle().take(pattern.len() * k * 2).collect();
        let (cycles, phase) = count_cycles(&data);
        // each pattern contributes two quarters
        assert_eq!(cycles, k as u32);
        assert_eq!(phase, 0);
    }

    #[test]
    fn signed_input_is_folded() {
        let unsigned = [0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
        let signed = [0.0, -1.0, 0.0, 1.0, 0.0, -1.0];
        assert_eq!(count_cycles(&unsigned), count_cycles(&signed));
    }

    #[test]
    fn silence_reports_quarter_cycle() {
        // Known quirk: flat input never advances the phase
        assert_close(frequency(&[0.0; 64], 20.0), 12.5);
        assert_close(frequency(&[0.3; 64], 40.0), 6.25);
    }

    #[test]
    fn monotonic_input_stops_after_first_quarter() {
        let falling: Vec<f32> = (0..32).rev().map(|i| i as f32).collect();
        assert_eq!(count_cycles(&falling), (0, 1));
        let rising: Vec<f32> = (0..32).map(|i| i as f32).collect();
        assert_eq!(count_cycles(&rising), (0, 0));
    }

    #[test]
    fn pitch_identity() {
        assert_eq!(pitch(440.0), 9.0);
        assert_eq!(pitch(880.0), 21.0);
        assert_eq!(pitch(220.0), -3.0);
    }

    #[test]
    fn pitch_of_non_positive_frequency() {
        assert_eq!(pitch(0.0), f32::NEG_INFINITY);
        assert!(pitch(-1.0).is_nan());
    }

    #[test]
    fn build_note_combines_features() {
        let w = wave(&[0.0, 1.0, 0.0, 1.0]);
        let note = build_note(&w, 2.0, 1.0, 2.0);
        assert_eq!(note.frequency, frequency(&w.data, 2.0));
        assert_eq!(note.pitch, pitch(note.frequency));
        assert_eq!(note.volume, volume(&w.data, 2.0, 1.0));
    }

    #[test]
    fn extract_keeps_wave_order() {
        let waves = vec![wave(&[0.0; 4]), wave(&[1.0, 0.0, 1.0, 0.0]), wave(&[0.5; 4])];
        let notes = extract(&waves, 2, 2, 1.0).unwrap();
        assert_eq!(notes.len(), 3);
        for (note, w) in notes.iter().zip(&waves) {
            assert_eq!(*note, build_note(w, 2.0, 1.0, 2.0));
        }
    }

    #[test]
    fn extract_rejects_wrong_length() {
        let waves = vec![wave(&[0.0; 4]), wave(&[0.0; 3])];
        assert!(matches!(
            extract(&waves, 2, 2, 1.0),
            Err(AnalysisError::ShapeMismatch {
                expected: 4,
                actual: 3,
                ..
            })
        ));
    }
}
