use rayon::prelude::*;

use crate::error::{AnalysisError, Result};

/// One sub-block of a wave: `sample_depth` absolute-valued points.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sample {
    pub points: Vec<f32>,
}

/// One analysis window: `lowest_heard_frequency` samples.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Wave {
    pub samples: Vec<Sample>,
}

impl Wave {
    fn with_capacity(samples: usize) -> Self {
        Self {
            samples: Vec::with_capacity(samples),
        }
    }
}

/// `waves[w].samples[s].points[p]`
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SegmentedSignal {
    pub waves: Vec<Wave>,
    pub lowest_heard_frequency: usize,
    pub sample_depth: usize,
}

impl SegmentedSignal {
    pub fn point_count(&self) -> usize {
        self.waves
            .iter()
            .flat_map(|w| &w.samples)
            .map(|s| s.points.len())
            .sum()
    }
}

/// A wave collapsed into one sample-major buffer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlattenedWave {
    pub data: Vec<f32>,
}

impl FlattenedWave {
    fn from_wave(wave: &Wave, samples: usize, depth: usize) -> Result<Self> {
        if wave.samples.len() != samples {
            return Err(AnalysisError::ShapeMismatch {
                context: "wave sample count",
                expected: samples,
                actual: wave.samples.len(),
            });
        }
        if let Some(bad) = wave.samples.iter().find(|s| s.points.len() != depth) {
            return Err(AnalysisError::ShapeMismatch {
                context: "sample point count",
                expected: depth,
                actual: bad.points.len(),
            });
        }

        let data = wave
            .samples
            .iter()
            .flat_map(|s| s.points.iter().copied())
            .collect();
        Ok(Self { data })
    }

    /// Inverse of flattening: split back into `samples` rows of `depth` points.
    pub fn reshape(&self, samples: usize, depth: usize) -> Result<Wave> {
        if depth == 0 || self.data.len() != samples * depth {
            return Err(AnalysisError::ShapeMismatch {
                context: "flattened wave length",
                expected: samples * depth,
                actual: self.data.len(),
            });
        }
        Ok(Wave {
            samples: self
                .data
                .chunks_exact(depth)
                .map(|points| Sample {
                    points: points.to_vec(),
                })
                .collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Split the first `total_samples` raw values into whole waves.
///
/// Values past the last complete wave are dropped, never padded.
pub fn segment(
    raw: &[f32],
    total_samples: usize,
    lowest_heard_frequency: usize,
    sample_depth: usize,
) -> Result<SegmentedSignal> {
    if lowest_heard_frequency == 0 || sample_depth == 0 {
        return Err(AnalysisError::InvalidConfig(format!(
            "lowest_heard_frequency ({}) and sample_depth ({}) must be positive",
            lowest_heard_frequency, sample_depth
        )));
    }
    let wave_len = lowest_heard_frequency
        .checked_mul(sample_depth)
        .ok_or_else(|| AnalysisError::InvalidConfig("wave length overflows usize".into()))?;
    if raw.len() < total_samples {
        return Err(AnalysisError::ShapeMismatch {
            context: "raw sample buffer",
            expected: total_samples,
            actual: raw.len(),
        });
    }

    let wave_count = total_samples / wave_len;
    let mut waves = Vec::with_capacity(wave_count);

    if wave_count > 0 {
        let mut wave = Wave::with_capacity(lowest_heard_frequency);
        let mut points = Vec::with_capacity(sample_depth);

        for &value in &raw[..total_samples] {
            points.push(value.abs());
            if points.len() < sample_depth {
                continue;
            }

            let full = std::mem::replace(&mut points, Vec::with_capacity(sample_depth));
            wave.samples.push(Sample { points: full });
            if wave.samples.len() < lowest_heard_frequency {
                continue;
            }

            waves.push(std::mem::replace(
                &mut wave,
                Wave::with_capacity(lowest_heard_frequency),
            ));
            if waves.len() == wave_count {
                break;
            }
        }
    }

    log::debug!(
        "Segmented {} samples into {} waves ({} x {})",
        total_samples,
        waves.len(),
        lowest_heard_frequency,
        sample_depth
    );

    Ok(SegmentedSignal {
        waves,
        lowest_heard_frequency,
        sample_depth,
    })
}

/// Flatten every wave, in order. Waves are independent so this runs on the
/// rayon pool.
pub fn flatten(signal: &SegmentedSignal) -> Result<Vec<FlattenedWave>> {
    signal
        .waves
        .par_iter()
        .map(|wave| {
            FlattenedWave::from_wave(wave, signal.lowest_heard_frequency, signal.sample_depth)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| if i % 2 == 0 { i as f32 } else { -(i as f32) })
            .collect()
    }

    #[test]
    fn wave_count_follows_floor() {
        let raw = ramp(100);
        let seg = segment(&raw, 100, 3, 4).unwrap();
        // 100 / 12 = 8 whole waves
        assert_eq!(seg.waves.len(), 8);
        for wave in &seg.waves {
            assert_eq!(wave.samples.len(), 3);
            assert!(wave.samples.iter().all(|s| s.points.len() == 4));
        }
        assert_eq!(seg.point_count(), 96);
        assert!(seg.point_count() <= 100);
    }

    #[test]
    fn points_are_absolute_and_in_order() {
        let raw = ramp(24);
        let seg = segment(&raw, 24, 2, 3).unwrap();
        assert_eq!(seg.waves.len(), 4);
        assert_eq!(seg.waves[0].samples[0].points, vec![0.0, 1.0, 2.0]);
        assert_eq!(seg.waves[0].samples[1].points, vec![3.0, 4.0, 5.0]);
        assert_eq!(seg.waves[3].samples[1].points, vec![21.0, 22.0, 23.0]);
        let all_positive = seg
            .waves
            .iter()
            .flat_map(|w| &w.samples)
            .flat_map(|s| &s.points)
            .all(|&p| p >= 0.0);
        assert!(all_positive);
    }

    #[test]
    fn trailing_partial_wave_is_dropped() {
        // 2 full waves of 6 plus 5 leftover values
        let raw = vec![-1.0; 17];
        let seg = segment(&raw, 17, 2, 3).unwrap();
        assert_eq!(seg.waves.len(), 2);
        assert_eq!(seg.point_count(), 12);
    }

    #[test]
    fn values_past_total_samples_are_ignored() {
        let raw = vec![1.0; 50];
        let seg = segment(&raw, 12, 2, 3).unwrap();
        assert_eq!(seg.waves.len(), 2);
    }

    #[test]
    fn short_input_yields_no_waves() {
        let seg = segment(&[0.5; 5], 5, 2, 3).unwrap();
        assert!(seg.waves.is_empty());
        assert!(flatten(&seg).unwrap().is_empty());
    }

    #[test]
    fn zero_parameters_are_rejected() {
        assert!(matches!(
            segment(&[1.0; 8], 8, 0, 4),
            Err(AnalysisError::InvalidConfig(_))
        ));
        assert!(matches!(
            segment(&[1.0; 8], 8, 2, 0),
            Err(AnalysisError::InvalidConfig(_))
        ));
    }

    #[test]
    fn raw_shorter_than_declared_total_is_rejected() {
        assert!(matches!(
            segment(&[1.0; 8], 10, 2, 2),
            Err(AnalysisError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn flatten_is_sample_major() {
        let raw = ramp(12);
        let seg = segment(&raw, 12, 2, 3).unwrap();
        let waves = flatten(&seg).unwrap();
        assert_eq!(waves.len(), 2);
        assert_eq!(waves[0].data, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(waves[1].data, vec![6.0, 7.0, 8.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn flatten_then_reshape_is_lossless() {
        let raw = ramp(64);
        let seg = segment(&raw, 64, 4, 4).unwrap();
        let waves = flatten(&seg).unwrap();
        for (flat, original) in waves.iter().zip(&seg.waves) {
            assert_eq!(&flat.reshape(4, 4).unwrap(), original);
        }
    }

    #[test]
    fn flatten_rejects_ragged_wave() {
        let mut seg = segment(&ramp(12), 12, 2, 3).unwrap();
        seg.waves[1].samples[0].points.pop();
        assert!(matches!(
            flatten(&seg),
            Err(AnalysisError::ShapeMismatch {
                expected: 3,
                actual: 2,
                ..
            })
        ));
    }

    #[test]
    fn reshape_rejects_wrong_length() {
        let flat = FlattenedWave {
            data: vec![1.0; 7],
        };
        assert!(flat.reshape(2, 4).is_err());
    }
}
