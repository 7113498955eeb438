use anyhow::Result;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use super::features::{FrameParams, PITCH_CLASSES};

const MIN_HZ: f32 = 55.0;
const MAX_HZ: f32 = 5000.0;
const A4_HZ: f32 = 440.0;

/// Turns one frame of samples into a 12-bin pitch-class energy vector.
///
/// Implementations may return a vector of the wrong shape; callers validate
/// through [`super::features::ChromaVector`] and skip frames that fail.
/// Returning `Err` means the extractor itself broke.
pub trait ChromaExtractor {
    fn extract(&mut self, frame: &[f32], params: FrameParams) -> Result<Vec<f32>>;
}

/// FFT chroma: Hann window, magnitude spectrum, each bin folded onto the
/// nearest equal-tempered pitch class, scaled so the loudest class is 1.
pub struct SpectralChroma {
    planner: FftPlanner<f32>,
    plan: Option<(usize, Arc<dyn Fft<f32>>)>,
    window: Vec<f32>,
}

impl SpectralChroma {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
            plan: None,
            window: Vec::new(),
        }
    }

    fn fft_for(&mut self, size: usize) -> Arc<dyn Fft<f32>> {
        if let Some((n, fft)) = &self.plan {
            if *n == size {
                return Arc::clone(fft);
            }
        }
        let fft = self.planner.plan_fft_forward(size);
        self.plan = Some((size, Arc::clone(&fft)));
        self.window = hann_window(size);
        fft
    }
}

impl Default for SpectralChroma {
    fn default() -> Self {
        Self::new()
    }
}

impl ChromaExtractor for SpectralChroma {
    fn extract(&mut self, frame: &[f32], params: FrameParams) -> Result<Vec<f32>> {
        if frame.len() != params.buffer_size {
            anyhow::bail!(
                "frame has {} samples, expected buffer size {}",
                frame.len(),
                params.buffer_size
            );
        }
        if params.sample_rate == 0 || params.buffer_size < 2 {
            anyhow::bail!("invalid frame parameters: {:?}", params);
        }

        let size = params.buffer_size;
        let fft = self.fft_for(size);

        let mut buffer: Vec<Complex<f32>> = frame
            .iter()
            .zip(self.window.iter())
            .map(|(&s, &w)| Complex::new(s * w, 0.0))
            .collect();
        fft.process(&mut buffer);

        let freq_resolution = params.sample_rate as f32 / size as f32;
        let mut chroma = vec![0.0f32; PITCH_CLASSES];
        for (bin, c) in buffer[..size / 2].iter().enumerate().skip(1) {
            let freq = bin as f32 * freq_resolution;
            if freq < MIN_HZ || freq > MAX_HZ {
                continue;
            }
            chroma[pitch_class(freq)] += c.norm();
        }

        let peak = chroma.iter().copied().fold(0.0f32, f32::max);
        if peak > 0.0 {
            for v in &mut chroma {
                *v /= peak;
            }
        }
        Ok(chroma)
    }
}

/// Nearest equal-tempered pitch class (C = 0) for a frequency.
pub fn pitch_class(freq: f32) -> usize {
    let midi = 69.0 + 12.0 * (freq / A4_HZ).log2();
    (midi.round() as i64).rem_euclid(PITCH_CLASSES as i64) as usize
}

pub fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    fn argmax(v: &[f32]) -> usize {
        v.iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap()
    }

    #[test]
    fn pitch_class_of_reference_tones() {
        assert_eq!(pitch_class(440.0), 9);
        assert_eq!(pitch_class(261.63), 0);
        assert_eq!(pitch_class(523.25), 0);
        assert_eq!(pitch_class(392.0), 7);
        assert_eq!(pitch_class(110.0), 9);
    }

    #[test]
    fn a440_peaks_on_a() {
        let params = FrameParams {
            buffer_size: 4096,
            sample_rate: 44100,
        };
        let frame = sine(440.0, 44100, 4096);
        let chroma = SpectralChroma::new().extract(&frame, params).unwrap();
        assert_eq!(chroma.len(), 12);
        assert_eq!(argmax(&chroma), 9);
        assert!((chroma[9] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn silence_gives_zero_chroma() {
        let params = FrameParams {
            buffer_size: 1024,
            sample_rate: 44100,
        };
        let chroma = SpectralChroma::new()
            .extract(&vec![0.0; 1024], params)
            .unwrap();
        assert_eq!(chroma, vec![0.0; 12]);
    }

    #[test]
    fn frame_size_mismatch_is_an_error() {
        let params = FrameParams {
            buffer_size: 4096,
            sample_rate: 44100,
        };
        assert!(SpectralChroma::new().extract(&[0.0; 100], params).is_err());
    }

    #[test]
    fn replans_when_size_changes() {
        let mut extractor = SpectralChroma::new();
        for size in [1024usize, 2048, 1024] {
            let params = FrameParams {
                buffer_size: size,
                sample_rate: 22050,
            };
            let chroma = extractor.extract(&sine(440.0, 22050, size), params).unwrap();
            assert_eq!(argmax(&chroma), 9);
        }
    }
}
