use anyhow::Result;

use super::chroma::ChromaExtractor;
use super::features::{
    ChromaVector, FrameParams, KeyCandidate, Mode, SampleBuffer, PITCH_CLASSES, UNKNOWN_KEY,
};
use super::progress::Progress;
use super::vector::{dot, normalize, rotate};
use crate::config::KeyConfig;

pub const MAJOR_PROFILE: [f32; PITCH_CLASSES] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];
pub const MINOR_PROFILE: [f32; PITCH_CLASSES] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

/// Progress is reported once every this many hops.
const PROGRESS_EVERY: usize = 50;

/// Krumhansl-Schmuckler key estimate. Chroma frames are averaged,
/// unit-normalised and cleaned of weak bins before matching against the
/// major and minor profiles at every root.
pub fn estimate_key(
    buffer: SampleBuffer<'_>,
    config: &KeyConfig,
    extractor: &mut dyn ChromaExtractor,
    progress: &dyn Progress,
) -> Result<String> {
    let Some(chroma) = average_chroma(buffer, config, extractor, progress)? else {
        log::debug!("No valid chroma frames");
        return Ok(UNKNOWN_KEY.to_string());
    };
    Ok(key_from_chroma(&chroma, config))
}

/// Mean chroma over every valid frame, or `None` if no frame validated.
pub fn average_chroma(
    buffer: SampleBuffer<'_>,
    config: &KeyConfig,
    extractor: &mut dyn ChromaExtractor,
    progress: &dyn Progress,
) -> Result<Option<[f32; PITCH_CLASSES]>> {
    let params = FrameParams {
        buffer_size: config.frame_size,
        sample_rate: buffer.sample_rate,
    };
    let total = buffer.samples.len().max(1);

    let mut sum = [0.0f32; PITCH_CLASSES];
    let mut valid = 0usize;
    let mut skipped = 0usize;

    for (i, frame) in buffer.frames(config.frame_size, config.hop_size).enumerate() {
        let raw = extractor.extract(frame, params)?;
        match ChromaVector::try_from(raw) {
            Ok(chroma) => {
                for (acc, v) in sum.iter_mut().zip(chroma.bins()) {
                    *acc += v;
                }
                valid += 1;
            }
            Err(e) => {
                log::debug!("Skipping chroma frame {}: {}", i, e);
                skipped += 1;
            }
        }
        if i % PROGRESS_EVERY == 0 {
            let pos = i * config.hop_size;
            progress.report(&format!("Chroma: {:.1}%", pos as f32 / total as f32 * 100.0));
        }
    }

    log::debug!("Chroma frames: {} valid, {} skipped", valid, skipped);
    if valid == 0 {
        return Ok(None);
    }
    for v in &mut sum {
        *v /= valid as f32;
    }
    Ok(Some(sum))
}

/// Label for an averaged chroma vector, applying the confidence floor and the
/// optional runner-up report.
pub fn key_from_chroma(chroma: &[f32; PITCH_CLASSES], config: &KeyConfig) -> String {
    let cleaned = suppress_noise(&normalize(chroma), config.noise_floor);
    let (best, second) = rank_keys(&cleaned);

    log::debug!(
        "Best key {} ({:.3}), runner-up {} ({:.3})",
        best.label(),
        best.score,
        second.label(),
        second.score
    );

    if best.score < config.confidence_floor {
        return UNKNOWN_KEY.to_string();
    }
    if config.report_ambiguity && second.score > config.ambiguity_ratio * best.score {
        return format!("{} (possible: {})", best.label(), second.label());
    }
    best.label()
}

/// Zero every bin below `floor` times the largest bin.
pub fn suppress_noise(chroma: &[f32], floor: f32) -> Vec<f32> {
    let peak = chroma.iter().copied().fold(0.0f32, f32::max);
    let threshold = peak * floor;
    chroma
        .iter()
        .map(|&v| if v < threshold { 0.0 } else { v })
        .collect()
}

/// Best and second-best of the 24 rotated profiles. Earlier candidates win
/// ties, with major checked before minor at each root.
pub fn rank_keys(chroma: &[f32]) -> (KeyCandidate, KeyCandidate) {
    let mut best = KeyCandidate {
        root: 0,
        mode: Mode::Major,
        score: f32::NEG_INFINITY,
    };
    let mut second = best;

    for root in 0..PITCH_CLASSES {
        for (mode, profile) in [(Mode::Major, &MAJOR_PROFILE), (Mode::Minor, &MINOR_PROFILE)] {
            let template = normalize(&rotate(profile, root));
            let candidate = KeyCandidate {
                root,
                mode,
                score: dot(chroma, &template),
            };
            if candidate.score > best.score {
                second = best;
                best = candidate;
            } else if candidate.score > second.score {
                second = candidate;
            }
        }
    }

    (best, second)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::chroma::SpectralChroma;
    use crate::audio::progress::Silent;
    use std::f32::consts::PI;

    const SR: u32 = 44100;

    fn tones(freqs: &[f32], seconds: f32) -> Vec<f32> {
        let len = (seconds * SR as f32) as usize;
        (0..len)
            .map(|i| {
                let t = i as f32 / SR as f32;
                freqs.iter().map(|f| (2.0 * PI * f * t).sin()).sum::<f32>() / freqs.len() as f32
            })
            .collect()
    }

    fn strict() -> KeyConfig {
        KeyConfig {
            report_ambiguity: false,
            ..KeyConfig::default()
        }
    }

    fn run(samples: &[f32], config: &KeyConfig) -> String {
        let mut extractor = SpectralChroma::new();
        estimate_key(SampleBuffer::new(samples, SR), config, &mut extractor, &Silent).unwrap()
    }

    struct Fixed(Vec<f32>);

    impl ChromaExtractor for Fixed {
        fn extract(&mut self, _frame: &[f32], _params: FrameParams) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    impl ChromaExtractor for Broken {
        fn extract(&mut self, _frame: &[f32], _params: FrameParams) -> Result<Vec<f32>> {
            anyhow::bail!("extractor crashed")
        }
    }

    fn triad(root: usize, third: usize, fifth: usize) -> [f32; 12] {
        let mut c = [0.0; 12];
        c[root % 12] = 1.0;
        c[third % 12] = 1.0;
        c[fifth % 12] = 1.0;
        c
    }

    #[test]
    fn c_major_triad_from_audio() {
        // C5, E5, G5
        let samples = tones(&[523.25, 659.26, 783.99], 3.0);
        let key = run(&samples, &KeyConfig::default());
        assert!(key.starts_with("C major"), "got {}", key);
        assert_eq!(run(&samples, &strict()), "C major");
    }

    #[test]
    fn a_minor_triad_from_chroma() {
        assert_eq!(key_from_chroma(&triad(9, 12, 16), &strict()), "A minor");
    }

    #[test]
    fn every_major_triad_maps_to_its_root() {
        for root in 0..12 {
            let key = key_from_chroma(&triad(root, root + 4, root + 7), &strict());
            assert_eq!(key, format!("{} major", crate::audio::features::PITCH_NAMES[root]));
        }
    }

    #[test]
    fn silence_is_unknown() {
        let samples = vec![0.0f32; SR as usize * 2];
        assert_eq!(run(&samples, &KeyConfig::default()), "Unknown");
    }

    #[test]
    fn shorter_than_one_frame_is_unknown() {
        let samples = tones(&[440.0], 0.05);
        assert!(samples.len() < KeyConfig::default().frame_size);
        assert_eq!(run(&samples, &KeyConfig::default()), "Unknown");
    }

    #[test]
    fn idempotent() {
        let samples = tones(&[440.0, 554.37, 659.26], 2.0);
        let first = run(&samples, &KeyConfig::default());
        let second = run(&samples, &KeyConfig::default());
        assert_eq!(first, second);
    }

    #[test]
    fn malformed_frames_are_skipped() {
        let samples = vec![0.1f32; 8192];
        let mut extractor = Fixed(vec![1.0; 7]);
        let key = estimate_key(
            SampleBuffer::new(&samples, SR),
            &KeyConfig::default(),
            &mut extractor,
            &Silent,
        )
        .unwrap();
        assert_eq!(key, "Unknown");
    }

    #[test]
    fn extractor_errors_propagate() {
        let samples = vec![0.1f32; 8192];
        let result = estimate_key(
            SampleBuffer::new(&samples, SR),
            &KeyConfig::default(),
            &mut Broken,
            &Silent,
        );
        assert!(result.is_err());
    }

    #[test]
    fn ambiguity_reports_runner_up() {
        // A pure C major triad scores E minor within 10% of C major.
        let key = key_from_chroma(&triad(0, 4, 7), &KeyConfig::default());
        assert_eq!(key, "C major (possible: E minor)");
    }

    #[test]
    fn confidence_floor_applies() {
        let config = KeyConfig {
            confidence_floor: 0.99,
            ..strict()
        };
        assert_eq!(key_from_chroma(&triad(0, 4, 7), &config), "Unknown");
    }

    #[test]
    fn noise_floor_zeroes_weak_bins() {
        let cleaned = suppress_noise(&[1.0, 0.05, 0.5, 0.099, 0.1], 0.1);
        assert_eq!(cleaned, vec![1.0, 0.0, 0.5, 0.0, 0.1]);
        let untouched = suppress_noise(&[1.0, 0.05], 0.0);
        assert_eq!(untouched, vec![1.0, 0.05]);
    }

    #[test]
    fn rank_keys_orders_best_and_second() {
        let chroma = normalize(&triad(0, 4, 7));
        let (best, second) = rank_keys(&chroma);
        assert_eq!((best.root, best.mode), (0, Mode::Major));
        assert_eq!((second.root, second.mode), (4, Mode::Minor));
        assert!(best.score > second.score);
    }
}
