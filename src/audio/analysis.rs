use anyhow::Result;
use std::path::Path;

use super::chroma::{ChromaExtractor, SpectralChroma};
use super::decode::{decode_audio, decode_bytes, DecodedAudio};
use super::features::{AnalysisResult, SampleBuffer, UNKNOWN_KEY};
use super::fetch::{fetch_audio, is_url, url_extension};
use super::key::estimate_key;
use super::progress::Progress;
use super::tempo::estimate_bpm;
use super::tracker::{track_bpm, OnsetTracker};
use crate::config::{Config, TempoMethod};

/// Analyse a local path or an http(s) URL.
pub fn analyze_input(input: &str, config: &Config, progress: &dyn Progress) -> Result<AnalysisResult> {
    if is_url(input) {
        progress.report("Fetching audio...");
        let bytes = fetch_audio(input)?;
        analyze_bytes(bytes, url_extension(input), config, progress)
    } else {
        analyze_file(Path::new(input), config, progress)
    }
}

pub fn analyze_file(path: &Path, config: &Config, progress: &dyn Progress) -> Result<AnalysisResult> {
    progress.report("Decoding audio...");
    let audio = decode_audio(path)?;
    Ok(analyze_decoded(&audio, config, progress))
}

/// Analyse an encoded payload held in memory.
pub fn analyze_bytes(
    bytes: Vec<u8>,
    extension: Option<&str>,
    config: &Config,
    progress: &dyn Progress,
) -> Result<AnalysisResult> {
    progress.report("Decoding audio...");
    let audio = decode_bytes(bytes, extension)?;
    Ok(analyze_decoded(&audio, config, progress))
}

pub fn analyze_decoded(audio: &DecodedAudio, config: &Config, progress: &dyn Progress) -> AnalysisResult {
    let mut extractor = SpectralChroma::new();
    analyze_channels(&audio.channels, audio.sample_rate, config, &mut extractor, progress)
}

/// Run both estimators on channel 0 and merge the results. Either estimator
/// failing falls back to its own default without affecting the other.
pub fn analyze_channels(
    channels: &[Vec<f32>],
    sample_rate: u32,
    config: &Config,
    extractor: &mut dyn ChromaExtractor,
    progress: &dyn Progress,
) -> AnalysisResult {
    let samples = match channels.first() {
        Some(c) if !c.is_empty() && sample_rate > 0 => c.as_slice(),
        _ => {
            log::warn!("No channel data to analyse");
            return AnalysisResult::unknown();
        }
    };
    let buffer = SampleBuffer::new(samples, sample_rate);
    log::debug!(
        "Analysing channel 0: {} samples at {} Hz ({:.1}s)",
        samples.len(),
        sample_rate,
        buffer.duration()
    );

    progress.report("Extracting chroma features...");
    let key = match estimate_key(buffer, &config.key, extractor, progress) {
        Ok(key) => key,
        Err(e) => {
            log::warn!("Key estimation failed: {:#}", e);
            UNKNOWN_KEY.to_string()
        }
    };

    progress.report("Estimating BPM...");
    let bpm = match config.tempo.method {
        TempoMethod::Autocorrelation => estimate_bpm(buffer, &config.tempo),
        TempoMethod::OnsetTracker => {
            let mut tracker = OnsetTracker::new(sample_rate);
            match track_bpm(buffer, &mut tracker) {
                Ok(bpm) => bpm,
                Err(e) => {
                    log::warn!("Tempo tracking failed: {:#}", e);
                    None
                }
            }
        }
    };

    let result = AnalysisResult { bpm, key };
    log::info!("Analysis: {}", result);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::features::FrameParams;
    use crate::audio::progress::Silent;
    use std::cell::RefCell;

    const SR: u32 = 32768;

    fn clicks(seconds: f32) -> Vec<f32> {
        let len = (seconds * SR as f32) as usize;
        let mut samples = vec![0.0f32; len];
        for start in (0..len).step_by(SR as usize / 2) {
            for s in samples.iter_mut().skip(start).take(64) {
                *s = 1.0;
            }
        }
        samples
    }

    struct Broken;

    impl ChromaExtractor for Broken {
        fn extract(&mut self, _frame: &[f32], _params: FrameParams) -> Result<Vec<f32>> {
            anyhow::bail!("extractor crashed")
        }
    }

    #[test]
    fn no_channels_is_unknown() {
        let result = analyze_channels(&[], 44100, &Config::default(), &mut Broken, &Silent);
        assert_eq!(result, AnalysisResult::unknown());
    }

    #[test]
    fn empty_first_channel_is_unknown() {
        let channels = vec![Vec::new(), vec![0.5; 10000]];
        let result = analyze_channels(&channels, 44100, &Config::default(), &mut Broken, &Silent);
        assert_eq!(result, AnalysisResult::unknown());
    }

    #[test]
    fn silence_is_unknown_everywhere() {
        let audio = DecodedAudio {
            channels: vec![vec![0.0; 44100 * 3]],
            sample_rate: 44100,
        };
        let result = analyze_decoded(&audio, &Config::default(), &Silent);
        assert_eq!(result, AnalysisResult::unknown());
    }

    #[test]
    fn broken_extractor_keeps_tempo() {
        let channels = vec![clicks(10.0)];
        let result = analyze_channels(&channels, SR, &Config::default(), &mut Broken, &Silent);
        assert_eq!(result.key, "Unknown");
        assert_eq!(result.bpm, Some(120));
    }

    #[test]
    fn only_first_channel_is_used() {
        let channels = vec![vec![0.0; SR as usize * 10], clicks(10.0)];
        let mut extractor = SpectralChroma::new();
        let result = analyze_channels(&channels, SR, &Config::default(), &mut extractor, &Silent);
        assert_eq!(result.bpm, None);
    }

    #[test]
    fn onset_tracker_route() {
        let mut config = Config::default();
        config.tempo.method = TempoMethod::OnsetTracker;
        let channels = vec![clicks(12.0)];
        let mut extractor = SpectralChroma::new();
        let result = analyze_channels(&channels, SR, &config, &mut extractor, &Silent);
        let bpm = result.bpm.expect("tracker finds the clicks");
        assert!((bpm as i32 - 120).abs() <= 2, "got {}", bpm);
    }

    #[test]
    fn progress_sees_milestones() {
        let seen = RefCell::new(Vec::new());
        let sink = |m: &str| seen.borrow_mut().push(m.to_string());
        let channels = vec![clicks(4.0)];
        let mut extractor = SpectralChroma::new();
        analyze_channels(&channels, SR, &Config::default(), &mut extractor, &sink);

        let seen = seen.into_inner();
        assert_eq!(seen.first().map(String::as_str), Some("Extracting chroma features..."));
        assert_eq!(seen.last().map(String::as_str), Some("Estimating BPM..."));
        assert!(seen.iter().any(|m| m == "Chroma: 0.0%"));
    }

    #[test]
    fn repeated_runs_match() {
        let channels = vec![clicks(6.0)];
        let first = analyze_channels(
            &channels,
            SR,
            &Config::default(),
            &mut SpectralChroma::new(),
            &Silent,
        );
        let second = analyze_channels(
            &channels,
            SR,
            &Config::default(),
            &mut SpectralChroma::new(),
            &Silent,
        );
        assert_eq!(first, second);
    }
}
