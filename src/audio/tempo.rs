use super::features::SampleBuffer;
use crate::config::TempoConfig;

/// Tempo from the autocorrelation of smoothed short-time energy.
pub fn estimate_bpm(buffer: SampleBuffer<'_>, config: &TempoConfig) -> Option<u32> {
    if buffer.sample_rate == 0 {
        return None;
    }
    let energy = short_time_energy(buffer, config.frame_size, config.hop_size);
    if energy.is_empty() {
        log::debug!("Buffer shorter than one energy frame");
        return None;
    }
    let smoothed = moving_average(&energy, config.smoothing_radius);

    let frames_per_sec = buffer.sample_rate as f32 / config.hop_size as f32;
    let min_lag = ((60.0 / config.max_bpm) * frames_per_sec).round() as usize;
    let max_lag = ((60.0 / config.min_bpm) * frames_per_sec).round() as usize;

    let lag = best_lag(&smoothed, min_lag.max(1), max_lag);
    if lag == 0 {
        log::debug!("No periodicity found in {} energy frames", smoothed.len());
        return None;
    }

    let seconds_per_beat = (lag * config.hop_size) as f32 / buffer.sample_rate as f32;
    let raw_bpm = 60.0 / seconds_per_beat;
    let bpm = octave_correct(raw_bpm, config.octave_low, config.octave_high);
    log::debug!(
        "Best lag {} frames -> {:.2} BPM, corrected {:.2}",
        lag,
        raw_bpm,
        bpm
    );
    Some(bpm.round() as u32)
}

/// Sum of squared samples per frame; trailing partial frames are dropped.
pub fn short_time_energy(buffer: SampleBuffer<'_>, frame_size: usize, hop_size: usize) -> Vec<f32> {
    buffer
        .frames(frame_size, hop_size)
        .map(|frame| frame.iter().map(|s| s * s).sum())
        .collect()
}

/// Centered moving average. Windows near either end shrink to the samples
/// that exist and are averaged over that span only.
pub fn moving_average(values: &[f32], radius: usize) -> Vec<f32> {
    let n = values.len();
    (0..n)
        .map(|i| {
            let start = i.saturating_sub(radius);
            let end = (i + radius + 1).min(n);
            values[start..end].iter().sum::<f32>() / (end - start) as f32
        })
        .collect()
}

/// Lag in `min_lag..=max_lag` with the largest unnormalised autocorrelation.
/// Only a strictly larger value replaces the current best, so ties keep the
/// lowest lag and a sequence with no positive correlation returns 0.
pub fn best_lag(values: &[f32], min_lag: usize, max_lag: usize) -> usize {
    let max_lag = max_lag.min(values.len().saturating_sub(1));
    let mut best = (0usize, 0.0f32);
    for lag in min_lag..=max_lag {
        let corr: f32 = values[..values.len() - lag]
            .iter()
            .zip(&values[lag..])
            .map(|(a, b)| a * b)
            .sum();
        if corr > best.1 {
            best = (lag, corr);
        }
    }
    best.0
}

/// Fold a tempo into range: double while below `low`, halve while above `high`.
pub fn octave_correct(bpm: f32, low: f32, high: f32) -> f32 {
    if !bpm.is_finite() || bpm <= 0.0 {
        return bpm;
    }
    let mut bpm = bpm;
    while bpm < low {
        bpm *= 2.0;
    }
    while bpm > high {
        bpm /= 2.0;
    }
    bpm
}
