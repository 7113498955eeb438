use anyhow::Result;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use super::chroma::hann_window;
use super::features::{SampleBuffer, TempoCandidate};

const FFT_SIZE: usize = 2048;
const HOP_SIZE: usize = 1024;
pub const CHUNK_SIZE: usize = 4096;
const CLUSTER_TOLERANCE: f32 = 0.06;

/// Flux frames either side of a frame that form its local mean.
const ONSET_NEIGHBOURHOOD: usize = 20;
const ONSET_MEAN_GAIN: f32 = 1.5;
const ONSET_FLOOR: f32 = 0.01;
// seconds
const MIN_ONSET_GAP: f32 = 0.1;
const MIN_INTERVAL: f32 = 0.3;
const MAX_INTERVAL: f32 = 1.0;

/// Streaming tempo tracker fed with consecutive sample chunks.
pub trait TempoTracker {
    fn push(&mut self, chunk: &[f32]) -> Result<()>;

    /// Tempo hypotheses, best first. Empty when nothing periodic was heard.
    fn candidates(&self) -> Vec<TempoCandidate>;
}

/// Run a tracker over the whole buffer in fixed chunks and round its top
/// candidate. The tracker's ranking is taken as is.
pub fn track_bpm(buffer: SampleBuffer<'_>, tracker: &mut dyn TempoTracker) -> Result<Option<u32>> {
    for chunk in buffer.samples.chunks(CHUNK_SIZE) {
        tracker.push(chunk)?;
    }
    let candidates = tracker.candidates();
    log::debug!("Tracker produced {} tempo candidates", candidates.len());
    Ok(candidates.first().map(|c| c.tempo.round() as u32))
}

/// Spectral-flux onset tracker: picks onsets against a local-mean threshold
/// and votes for the tempos implied by inter-onset intervals.
pub struct OnsetTracker {
    sample_rate: u32,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    pending: Vec<f32>,
    consumed: usize,
    prev_magnitudes: Vec<f32>,
    flux: Vec<(f32, f32)>, // (time, flux)
}

impl OnsetTracker {
    pub fn new(sample_rate: u32) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        Self {
            sample_rate,
            fft: planner.plan_fft_forward(FFT_SIZE),
            window: hann_window(FFT_SIZE),
            pending: Vec::with_capacity(CHUNK_SIZE + FFT_SIZE),
            consumed: 0,
            prev_magnitudes: vec![0.0; FFT_SIZE / 2],
            flux: Vec::new(),
        }
    }

    fn process_frame(&mut self) {
        let mut buffer: Vec<Complex<f32>> = self.pending[..FFT_SIZE]
            .iter()
            .zip(self.window.iter())
            .map(|(&s, &w)| Complex::new(s * w, 0.0))
            .collect();
        self.fft.process(&mut buffer);

        let magnitudes: Vec<f32> = buffer[..FFT_SIZE / 2].iter().map(|c| c.norm()).collect();
        let flux: f32 = magnitudes
            .iter()
            .zip(self.prev_magnitudes.iter())
            .map(|(cur, prev)| (cur - prev).max(0.0))
            .sum();

        let time = self.consumed as f32 / self.sample_rate as f32;
        self.flux.push((time, flux));
        self.prev_magnitudes = magnitudes;
        self.pending.drain(..HOP_SIZE);
        self.consumed += HOP_SIZE;
    }
}

impl TempoTracker for OnsetTracker {
    fn push(&mut self, chunk: &[f32]) -> Result<()> {
        if self.sample_rate == 0 {
            anyhow::bail!("tracker created with a zero sample rate");
        }
        self.pending.extend_from_slice(chunk);
        while self.pending.len() >= FFT_SIZE {
            self.process_frame();
        }
        Ok(())
    }

    fn candidates(&self) -> Vec<TempoCandidate> {
        let onsets = detect_onsets(&self.flux);
        rank_intervals(&onsets)
    }
}

/// Times of flux peaks that clear `ONSET_MEAN_GAIN` times their local mean
/// and sit at least `MIN_ONSET_GAP` after the previous onset.
pub fn detect_onsets(flux: &[(f32, f32)]) -> Vec<f32> {
    let mut onsets: Vec<f32> = Vec::new();

    for (i, &(time, value)) in flux.iter().enumerate() {
        let lo = i.saturating_sub(ONSET_NEIGHBOURHOOD);
        let hi = (i + ONSET_NEIGHBOURHOOD + 1).min(flux.len());
        let local_mean = flux[lo..hi].iter().map(|&(_, f)| f).sum::<f32>() / (hi - lo) as f32;
        if value <= local_mean * ONSET_MEAN_GAIN + ONSET_FLOOR {
            continue;
        }

        let rising = i == 0 || value >= flux[i - 1].1;
        let falling = flux.get(i + 1).map_or(true, |&(_, next)| value >= next);
        let clear_of_last = onsets.last().map_or(true, |&last| time - last > MIN_ONSET_GAP);
        if rising && falling && clear_of_last {
            onsets.push(time);
        }
    }

    onsets
}

/// Group inter-onset intervals of `MIN_INTERVAL`..=`MAX_INTERVAL` seconds into clusters whose members lie
/// within 6% of the cluster mean. Each cluster becomes one candidate, ranked by
/// how many intervals it holds.
pub fn rank_intervals(onsets: &[f32]) -> Vec<TempoCandidate> {
    let mut intervals: Vec<f32> = onsets
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|i| (MIN_INTERVAL..=MAX_INTERVAL).contains(i))
        .collect();
    intervals.sort_by(f32::total_cmp);

    let mut clusters: Vec<(f32, usize)> = Vec::new(); // (sum, count)
    for interval in intervals {
        match clusters.last_mut() {
            Some((sum, count))
                if (interval - *sum / *count as f32).abs()
                    <= CLUSTER_TOLERANCE * (*sum / *count as f32) =>
            {
                *sum += interval;
                *count += 1;
            }
            _ => clusters.push((interval, 1)),
        }
    }

    let mut candidates: Vec<TempoCandidate> = clusters
        .into_iter()
        .map(|(sum, count)| TempoCandidate {
            tempo: 60.0 / (sum / count as f32),
            count,
        })
        .collect();
    candidates.sort_by(|a, b| b.count.cmp(&a.count));
    candidates
}
