use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub const PITCH_CLASSES: usize = 12;

pub const PITCH_NAMES: [&str; PITCH_CLASSES] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

pub const UNKNOWN_KEY: &str = "Unknown";

/// One channel of decoded audio. Borrowed, never mutated by the estimators.
#[derive(Clone, Copy, Debug)]
pub struct SampleBuffer<'a> {
    pub samples: &'a [f32],
    pub sample_rate: u32,
}

impl<'a> SampleBuffer<'a> {
    pub fn new(samples: &'a [f32], sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Overlapping fixed-size frames. A frame that would run past the end is
    /// dropped rather than zero-padded.
    pub fn frames(&self, frame_size: usize, hop_size: usize) -> impl Iterator<Item = &'a [f32]> {
        let samples = self.samples;
        let count = frame_count(samples.len(), frame_size, hop_size);
        (0..count).map(move |i| &samples[i * hop_size..i * hop_size + frame_size])
    }

    pub fn duration(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

pub fn frame_count(len: usize, frame_size: usize, hop_size: usize) -> usize {
    if frame_size == 0 || hop_size == 0 || len < frame_size {
        return 0;
    }
    (len - frame_size) / hop_size + 1
}

/// Parameters handed to a chroma extractor alongside each frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameParams {
    pub buffer_size: usize,
    pub sample_rate: u32,
}

#[derive(Debug, Error, PartialEq)]
pub enum ChromaError {
    #[error("expected 12 chroma bins, got {0}")]
    BinCount(usize),
    #[error("chroma bin {0} is not a finite non-negative value")]
    InvalidBin(usize),
}

/// Pitch-class energy for one frame, C through B.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChromaVector([f32; PITCH_CLASSES]);

impl ChromaVector {
    pub fn bins(&self) -> &[f32; PITCH_CLASSES] {
        &self.0
    }
}

impl TryFrom<Vec<f32>> for ChromaVector {
    type Error = ChromaError;

    fn try_from(raw: Vec<f32>) -> Result<Self, Self::Error> {
        let bins: [f32; PITCH_CLASSES] = raw
            .as_slice()
            .try_into()
            .map_err(|_| ChromaError::BinCount(raw.len()))?;
        if let Some(idx) = bins.iter().position(|v| !v.is_finite() || *v < 0.0) {
            return Err(ChromaError::InvalidBin(idx));
        }
        Ok(Self(bins))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Major,
    Minor,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Major => write!(f, "major"),
            Mode::Minor => write!(f, "minor"),
        }
    }
}

/// A scored (root, mode) pair from profile matching.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KeyCandidate {
    pub root: usize,
    pub mode: Mode,
    pub score: f32,
}

impl KeyCandidate {
    pub fn label(&self) -> String {
        format!("{} {}", PITCH_NAMES[self.root % PITCH_CLASSES], self.mode)
    }
}

/// A tempo hypothesis reported by a tempo tracker, best first.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TempoCandidate {
    pub tempo: f32,
    pub count: usize,
}

/// Merged output of one analysis call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    pub bpm: Option<u32>,
    pub key: String,
}

impl AnalysisResult {
    pub fn unknown() -> Self {
        Self {
            bpm: None,
            key: UNKNOWN_KEY.to_string(),
        }
    }
}

impl fmt::Display for AnalysisResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bpm {
            Some(bpm) => write!(f, "{} BPM, {}", bpm, self.key),
            None => write!(f, "Unknown BPM, {}", self.key),
        }
    }
}
