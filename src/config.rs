use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub key: KeyConfig,
    #[serde(default)]
    pub tempo: TempoConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeyConfig {
    #[serde(default = "default_key_frame")]
    pub frame_size: usize,
    #[serde(default = "default_key_hop")]
    pub hop_size: usize,
    /// Scores below this yield "Unknown".
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f32,
    /// Bins below this fraction of the peak are zeroed. 0 disables.
    #[serde(default = "default_noise_floor")]
    pub noise_floor: f32,
    #[serde(default = "default_report_ambiguity")]
    pub report_ambiguity: bool,
    #[serde(default = "default_ambiguity_ratio")]
    pub ambiguity_ratio: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TempoMethod {
    Autocorrelation,
    OnsetTracker,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TempoConfig {
    #[serde(default = "default_tempo_method")]
    pub method: TempoMethod,
    #[serde(default = "default_tempo_frame")]
    pub frame_size: usize,
    #[serde(default = "default_tempo_hop")]
    pub hop_size: usize,
    #[serde(default = "default_smoothing_radius")]
    pub smoothing_radius: usize,
    #[serde(default = "default_min_bpm")]
    pub min_bpm: f32,
    #[serde(default = "default_max_bpm")]
    pub max_bpm: f32,
    #[serde(default = "default_octave_low")]
    pub octave_low: f32,
    #[serde(default = "default_octave_high")]
    pub octave_high: f32,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub json: bool,
    #[serde(default)]
    pub timing: bool,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            frame_size: default_key_frame(),
            hop_size: default_key_hop(),
            confidence_floor: default_confidence_floor(),
            noise_floor: default_noise_floor(),
            report_ambiguity: default_report_ambiguity(),
            ambiguity_ratio: default_ambiguity_ratio(),
        }
    }
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            method: default_tempo_method(),
            frame_size: default_tempo_frame(),
            hop_size: default_tempo_hop(),
            smoothing_radius: default_smoothing_radius(),
            min_bpm: default_min_bpm(),
            max_bpm: default_max_bpm(),
            octave_low: default_octave_low(),
            octave_high: default_octave_high(),
        }
    }
}

fn default_key_frame() -> usize { 4096 }
fn default_key_hop() -> usize { 2048 }
fn default_confidence_floor() -> f32 { 0.15 }
fn default_noise_floor() -> f32 { 0.10 }
fn default_report_ambiguity() -> bool { true }
fn default_ambiguity_ratio() -> f32 { 0.90 }
fn default_tempo_method() -> TempoMethod { TempoMethod::Autocorrelation }
fn default_tempo_frame() -> usize { 1024 }
fn default_tempo_hop() -> usize { 512 }
fn default_smoothing_radius() -> usize { 5 }
fn default_min_bpm() -> f32 { 60.0 }
fn default_max_bpm() -> f32 { 180.0 }
fn default_octave_low() -> f32 { 70.0 }
fn default_octave_high() -> f32 { 180.0 }

impl Config {
    /// Reject settings the estimators cannot run with.
    pub fn validate(&self) -> Result<()> {
        let k = &self.key;
        if k.frame_size < 2 || k.hop_size == 0 || k.hop_size >= k.frame_size {
            anyhow::bail!(
                "key frames must overlap: need 0 < hop_size < frame_size, got hop {} frame {}",
                k.hop_size,
                k.frame_size
            );
        }
        if !(0.0..1.0).contains(&k.noise_floor) {
            anyhow::bail!("key noise_floor must be in [0, 1), got {}", k.noise_floor);
        }
        if !(0.0..=1.0).contains(&k.confidence_floor) {
            anyhow::bail!("key confidence_floor must be in [0, 1], got {}", k.confidence_floor);
        }
        if !(0.0..=1.0).contains(&k.ambiguity_ratio) {
            anyhow::bail!("key ambiguity_ratio must be in [0, 1], got {}", k.ambiguity_ratio);
        }

        let t = &self.tempo;
        if t.hop_size == 0 || t.hop_size >= t.frame_size {
            anyhow::bail!(
                "tempo frames must overlap: need 0 < hop_size < frame_size, got hop {} frame {}",
                t.hop_size,
                t.frame_size
            );
        }
        if !(t.min_bpm > 0.0 && t.min_bpm < t.max_bpm) {
            anyhow::bail!(
                "tempo range must satisfy 0 < min_bpm < max_bpm, got {}..{}",
                t.min_bpm,
                t.max_bpm
            );
        }
        if !(t.octave_low > 0.0 && t.octave_low * 2.0 <= t.octave_high) {
            anyhow::bail!(
                "octave bounds need 0 < octave_low and octave_low * 2 <= octave_high, got {}..{}",
                t.octave_low,
                t.octave_high
            );
        }
        Ok(())
    }
}

/// Explicit path first, then ./keybpm.toml, then the user config dirs.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("keybpm.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("keybpm").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("keybpm").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Option<Config> {
    match toml::from_str(content) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            log::debug!("Config parse error: {}", e);
            None
        }
    }
}
