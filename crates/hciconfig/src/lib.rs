use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Settings for one hci run, loaded from TOML and overridden from the CLI.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub display: DisplaySection,
    #[serde(default)]
    pub recording: RecordingSection,
    #[serde(default)]
    pub analysis: AnalysisSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DisplaySection {
    #[serde(deserialize_with = "deserialize_pair")]
    pub offset: (f32, f32),
    #[serde(deserialize_with = "deserialize_pair")]
    pub scale: (f32, f32),
    /// Mirror frames vertically in the window; they are upright by default.
    pub flip: bool,
    #[serde(deserialize_with = "deserialize_pair")]
    pub initial_size: (u32, u32),
    pub title: String,
}

impl Default for DisplaySection {
    fn default() -> Self {
        Self {
            offset: (0.0, 0.0),
            scale: (1.0, 1.0),
            flip: false,
            initial_size: (640, 480),
            title: "hci".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RecordingSection {
    pub file_name: String,
    /// Movie frame rate; the input's own rate is used when unset.
    pub fps: Option<f64>,
    pub codec: String,
    pub queue_depth: usize,
}

impl Default for RecordingSection {
    fn default() -> Self {
        Self {
            file_name: "movie.mov".into(),
            fps: None,
            codec: "libx264".into(),
            queue_depth: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalysisSection {
    /// Weight of the previous output when blending, in `[0, 1)`.
    pub smoothing: f32,
    pub calibration: f32,
    pub crop_scale: f32,
    pub models: ModelSection,
}

impl Default for AnalysisSection {
    fn default() -> Self {
        Self {
            smoothing: 0.0,
            calibration: 0.0,
            crop_scale: 1.0,
            models: ModelSection::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ModelSection {
    pub detector: Option<PathBuf>,
    pub detector_mean: Option<PathBuf>,
    pub regressor: Option<PathBuf>,
    pub eye: Option<PathBuf>,
}

impl ModelSection {
    /// (name, path) for every model slot, in a fixed order.
    pub fn entries(&self) -> [(&'static str, Option<&Path>); 4] {
        [
            ("detector", self.detector.as_deref()),
            ("detector mean", self.detector_mean.as_deref()),
            ("regressor", self.regressor.as_deref()),
            ("eye", self.eye.as_deref()),
        ]
    }

    fn rebase(&mut self, base: &Path) {
        for slot in [
            &mut self.detector,
            &mut self.detector_mean,
            &mut self.regressor,
            &mut self.eye,
        ] {
            if let Some(path) = slot {
                if path.is_relative() {
                    *path = base.join(&*path);
                }
            }
        }
    }
}

/// Values supplied on the command line. `None` keeps the file's value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub offset: Option<(f32, f32)>,
    pub display_scale: Option<(f32, f32)>,
    pub flip: Option<bool>,
    pub smoothing: Option<f32>,
    pub calibration: Option<f32>,
    pub crop_scale: Option<f32>,
    pub fps: Option<f64>,
    pub detector: Option<PathBuf>,
    pub detector_mean: Option<PathBuf>,
    pub regressor: Option<PathBuf>,
    pub eye: Option<PathBuf>,
}

impl SessionConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: SessionConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    /// Reads a config file. Relative model paths are taken relative to the
    /// file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(base) = path.parent() {
            config.analysis.models.rebase(base);
        }
        Ok(config)
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(offset) = overrides.offset {
            self.display.offset = offset;
        }
        if let Some(scale) = overrides.display_scale {
            self.display.scale = scale;
        }
        if let Some(flip) = overrides.flip {
            self.display.flip = flip;
        }
        if let Some(smoothing) = overrides.smoothing {
            self.analysis.smoothing = smoothing;
        }
        if let Some(calibration) = overrides.calibration {
            self.analysis.calibration = calibration;
        }
        if let Some(crop_scale) = overrides.crop_scale {
            self.analysis.crop_scale = crop_scale;
        }
        if let Some(fps) = overrides.fps {
            self.recording.fps = Some(fps);
        }

        let models = &mut self.analysis.models;
        for (slot, value) in [
            (&mut models.detector, &overrides.detector),
            (&mut models.detector_mean, &overrides.detector_mean),
            (&mut models.regressor, &overrides.regressor),
            (&mut models.eye, &overrides.eye),
        ] {
            if let Some(path) = value {
                *slot = Some(path.clone());
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let display = &self.display;
        let (sx, sy) = display.scale;
        if !(sx.is_finite() && sy.is_finite() && sx > 0.0 && sy > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "display.scale must be positive and finite, got {sx}x{sy}"
            )));
        }
        if !(display.offset.0.is_finite() && display.offset.1.is_finite()) {
            return Err(ConfigError::Invalid("display.offset must be finite".into()));
        }
        if display.initial_size.0 == 0 || display.initial_size.1 == 0 {
            return Err(ConfigError::Invalid(
                "display.initial_size must be non-zero".into(),
            ));
        }

        let recording = &self.recording;
        let file_name = recording.file_name.trim();
        if file_name.is_empty() || file_name.contains(['/', '\\']) {
            return Err(ConfigError::Invalid(format!(
                "recording.file_name '{}' must be a plain file name",
                recording.file_name
            )));
        }
        if let Some(fps) = recording.fps {
            if !(fps.is_finite() && fps > 0.0) {
                return Err(ConfigError::Invalid("recording.fps must be > 0".into()));
            }
        }
        if recording.codec.trim().is_empty() {
            return Err(ConfigError::Invalid("recording.codec may not be empty".into()));
        }
        if recording.queue_depth == 0 {
            return Err(ConfigError::Invalid(
                "recording.queue_depth must be at least 1".into(),
            ));
        }

        let analysis = &self.analysis;
        if !(0.0..1.0).contains(&analysis.smoothing) {
            return Err(ConfigError::Invalid(format!(
                "analysis.smoothing must be in [0, 1), got {}",
                analysis.smoothing
            )));
        }
        if !analysis.calibration.is_finite() {
            return Err(ConfigError::Invalid(
                "analysis.calibration must be finite".into(),
            ));
        }
        if !(analysis.crop_scale.is_finite() && analysis.crop_scale > 0.0) {
            return Err(ConfigError::Invalid(
                "analysis.crop_scale must be > 0".into(),
            ));
        }

        Ok(())
    }
}

/// Parses `"<a>x<b>"` (also accepting `,`) into a pair.
pub fn parse_pair<T>(raw: &str) -> Result<(T, T), String>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let normalized = raw.trim().to_ascii_lowercase();
    let (a, b) = normalized
        .split_once('x')
        .or_else(|| normalized.split_once(','))
        .ok_or_else(|| format!("invalid pair '{raw}'; expected <a>x<b>"))?;
    let a = a
        .trim()
        .parse()
        .map_err(|err| format!("invalid value '{a}' in '{raw}': {err}"))?;
    let b = b
        .trim()
        .parse()
        .map_err(|err| format!("invalid value '{b}' in '{raw}': {err}"))?;
    Ok((a, b))
}

fn deserialize_pair<'de, D, T>(deserializer: D) -> Result<(T, T), D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Deserialize<'de>,
    T::Err: fmt::Display,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Helper<T> {
        Str(String),
        Pair([T; 2]),
    }

    match Helper::<T>::deserialize(deserializer)? {
        Helper::Str(raw) => parse_pair(&raw).map_err(de::Error::custom),
        Helper::Pair([a, b]) => Ok((a, b)),
    }
}
