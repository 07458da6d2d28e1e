//! Glitch configuration
//!
//! Handles the tunable ranges of the glitch controller and loading/saving
//! them as XML in the user's config directory.

use quick_xml::de::from_str;
use quick_xml::se::to_string;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Convert configured seconds to a `Duration`, rounded to whole microseconds
///
/// Negative or NaN values give zero; values too large for a `Duration`
/// saturate to `Duration::MAX`.
pub fn seconds_to_duration(seconds: f32) -> Duration {
    let micros = (f64::from(seconds) * 1e6).round();
    if micros.is_nan() || micros <= 0.0 {
        Duration::ZERO
    } else if micros >= u64::MAX as f64 {
        Duration::MAX
    } else {
        Duration::from_micros(micros as u64)
    }
}

/// Inclusive `[min, max]` range sampled uniformly
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    #[serde(rename = "min")]
    pub min: f32,
    #[serde(rename = "max")]
    pub max: f32,
}

impl ValueRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// A range containing a single value
    pub const fn fixed(value: f32) -> Self {
        Self { min: value, max: value }
    }

    /// Check if a value lies inside the range (inclusive)
    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }

    /// Draw a value uniformly from the range
    ///
    /// A degenerate or inverted range yields `min`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        if self.min < self.max {
            rng.random_range(self.min..=self.max)
        } else {
            self.min
        }
    }

    fn validate(&self, field: &'static str) -> Result<(), ConfigError> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(ConfigError::NotFinite { field });
        }
        if self.min > self.max {
            return Err(ConfigError::InvertedRange {
                field,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

/// Tunable parameters of the glitch controller
///
/// Stored as `<GlitchConfig>` XML. Missing elements fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "GlitchConfig", default)]
pub struct GlitchConfig {
    /// Probability (0-1) that a check starts a glitch
    #[serde(rename = "chance")]
    pub chance: f32,

    /// Seconds between probability checks
    #[serde(rename = "checkInterval")]
    pub check_interval: f32,

    /// Glitch duration in seconds
    #[serde(rename = "duration")]
    pub duration: ValueRange,

    /// Transparency applied while glitching
    #[serde(rename = "transparency")]
    pub transparency: ValueRange,

    /// Displacement amplitude applied while glitching
    #[serde(rename = "amplitude")]
    pub amplitude: ValueRange,

    /// Displacement speed applied while glitching
    #[serde(rename = "speed")]
    pub speed: ValueRange,

    /// Fixed cutout threshold applied while glitching
    #[serde(rename = "cutoutThreshold")]
    pub cutout_threshold: f32,

    /// Fixed glitch amount applied while glitching
    #[serde(rename = "amount")]
    pub amount: f32,

    /// Seed for reproducible runs; entropy-seeded when absent
    #[serde(rename = "seed", skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for GlitchConfig {
    fn default() -> Self {
        Self {
            chance: 0.1,
            check_interval: 0.1,
            duration: ValueRange::new(0.05, 0.25),
            transparency: ValueRange::new(0.1, 0.25),
            amplitude: ValueRange::new(15.0, 30.0),
            speed: ValueRange::new(20.0, 40.0),
            cutout_threshold: 0.45,
            amount: 1.0,
            seed: None,
        }
    }
}

impl GlitchConfig {
    /// Check every range and interval
    ///
    /// Values outside the documented bounds (e.g. a chance above 1) are
    /// accepted as-is; only inverted, negative or non-finite values fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.chance.is_finite() {
            return Err(ConfigError::NotFinite { field: "chance" });
        }
        if !self.check_interval.is_finite() {
            return Err(ConfigError::NotFinite { field: "checkInterval" });
        }
        if self.check_interval < 0.0 {
            return Err(ConfigError::Negative {
                field: "checkInterval",
                value: self.check_interval,
            });
        }

        self.duration.validate("duration")?;
        if self.duration.min < 0.0 {
            return Err(ConfigError::Negative {
                field: "duration",
                value: self.duration.min,
            });
        }

        self.transparency.validate("transparency")?;
        self.amplitude.validate("amplitude")?;
        self.speed.validate("speed")?;

        if !self.cutout_threshold.is_finite() {
            return Err(ConfigError::NotFinite { field: "cutoutThreshold" });
        }
        if !self.amount.is_finite() {
            return Err(ConfigError::NotFinite { field: "amount" });
        }
        Ok(())
    }

    /// Time between probability checks
    pub fn check_interval_duration(&self) -> Duration {
        seconds_to_duration(self.check_interval)
    }

    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("SurfaceGlitch");
            p.push("glitch.xml");
            p
        })
    }

    /// Parse and validate a config from XML text
    pub fn from_xml(xml: &str) -> Result<Self, SettingsError> {
        let config: Self = from_str(xml).map_err(SettingsError::XmlParse)?;
        config.validate().map_err(SettingsError::Invalid)?;
        Ok(config)
    }

    /// Serialize the config to XML, including the declaration
    pub fn to_xml(&self) -> Result<String, SettingsError> {
        let xml = to_string(self).map_err(SettingsError::XmlWrite)?;
        Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", xml))
    }

    /// Load a config from an XML file
    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path).map_err(SettingsError::Io)?;
        Self::from_xml(&contents)
    }

    /// Save the config to an XML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(SettingsError::Io)?;
            }
        }
        fs::write(path, self.to_xml()?).map_err(SettingsError::Io)?;
        Ok(())
    }

    /// Load from the default location, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match Self::load_from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load glitch config from {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save to the default location
    pub fn save(&self) -> Result<(), SettingsError> {
        let Some(path) = Self::default_path() else {
            return Err(SettingsError::NoConfigDir);
        };
        self.save_to_file(&path)
    }
}

/// Config validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A range has `min > max`
    InvertedRange { field: &'static str, min: f32, max: f32 },
    /// A value is NaN or infinite
    NotFinite { field: &'static str },
    /// A time value is below zero
    Negative { field: &'static str, value: f32 },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvertedRange { field, min, max } => {
                write!(f, "{}: min ({}) is greater than max ({})", field, min, max)
            }
            ConfigError::NotFinite { field } => write!(f, "{}: value is not finite", field),
            ConfigError::Negative { field, value } => write!(f, "{}: {} is negative", field, value),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Settings-related errors
#[derive(Debug)]
pub enum SettingsError {
    Io(std::io::Error),
    XmlParse(quick_xml::DeError),
    XmlWrite(quick_xml::SeError),
    NoConfigDir,
    Invalid(ConfigError),
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::Io(e) => write!(f, "IO error: {}", e),
            SettingsError::XmlParse(e) => write!(f, "XML parse error: {}", e),
            SettingsError::XmlWrite(e) => write!(f, "XML write error: {}", e),
            SettingsError::NoConfigDir => write!(f, "Could not find config directory"),
            SettingsError::Invalid(e) => write!(f, "Invalid config: {}", e),
        }
    }
}

impl std::error::Error for SettingsError {}
