//! Randomization intensity presets.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How aggressively fingerprint-breaking transforms are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Intensity {
    /// No randomization; the source is copied through untouched
    None,
    /// Subtle transforms
    Low,
    /// Balanced transforms
    #[default]
    Medium,
    /// Aggressive transforms
    High,
}

impl Intensity {
    pub const ALL: &'static [Intensity] = &[
        Intensity::None,
        Intensity::Low,
        Intensity::Medium,
        Intensity::High,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intensity::None => "none",
            Intensity::Low => "low",
            Intensity::Medium => "medium",
            Intensity::High => "high",
        }
    }

    /// Parse a label, falling back to [`Intensity::Medium`] for anything unknown.
    ///
    /// The second value reports whether the label was recognized so callers can
    /// log the fallback.
    pub fn from_label(label: &str) -> (Self, bool) {
        match label.trim().parse::<Intensity>() {
            Ok(intensity) => (intensity, true),
            Err(_) => (Intensity::Medium, false),
        }
    }

    /// Whether this preset disables every randomization stage.
    pub fn is_passthrough(&self) -> bool {
        matches!(self, Intensity::None)
    }
}

impl fmt::Display for Intensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Intensity {
    type Err = IntensityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Intensity::None),
            "low" => Ok(Intensity::Low),
            "medium" => Ok(Intensity::Medium),
            "high" => Ok(Intensity::High),
            _ => Err(IntensityParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown randomization intensity: {0}")]
pub struct IntensityParseError(String);
