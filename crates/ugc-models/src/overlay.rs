//! Product overlay request, placement and timing types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Default visible window for the overlay clip, in seconds.
pub const DEFAULT_OVERLAY_DURATION: f64 = 5.0;
/// Default overlay size relative to the main video width.
pub const DEFAULT_RELATIVE_SIZE: f64 = 0.4;
/// Default margin from the frame edges, as a percentage of the main video size.
pub const DEFAULT_MARGIN_PERCENT: f64 = 5.0;

/// Nine-cell placement grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverlayPlacement {
    TopLeft,
    TopCenter,
    TopRight,
    MiddleLeft,
    #[default]
    MiddleCenter,
    MiddleRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

/// Horizontal cell of a placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HorizontalAnchor {
    Left,
    Center,
    Right,
}

/// Vertical cell of a placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalAnchor {
    Top,
    Middle,
    Bottom,
}

impl OverlayPlacement {
    pub const ALL: &'static [OverlayPlacement] = &[
        OverlayPlacement::TopLeft,
        OverlayPlacement::TopCenter,
        OverlayPlacement::TopRight,
        OverlayPlacement::MiddleLeft,
        OverlayPlacement::MiddleCenter,
        OverlayPlacement::MiddleRight,
        OverlayPlacement::BottomLeft,
        OverlayPlacement::BottomCenter,
        OverlayPlacement::BottomRight,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OverlayPlacement::TopLeft => "top_left",
            OverlayPlacement::TopCenter => "top_center",
            OverlayPlacement::TopRight => "top_right",
            OverlayPlacement::MiddleLeft => "middle_left",
            OverlayPlacement::MiddleCenter => "middle_center",
            OverlayPlacement::MiddleRight => "middle_right",
            OverlayPlacement::BottomLeft => "bottom_left",
            OverlayPlacement::BottomCenter => "bottom_center",
            OverlayPlacement::BottomRight => "bottom_right",
        }
    }

    pub fn anchors(&self) -> (VerticalAnchor, HorizontalAnchor) {
        use HorizontalAnchor::*;
        use VerticalAnchor::*;
        match self {
            OverlayPlacement::TopLeft => (Top, Left),
            OverlayPlacement::TopCenter => (Top, Center),
            OverlayPlacement::TopRight => (Top, Right),
            OverlayPlacement::MiddleLeft => (Middle, Left),
            OverlayPlacement::MiddleCenter => (Middle, Center),
            OverlayPlacement::MiddleRight => (Middle, Right),
            OverlayPlacement::BottomLeft => (Bottom, Left),
            OverlayPlacement::BottomCenter => (Bottom, Center),
            OverlayPlacement::BottomRight => (Bottom, Right),
        }
    }
}

impl fmt::Display for OverlayPlacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OverlayPlacement {
    type Err = PlacementParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "top_left" => Ok(OverlayPlacement::TopLeft),
            "top_center" | "top" => Ok(OverlayPlacement::TopCenter),
            "top_right" => Ok(OverlayPlacement::TopRight),
            "middle_left" | "left" => Ok(OverlayPlacement::MiddleLeft),
            "middle_center" | "center" | "middle" => Ok(OverlayPlacement::MiddleCenter),
            "middle_right" | "right" => Ok(OverlayPlacement::MiddleRight),
            "bottom_left" => Ok(OverlayPlacement::BottomLeft),
            "bottom_center" | "bottom" => Ok(OverlayPlacement::BottomCenter),
            "bottom_right" => Ok(OverlayPlacement::BottomRight),
            _ => Err(PlacementParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown overlay placement: {0}")]
pub struct PlacementParseError(String);

/// One configured placement choice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlacementPreference {
    #[serde(default)]
    pub placement: OverlayPlacement,
    /// Overlay width as a fraction of the main video width; `>= 1.0` means full screen
    #[serde(default = "default_relative_size")]
    pub relative_size: f64,
}

impl Default for PlacementPreference {
    fn default() -> Self {
        Self {
            placement: OverlayPlacement::default(),
            relative_size: DEFAULT_RELATIVE_SIZE,
        }
    }
}

fn default_relative_size() -> f64 {
    DEFAULT_RELATIVE_SIZE
}
fn default_duration() -> f64 {
    DEFAULT_OVERLAY_DURATION
}
fn default_margin() -> f64 {
    DEFAULT_MARGIN_PERCENT
}

/// Built-in per-language fallback terms added to the trigger keywords.
pub fn default_language_synonyms() -> BTreeMap<String, Vec<String>> {
    let mut map = BTreeMap::new();
    map.insert("spanish".to_string(), vec!["compra".to_string()]);
    map
}

/// Synonyms for `language`. Both the language and the map keys compare
/// trimmed and case-insensitively.
pub fn synonyms_for<'a>(synonyms: &'a BTreeMap<String, Vec<String>>, language: &str) -> &'a [String] {
    let language = language.trim().to_lowercase();
    synonyms
        .iter()
        .find(|(key, _)| key.trim().to_lowercase() == language)
        .map(|(_, terms)| terms.as_slice())
        .unwrap_or(&[])
}

/// Product clip overlay requested for a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OverlayRequest {
    /// Product clip to composite on top of the main video
    pub clip_path: PathBuf,

    /// Words whose first spoken occurrence starts the overlay
    pub trigger_keywords: Vec<String>,

    /// How long the overlay stays visible, in seconds
    #[serde(default = "default_duration")]
    pub desired_duration: f64,

    /// Placement choices; only the first entry is used
    #[serde(default)]
    pub placements: Vec<PlacementPreference>,

    /// Edge margin as a percentage of the main video dimensions
    #[serde(default = "default_margin")]
    pub margin_percent: f64,

    /// Script language (e.g. "english", "spanish")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Extra keywords per language
    #[serde(default = "default_language_synonyms")]
    pub language_synonyms: BTreeMap<String, Vec<String>>,
}

impl OverlayRequest {
    pub fn new(clip_path: impl Into<PathBuf>, trigger_keywords: Vec<String>) -> Self {
        Self {
            clip_path: clip_path.into(),
            trigger_keywords,
            desired_duration: DEFAULT_OVERLAY_DURATION,
            placements: Vec::new(),
            margin_percent: DEFAULT_MARGIN_PERCENT,
            language: None,
            language_synonyms: default_language_synonyms(),
        }
    }

    /// The placement actually used: first configured entry, else the default.
    pub fn effective_placement(&self) -> PlacementPreference {
        self.placements.first().copied().unwrap_or_default()
    }

    /// Synonyms configured for the request language, if any.
    pub fn synonyms_for_language(&self) -> &[String] {
        self.language
            .as_deref()
            .map(|lang| synonyms_for(&self.language_synonyms, lang))
            .unwrap_or(&[])
    }
}

/// Pixel rectangle of the overlay on the main video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OverlayGeometry {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl OverlayGeometry {
    pub fn fits_within(&self, main_width: u32, main_height: u32) -> bool {
        self.x + self.width <= main_width && self.y + self.height <= main_height
    }
}

/// Visible window of the overlay, anchored on the first keyword hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KeywordTiming {
    /// Keyword as spoken (punctuation stripped, lower-cased)
    pub keyword: String,
    pub start: f64,
    pub end: f64,
}

impl KeywordTiming {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placement_parse_aliases() {
        assert_eq!(
            "bottom-right".parse::<OverlayPlacement>().unwrap(),
            OverlayPlacement::BottomRight
        );
        assert_eq!(
            "center".parse::<OverlayPlacement>().unwrap(),
            OverlayPlacement::MiddleCenter
        );
        assert!("corner".parse::<OverlayPlacement>().is_err());
    }

    #[test]
    fn test_effective_placement_uses_first_entry() {
        let mut request = OverlayRequest::new("product.mp4", vec!["buy".into()]);
        assert_eq!(request.effective_placement(), PlacementPreference::default());

        request.placements = vec![
            PlacementPreference {
                placement: OverlayPlacement::TopLeft,
                relative_size: 0.3,
            },
            PlacementPreference {
                placement: OverlayPlacement::BottomRight,
                relative_size: 0.6,
            },
        ];
        let chosen = request.effective_placement();
        assert_eq!(chosen.placement, OverlayPlacement::TopLeft);
        assert!((chosen.relative_size - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn test_language_synonyms() {
        let mut request = OverlayRequest::new("product.mp4", vec!["buy".into()]);
        assert!(request.synonyms_for_language().is_empty());

        request.language = Some("Spanish".to_string());
        assert_eq!(request.synonyms_for_language(), &["compra".to_string()]);
    }

    #[test]
    fn test_synonym_keys_match_any_case() {
        let mut request = OverlayRequest::new("clip.mp4", vec!["buy".into()]);
        request.language_synonyms.clear();
        request
            .language_synonyms
            .insert("Spanish".to_string(), vec!["compra".to_string()]);
        request.language = Some("spanish".to_string());
        assert_eq!(request.synonyms_for_language(), &["compra".to_string()]);
        request.language = Some(" SPANISH ".to_string());
        assert_eq!(request.synonyms_for_language(), &["compra".to_string()]);
    }

    #[test]
    fn test_request_defaults_from_json() {
        let json = r#"{"clip_path": "p.mp4", "trigger_keywords": ["buy"]}"#;
        let request: OverlayRequest = serde_json::from_str(json).unwrap();
        assert!((request.desired_duration - 5.0).abs() < f64::EPSILON);
        assert!((request.margin_percent - 5.0).abs() < f64::EPSILON);
        assert!(request.language_synonyms.contains_key("spanish"));
    }
}
