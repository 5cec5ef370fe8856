use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::colors::DEFAULT_FILL_ALPHA;
use crate::error::AnnotateError;
use crate::parse::FallbackPolicy;

/// Largest accepted label text height, in pixels.
pub const MAX_LABEL_SCALE: f32 = 512.0;

/// Largest accepted chip padding and label gap, in pixels.
pub const MAX_LABEL_SPACING: u32 = 256;

/// Settings for an [`crate::Annotator`].
///
/// Every field has a default, so a partial JSON document such as
/// `{"fallback_policy": "placeholder"}` is a complete configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotatorConfig {
    /// Descriptors substituted when the upstream response is unusable.
    pub fallback_policy: FallbackPolicy,

    /// TrueType/OpenType font for labels. The built-in bitmap font is used
    /// when unset or unloadable.
    pub font_path: Option<PathBuf>,

    /// Opacity of the region fill, out of 255.
    pub fill_alpha: u8,

    /// Vertical gap between a label chip's text and its region, in pixels.
    pub label_gap: u32,

    /// Chip padding on each side of the label text, in pixels.
    pub label_padding: u32,

    /// Label text height in pixels. When unset it follows the image size:
    /// `max(12, min(width, height) / 40)`.
    pub label_scale: Option<f32>,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        AnnotatorConfig {
            fallback_policy: FallbackPolicy::default(),
            font_path: None,
            fill_alpha: DEFAULT_FILL_ALPHA,
            label_gap: 5,
            label_padding: 2,
            label_scale: None,
        }
    }
}

impl AnnotatorConfig {
    pub fn from_json_str(json: &str) -> Result<Self, AnnotateError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| AnnotateError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AnnotateError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| AnnotateError::ConfigError(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Checks that label sizes are positive and within
    /// [`MAX_LABEL_SCALE`] and [`MAX_LABEL_SPACING`].
    pub fn validate(&self) -> Result<(), AnnotateError> {
        if let Some(scale) = self.label_scale
            && !(scale.is_finite() && scale > 0.0 && scale <= MAX_LABEL_SCALE)
        {
            return Err(AnnotateError::ConfigError(format!(
                "label_scale must be in (0, {MAX_LABEL_SCALE}], got {scale}"
            )));
        }
        for (name, value) in [
            ("label_padding", self.label_padding),
            ("label_gap", self.label_gap),
        ] {
            if value > MAX_LABEL_SPACING {
                return Err(AnnotateError::ConfigError(format!(
                    "{name} must be at most {MAX_LABEL_SPACING}, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Pulls out-of-range label settings back into range. An unusable
    /// `label_scale` is dropped in favour of the size-derived default.
    pub(crate) fn clamped(mut self) -> Self {
        self.label_scale = self
            .label_scale
            .filter(|scale| scale.is_finite() && *scale > 0.0)
            .map(|scale| scale.min(MAX_LABEL_SCALE));
        self.label_padding = self.label_padding.min(MAX_LABEL_SPACING);
        self.label_gap = self.label_gap.min(MAX_LABEL_SPACING);
        self
    }

    pub fn fallback_policy(mut self, policy: FallbackPolicy) -> Self {
        self.fallback_policy = policy;
        self
    }

    pub fn font_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_path = Some(path.into());
        self
    }

    pub fn fill_alpha(mut self, alpha: u8) -> Self {
        self.fill_alpha = alpha;
        self
    }

    pub fn label_gap(mut self, gap: u32) -> Self {
        self.label_gap = gap;
        self
    }

    pub fn label_padding(mut self, padding: u32) -> Self {
        self.label_padding = padding;
        self
    }

    pub fn label_scale(mut self, scale: f32) -> Self {
        self.label_scale = Some(scale);
        self
    }

    /// Label text height for an image of the given size.
    pub(crate) fn label_scale_for(&self, width: u32, height: u32) -> f32 {
        match self.label_scale {
            Some(scale) if scale.is_finite() && scale > 0.0 => scale.min(MAX_LABEL_SCALE),
            _ => ((width.min(height) / 40).max(12) as f32).min(MAX_LABEL_SCALE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = AnnotatorConfig::default();
        assert_eq!(config.fallback_policy, FallbackPolicy::Empty);
        assert_eq!(config.fill_alpha, 50);
        assert_eq!(config.label_gap, 5);
        assert_eq!(config.label_padding, 2);
        assert_eq!(config.label_scale_for(200, 100), 12.0);
        assert_eq!(config.label_scale_for(2000, 1200), 30.0);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            AnnotatorConfig::from_json_str(r#"{"fallback_policy":"placeholder","fill_alpha":80}"#)
                .unwrap();
        assert_eq!(config.fallback_policy, FallbackPolicy::Placeholder);
        assert_eq!(config.fill_alpha, 80);
        assert_eq!(config.label_gap, 5);
        assert!(config.font_path.is_none());
    }

    #[test]
    fn rejects_bad_json_and_bad_scale() {
        assert!(AnnotatorConfig::from_json_str("{").is_err());
        assert!(AnnotatorConfig::from_json_str(r#"{"fallback_policy":"demo"}"#).is_err());
        assert!(AnnotatorConfig::from_json_str(r#"{"label_scale":-4}"#).is_err());
    }

    #[test]
    fn rejects_oversized_labels() {
        assert!(AnnotatorConfig::from_json_str(r#"{"label_scale":100000}"#).is_err());
        assert!(AnnotatorConfig::from_json_str(r#"{"label_scale":1e9}"#).is_err());
        assert!(AnnotatorConfig::from_json_str(r#"{"label_padding":4000000000}"#).is_err());
        assert!(AnnotatorConfig::from_json_str(r#"{"label_gap":257}"#).is_err());
        assert!(AnnotatorConfig::from_json_str(r#"{"label_scale":512,"label_gap":256}"#).is_ok());
    }

    #[test]
    fn clamped_pulls_settings_into_range() {
        let config = AnnotatorConfig::default()
            .label_scale(1e9)
            .label_padding(u32::MAX)
            .label_gap(1000)
            .clamped();
        assert!(config.validate().is_ok());
        assert_eq!(config.label_scale, Some(MAX_LABEL_SCALE));
        assert_eq!(config.label_padding, MAX_LABEL_SPACING);

        let config = AnnotatorConfig::default().label_scale(f32::NAN).clamped();
        assert_eq!(config.label_scale, None);
        assert_eq!(config.label_scale_for(200, 100), 12.0);
    }

    #[test]
    fn builder_overrides() {
        let config = AnnotatorConfig::default()
            .fallback_policy(FallbackPolicy::Placeholder)
            .label_scale(20.0)
            .label_gap(8)
            .font_path("/fonts/label.ttf");
        assert_eq!(config.label_scale_for(4000, 4000), 20.0);
        assert_eq!(config.label_gap, 8);
        assert_eq!(config.font_path.as_deref(), Some(Path::new("/fonts/label.ttf")));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"label_padding": 3}}"#).unwrap();
        let config = AnnotatorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.label_padding, 3);

        let missing = AnnotatorConfig::from_file("/nonexistent/annotator.json");
        assert!(matches!(missing, Err(AnnotateError::ConfigError(_))));
    }
}
