//! Abnormality descriptors as recovered from an upstream detector.

use std::fmt;
use std::ops::Deref;

use serde::Serialize;

/// Description used when the upstream element carries none.
pub const DEFAULT_DESCRIPTION: &str = "Unspecified abnormality";

/// Qualitative severity of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

impl Severity {
    /// Maps a free-text severity to a variant, case-insensitively.
    ///
    /// Anything unrecognised (`"Critical"`, `""`, `"moderate"`) becomes
    /// [`Severity::Medium`].
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" => Severity::Low,
            "high" => Severity::High,
            _ => Severity::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Center-based bounding region, every field a percentage of the image size.
///
/// Values are kept exactly as the detector produced them, even when they
/// fall outside `[0, 100]`; clamping happens in [`crate::rect::to_pixel_rect`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Region {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for Region {
    fn default() -> Self {
        Region {
            x: 50.0,
            y: 50.0,
            width: 10.0,
            height: 10.0,
        }
    }
}

/// One detected region of interest.
///
/// Fields are private so a descriptor cannot change once it has been built
/// from upstream data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbnormalityDescriptor {
    description: String,
    region: Region,
    severity: Severity,
    confidence: u8,
}

impl AbnormalityDescriptor {
    /// Builds a descriptor, substituting the placeholder for a blank
    /// description and clamping `confidence` to `0..=100`.
    pub fn new(
        description: impl Into<String>,
        region: Region,
        severity: Severity,
        confidence: u8,
    ) -> Self {
        let description = description.into();
        let description = if description.trim().is_empty() {
            DEFAULT_DESCRIPTION.to_string()
        } else {
            description
        };

        AbnormalityDescriptor {
            description,
            region,
            severity,
            confidence: confidence.min(100),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Confidence as an integer percentage in `0..=100`.
    pub fn confidence(&self) -> u8 {
        self.confidence
    }

    /// Label text for the `index`-th (1-based) descriptor, e.g. `"2. High (85%)"`.
    pub fn label(&self, index: usize) -> String {
        format!("{}. {} ({}%)", index, self.severity, self.confidence)
    }
}

/// Ordered descriptors for one image. Order drives label numbering and
/// paint order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DescriptorSet(Vec<AbnormalityDescriptor>);

impl DescriptorSet {
    pub fn new(descriptors: Vec<AbnormalityDescriptor>) -> Self {
        DescriptorSet(descriptors)
    }

    pub fn empty() -> Self {
        DescriptorSet(Vec::new())
    }

    pub fn into_inner(self) -> Vec<AbnormalityDescriptor> {
        self.0
    }
}

impl Deref for DescriptorSet {
    type Target = [AbnormalityDescriptor];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromIterator<AbnormalityDescriptor> for DescriptorSet {
    fn from_iter<I: IntoIterator<Item = AbnormalityDescriptor>>(iter: I) -> Self {
        DescriptorSet(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a DescriptorSet {
    type Item = &'a AbnormalityDescriptor;
    type IntoIter = std::slice::Iter<'a, AbnormalityDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_labels_fold_case_and_default_to_medium() {
        assert_eq!(Severity::from_label("low"), Severity::Low);
        assert_eq!(Severity::from_label(" HIGH "), Severity::High);
        assert_eq!(Severity::from_label("Medium"), Severity::Medium);
        assert_eq!(Severity::from_label("Critical"), Severity::Medium);
        assert_eq!(Severity::from_label(""), Severity::Medium);
    }

    #[test]
    fn blank_description_gets_placeholder() {
        let d = AbnormalityDescriptor::new("   ", Region::default(), Severity::Low, 10);
        assert_eq!(d.description(), DEFAULT_DESCRIPTION);
    }

    #[test]
    fn confidence_is_clamped() {
        let d = AbnormalityDescriptor::new("nodule", Region::default(), Severity::High, 250);
        assert_eq!(d.confidence(), 100);
    }

    #[test]
    fn label_format() {
        let d = AbnormalityDescriptor::new("nodule", Region::default(), Severity::High, 85);
        assert_eq!(d.label(1), "1. High (85%)");
    }

    #[test]
    fn descriptor_set_serializes_as_array() {
        let set: DescriptorSet = vec![AbnormalityDescriptor::new(
            "opacity",
            Region::default(),
            Severity::Low,
            40,
        )]
        .into_iter()
        .collect();
        let json = serde_json::to_value(&set).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["severity"], "Low");
        assert_eq!(json[0]["region"]["width"], 10.0);
    }
}
