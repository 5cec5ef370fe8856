//! Recovery of a [`DescriptorSet`] from loosely structured detector output.
//!
//! The upstream model is asked for
//! `{"abnormalities":[{"description","location":{x,y,width,height},"severity","confidence"}]}`
//! but may wrap it in a markdown fence, surround it with prose, truncate it,
//! or return something else entirely. [`recover_descriptors`] never fails:
//! per-field problems take the field default, and whole-response problems
//! yield the [`FallbackPolicy`] set.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::descriptor::{AbnormalityDescriptor, DescriptorSet, Region, Severity};

/// Description carried by the synthetic descriptor of [`FallbackPolicy::Placeholder`].
pub const UNPARSEABLE_DESCRIPTION: &str = "Unparseable upstream response";

/// What to return when the upstream response cannot be parsed at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// No descriptors: the image is returned unannotated.
    #[default]
    Empty,

    /// A single zero-confidence `Low` descriptor flagging the failure.
    Placeholder,
}

impl FallbackPolicy {
    pub fn descriptors(&self) -> DescriptorSet {
        match self {
            FallbackPolicy::Empty => DescriptorSet::empty(),
            FallbackPolicy::Placeholder => DescriptorSet::new(vec![AbnormalityDescriptor::new(
                UNPARSEABLE_DESCRIPTION,
                Region::default(),
                Severity::Low,
                0,
            )]),
        }
    }
}

/// Why a response could not be recovered.
#[derive(Debug, Error)]
enum RecoveryError {
    #[error("response is not valid JSON: {0}")]
    Malformed(String),

    #[error("response has no `abnormalities` key")]
    MissingAbnormalities,

    #[error("`abnormalities` is not an array")]
    NotAnArray,
}

/// Result of recovering descriptors from upstream text.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// The response parsed; individual fields may still have been defaulted.
    Recovered(DescriptorSet),

    /// The response was unusable and the policy set was substituted.
    Fallback {
        descriptors: DescriptorSet,
        reason: String,
    },
}

impl ParseOutcome {
    pub fn descriptors(&self) -> &DescriptorSet {
        match self {
            ParseOutcome::Recovered(descriptors) => descriptors,
            ParseOutcome::Fallback { descriptors, .. } => descriptors,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ParseOutcome::Fallback { .. })
    }

    pub fn fallback_reason(&self) -> Option<&str> {
        match self {
            ParseOutcome::Recovered(_) => None,
            ParseOutcome::Fallback { reason, .. } => Some(reason),
        }
    }

    pub fn into_parts(self) -> (DescriptorSet, Option<String>) {
        match self {
            ParseOutcome::Recovered(descriptors) => (descriptors, None),
            ParseOutcome::Fallback {
                descriptors,
                reason,
            } => (descriptors, Some(reason)),
        }
    }
}

/// Turns raw upstream text into descriptors. Never fails.
///
/// The text may be bare JSON, JSON inside a markdown fence, or prose with a
/// fenced block in it. Entries with missing or malformed fields keep their
/// defaults; entries that are not objects are skipped.
///
/// # Arguments
///
/// * `text` - The detector's response, verbatim.
/// * `policy` - Which descriptors to substitute when no `abnormalities`
///   array can be recovered at all.
///
/// # Returns
///
/// [`ParseOutcome::Recovered`] with the descriptors in upstream order, or
/// [`ParseOutcome::Fallback`] with `policy`'s descriptors and the reason the
/// response was rejected.
///
/// # Examples
///
/// ```
/// use scan_annotate::{FallbackPolicy, ParseOutcome, recover_descriptors};
///
/// let text = "Findings:\n```json\n{\"abnormalities\":[{\"severity\":\"high\"}]}\n```";
/// let outcome = recover_descriptors(text, FallbackPolicy::Empty);
/// assert!(!outcome.is_fallback());
/// assert_eq!(outcome.descriptors().len(), 1);
///
/// let outcome = recover_descriptors("no findings", FallbackPolicy::Empty);
/// assert!(outcome.is_fallback());
/// assert!(outcome.descriptors().is_empty());
/// ```
pub fn recover_descriptors(text: &str, policy: FallbackPolicy) -> ParseOutcome {
    match parse_abnormalities(text) {
        Ok(descriptors) => ParseOutcome::Recovered(descriptors),
        Err(err) => {
            warn!(error = %err, ?policy, "upstream response unusable, using fallback descriptors");
            ParseOutcome::Fallback {
                descriptors: policy.descriptors(),
                reason: err.to_string(),
            }
        }
    }
}

fn parse_abnormalities(text: &str) -> Result<DescriptorSet, RecoveryError> {
    let root = parse_json_lenient(extract_json_body(text))?;

    let items = root
        .get("abnormalities")
        .ok_or(RecoveryError::MissingAbnormalities)?
        .as_array()
        .ok_or(RecoveryError::NotAnArray)?;

    Ok(items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| descriptor_from_value(i, item))
        .collect())
}

/// Strips a surrounding markdown fence, or picks the first ```` ```json ````
/// block out of prose. Unterminated fences run to the end of the text.
fn extract_json_body(text: &str) -> &str {
    let trimmed = text.trim();

    if let Some(rest) = trimmed.strip_prefix("```") {
        let body = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => strip_language_tag(rest),
        };
        return body.strip_suffix("```").unwrap_or(body).trim();
    }

    if let Some(start) = trimmed.find("```json") {
        let body = &trimmed[start + 7..];
        let end = body.find("```").unwrap_or(body.len());
        return body[..end].trim();
    }

    trimmed
}

fn strip_language_tag(rest: &str) -> &str {
    match rest.get(..4) {
        Some(tag) if tag.eq_ignore_ascii_case("json") => &rest[4..],
        _ => rest,
    }
}

/// Parses `body`, retrying on the outermost `{...}` slice when prose
/// surrounds the object.
fn parse_json_lenient(body: &str) -> Result<Value, RecoveryError> {
    let first_err = match serde_json::from_str::<Value>(body) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    if let (Some(start), Some(end)) = (body.find('{'), body.rfind('}'))
        && start < end
        && let Ok(value) = serde_json::from_str::<Value>(&body[start..=end])
    {
        return Ok(value);
    }

    Err(RecoveryError::Malformed(first_err.to_string()))
}

fn descriptor_from_value(index: usize, value: &Value) -> Option<AbnormalityDescriptor> {
    let Some(obj) = value.as_object() else {
        warn!(index, "skipping non-object abnormality entry");
        return None;
    };

    let description = obj
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let region = obj
        .get("location")
        .or_else(|| obj.get("region"))
        .and_then(Value::as_object)
        .map(region_from_map)
        .unwrap_or_default();

    let severity = obj
        .get("severity")
        .and_then(Value::as_str)
        .map(Severity::from_label)
        .unwrap_or_default();

    let confidence = obj
        .get("confidence")
        .and_then(lenient_number)
        .map(to_percentage)
        .unwrap_or(0);

    Some(AbnormalityDescriptor::new(
        description,
        region,
        severity,
        confidence,
    ))
}

fn region_from_map(map: &Map<String, Value>) -> Region {
    let defaults = Region::default();
    let field = |key: &str, default: f64| map.get(key).and_then(lenient_number).unwrap_or(default);

    Region {
        x: field("x", defaults.x),
        y: field("y", defaults.y),
        width: field("width", defaults.width),
        height: field("height", defaults.height),
    }
}

/// Accepts JSON numbers and numeric strings such as `"85"` or `"85%"`.
fn lenient_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim_end().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

fn to_percentage(value: f64) -> u8 {
    num_traits::clamp(value.round(), 0.0, 100.0) as u8
}
