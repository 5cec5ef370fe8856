use std::str::FromStr;

use image::Rgb;
use palette::{LinSrgb, Srgb};

use crate::descriptor::Severity;

/// Default fill opacity of a region highlight, 50/255.
pub const DEFAULT_FILL_ALPHA: u8 = 50;

const LOW_HEX: &str = "#FFFF00";
const MEDIUM_HEX: &str = "#FFA500";
const HIGH_HEX: &str = "#FF0000";

// Used only if a hex constant above ever fails to parse.
const MEDIUM_RGB: Rgb<u8> = Rgb([255, 165, 0]);

/// Fixed severity palette: Low yellow, Medium orange, High red.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeverityColorMap {
    fill_alpha: u8,
}

impl Default for SeverityColorMap {
    fn default() -> Self {
        SeverityColorMap {
            fill_alpha: DEFAULT_FILL_ALPHA,
        }
    }
}

impl SeverityColorMap {
    pub fn with_fill_alpha(fill_alpha: u8) -> Self {
        SeverityColorMap { fill_alpha }
    }

    pub fn fill_alpha(&self) -> u8 {
        self.fill_alpha
    }

    pub fn hex(&self, severity: Severity) -> &'static str {
        match severity {
            Severity::Low => LOW_HEX,
            Severity::Medium => MEDIUM_HEX,
            Severity::High => HIGH_HEX,
        }
    }

    pub fn color(&self, severity: Severity) -> Rgb<u8> {
        parse_hex(self.hex(severity)).unwrap_or(MEDIUM_RGB)
    }

    /// Color for a raw severity string; unknown labels get Medium's color.
    pub fn color_for_label(&self, label: &str) -> Rgb<u8> {
        self.color(Severity::from_label(label))
    }
}

fn parse_hex(hex: &str) -> Option<Rgb<u8>> {
    let srgb = Srgb::<u8>::from_str(hex).ok()?;
    Some(Rgb([srgb.red, srgb.green, srgb.blue]))
}

/// Black or white, whichever reads better on `background`.
///
/// Uses relative luminance with the WCAG crossover point, so all three
/// severity colors get black text.
pub(crate) fn contrasting_text_color(background: Rgb<u8>) -> Rgb<u8> {
    let [r, g, b] = background.0;
    let linear: LinSrgb = Srgb::new(r, g, b).into_format::<f32>().into_linear();
    let luminance = 0.2126 * linear.red + 0.7152 * linear.green + 0.0722 * linear.blue;

    if luminance > 0.179 {
        Rgb([0, 0, 0])
    } else {
        Rgb([255, 255, 255])
    }
}

/// Alpha-blends `color` over `base` with opacity `alpha / 255`.
pub(crate) fn blend(base: Rgb<u8>, color: Rgb<u8>, alpha: u8) -> Rgb<u8> {
    let a = u32::from(alpha);
    let mix = |b: u8, c: u8| ((u32::from(b) * (255 - a) + u32::from(c) * a + 127) / 255) as u8;
    Rgb([
        mix(base[0], color[0]),
        mix(base[1], color[1]),
        mix(base[2], color[2]),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_colors_match_palette() {
        let map = SeverityColorMap::default();
        assert_eq!(map.color(Severity::Low), Rgb([255, 255, 0]));
        assert_eq!(map.color(Severity::Medium), Rgb([255, 165, 0]));
        assert_eq!(map.color(Severity::High), Rgb([255, 0, 0]));
        assert_eq!(map.fill_alpha(), 50);
    }

    #[test]
    fn unknown_label_uses_medium() {
        let map = SeverityColorMap::default();
        assert_eq!(map.color_for_label("Critical"), map.color(Severity::Medium));
        assert_eq!(map.color_for_label("HIGH"), map.color(Severity::High));
    }

    #[test]
    fn text_contrast() {
        for severity in [Severity::Low, Severity::Medium, Severity::High] {
            let color = SeverityColorMap::default().color(severity);
            assert_eq!(contrasting_text_color(color), Rgb([0, 0, 0]));
        }
        assert_eq!(contrasting_text_color(Rgb([0, 0, 128])), Rgb([255, 255, 255]));
    }

    #[test]
    fn blend_endpoints() {
        let base = Rgb([10, 20, 30]);
        let color = Rgb([200, 100, 0]);
        assert_eq!(blend(base, color, 0), base);
        assert_eq!(blend(base, color, 255), color);
        assert_eq!(blend(Rgb([0, 0, 0]), Rgb([255, 0, 0]), 50), Rgb([50, 0, 0]));
        assert_eq!(blend(color, color, 50), color);
    }
}
