//! Label fonts: a loaded TrueType/OpenType face, or a built-in bitmap face
//! that needs no external resource.

use std::fmt;
use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::error::AnnotateError;

const GLYPH_COLUMNS: u32 = 5;
const GLYPH_ROWS: u32 = 7;
/// One blank column between glyphs.
const GLYPH_ADVANCE: u32 = GLYPH_COLUMNS + 1;
/// Cells are at most this many pixels on a side.
const MAX_BUILTIN_FACTOR: f32 = 4096.0;

#[derive(Clone, Default)]
pub enum LabelFont {
    TrueType(FontArc),
    /// 5x7 bitmap glyphs scaled by an integer factor.
    #[default]
    Builtin,
}

impl fmt::Debug for LabelFont {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelFont::TrueType(_) => f.write_str("LabelFont::TrueType"),
            LabelFont::Builtin => f.write_str("LabelFont::Builtin"),
        }
    }
}

impl LabelFont {
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, AnnotateError> {
        FontArc::try_from_vec(data)
            .map(LabelFont::TrueType)
            .map_err(|e| AnnotateError::FontError(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, AnnotateError> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_err(|e| AnnotateError::FontError(format!("{}: {e}", path.display())))?;
        Self::from_bytes(data)
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self, LabelFont::Builtin)
    }

    /// Rendered `(width, height)` of `text` at a nominal pixel height of `scale`.
    pub fn measure(&self, text: &str, scale: f32) -> (u32, u32) {
        match self {
            LabelFont::TrueType(font) => text_size(PxScale::from(scale), font, text),
            LabelFont::Builtin => {
                let factor = builtin_factor(scale);
                let chars = text.chars().count() as u32;
                let width = chars
                    .saturating_mul(GLYPH_ADVANCE)
                    .saturating_sub(1)
                    .saturating_mul(factor);
                (width, GLYPH_ROWS.saturating_mul(factor))
            }
        }
    }

    /// Draws `text` with its top-left corner at `(x, y)`. Pixels outside the
    /// canvas are dropped.
    pub fn draw(
        &self,
        canvas: &mut RgbImage,
        color: Rgb<u8>,
        x: i32,
        y: i32,
        scale: f32,
        text: &str,
    ) {
        match self {
            LabelFont::TrueType(font) => {
                draw_text_mut(canvas, color, x, y, PxScale::from(scale), font, text)
            }
            LabelFont::Builtin => draw_builtin(canvas, color, x, y, builtin_factor(scale), text),
        }
    }
}

fn builtin_factor(scale: f32) -> u32 {
    if scale.is_finite() {
        (scale / GLYPH_ROWS as f32).round().clamp(1.0, MAX_BUILTIN_FACTOR) as u32
    } else {
        1
    }
}

fn draw_builtin(canvas: &mut RgbImage, color: Rgb<u8>, x: i32, y: i32, factor: u32, text: &str) {
    let (width, height) = (i64::from(canvas.width()), i64::from(canvas.height()));
    let cell = i64::from(factor);

    for (i, ch) in text.chars().enumerate() {
        let origin_x = i64::from(x) + i as i64 * i64::from(GLYPH_ADVANCE) * cell;
        if origin_x >= width {
            break;
        }
        for (row, bits) in glyph(ch).iter().enumerate() {
            let py = i64::from(y) + row as i64 * cell;
            if py >= height || py + cell <= 0 {
                continue;
            }
            for col in 0..GLYPH_COLUMNS {
                if bits & (1 << (GLYPH_COLUMNS - 1 - col)) == 0 {
                    continue;
                }
                let px = origin_x + i64::from(col) * cell;
                if px >= width || px + cell <= 0 {
                    continue;
                }
                // Cells straddling the top or left edge start off-canvas; the
                // fill clips them.
                let (Ok(cx), Ok(cy)) = (i32::try_from(px), i32::try_from(py)) else {
                    continue;
                };
                draw_filled_rect_mut(canvas, Rect::at(cx, cy).of_size(factor, factor), color);
            }
        }
    }
}

/// Row bitmaps, top to bottom, most significant of the low five bits leftmost.
/// Lowercase letters share the uppercase shapes; anything else is a box.
fn glyph(ch: char) -> [u8; 7] {
    match ch.to_ascii_uppercase() {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        '(' => [0x02, 0x04, 0x08, 0x08, 0x08, 0x04, 0x02],
        ')' => [0x08, 0x04, 0x02, 0x02, 0x02, 0x04, 0x08],
        '%' => [0x18, 0x19, 0x02, 0x04, 0x08, 0x13, 0x03],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        ' ' => [0x00; 7],
        _ => [0x1F, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1F],
    }
}
