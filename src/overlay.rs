//! Severity-colored region highlights and their label chips.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use tracing::{debug, warn};

use crate::colors::{SeverityColorMap, blend, contrasting_text_color};
use crate::descriptor::AbnormalityDescriptor;
use crate::font::LabelFont;
use crate::rect::{PixelRect, stroke_width};

const CHIP_OUTLINE: Rgb<u8> = Rgb([0, 0, 0]);

static BUILTIN_FONT: LabelFont = LabelFont::Builtin;

/// How completely one descriptor was drawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderQuality {
    Full,
    /// Drawn, but with a fallback along the way.
    Degraded(String),
}

impl RenderQuality {
    pub fn is_degraded(&self) -> bool {
        matches!(self, RenderQuality::Degraded(_))
    }
}

/// Placement of a label chip and the text inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelLayout {
    pub chip: PixelRect,
    pub text_x: i32,
    pub text_y: i32,
}

/// Draws descriptors onto a working raster.
#[derive(Debug, Clone)]
pub struct OverlayRenderer<'a> {
    pub colors: SeverityColorMap,
    pub font: &'a LabelFont,
    pub label_scale: f32,
    pub label_gap: u32,
    pub label_padding: u32,
}

impl OverlayRenderer<'_> {
    /// Draws outline, translucent fill, and label chip for the `index`-th
    /// (1-based) descriptor onto `canvas`, blending over whatever earlier
    /// descriptors left there.
    ///
    /// `placed` holds the chips of earlier descriptors on this canvas; the new
    /// chip avoids them where the image leaves room and is appended to it.
    pub fn render(
        &self,
        canvas: &mut RgbImage,
        rect: PixelRect,
        descriptor: &AbnormalityDescriptor,
        index: usize,
        placed: &mut Vec<PixelRect>,
    ) -> RenderQuality {
        let color = self.colors.color(descriptor.severity());

        if rect.is_degenerate() {
            debug!(index, ?rect, "region is degenerate, drawing label only");
        } else {
            self.draw_outline(canvas, rect, color);
            fill_translucent(canvas, rect, color, self.colors.fill_alpha());
        }

        self.draw_label(canvas, rect, &descriptor.label(index), color, placed)
    }

    fn draw_outline(&self, canvas: &mut RgbImage, rect: PixelRect, color: Rgb<u8>) {
        let stroke = stroke_width(canvas.width(), canvas.height());

        // Strokes grow inward so the outline never leaves the region.
        for inset in 0..stroke {
            let (w, h) = (rect.width(), rect.height());
            if w <= 2 * inset || h <= 2 * inset {
                break;
            }
            let ring = Rect::at((rect.x1 + inset) as i32, (rect.y1 + inset) as i32)
                .of_size(w - 2 * inset, h - 2 * inset);
            draw_hollow_rect_mut(canvas, ring, color);
        }
    }

    fn draw_label(
        &self,
        canvas: &mut RgbImage,
        rect: PixelRect,
        text: &str,
        color: Rgb<u8>,
        placed: &mut Vec<PixelRect>,
    ) -> RenderQuality {
        let mut quality = RenderQuality::Full;
        let mut font = self.font;

        let (mut text_w, mut text_h) = font.measure(text, self.label_scale);
        if text_w == 0 || text_h == 0 {
            warn!(text, "label font has no extents, using built-in font");
            font = &BUILTIN_FONT;
            (text_w, text_h) = font.measure(text, self.label_scale);
            quality = RenderQuality::Degraded("label font unusable, built-in font used".into());
        }

        let (width, height) = canvas.dimensions();
        let layout = self.layout_label(width, height, rect, text_w, text_h, placed);
        let padding = self.label_padding.saturating_mul(2);
        if layout.chip.width() < text_w.saturating_add(padding)
            || layout.chip.height() < text_h.saturating_add(padding)
        {
            warn!(text, "label chip does not fit inside the image");
            quality = RenderQuality::Degraded("label clipped to image bounds".into());
        }

        if let Some(chip) = layout.chip.to_imageproc_rect() {
            draw_filled_rect_mut(canvas, chip, color);
            draw_hollow_rect_mut(canvas, chip, CHIP_OUTLINE);
        }
        font.draw(
            canvas,
            contrasting_text_color(color),
            layout.text_x,
            layout.text_y,
            self.label_scale,
            text,
        );
        placed.push(layout.chip);

        quality
    }

    /// Positions a chip for text of the given size above `rect`'s top-left
    /// corner, pushed back inside the image where it would overflow.
    ///
    /// A chip that would cover one in `placed` is stacked above it, or below
    /// it when there is no room above. If neither fits, it keeps its first
    /// position and overlaps. The returned chip is clipped to the image.
    pub fn layout_label(
        &self,
        width: u32,
        height: u32,
        rect: PixelRect,
        text_w: u32,
        text_h: u32,
        placed: &[PixelRect],
    ) -> LabelLayout {
        let pad = i64::from(self.label_padding);
        let chip_w = i64::from(text_w) + 2 * pad;
        let chip_h = i64::from(text_h) + 2 * pad;
        let (width, height) = (i64::from(width), i64::from(height));

        let text_top = i64::from(rect.y1) - i64::from(text_h) - i64::from(self.label_gap);
        let left = i64::from(rect.x1).min(width - chip_w).max(0);
        let preferred = (text_top - pad).min(height - chip_h).max(0);

        let blocker = |top: i64| {
            placed.iter().find(|p| {
                i64::from(p.x1) < left + chip_w
                    && left < i64::from(p.x2)
                    && i64::from(p.y1) < top + chip_h
                    && top < i64::from(p.y2)
            })
        };
        // Each step moves strictly away from `preferred`, so both searches end.
        let stack_up = || {
            let mut top = preferred;
            while let Some(p) = blocker(top) {
                top = i64::from(p.y1) - chip_h;
                if top < 0 {
                    return None;
                }
            }
            Some(top)
        };
        let stack_down = || {
            let mut top = preferred;
            while let Some(p) = blocker(top) {
                top = i64::from(p.y2);
                if top + chip_h > height {
                    return None;
                }
            }
            Some(top)
        };
        let top = stack_up().or_else(stack_down).unwrap_or_else(|| {
            debug!(left, preferred, "no free space for label chip, overlapping");
            preferred
        });

        let chip = PixelRect {
            x1: left as u32,
            y1: top as u32,
            x2: (left + chip_w).min(width) as u32,
            y2: (top + chip_h).min(height) as u32,
        };

        LabelLayout {
            chip,
            text_x: (left + pad) as i32,
            text_y: (top + pad) as i32,
        }
    }
}

/// Blends `color` at `alpha / 255` over every pixel of `rect`.
pub fn fill_translucent(canvas: &mut RgbImage, rect: PixelRect, color: Rgb<u8>, alpha: u8) {
    let x2 = rect.x2.min(canvas.width());
    let y2 = rect.y2.min(canvas.height());
    for y in rect.y1..y2 {
        for x in rect.x1..x2 {
            let pixel = canvas.get_pixel_mut(x, y);
            *pixel = blend(*pixel, color, alpha);
        }
    }
}
