use imageproc::rect::Rect;

use crate::descriptor::Region;

/// Axis-aligned pixel rectangle with inclusive-exclusive extent
/// `[x1, x2) x [y1, y2)`.
///
/// Always satisfies `x1 <= x2` and `y1 <= y2`. A rectangle with zero width or
/// height is degenerate; it still has a position, which is where labels go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelRect {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl PixelRect {
    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    pub fn is_degenerate(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// The equivalent `imageproc` rectangle, or `None` when degenerate
    /// (`imageproc` rejects empty rectangles).
    pub fn to_imageproc_rect(&self) -> Option<Rect> {
        if self.is_degenerate() {
            return None;
        }
        Some(Rect::at(self.x1 as i32, self.y1 as i32).of_size(self.width(), self.height()))
    }
}

/// Maps a center-based percentage region onto a `width x height` image.
///
/// Corners are `center ± half-extent`, floored to whole pixels and then
/// clamped to `[0, width] x [0, height]`. Flooring happens before clamping so
/// a zero-size region at `(50, 50)` lands exactly on `(width / 2, height / 2)`.
/// Regions partly or fully outside the image are never rejected; they shrink
/// toward, or collapse onto, the nearest edge.
///
/// # Arguments
///
/// * `region` - Center and extent as percentages of the image size. Values
///   outside `[0, 100]`, negative extents and NaN are all accepted.
/// * `width`, `height` - Image size in pixels.
///
/// # Returns
///
/// A [`PixelRect`] inside `[0, width] x [0, height]`, possibly degenerate.
///
/// # Examples
///
/// ```
/// use scan_annotate::descriptor::Region;
/// use scan_annotate::rect::to_pixel_rect;
///
/// let region = Region { x: 50.0, y: 50.0, width: 20.0, height: 40.0 };
/// let rect = to_pixel_rect(&region, 200, 100);
///
/// assert_eq!((rect.x1, rect.y1, rect.x2, rect.y2), (80, 30, 120, 70));
/// ```
pub fn to_pixel_rect(region: &Region, width: u32, height: u32) -> PixelRect {
    let (w, h) = (f64::from(width), f64::from(height));

    let cx = region.x / 100.0 * w;
    let cy = region.y / 100.0 * h;
    let half_w = (region.width / 100.0 * w / 2.0).abs();
    let half_h = (region.height / 100.0 * h / 2.0).abs();

    PixelRect {
        x1: clamp_to_axis(cx - half_w, width),
        y1: clamp_to_axis(cy - half_h, height),
        x2: clamp_to_axis(cx + half_w, width),
        y2: clamp_to_axis(cy + half_h, height),
    }
}

/// Floors `value` and clamps it into `[0, extent]`. NaN maps to 0.
fn clamp_to_axis(value: f64, extent: u32) -> u32 {
    let floored = value.floor();
    if floored.is_nan() || floored <= 0.0 {
        0
    } else if floored >= f64::from(extent) {
        extent
    } else {
        floored as u32
    }
}

/// Outline stroke width for an image, `max(2, min(width, height) / 200)`.
pub fn stroke_width(width: u32, height: u32) -> u32 {
    (width.min(height) / 200).max(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(x: f64, y: f64, width: f64, height: f64) -> Region {
        Region {
            x,
            y,
            width,
            height,
        }
    }

    fn assert_in_bounds(rect: PixelRect, width: u32, height: u32) {
        assert!(rect.x1 <= rect.x2 && rect.x2 <= width, "{rect:?}");
        assert!(rect.y1 <= rect.y2 && rect.y2 <= height, "{rect:?}");
    }

    #[test]
    fn zero_size_region_maps_to_center_point() {
        for (w, h) in [(100, 100), (101, 57), (640, 480), (1, 1)] {
            let rect = to_pixel_rect(&region(50.0, 50.0, 0.0, 0.0), w, h);
            assert_eq!(
                rect,
                PixelRect {
                    x1: w / 2,
                    y1: h / 2,
                    x2: w / 2,
                    y2: h / 2
                }
            );
        }
    }

    #[test]
    fn default_region_on_square_image() {
        let rect = to_pixel_rect(&Region::default(), 200, 200);
        assert_eq!(
            rect,
            PixelRect {
                x1: 90,
                y1: 90,
                x2: 110,
                y2: 110
            }
        );
    }

    #[test]
    fn oversized_and_off_image_regions_are_clamped() {
        let cases = [
            region(50.0, 50.0, 250.0, 300.0),
            region(-400.0, 50.0, 10.0, 10.0),
            region(500.0, 500.0, 10.0, 10.0),
            region(0.0, 100.0, 1000.0, 0.5),
            region(f64::NAN, 50.0, 10.0, 10.0),
            region(50.0, 50.0, -30.0, -30.0),
        ];
        for r in cases {
            assert_in_bounds(to_pixel_rect(&r, 320, 240), 320, 240);
        }
    }

    #[test]
    fn region_fully_outside_collapses_to_edge() {
        let rect = to_pixel_rect(&region(150.0, 50.0, 10.0, 10.0), 100, 100);
        assert_eq!((rect.x1, rect.x2), (100, 100));
        assert!(rect.is_degenerate());
        assert!(rect.to_imageproc_rect().is_none());
    }

    #[test]
    fn full_image_region() {
        let rect = to_pixel_rect(&region(50.0, 50.0, 100.0, 100.0), 64, 48);
        assert_eq!(
            rect,
            PixelRect {
                x1: 0,
                y1: 0,
                x2: 64,
                y2: 48
            }
        );
        let r = rect.to_imageproc_rect().unwrap();
        assert_eq!((r.width(), r.height()), (64, 48));
    }

    #[test]
    fn axis_clamp_floors_then_saturates() {
        assert_eq!(clamp_to_axis(12.99, 100), 12);
        assert_eq!(clamp_to_axis(-0.5, 100), 0);
        assert_eq!(clamp_to_axis(f64::NAN, 100), 0);
        assert_eq!(clamp_to_axis(f64::INFINITY, 100), 100);
        assert_eq!(clamp_to_axis(f64::NEG_INFINITY, 100), 0);
        assert_eq!(clamp_to_axis(1e300, u32::MAX), u32::MAX);
    }

    #[test]
    fn stroke_scales_with_smaller_side() {
        assert_eq!(stroke_width(100, 100), 2);
        assert_eq!(stroke_width(800, 600), 3);
        assert_eq!(stroke_width(4000, 3000), 15);
    }
}
