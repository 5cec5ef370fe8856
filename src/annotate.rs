//! End-to-end annotation of one image: decode, recover descriptors, render.

use std::panic::{AssertUnwindSafe, catch_unwind};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbImage, RgbaImage};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::colors::SeverityColorMap;
use crate::config::AnnotatorConfig;
use crate::descriptor::DescriptorSet;
use crate::error::AnnotateError;
use crate::font::LabelFont;
use crate::overlay::OverlayRenderer;
use crate::parse::recover_descriptors;
use crate::rect::to_pixel_rect;

/// How much of the requested annotation made it onto the returned image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationStatus {
    /// Every recovered descriptor was drawn in full.
    FullyAnnotated,
    /// Something was drawn, but with fallbacks: a placeholder descriptor,
    /// or one or more descriptors rendered in degraded form.
    PartiallyAnnotated,
    /// Nothing usable was drawn; the image is the unannotated original.
    Unavailable,
}

/// An annotated raster and the metadata describing how it was produced.
#[derive(Debug, Clone)]
pub struct Annotation {
    pub image: RgbImage,
    pub descriptors: DescriptorSet,
    pub status: AnnotationStatus,
    /// Set when the upstream response could not be parsed.
    pub fallback_reason: Option<String>,
    /// Number of descriptors drawn with a fallback.
    pub degraded: usize,
}

/// Serializable response metadata for an [`Annotation`].
#[derive(Debug, Clone, Serialize)]
pub struct AnnotationSummary<'a> {
    pub status: AnnotationStatus,
    pub width: u32,
    pub height: u32,
    pub degraded: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<&'a str>,
    pub abnormalities: &'a DescriptorSet,
}

impl Annotation {
    pub fn summary(&self) -> AnnotationSummary<'_> {
        AnnotationSummary {
            status: self.status,
            width: self.image.width(),
            height: self.image.height(),
            degraded: self.degraded,
            fallback_reason: self.fallback_reason.as_deref(),
            abnormalities: &self.descriptors,
        }
    }

    pub fn encode_png(&self) -> Result<Vec<u8>, AnnotateError> {
        let mut buffer = Vec::new();
        PngEncoder::new(&mut buffer)
            .write_image(
                self.image.as_raw(),
                self.image.width(),
                self.image.height(),
                ExtendedColorType::Rgb8,
            )
            .map_err(|e| AnnotateError::EncodeError(e.to_string()))?;
        Ok(buffer)
    }

    /// The image as a `data:image/png;base64,...` URL.
    pub fn to_data_url(&self) -> Result<String, AnnotateError> {
        let png = self.encode_png()?;
        Ok(format!("data:image/png;base64,{}", STANDARD.encode(png)))
    }
}

/// Result of drawing a descriptor set onto a copy of an image.
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub image: RgbImage,
    pub degraded: usize,
    /// `false` when rendering aborted and `image` is the untouched input.
    pub completed: bool,
}

/// Shared, read-only annotation service.
///
/// Build one at startup and hand out `&Annotator` (or an `Arc`) to request
/// handlers; calls never mutate it and need no synchronisation.
#[derive(Debug, Clone)]
pub struct Annotator {
    config: AnnotatorConfig,
    font: LabelFont,
    colors: SeverityColorMap,
}

impl Default for Annotator {
    fn default() -> Self {
        Annotator::new(AnnotatorConfig::default())
    }
}

impl Annotator {
    /// Builds an annotator. A font that cannot be loaded is replaced by the
    /// built-in font.
    pub fn new(config: AnnotatorConfig) -> Self {
        let font = match &config.font_path {
            Some(path) => LabelFont::load(path).unwrap_or_else(|err| {
                warn!(error = %err, "falling back to built-in label font");
                LabelFont::Builtin
            }),
            None => LabelFont::Builtin,
        };
        Self::with_font(config, font)
    }

    /// Like [`Annotator::new`], but fails on an invalid configuration or an
    /// unloadable font.
    pub fn try_new(config: AnnotatorConfig) -> Result<Self, AnnotateError> {
        config.validate()?;
        let font = match &config.font_path {
            Some(path) => LabelFont::load(path)?,
            None => LabelFont::Builtin,
        };
        Ok(Self::with_font(config, font))
    }

    /// Builds an annotator around an already loaded font; `config.font_path`
    /// is ignored. Out-of-range label settings are clamped.
    pub fn with_font(config: AnnotatorConfig, font: LabelFont) -> Self {
        let config = match config.validate() {
            Ok(()) => config,
            Err(err) => {
                warn!(error = %err, "clamping annotator configuration");
                config.clamped()
            }
        };
        let colors = SeverityColorMap::with_fill_alpha(config.fill_alpha);
        Annotator {
            config,
            font,
            colors,
        }
    }

    pub fn config(&self) -> &AnnotatorConfig {
        &self.config
    }

    pub fn font(&self) -> &LabelFont {
        &self.font
    }

    /// Decodes an encoded image (PNG, JPEG, ...) and annotates it.
    ///
    /// Only decoding can fail; everything after it degrades instead.
    ///
    /// # Errors
    ///
    /// [`AnnotateError::DecodeError`] when `encoded` is not a supported image,
    /// [`AnnotateError::ZeroDimensions`] when it decodes to an empty one.
    pub fn annotate(&self, encoded: &[u8], upstream: &str) -> Result<Annotation, AnnotateError> {
        let image = image::load_from_memory(encoded)
            .map_err(|e| AnnotateError::DecodeError(e.to_string()))?;
        self.annotate_decoded(&image, upstream)
    }

    /// Annotates a raw RGB8 or RGBA8 buffer of the declared size.
    pub fn annotate_pixels(
        &self,
        width: u32,
        height: u32,
        pixels: Vec<u8>,
        upstream: &str,
    ) -> Result<Annotation, AnnotateError> {
        let mismatch = |len| AnnotateError::BufferMismatch { width, height, len };
        let area = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| mismatch(pixels.len()))?;

        let len = pixels.len();
        let image = if Some(len) == area.checked_mul(3) {
            RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8)
        } else if Some(len) == area.checked_mul(4) {
            RgbaImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgba8)
        } else {
            None
        }
        .ok_or_else(|| mismatch(len))?;

        self.annotate_decoded(&image, upstream)
    }

    fn annotate_decoded(
        &self,
        image: &DynamicImage,
        upstream: &str,
    ) -> Result<Annotation, AnnotateError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(AnnotateError::ZeroDimensions);
        }
        Ok(self.annotate_image(&image.to_rgb8(), upstream))
    }

    /// Recovers descriptors from `upstream` and draws them on a copy of
    /// `image`. Never fails; `image` is left untouched.
    ///
    /// Descriptors are drawn in upstream order, each blending over the ones
    /// before it. A descriptor whose label had to fall back (built-in font,
    /// chip clipped to the image) still counts as drawn, but is tallied in
    /// [`Annotation::degraded`].
    ///
    /// # Arguments
    ///
    /// * `image` - The decoded scan.
    /// * `upstream` - The detector's raw response text.
    ///
    /// # Returns
    ///
    /// An [`Annotation`] whose `status` is
    ///
    /// * `Unavailable` if rendering aborted, or nothing could be recovered and
    ///   the fallback policy supplied no descriptors,
    /// * `PartiallyAnnotated` if placeholder descriptors were drawn or any
    ///   descriptor degraded,
    /// * `FullyAnnotated` otherwise, including for an empty recovered list.
    pub fn annotate_image(&self, image: &RgbImage, upstream: &str) -> Annotation {
        let _span = tracing::info_span!("annotate", width = image.width(), height = image.height())
            .entered();

        let (descriptors, fallback_reason) =
            recover_descriptors(upstream, self.config.fallback_policy).into_parts();
        let rendered = self.render_descriptors(image, &descriptors);

        let status = if !rendered.completed
            || (fallback_reason.is_some() && descriptors.is_empty())
        {
            AnnotationStatus::Unavailable
        } else if fallback_reason.is_some() || rendered.degraded > 0 {
            AnnotationStatus::PartiallyAnnotated
        } else {
            AnnotationStatus::FullyAnnotated
        };

        info!(
            count = descriptors.len(),
            degraded = rendered.degraded,
            ?status,
            "annotation finished"
        );

        Annotation {
            image: rendered.image,
            descriptors,
            status,
            fallback_reason,
            degraded: rendered.degraded,
        }
    }

    /// Draws `descriptors` in order onto a copy of `image`.
    ///
    /// If drawing panics part-way, the partial copy is discarded and the
    /// outcome carries an unmodified clone of `image`.
    pub fn render_descriptors(
        &self,
        image: &RgbImage,
        descriptors: &DescriptorSet,
    ) -> RenderOutcome {
        let (width, height) = image.dimensions();
        let renderer = OverlayRenderer {
            colors: self.colors,
            font: &self.font,
            label_scale: self.config.label_scale_for(width, height),
            label_gap: self.config.label_gap,
            label_padding: self.config.label_padding,
        };

        let result = catch_unwind(AssertUnwindSafe(|| {
            let mut canvas = image.clone();
            let mut degraded = 0;
            let mut labels = Vec::with_capacity(descriptors.len());
            for (i, descriptor) in descriptors.iter().enumerate() {
                let rect = to_pixel_rect(&descriptor.region(), width, height);
                let quality = renderer.render(&mut canvas, rect, descriptor, i + 1, &mut labels);
                if quality.is_degraded() {
                    degraded += 1;
                }
                debug!(index = i + 1, ?rect, ?quality, "rendered descriptor");
            }
            (canvas, degraded)
        }));

        match result {
            Ok((image, degraded)) => RenderOutcome {
                image,
                degraded,
                completed: true,
            },
            Err(_) => {
                warn!("annotation rendering panicked, returning original image");
                RenderOutcome {
                    image: image.clone(),
                    degraded: 0,
                    completed: false,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::FallbackPolicy;
    use image::Rgb;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, 128])
        })
    }

    #[test]
    fn empty_set_is_pixel_identical() {
        let image = gradient(120, 80);
        let annotation = Annotator::default().annotate_image(&image, r#"{"abnormalities":[]}"#);
        assert_eq!(annotation.image, image);
        assert_eq!(annotation.status, AnnotationStatus::FullyAnnotated);
        assert!(annotation.descriptors.is_empty());
    }

    #[test]
    fn garbage_upstream_returns_original() {
        let image = gradient(120, 80);
        let annotation = Annotator::default().annotate_image(&image, "not json at all");
        assert_eq!(annotation.image, image);
        assert_eq!(annotation.status, AnnotationStatus::Unavailable);
        assert!(annotation.fallback_reason.is_some());
    }

    #[test]
    fn placeholder_policy_draws_something() {
        let image = gradient(200, 200);
        let annotator =
            Annotator::new(AnnotatorConfig::default().fallback_policy(FallbackPolicy::Placeholder));
        let annotation = annotator.annotate_image(&image, "not json at all");
        assert_eq!(annotation.status, AnnotationStatus::PartiallyAnnotated);
        assert_eq!(annotation.descriptors.len(), 1);
        assert_ne!(annotation.image, image);
    }

    #[test]
    fn input_is_not_mutated() {
        let image = gradient(200, 200);
        let before = image.clone();
        let annotation = Annotator::default()
            .annotate_image(&image, r#"{"abnormalities":[{"severity":"High","confidence":90}]}"#);
        assert_eq!(image, before);
        assert_ne!(annotation.image, image);
        assert_eq!(annotation.status, AnnotationStatus::FullyAnnotated);
    }

    #[test]
    fn pixel_buffer_length_must_match() {
        let err = Annotator::default()
            .annotate_pixels(4, 4, vec![0; 10], "{}")
            .unwrap_err();
        assert!(matches!(err, AnnotateError::BufferMismatch { len: 10, .. }));
        assert!(err.is_fatal_input());

        let zero = Annotator::default().annotate_pixels(0, 4, Vec::new(), "{}");
        assert!(matches!(zero, Err(AnnotateError::ZeroDimensions)));
    }

    #[test]
    fn rgba_pixels_are_flattened_to_rgb() {
        let annotation = Annotator::default()
            .annotate_pixels(3, 2, vec![7; 3 * 2 * 4], r#"{"abnormalities":[]}"#)
            .unwrap();
        assert_eq!(annotation.image.dimensions(), (3, 2));
        assert_eq!(*annotation.image.get_pixel(0, 0), Rgb([7, 7, 7]));
    }

    #[test]
    fn unloadable_font_path() {
        let config = AnnotatorConfig::default().font_path("/nonexistent/font.ttf");
        assert!(Annotator::new(config.clone()).font().is_builtin());
        assert!(matches!(
            Annotator::try_new(config),
            Err(AnnotateError::FontError(_))
        ));
    }

    #[test]
    fn summary_serializes() {
        let image = gradient(100, 100);
        let annotation = Annotator::default().annotate_image(
            &image,
            r#"{"abnormalities":[{"description":"nodule","severity":"low","confidence":33}]}"#,
        );
        let json = serde_json::to_value(annotation.summary()).unwrap();
        assert_eq!(json["status"], "fully_annotated");
        assert_eq!(json["width"], 100);
        assert_eq!(json["abnormalities"][0]["description"], "nodule");
        assert!(json.get("fallback_reason").is_none());
    }

    #[test]
    fn data_url_prefix() {
        let annotation = Annotator::default().annotate_image(&gradient(8, 8), "");
        let url = annotation.to_data_url().unwrap();
        assert!(url.starts_with("data:image/png;base64,iVBORw0KGgo"));
    }
}
