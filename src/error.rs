use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnnotateError {
    #[error("failed to decode image: {0}")]
    DecodeError(String),

    #[error("image dimensions are zero")]
    ZeroDimensions,

    #[error("pixel buffer of {len} bytes does not match a {width}x{height} RGB or RGBA raster")]
    BufferMismatch { width: u32, height: u32, len: usize },

    #[error("failed to encode image: {0}")]
    EncodeError(String),

    #[error("failed to load font: {0}")]
    FontError(String),

    #[error("invalid annotator configuration: {0}")]
    ConfigError(String),
}

impl AnnotateError {
    /// Whether the error means the caller's image could not be used at all.
    pub fn is_fatal_input(&self) -> bool {
        matches!(
            self,
            AnnotateError::DecodeError(_)
                | AnnotateError::ZeroDimensions
                | AnnotateError::BufferMismatch { .. }
        )
    }
}
