//! Severity-colored region highlighting for medical images.
//!
//! An upstream detector describes abnormalities as percentage-space boxes
//! with a severity and confidence. This crate recovers those descriptors from
//! whatever text the detector produced, maps them onto the image, and draws
//! a translucent highlight plus a numbered label chip for each one.
//!
//! # Example
//!
//! ```no_run
//! use scan_annotate::{Annotator, AnnotatorConfig};
//!
//! let annotator = Annotator::new(AnnotatorConfig::default());
//! let bytes = std::fs::read("chest.png").unwrap();
//! let upstream = r#"{"abnormalities":[{"description":"opacity",
//!     "location":{"x":40,"y":55,"width":20,"height":15},"severity":"High","confidence":82}]}"#;
//!
//! let annotation = annotator.annotate(&bytes, upstream).unwrap();
//! println!("{:?}: {} findings", annotation.status, annotation.descriptors.len());
//! ```

pub mod annotate;
pub mod colors;
pub mod config;
pub mod descriptor;
mod error;
pub mod font;
pub mod overlay;
pub mod parse;
pub mod rect;

pub use annotate::{Annotation, AnnotationStatus, Annotator};
pub use config::AnnotatorConfig;
pub use descriptor::{AbnormalityDescriptor, DescriptorSet, Region, Severity};
pub use error::AnnotateError;
pub use parse::{FallbackPolicy, ParseOutcome, recover_descriptors};
