//! Error types shared by every stage of the scan and projection pipeline.

use thiserror::Error;

/// Errors that can occur while scanning, projecting or persisting images.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid texture size, scan depth or other setting.
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    /// Two images that must share dimensions do not.
    #[error("Image dimensions {actual:?} do not match expected {expected:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("Pixel ({x}, {y}) is outside a {width}x{height} image")]
    OutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    #[error("Image codec error: {0}")]
    Image(#[from] image::ImageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("XML parse error: {0}")]
    XmlParse(quick_xml::DeError),
    #[error("XML write error: {0}")]
    XmlWrite(quick_xml::SeError),
    /// The capture provider could not produce a screenshot.
    #[error("Capture failed: {0}")]
    Capture(String),
    /// A capture was submitted after the scan reached its final state.
    #[error("Scan is already complete")]
    SessionFinished,
    #[error("Background scan worker is no longer running")]
    WorkerDisconnected,
}

impl Error {
    /// Shorthand for a dimension mismatch between two `(width, height)` pairs.
    pub fn dimensions(expected: (u32, u32), actual: (u32, u32)) -> Self {
        Error::DimensionMismatch { expected, actual }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
