//! Structured light texture scanning.
//!
//! A [`ScanSession`] walks through black and white references followed by
//! one bit-plane per coordinate bit on each axis, accumulating a projection
//! map from the captured screenshots.

mod classifier;
mod pattern;
mod runner;
mod session;

pub use classifier::{
    ClassifierKind, ContrastBlend, ExactMatch, MarginMatch, Response, ResponseClassifier, DEFAULT_MATCH_MARGIN,
    MIN_SPAN,
};
pub use pattern::{PatternGenerator, ScanAxis, Stimulus};
pub use runner::{
    CaptureProvider, FileStimulusSink, ReplayCapture, ScanRunner, ScanWorker, StimulusSink, WorkerEvent,
};
pub use session::{ScanSession, ScanState};
