//! Per-pixel classification of a capture against the black/white references.
//!
//! Three strategies share the [`ResponseClassifier`] interface:
//! - [`ExactMatch`] - luma must equal one reference exactly
//! - [`ContrastBlend`] - hard-light blend of the distances, binarized at 0.5
//! - [`MarginMatch`] - normalized distances with an ambiguity margin (default)

use crate::error::{Error, Result};
use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Smallest white-minus-black luma span that can still be discriminated.
pub const MIN_SPAN: u8 = 16;
/// Default ambiguity margin for [`MarginMatch`].
pub const DEFAULT_MATCH_MARGIN: f32 = 0.5;
/// Binarization threshold of the contrast blend.
const CONTRAST_THRESHOLD: f32 = 0.5;

/// Outcome of classifying one pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Response {
    MatchedWhite,
    MatchedBlack,
    /// Too close to call; the pixel becomes permanently unmappable.
    Ambiguous,
}

/// Strategy deciding whether a captured pixel responded as white or black.
pub trait ResponseClassifier: Send + Sync {
    /// Classify a single luma sample against its references.
    fn classify_pixel(&self, capture: u8, black: u8, white: u8) -> Response;

    /// Classify every pixel of a greyscale capture.
    fn classify(&self, capture: &GrayImage, black: &GrayImage, white: &GrayImage) -> Result<Vec<Response>> {
        for reference in [black, white] {
            if reference.dimensions() != capture.dimensions() {
                return Err(Error::dimensions(reference.dimensions(), capture.dimensions()));
            }
        }

        Ok(capture
            .pixels()
            .zip(black.pixels())
            .zip(white.pixels())
            .map(|((c, b), w)| self.classify_pixel(c[0], b[0], w[0]))
            .collect())
    }
}

/// Matches only when the capture equals exactly one of the references.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatch;

impl ResponseClassifier for ExactMatch {
    fn classify_pixel(&self, capture: u8, black: u8, white: u8) -> Response {
        match (capture == white, capture == black) {
            (true, false) => Response::MatchedWhite,
            (false, true) => Response::MatchedBlack,
            _ => Response::Ambiguous,
        }
    }
}

/// Hard-light blend of "whiter" over "blacker", binarized at 0.5.
///
/// Never reports [`Response::Ambiguous`]; pixels whose references do not
/// differ are already excluded when the projection map is initialized.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContrastBlend;

impl ContrastBlend {
    fn hard_light(backdrop: f32, source: f32) -> f32 {
        if source <= 0.5 {
            backdrop * 2.0 * source
        } else {
            1.0 - (1.0 - backdrop) * (1.0 - (2.0 * source - 1.0))
        }
    }
}

impl ResponseClassifier for ContrastBlend {
    fn classify_pixel(&self, capture: u8, black: u8, white: u8) -> Response {
        let whiter = 1.0 - white.saturating_sub(capture) as f32 / 255.0;
        let blacker = capture.saturating_sub(black) as f32 / 255.0;

        if Self::hard_light(whiter, blacker) >= CONTRAST_THRESHOLD {
            Response::MatchedWhite
        } else {
            Response::MatchedBlack
        }
    }
}

/// Normalized distance to each reference, ambiguous within `margin`.
#[derive(Debug, Clone, Copy)]
pub struct MarginMatch {
    pub margin: f32,
}

impl Default for MarginMatch {
    fn default() -> Self {
        Self {
            margin: DEFAULT_MATCH_MARGIN,
        }
    }
}

impl ResponseClassifier for MarginMatch {
    fn classify_pixel(&self, capture: u8, black: u8, white: u8) -> Response {
        let span = white.saturating_sub(black);
        if span < MIN_SPAN {
            return Response::Ambiguous;
        }

        let black_dist = capture.saturating_sub(black);
        let white_dist = white.saturating_sub(capture);
        let dist_black = black_dist as f32 / span as f32;
        let dist_white = white_dist as f32 / span as f32;

        if (dist_black - dist_white).abs() <= self.margin {
            Response::Ambiguous
        } else if white_dist < black_dist {
            Response::MatchedWhite
        } else {
            Response::MatchedBlack
        }
    }
}

/// Serializable selector for a classification strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClassifierKind {
    Exact,
    Contrast,
    #[default]
    Margin,
}

impl ClassifierKind {
    /// Instantiate the strategy. `margin` is only used by [`ClassifierKind::Margin`].
    pub fn build(self, margin: f32) -> Box<dyn ResponseClassifier> {
        match self {
            ClassifierKind::Exact => Box::new(ExactMatch),
            ClassifierKind::Contrast => Box::new(ContrastBlend),
            ClassifierKind::Margin => Box::new(MarginMatch { margin }),
        }
    }
}
