//! Binary stimulus textures for structured light texture scans.

use crate::bitmap::{Pixel, PixelImage, BLACK, WHITE};
use serde::{Deserialize, Serialize};

/// Axis a bit-plane is resolved on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanAxis {
    /// Stripes selected by the texel column, decode X coordinate.
    Horizontal,
    /// Stripes selected by the texel row, decode Y coordinate.
    Vertical,
}

impl ScanAxis {
    /// The texel coordinate this axis selects on.
    pub fn select(self, x: u32, y: u32) -> u32 {
        match self {
            ScanAxis::Horizontal => x,
            ScanAxis::Vertical => y,
        }
    }
}

impl std::fmt::Display for ScanAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanAxis::Horizontal => write!(f, "Horizontal"),
            ScanAxis::Vertical => write!(f, "Vertical"),
        }
    }
}

/// Description of a stimulus without the rendered pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stimulus {
    /// All-black reference.
    Black,
    /// All-white reference.
    White,
    /// White wherever the selected coordinate has `1 << bit` set.
    Mask { axis: ScanAxis, bit: u32 },
}

impl Stimulus {
    /// Render at `size` x `size`.
    pub fn render(&self, size: u32) -> PixelImage {
        match *self {
            Stimulus::Black => PatternGenerator::solid(size, BLACK),
            Stimulus::White => PatternGenerator::solid(size, WHITE),
            Stimulus::Mask { axis, bit } => {
                PatternGenerator::axis_mask(size, size, 1 << bit, axis, WHITE, BLACK)
            }
        }
    }
}

impl std::fmt::Display for Stimulus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stimulus::Black => write!(f, "All Black"),
            Stimulus::White => write!(f, "All White"),
            Stimulus::Mask { axis, bit } => write!(f, "{} {}", axis, 1u32 << bit),
        }
    }
}

/// Deterministic generator for scan textures.
pub struct PatternGenerator;

impl PatternGenerator {
    /// `size` x `size` image of a single color.
    pub fn solid(size: u32, color: Pixel) -> PixelImage {
        PixelImage::filled(size, size, color)
    }

    /// Pixel `(x, y)` is `match_color` when the axis coordinate has any bit of
    /// `bit_value` set, otherwise `no_match_color`.
    pub fn axis_mask(
        width: u32,
        height: u32,
        bit_value: u32,
        axis: ScanAxis,
        match_color: Pixel,
        no_match_color: Pixel,
    ) -> PixelImage {
        PixelImage::from_fn(width, height, |x, y| {
            if axis.select(x, y) & bit_value != 0 {
                match_color
            } else {
                no_match_color
            }
        })
    }

    /// Checkerboard test texture with cells of `2^(texture_size - scan_size)` texels.
    pub fn checkerboard(texture_size: u32, scan_size: u32, black: Pixel, white: Pixel) -> PixelImage {
        let size = 1 << texture_size;
        let shift = texture_size.saturating_sub(scan_size);
        PixelImage::from_fn(size, size, |x, y| {
            let h = (x >> shift) & 1 == 1;
            let v = (y >> shift) & 1 == 1;
            if h != v {
                white
            } else {
                black
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_mask_is_deterministic() {
        let a = PatternGenerator::axis_mask(64, 32, 8, ScanAxis::Horizontal, WHITE, BLACK);
        let b = PatternGenerator::axis_mask(64, 32, 8, ScanAxis::Horizontal, WHITE, BLACK);
        assert_eq!(a, b);
    }

    #[test]
    fn test_axis_mask_stripes() {
        let h = PatternGenerator::axis_mask(16, 16, 4, ScanAxis::Horizontal, WHITE, BLACK);
        assert_eq!(h.get(3, 9).unwrap(), BLACK);
        assert_eq!(h.get(4, 0).unwrap(), WHITE);
        assert_eq!(h.get(7, 15).unwrap(), WHITE);
        assert_eq!(h.get(8, 5).unwrap(), BLACK);

        let v = PatternGenerator::axis_mask(16, 16, 4, ScanAxis::Vertical, WHITE, BLACK);
        assert_eq!(v.get(4, 0).unwrap(), BLACK);
        assert_eq!(v.get(0, 4).unwrap(), WHITE);
    }

    #[test]
    fn test_stimulus_render() {
        assert_eq!(Stimulus::Black.render(4), PatternGenerator::solid(4, BLACK));
        let mask = Stimulus::Mask { axis: ScanAxis::Vertical, bit: 1 }.render(8);
        assert_eq!(mask.get(0, 2).unwrap(), WHITE);
        assert_eq!(mask.get(2, 1).unwrap(), BLACK);
        assert_eq!(Stimulus::Mask { axis: ScanAxis::Horizontal, bit: 3 }.to_string(), "Horizontal 8");
    }

    #[test]
    fn test_checkerboard_cells() {
        let board = PatternGenerator::checkerboard(4, 2, BLACK, WHITE);
        assert_eq!(board.dimensions(), (16, 16));
        assert_eq!(board.get(0, 0).unwrap(), BLACK);
        assert_eq!(board.get(4, 0).unwrap(), WHITE);
        assert_eq!(board.get(4, 4).unwrap(), BLACK);
        assert_eq!(board.get(3, 7).unwrap(), WHITE);
    }
}
