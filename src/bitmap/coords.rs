//! 12-bit texture coordinates packed into pixel color channels.
//!
//! Layout (per pixel):
//! - X = `G << 4 | (R & 0x0F)`
//! - Y = `B << 4 | (R >> 4)`
//! - A = 255 when the pixel carries a valid coordinate
//!
//! The two nibbles of the red channel are owned by separate axes, so writing
//! one axis never disturbs the other.

use super::Pixel;

/// Bits per coordinate axis.
pub const COORDINATE_BITS: u32 = 12;
/// Size of the coordinate space (4096).
pub const COORDINATE_SPACE: u32 = 1 << COORDINATE_BITS;
pub const COORDINATE_MASK: u32 = COORDINATE_SPACE - 1;
/// Alpha value marking a pixel as carrying a valid coordinate.
pub const MAPPED_ALPHA: u8 = 255;

/// A destination location in the 4096x4096 coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Coordinate {
    pub x: u32,
    pub y: u32,
}

impl Coordinate {
    pub fn new(x: u32, y: u32) -> Self {
        Self {
            x: x & COORDINATE_MASK,
            y: y & COORDINATE_MASK,
        }
    }

    /// Scale down to a texel in a `2^texture_size` square texture.
    pub fn to_texel(self, texture_size: u32) -> (u32, u32) {
        let shift = COORDINATE_BITS - texture_size.min(COORDINATE_BITS);
        (self.x >> shift, self.y >> shift)
    }
}

/// Store `x` (masked to 12 bits) in the G channel and low nibble of R.
pub fn pack_x(pixel: &mut Pixel, x: u32) {
    let x = x & COORDINATE_MASK;
    pixel[0] = (pixel[0] & 0xF0) | (x & 0x0F) as u8;
    pixel[1] = (x >> 4) as u8;
}

/// Store `y` (masked to 12 bits) in the B channel and high nibble of R.
pub fn pack_y(pixel: &mut Pixel, y: u32) {
    let y = y & COORDINATE_MASK;
    pixel[0] = (pixel[0] & 0x0F) | (((y & 0x0F) as u8) << 4);
    pixel[2] = (y >> 4) as u8;
}

pub fn unpack_x(pixel: &Pixel) -> u32 {
    ((pixel[1] as u32) << 4) | (pixel[0] as u32 & 0x0F)
}

pub fn unpack_y(pixel: &Pixel) -> u32 {
    ((pixel[2] as u32) << 4) | ((pixel[0] as u32 >> 4) & 0x0F)
}

pub fn pack(pixel: &mut Pixel, coordinate: Coordinate) {
    pack_x(pixel, coordinate.x);
    pack_y(pixel, coordinate.y);
}

pub fn unpack(pixel: &Pixel) -> Coordinate {
    Coordinate {
        x: unpack_x(pixel),
        y: unpack_y(pixel),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_round_trip_all_coordinates() {
        for x in 0..COORDINATE_SPACE {
            for y in (0..COORDINATE_SPACE).step_by(7).chain([COORDINATE_MASK]) {
                let mut xy = Rgba([0, 0, 0, 255]);
                pack_y(&mut xy, y);
                pack_x(&mut xy, x);

                let mut yx = Rgba([0xAB, 0xCD, 0xEF, 255]);
                pack_x(&mut yx, x);
                pack_y(&mut yx, y);

                assert_eq!(unpack_x(&xy), x);
                assert_eq!(unpack_y(&xy), y);
                assert_eq!(xy, yx, "packing order changed the pixel for ({}, {})", x, y);
            }
        }
    }

    #[test]
    fn test_axes_are_independent() {
        let mut pixel = Rgba([0, 0, 0, 255]);
        pack_y(&mut pixel, 0xABC);
        pack_x(&mut pixel, 0x123);
        pack_x(&mut pixel, 0xFFF);
        assert_eq!(unpack_y(&pixel), 0xABC);
        pack_y(&mut pixel, 0);
        assert_eq!(unpack_x(&pixel), 0xFFF);
        assert_eq!(pixel[3], 255);
    }

    #[test]
    fn test_out_of_range_wraps() {
        let mut pixel = Rgba([0, 0, 0, 0]);
        pack_x(&mut pixel, 4096 + 5);
        pack_y(&mut pixel, 0x1_0FFF);
        assert_eq!(unpack_x(&pixel), 5);
        assert_eq!(unpack_y(&pixel), 0xFFF);
    }

    #[test]
    fn test_channel_layout() {
        let mut pixel = Rgba([0, 0, 0, 255]);
        pack(&mut pixel, Coordinate::new(0x123, 0x456));
        assert_eq!(pixel, Rgba([0x63, 0x12, 0x45, 255]));
    }

    #[test]
    fn test_to_texel() {
        let coord = Coordinate::new(256 * 5 + 17, 4095);
        assert_eq!(coord.to_texel(4), (5, 15));
        assert_eq!(coord.to_texel(12), (256 * 5 + 17, 4095));
    }
}
