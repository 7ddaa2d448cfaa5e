//! Filling single-texel holes left in a projected texture.

use crate::bitmap::{Pixel, PixelImage};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Up,
    Down,
    Left,
    Right,
}

use Side::*;

/// Neighbour sets tried in priority order; the first set with no transparent
/// texel wins.
const RULES: [&[Side]; 7] = [
    &[Up, Down, Left, Right],
    &[Up, Down],
    &[Left, Right],
    &[Up, Down, Left],
    &[Up, Down, Right],
    &[Up, Left, Right],
    &[Down, Left, Right],
];

/// Repairs fully transparent interior texels from their non-transparent neighbours.
pub struct HoleFiller;

impl HoleFiller {
    /// Run up to `passes` passes over `texture`, returning the number of texels filled.
    ///
    /// Border texels are never touched. Texels filled earlier in a pass count
    /// as neighbours for later ones. Stops early once a pass fills nothing.
    pub fn fill(texture: &mut PixelImage, passes: u32) -> Result<usize> {
        let (width, height) = texture.dimensions();
        if width < 3 || height < 3 {
            return Ok(0);
        }

        let mut total = 0;
        for pass in 0..passes {
            let mut filled = 0;
            for x in 1..width - 1 {
                for y in 1..height - 1 {
                    if Self::fill_texel(texture, x, y)? {
                        filled += 1;
                    }
                }
            }
            log::debug!("Hole filling pass {} filled {} texels", pass + 1, filled);
            total += filled;
            if filled == 0 {
                break;
            }
        }
        Ok(total)
    }

    fn fill_texel(texture: &mut PixelImage, x: u32, y: u32) -> Result<bool> {
        let image = texture.as_rgba();
        if image.get_pixel(x, y)[3] != 0 {
            return Ok(false);
        }

        let neighbour = |side: Side| -> Pixel {
            match side {
                Up => *image.get_pixel(x, y - 1),
                Down => *image.get_pixel(x, y + 1),
                Left => *image.get_pixel(x - 1, y),
                Right => *image.get_pixel(x + 1, y),
            }
        };

        let Some(rule) = RULES
            .iter()
            .find(|rule| rule.iter().all(|&side| neighbour(side)[3] != 0))
        else {
            return Ok(false);
        };

        let mut sum = [0u32; 4];
        for &side in rule.iter() {
            let pixel = neighbour(side);
            for (acc, channel) in sum.iter_mut().zip(pixel.0) {
                *acc += channel as u32;
            }
        }
        let count = rule.len() as u32;
        let mean = image::Rgba(sum.map(|s| (s / count) as u8));

        *texture.get_mut(x, y)? = mean;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const OPAQUE: Pixel = Rgba([100, 100, 100, 255]);

    #[test]
    fn test_four_neighbour_mean() {
        let mut texture = PixelImage::new(3, 3);
        texture.set(1, 0, Rgba([10, 20, 30, 255])).unwrap();
        texture.set(1, 2, Rgba([20, 30, 40, 255])).unwrap();
        texture.set(0, 1, Rgba([30, 40, 50, 255])).unwrap();
        texture.set(2, 1, Rgba([41, 50, 60, 255])).unwrap();

        assert_eq!(HoleFiller::fill(&mut texture, 1).unwrap(), 1);
        assert_eq!(texture.get(1, 1).unwrap(), Rgba([25, 35, 45, 255]));
    }

    #[test]
    fn test_vertical_pair_before_horizontal() {
        let mut texture = PixelImage::new(3, 3);
        texture.set(1, 0, Rgba([0, 0, 0, 255])).unwrap();
        texture.set(1, 2, Rgba([200, 200, 200, 255])).unwrap();
        texture.set(0, 1, Rgba([50, 50, 50, 128])).unwrap();

        HoleFiller::fill(&mut texture, 1).unwrap();
        assert_eq!(texture.get(1, 1).unwrap(), Rgba([100, 100, 100, 255]));
    }

    #[test]
    fn test_semi_transparent_neighbours_count() {
        let mut texture = PixelImage::new(3, 3);
        texture.set(1, 0, Rgba([10, 20, 30, 128])).unwrap();
        texture.set(1, 2, Rgba([20, 30, 40, 1])).unwrap();
        texture.set(0, 1, Rgba([30, 40, 50, 200])).unwrap();
        texture.set(2, 1, Rgba([41, 50, 60, 254])).unwrap();

        assert_eq!(HoleFiller::fill(&mut texture, 1).unwrap(), 1);
        // (128 + 1 + 200 + 254) / 4 = 145
        assert_eq!(texture.get(1, 1).unwrap(), Rgba([25, 35, 45, 145]));
    }

    #[test]
    fn test_semi_transparent_vertical_pair() {
        let mut texture = PixelImage::new(3, 3);
        texture.set(1, 0, Rgba([200, 0, 0, 127])).unwrap();
        texture.set(1, 2, Rgba([100, 50, 0, 64])).unwrap();

        assert_eq!(HoleFiller::fill(&mut texture, 1).unwrap(), 1);
        assert_eq!(texture.get(1, 1).unwrap(), Rgba([150, 25, 0, 95]));
    }

    #[test]
    fn test_horizontal_pair() {
        let mut texture = PixelImage::new(3, 3);
        texture.set(0, 1, Rgba([10, 0, 0, 255])).unwrap();
        texture.set(2, 1, Rgba([21, 0, 0, 255])).unwrap();

        HoleFiller::fill(&mut texture, 1).unwrap();
        assert_eq!(texture.get(1, 1).unwrap(), Rgba([15, 0, 0, 255]));
    }

    #[test]
    fn test_single_neighbour_left_alone() {
        let mut texture = PixelImage::new(3, 3);
        texture.set(0, 1, OPAQUE).unwrap();
        assert_eq!(HoleFiller::fill(&mut texture, 5).unwrap(), 0);
        assert_eq!(texture.get(1, 1).unwrap()[3], 0);
    }

    #[test]
    fn test_border_untouched() {
        let mut texture = PixelImage::filled(4, 4, OPAQUE);
        texture.set(0, 2, Rgba([0, 0, 0, 0])).unwrap();
        texture.set(3, 3, Rgba([0, 0, 0, 0])).unwrap();

        assert_eq!(HoleFiller::fill(&mut texture, 3).unwrap(), 0);
        assert_eq!(texture.get(0, 2).unwrap()[3], 0);
        assert_eq!(texture.get(3, 3).unwrap()[3], 0);
    }

    #[test]
    fn test_fully_opaque_is_stable() {
        let mut texture = PixelImage::from_fn(6, 6, |x, y| Rgba([x as u8, y as u8, 0, 255]));
        let before = texture.clone();
        assert_eq!(HoleFiller::fill(&mut texture, 4).unwrap(), 0);
        assert_eq!(texture, before);
    }

    #[test]
    fn test_filled_texels_feed_later_ones() {
        // Two-texel vertical hole in an opaque field.
        let mut texture = PixelImage::filled(5, 5, OPAQUE);
        texture.set(2, 1, Rgba([0, 0, 0, 0])).unwrap();
        texture.set(2, 2, Rgba([0, 0, 0, 0])).unwrap();

        assert_eq!(HoleFiller::fill(&mut texture, 1).unwrap(), 2);
        assert_eq!(texture.get(2, 1).unwrap(), OPAQUE);
        assert_eq!(texture.get(2, 2).unwrap(), OPAQUE);
    }
}
