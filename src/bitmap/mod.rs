//! Owned RGBA8 pixel buffers and the coordinate packing used by projection maps.

mod coords;

pub use coords::{
    pack, pack_x, pack_y, unpack, unpack_x, unpack_y, Coordinate, COORDINATE_BITS, COORDINATE_MASK,
    COORDINATE_SPACE, MAPPED_ALPHA,
};

use crate::error::{Error, Result};
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageFormat, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A single RGBA8 pixel.
pub type Pixel = Rgba<u8>;

/// Fully transparent black.
pub const TRANSPARENT: Pixel = Rgba([0, 0, 0, 0]);
/// Opaque black.
pub const BLACK: Pixel = Rgba([0, 0, 0, 255]);
/// Opaque white.
pub const WHITE: Pixel = Rgba([255, 255, 255, 255]);

/// File formats a texture can be written as.
///
/// Projection maps are always written as PNG since the coordinate data lives
/// bit-exactly in the color channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextureFormat {
    /// Pick the format from the file extension.
    #[default]
    Auto,
    Png,
    Tga,
    Bmp,
    Tiff,
}

impl TextureFormat {
    fn resolve(self, path: &Path) -> Result<ImageFormat> {
        match self {
            TextureFormat::Png => Ok(ImageFormat::Png),
            TextureFormat::Tga => Ok(ImageFormat::Tga),
            TextureFormat::Bmp => Ok(ImageFormat::Bmp),
            TextureFormat::Tiff => Ok(ImageFormat::Tiff),
            TextureFormat::Auto => match ImageFormat::from_path(path)? {
                format @ (ImageFormat::Png | ImageFormat::Tga | ImageFormat::Bmp | ImageFormat::Tiff) => {
                    Ok(format)
                }
                other => Err(Error::Configuration(format!(
                    "Unsupported texture format {:?} for {}",
                    other,
                    path.display()
                ))),
            },
        }
    }
}

/// An owned, row-major buffer of RGBA8 pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelImage {
    buffer: RgbaImage,
}

impl PixelImage {
    /// Create a fully transparent black image.
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, TRANSPARENT)
    }

    /// Create an image with every pixel set to `color`.
    pub fn filled(width: u32, height: u32, color: Pixel) -> Self {
        Self {
            buffer: RgbaImage::from_pixel(width, height, color),
        }
    }

    /// Build an image by evaluating `f` at every pixel.
    pub fn from_fn(width: u32, height: u32, f: impl FnMut(u32, u32) -> Pixel) -> Self {
        Self {
            buffer: RgbaImage::from_fn(width, height, f),
        }
    }

    pub fn from_rgba(buffer: RgbaImage) -> Self {
        Self { buffer }
    }

    pub fn into_rgba(self) -> RgbaImage {
        self.buffer
    }

    pub fn as_rgba(&self) -> &RgbaImage {
        &self.buffer
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    fn check_bounds(&self, x: u32, y: u32) -> Result<()> {
        if x < self.width() && y < self.height() {
            Ok(())
        } else {
            Err(Error::OutOfBounds {
                x,
                y,
                width: self.width(),
                height: self.height(),
            })
        }
    }

    /// Read a pixel.
    pub fn get(&self, x: u32, y: u32) -> Result<Pixel> {
        self.check_bounds(x, y)?;
        Ok(*self.buffer.get_pixel(x, y))
    }

    /// Overwrite a pixel.
    pub fn set(&mut self, x: u32, y: u32, pixel: Pixel) -> Result<()> {
        self.check_bounds(x, y)?;
        self.buffer.put_pixel(x, y, pixel);
        Ok(())
    }

    /// Mutable access to a pixel.
    pub fn get_mut(&mut self, x: u32, y: u32) -> Result<&mut Pixel> {
        self.check_bounds(x, y)?;
        Ok(self.buffer.get_pixel_mut(x, y))
    }

    /// Iterate over `(x, y, pixel)` in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = (u32, u32, &Pixel)> {
        self.buffer.enumerate_pixels()
    }

    pub fn pixels_mut(&mut self) -> impl Iterator<Item = (u32, u32, &mut Pixel)> {
        self.buffer.enumerate_pixels_mut()
    }

    /// Fail with [`Error::DimensionMismatch`] unless `other` has our size.
    pub fn ensure_same_size(&self, other: &PixelImage) -> Result<()> {
        if self.dimensions() == other.dimensions() {
            Ok(())
        } else {
            Err(Error::dimensions(self.dimensions(), other.dimensions()))
        }
    }

    /// Luma conversion used for every captured screenshot.
    pub fn to_luma(&self) -> GrayImage {
        imageops::grayscale(&self.buffer)
    }

    /// Composite `other` over this image at the given opacity (0.0-1.0).
    ///
    /// Used to preview an overlay on top of a projection map.
    pub fn layer(&self, other: &PixelImage, opacity: f32) -> Result<PixelImage> {
        self.ensure_same_size(other)?;
        let opacity = opacity.clamp(0.0, 1.0);

        let mut combined = self.clone();
        for ((_, _, dst), src) in combined.pixels_mut().zip(other.buffer.pixels()) {
            let a = src[3] as f32 / 255.0 * opacity;
            let dst_a = dst[3] as f32 / 255.0;
            let out_a = a + dst_a * (1.0 - a);
            if out_a <= 0.0 {
                *dst = TRANSPARENT;
                continue;
            }
            for c in 0..3 {
                let blended = (src[c] as f32 * a + dst[c] as f32 * dst_a * (1.0 - a)) / out_a;
                dst[c] = blended.round().clamp(0.0, 255.0) as u8;
            }
            dst[3] = (out_a * 255.0).round() as u8;
        }
        Ok(combined)
    }

    /// Bicubic resample to a new size.
    pub fn scaled(&self, width: u32, height: u32) -> PixelImage {
        if (width, height) == self.dimensions() {
            return self.clone();
        }
        PixelImage::from_rgba(imageops::resize(&self.buffer, width, height, FilterType::CatmullRom))
    }

    /// Load any image the `image` crate can decode, converting to RGBA8.
    pub fn load(path: impl AsRef<Path>) -> Result<PixelImage> {
        let path = path.as_ref();
        let image = image::open(path)?;
        log::debug!("Loaded {} ({}x{})", path.display(), image.width(), image.height());
        Ok(PixelImage::from_rgba(image.to_rgba8()))
    }

    /// Write the image as PNG, TGA, BMP or TIFF.
    pub fn save(&self, path: impl AsRef<Path>, format: TextureFormat) -> Result<()> {
        let path = path.as_ref();
        let format = format.resolve(path)?;
        self.buffer.save_with_format(path, format)?;
        log::debug!("Saved {} as {:?}", path.display(), format);
        Ok(())
    }
}
