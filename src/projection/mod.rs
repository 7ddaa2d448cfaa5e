//! Projecting a source image through a finished projection map.
//!
//! Every mappable map pixel names a destination texel; the overlay pixel at
//! the same screen position is folded into that texel with an alpha-weighted
//! running average. Many screen pixels can land on one texel and all of them
//! contribute.

mod holes;

pub use holes::HoleFiller;

use crate::bitmap::{unpack, PixelImage, COORDINATE_BITS, MAPPED_ALPHA};
use crate::error::{Error, Result};
use image::{GrayImage, Luma, Rgba};
use serde::{Deserialize, Serialize};

/// Opacity of the overlay when previewing it on top of the map.
pub const PREVIEW_OPACITY: f32 = 0.5;

/// Output texture and per-texel sample counters.
#[derive(Debug, Clone)]
pub struct SampleAccumulator {
    texture: PixelImage,
    counts: GrayImage,
}

impl SampleAccumulator {
    /// Fully transparent `size` x `size` texture with zeroed counters.
    pub fn new(size: u32) -> Self {
        Self {
            texture: PixelImage::new(size, size),
            counts: GrayImage::new(size, size),
        }
    }

    pub fn sample_count(&self, x: u32, y: u32) -> Option<u8> {
        self.counts.get_pixel_checked(x, y).map(|p| p[0])
    }

    /// Fold `sample` into texel `(x, y)`.
    ///
    /// Alpha becomes the sample-count weighted mean of the alphas; colors are
    /// weighted by alpha. Zero total weight resolves to transparent black.
    pub fn add(&mut self, x: u32, y: u32, sample: Rgba<u8>) -> Result<()> {
        let current = self.texture.get(x, y)?;
        let count = self.counts.get_pixel(x, y)[0];
        let n = count as f64;

        let old_alpha = current[3] as f64;
        let new_alpha = sample[3] as f64;
        let total_alpha = old_alpha * n + new_alpha;

        let blended = if total_alpha == 0.0 {
            Rgba([0, 0, 0, 0])
        } else {
            let channel = |c: usize| {
                let weighted = current[c] as f64 * old_alpha * n + sample[c] as f64 * new_alpha;
                (weighted / total_alpha) as u8
            };
            let alpha = (current[3] as u32 * count as u32 + sample[3] as u32) / (count as u32 + 1);
            Rgba([channel(0), channel(1), channel(2), alpha as u8])
        };

        self.texture.set(x, y, blended)?;
        self.counts.put_pixel(x, y, Luma([count.saturating_add(1)]));
        Ok(())
    }

    pub fn into_texture(self) -> PixelImage {
        self.texture
    }
}

/// Scatters overlay pixels into texture space through a projection map.
pub struct Projector;

impl Projector {
    /// Build a `2^texture_size` square texture from `overlay` using `map`.
    ///
    /// `overlay` must have the same dimensions as `map`.
    pub fn project(map: &PixelImage, overlay: &PixelImage, texture_size: u32) -> Result<PixelImage> {
        if !(1..=COORDINATE_BITS).contains(&texture_size) {
            return Err(Error::Configuration(format!(
                "texture size {} must be between 1 and {}",
                texture_size, COORDINATE_BITS
            )));
        }
        map.ensure_same_size(overlay)?;

        let mut accumulator = SampleAccumulator::new(1 << texture_size);
        let mut projected = 0usize;

        for ((_, _, map_pixel), source) in map.pixels().zip(overlay.as_rgba().pixels()) {
            if map_pixel[3] != MAPPED_ALPHA {
                continue;
            }
            let (tx, ty) = unpack(map_pixel).to_texel(texture_size);
            accumulator.add(tx, ty, *source)?;
            projected += 1;
        }

        log::info!(
            "Projected {} pixels into a {}x{} texture",
            projected,
            1u32 << texture_size,
            1u32 << texture_size
        );
        Ok(accumulator.into_texture())
    }

    /// The overlay composited over the map at [`PREVIEW_OPACITY`].
    pub fn preview(map: &PixelImage, overlay: &PixelImage) -> Result<PixelImage> {
        map.layer(overlay, PREVIEW_OPACITY)
    }
}

/// Project, repair holes and rescale in one go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionJob {
    /// log2 of the projected texture size.
    pub texture_size: u32,
    /// log2 of the saved texture size; `None` keeps the projected size.
    pub output_size: Option<u32>,
    /// Hole filling passes, 0 disables.
    pub fill_passes: u32,
}

impl ProjectionJob {
    pub fn run(&self, map: &PixelImage, overlay: &PixelImage) -> Result<PixelImage> {
        let mut texture = Projector::project(map, overlay, self.texture_size)?;

        if self.fill_passes > 0 {
            let filled = HoleFiller::fill(&mut texture, self.fill_passes)?;
            log::info!("Filled {} holes", filled);
        }

        match self.output_size {
            Some(size) if size != self.texture_size => {
                let side = 1 << size.min(COORDINATE_BITS);
                Ok(texture.scaled(side, side))
            }
            _ => Ok(texture),
        }
    }
}
