//! Projexture
//!
//! Reverse-projects a flat image onto a 3D model's UV texture using
//! structured light:
//! - Binary stripe stimuli applied as the model's texture
//! - Screenshot classification into a per-pixel texture coordinate map
//! - Alpha-weighted projection of arbitrary overlays through that map
//! - Hole filling of the resulting texture

pub mod bitmap;
pub mod config;
pub mod error;
pub mod projection;
pub mod scan;

pub use error::{Error, Result};
