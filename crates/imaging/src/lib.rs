//! Photoview Imaging Library
//!
//! ARGB32 pixel buffers and the pure pixel operations used for thumbnails,
//! full-size photos and themed icons.

mod error;
mod pixmap;
pub mod transform;

pub use error::{ImagingError, Result};
pub use pixmap::Pixmap;
pub use transform::{overlay_color, scale, set_alpha, subtract_color};
