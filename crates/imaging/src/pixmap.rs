//! Decoded ARGB32 image buffer.

use crate::{transform, ImagingError, Result};
use image::RgbaImage;

/// A decoded image in row-major ARGB32 (`0xAARRGGBB`) layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pixmap {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl Pixmap {
    /// Wraps an existing pixel buffer.
    pub fn from_argb(width: u32, height: u32, pixels: Vec<u32>) -> Result<Self> {
        if pixels.len() != width as usize * height as usize {
            return Err(ImagingError::InvalidArgument(format!(
                "buffer holds {} pixels, expected {}x{}",
                pixels.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Decodes any format supported by the `image` crate (JPEG and PNG for
    /// photo feeds).
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let rgba = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = rgba.dimensions();

        let pixels = rgba
            .pixels()
            .map(|p| {
                let [r, g, b, a] = p.0;
                (u32::from(a) << 24) | (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b)
            })
            .collect();

        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Shrinks the image so neither side exceeds the given bounds, keeping
    /// its aspect ratio. Images already within bounds are returned as-is.
    pub fn fit_within(self, max_width: u32, max_height: u32) -> Result<Self> {
        if self.width <= max_width && self.height <= max_height {
            return Ok(self);
        }
        if max_width == 0 || max_height == 0 {
            return Err(ImagingError::InvalidArgument(
                "bounds must be non-zero".to_string(),
            ));
        }

        let ratio_w = max_width as f64 / self.width as f64;
        let ratio_h = max_height as f64 / self.height as f64;
        let ratio = ratio_w.min(ratio_h);
        let new_width = ((self.width as f64 * ratio).floor() as u32).max(1);
        let new_height = ((self.height as f64 * ratio).floor() as u32).max(1);

        self.scaled(new_width, new_height)
    }

    /// Returns a nearest-neighbour resampled copy.
    pub fn scaled(&self, new_width: u32, new_height: u32) -> Result<Self> {
        let pixels = transform::scale(&self.pixels, self.width, self.height, new_width, new_height)?;
        Ok(Self {
            width: new_width,
            height: new_height,
            pixels,
        })
    }

    /// Converts to an RGBA image for encoding.
    pub fn to_rgba_image(&self) -> RgbaImage {
        RgbaImage::from_fn(self.width, self.height, |x, y| {
            let p = self.pixels[(y * self.width + x) as usize];
            image::Rgba([(p >> 16) as u8, (p >> 8) as u8, p as u8, (p >> 24) as u8])
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u32] {
        &mut self.pixels
    }

    /// Memory footprint of the pixel data in bytes.
    pub fn byte_size(&self) -> usize {
        self.pixels.len() * std::mem::size_of::<u32>()
    }
}
