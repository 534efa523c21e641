//! Stateless pixel operations on row-major ARGB32 buffers.
//!
//! Every operation validates its arguments before touching the buffer, so an
//! `InvalidArgument` error always leaves the input unmodified.

use crate::{ImagingError, Result};

const ALPHA_MASK: u32 = 0xFF00_0000;
const RGB_MASK: u32 = 0x00FF_FFFF;

fn check_channel(name: &str, value: u32) -> Result<()> {
    if value > 255 {
        return Err(ImagingError::InvalidArgument(format!(
            "{name} must be in [0, 255], got {value}"
        )));
    }
    Ok(())
}

/// Applies `alpha` to every fully opaque pixel.
///
/// Pixels whose alpha is already below 255 keep their value, so anti-aliased
/// edges of an icon are not flattened.
pub fn set_alpha(pixels: &mut [u32], alpha: u32) -> Result<()> {
    check_channel("alpha", alpha)?;

    for pixel in pixels.iter_mut() {
        if *pixel >> 24 == 0xFF {
            *pixel = (alpha << 24) | (*pixel & RGB_MASK);
        }
    }

    Ok(())
}

/// Subtracts `r`, `g` and `b` from the matching channels, saturating at zero.
///
/// The alpha channel is preserved.
pub fn subtract_color(pixels: &mut [u32], r: u32, g: u32, b: u32) -> Result<()> {
    check_channel("red", r)?;
    check_channel("green", g)?;
    check_channel("blue", b)?;

    for pixel in pixels.iter_mut() {
        let a = *pixel & ALPHA_MASK;
        let pr = ((*pixel >> 16) & 0xFF).saturating_sub(r);
        let pg = ((*pixel >> 8) & 0xFF).saturating_sub(g);
        let pb = (*pixel & 0xFF).saturating_sub(b);
        *pixel = a | (pr << 16) | (pg << 8) | pb;
    }

    Ok(())
}

/// Nearest-neighbour resample of a `width` x `height` buffer.
///
/// Source coordinates are picked with integer division
/// (`src_x = dst_x * width / new_width`), so scaling to the current size
/// returns an identical buffer.
pub fn scale(
    pixels: &[u32],
    width: u32,
    height: u32,
    new_width: u32,
    new_height: u32,
) -> Result<Vec<u32>> {
    if width == 0 || height == 0 || new_width == 0 || new_height == 0 {
        return Err(ImagingError::InvalidArgument(format!(
            "cannot scale {width}x{height} to {new_width}x{new_height}"
        )));
    }

    let (src_w, src_h) = (width as usize, height as usize);
    let (dst_w, dst_h) = (new_width as usize, new_height as usize);

    if pixels.len() != src_w * src_h {
        return Err(ImagingError::InvalidArgument(format!(
            "buffer holds {} pixels, expected {}",
            pixels.len(),
            src_w * src_h
        )));
    }

    let mut scaled = Vec::with_capacity(dst_w * dst_h);
    for y in 0..dst_h {
        let sy = y * src_h / dst_h;
        let row = &pixels[sy * src_w..(sy + 1) * src_w];
        for x in 0..dst_w {
            scaled.push(row[x * src_w / dst_w]);
        }
    }

    Ok(scaled)
}

/// Replaces the RGB channels of every pixel with `color`, keeping each
/// pixel's own alpha. Used to tint single-colour icons to the theme.
pub fn overlay_color(pixels: &mut [u32], color: u32) {
    let rgb = color & RGB_MASK;
    for pixel in pixels.iter_mut() {
        *pixel = (*pixel & ALPHA_MASK) | rgb;
    }
}
