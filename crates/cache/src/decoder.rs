//! Conversion from fetched bytes to the value a cache hands out.

use crate::{CacheError, Result};
use photoview_imaging::Pixmap;

/// Turns raw bytes (from the network or the persistent store) into the
/// use-form of a cached value.
///
/// Runs on worker threads. A decode error is treated as a failed fetch:
/// nothing is persisted and waiters receive `None`.
pub trait ResourceDecoder<V>: Send + Sync {
    fn decode(&self, key: &str, bytes: &[u8]) -> Result<V>;
}

impl<V, F> ResourceDecoder<V> for F
where
    F: Fn(&str, &[u8]) -> Result<V> + Send + Sync,
{
    fn decode(&self, key: &str, bytes: &[u8]) -> Result<V> {
        self(key, bytes)
    }
}

/// Decodes images and shrinks them to fit the screen.
#[derive(Debug, Clone, Copy)]
pub struct PixmapDecoder {
    max_width: u32,
    max_height: u32,
}

impl PixmapDecoder {
    pub fn new(max_width: u32, max_height: u32) -> Self {
        Self {
            max_width,
            max_height,
        }
    }

    /// Caps images to a `width` x `width` box, so nothing decoded is wider
    /// than the screen.
    pub fn for_screen_width(width: u32) -> Self {
        Self::new(width, width)
    }
}

impl ResourceDecoder<Pixmap> for PixmapDecoder {
    fn decode(&self, key: &str, bytes: &[u8]) -> Result<Pixmap> {
        let unavailable = |e: photoview_imaging::ImagingError| {
            CacheError::ResourceUnavailable(format!("{key}: {e}"))
        };

        Pixmap::decode(bytes)
            .map_err(unavailable)?
            .fit_within(self.max_width, self.max_height)
            .map_err(unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbaImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, image::Rgba([9, 8, 7, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_pixmap_decoder_caps_to_screen_width() {
        let decoder = PixmapDecoder::for_screen_width(240);
        let pixmap = decoder.decode("wide.png", &png(480, 120)).unwrap();

        assert_eq!(pixmap.width(), 240);
        assert_eq!(pixmap.height(), 60);
    }

    #[test]
    fn test_pixmap_decoder_reports_unavailable() {
        let decoder = PixmapDecoder::for_screen_width(240);
        let result = decoder.decode("broken.jpg", b"<html>not found</html>");
        assert!(matches!(result, Err(CacheError::ResourceUnavailable(_))));
    }

    #[test]
    fn test_closure_decoder() {
        let decoder = |_key: &str, bytes: &[u8]| -> Result<Vec<u8>> { Ok(bytes.to_vec()) };
        assert_eq!(decoder.decode("k", b"abc").unwrap(), b"abc");
    }
}
