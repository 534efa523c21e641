use thiserror::Error;

/// Errors produced by pixel operations and image decoding.
#[derive(Debug, Error)]
pub enum ImagingError {
    /// A parameter was outside its valid range. Nothing was modified.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The encoded bytes could not be decoded into pixels.
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, ImagingError>;
