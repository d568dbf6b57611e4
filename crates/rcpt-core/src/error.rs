//! Error types for the rcpt-core library.

use thiserror::Error;

/// Main error type for the rcpt library.
#[derive(Error, Debug)]
pub enum RcptError {
    /// Receipt extraction error.
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Inference error from the inference layer.
    #[error("inference error: {0}")]
    Inference(#[from] rcpt_inference::InferenceError),

    /// Image processing error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors raised while turning a receipt image into a structured record.
///
/// Any of these means the submission failed as a whole; no partial record
/// is ever returned alongside them.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// The upload is not a PNG or JPEG image.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// The image bytes could not be decoded.
    #[error("failed to decode image: {0}")]
    ImageDecode(String),

    /// Image preprocessing failed.
    #[error("preprocessing failed: {0}")]
    Preprocessing(String),

    /// The encoder or decoder session failed.
    #[error("model call failed: {0}")]
    Inference(#[from] rcpt_inference::InferenceError),

    /// The model returned tensors of an unexpected shape.
    #[error("unexpected model output: {0}")]
    ModelOutput(String),

    /// Tokenizer load, encode or decode failure.
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// The cleaned tag sequence could not be turned into a record.
    #[error("failed to convert model output: {0}")]
    Conversion(String),
}

/// Result type for the rcpt library.
pub type Result<T> = std::result::Result<T, RcptError>;
