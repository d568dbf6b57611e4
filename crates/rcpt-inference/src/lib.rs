//! ONNX inference abstraction layer for rcpt.
//!
//! The receipt model ships as two ONNX graphs (a vision encoder and a text
//! decoder). This crate hides the runtime behind [`InferenceBackend`] so the
//! decoding loop in `rcpt-core` can be driven by ONNX Runtime in production
//! and by in-memory fakes in tests.

mod backend;
mod error;
mod tensor;

pub use backend::InferenceBackend;
pub use error::InferenceError;
pub use tensor::{InputTensor, OutputTensor, TensorType};

#[cfg(feature = "native")]
pub use backend::ort::OrtBackend;

/// Result type for inference operations.
pub type Result<T> = std::result::Result<T, InferenceError>;
