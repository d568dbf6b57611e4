//! Inference errors.

use thiserror::Error;

/// Failure loading or running an encoder/decoder graph.
#[derive(Error, Debug)]
pub enum InferenceError {
    /// The ONNX graph could not be parsed.
    #[error("failed to load ONNX graph: {0}")]
    ModelLoad(String),

    /// Session options or execution providers were rejected.
    #[error("failed to build session: {0}")]
    SessionCreate(String),

    /// Input tensor data does not match its declared shape.
    #[error("invalid input tensor: {0}")]
    InvalidInput(String),

    #[error("inference failed: {0}")]
    InferenceFailed(String),

    /// An output tensor had an unsupported element type or inconsistent shape.
    #[error("failed to read output tensor: {0}")]
    OutputExtraction(String),

    /// A named output was not produced by the model.
    #[error("model produced no output named '{0}'")]
    MissingOutput(String),

    /// The model file could not be read.
    #[error("failed to read model file: {0}")]
    Io(#[from] std::io::Error),
}
