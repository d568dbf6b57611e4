//! Inference backend implementations.

#[cfg(feature = "native")]
pub mod ort;

use crate::{InferenceError, InputTensor, OutputTensor, Result};

/// Trait for ONNX inference backends.
///
/// Implementations must be callable from several threads at once: the
/// receipt server shares one loaded model between concurrent requests, so
/// any per-run scratch state has to live inside `run` or behind a lock.
pub trait InferenceBackend: Send + Sync {
    /// Run inference with the given inputs.
    ///
    /// # Arguments
    /// * `inputs` - Named input tensors
    ///
    /// # Returns
    /// Named output tensors from the model
    fn run(&self, inputs: &[(&str, InputTensor)]) -> Result<Vec<(String, OutputTensor)>>;

    /// Run inference and return only the output called `name`.
    fn run_for(&self, inputs: &[(&str, InputTensor)], name: &str) -> Result<OutputTensor> {
        self.run(inputs)?
            .into_iter()
            .find(|(output, _)| output == name)
            .map(|(_, tensor)| tensor)
            .ok_or_else(|| InferenceError::MissingOutput(name.to_string()))
    }
}
