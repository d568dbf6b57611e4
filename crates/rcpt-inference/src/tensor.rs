//! Tensor types for inference input/output.

use ndarray::{ArrayD, IxDyn};

use crate::{InferenceError, Result};

/// Supported tensor data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorType {
    Float32,
    Int32,
    Int64,
}

/// Input tensor for inference.
#[derive(Debug, Clone)]
pub enum InputTensor {
    Float32(ArrayD<f32>),
    Int32(ArrayD<i32>),
    Int64(ArrayD<i64>),
}

impl InputTensor {
    /// Get the shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        match self {
            InputTensor::Float32(arr) => arr.shape(),
            InputTensor::Int32(arr) => arr.shape(),
            InputTensor::Int64(arr) => arr.shape(),
        }
    }

    /// Get the data type of the tensor.
    pub fn dtype(&self) -> TensorType {
        match self {
            InputTensor::Float32(_) => TensorType::Float32,
            InputTensor::Int32(_) => TensorType::Int32,
            InputTensor::Int64(_) => TensorType::Int64,
        }
    }

    /// Create a Float32 tensor from raw data and shape.
    pub fn from_f32(data: Vec<f32>, shape: &[usize]) -> Result<Self> {
        ArrayD::from_shape_vec(IxDyn(shape), data)
            .map(InputTensor::Float32)
            .map_err(|e| InferenceError::InvalidInput(e.to_string()))
    }

    /// Create an Int64 tensor from raw data and shape.
    pub fn from_i64(data: Vec<i64>, shape: &[usize]) -> Result<Self> {
        ArrayD::from_shape_vec(IxDyn(shape), data)
            .map(InputTensor::Int64)
            .map_err(|e| InferenceError::InvalidInput(e.to_string()))
    }
}

/// Output tensor from inference.
#[derive(Debug, Clone)]
pub enum OutputTensor {
    Float32(ArrayD<f32>),
    Int32(ArrayD<i32>),
    Int64(ArrayD<i64>),
}

impl OutputTensor {
    /// Get the shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        match self {
            OutputTensor::Float32(arr) => arr.shape(),
            OutputTensor::Int32(arr) => arr.shape(),
            OutputTensor::Int64(arr) => arr.shape(),
        }
    }

    /// Get the data type of the tensor.
    pub fn dtype(&self) -> TensorType {
        match self {
            OutputTensor::Float32(_) => TensorType::Float32,
            OutputTensor::Int32(_) => TensorType::Int32,
            OutputTensor::Int64(_) => TensorType::Int64,
        }
    }

    /// Take the inner Float32 array, failing for any other data type.
    pub fn into_f32(self) -> Result<ArrayD<f32>> {
        match self {
            OutputTensor::Float32(arr) => Ok(arr),
            other => Err(InferenceError::OutputExtraction(format!(
                "expected float32 tensor, got {:?}",
                other.dtype()
            ))),
        }
    }
}
