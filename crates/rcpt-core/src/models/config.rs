//! Configuration structures for the receipt pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for the rcpt pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RcptConfig {
    /// Model file locations.
    pub model: ModelConfig,

    /// Decoding settings.
    pub decoder: DecoderConfig,

    /// Image preprocessing settings.
    pub image: ImageConfig,

    /// Upload server settings.
    pub server: ServerConfig,
}

/// Model file paths and download source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Directory containing model files.
    pub model_dir: PathBuf,

    /// Vision encoder ONNX file name.
    pub encoder_model: String,

    /// Text decoder ONNX file name.
    pub decoder_model: String,

    /// Tokenizer definition file name.
    pub tokenizer: String,

    /// Model configuration file name (holds `max_position_embeddings`).
    pub model_config: String,

    /// Hugging Face repository the model files are downloaded from.
    pub repo: String,

    /// Number of CPU threads per ONNX session.
    pub num_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            encoder_model: "encoder_model.onnx".to_string(),
            decoder_model: "decoder_model.onnx".to_string(),
            tokenizer: "tokenizer.json".to_string(),
            model_config: "config.json".to_string(),
            repo: "debu-das/donut_receipt_v1.20".to_string(),
            num_threads: 4,
        }
    }
}

/// Greedy decoding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Start-of-task marker seeding the decoder.
    pub task_prompt: String,

    /// Hard cap on the decoded length, seed included. `None` uses the
    /// model's `max_position_embeddings`.
    pub max_length: Option<usize>,

    /// Length cap used when the model config does not name one.
    pub default_max_length: usize,

    /// End-of-sequence marker text.
    pub eos_token: String,

    /// Padding marker text.
    pub pad_token: String,

    /// Unknown-token marker text; never emitted during decoding.
    pub unk_token: String,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            task_prompt: "<s_cord-v2>".to_string(),
            max_length: None,
            default_max_length: 768,
            eos_token: "</s>".to_string(),
            pad_token: "<pad>".to_string(),
            unk_token: "<unk>".to_string(),
        }
    }
}

/// Encoder input geometry and normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Encoder input height in pixels.
    pub input_height: u32,

    /// Encoder input width in pixels.
    pub input_width: u32,

    /// Rotate images whose orientation differs from the input geometry.
    pub align_long_axis: bool,

    /// Per-channel normalization mean.
    pub mean: [f32; 3],

    /// Per-channel normalization standard deviation.
    pub std: [f32; 3],
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            input_height: 1280,
            input_width: 960,
            align_long_axis: false,
            mean: [0.5, 0.5, 0.5],
            std: [0.5, 0.5, 0.5],
        }
    }
}

/// Upload server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the server binds to.
    pub bind: String,

    /// Maximum accepted upload size in bytes.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8501".to_string(),
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

impl RcptConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }

    /// Get full path to a model file.
    pub fn model_path(&self, file_name: &str) -> PathBuf {
        self.model.model_dir.join(file_name)
    }

    /// Same configuration, reading models from another directory.
    pub fn with_model_dir(mut self, model_dir: PathBuf) -> Self {
        self.model.model_dir = model_dir;
        self
    }
}
