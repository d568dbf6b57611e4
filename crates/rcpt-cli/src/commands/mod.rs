//! CLI commands.

pub mod config;
pub mod models;
pub mod process;
pub mod serve;

use std::path::{Path, PathBuf};

use tracing::debug;

use rcpt_core::RcptConfig;

/// Load the configuration for a command.
///
/// An explicit `--config` path must exist. Otherwise the default config file
/// is used when present, and built-in defaults (models under the user data
/// directory) when not. `model_dir` overrides whatever the file says.
pub fn load_config(config_path: Option<&str>, model_dir: Option<PathBuf>) -> anyhow::Result<RcptConfig> {
    let config = match config_path {
        Some(path) => {
            let path = Path::new(path);
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            RcptConfig::from_file(path)?
        }
        None => {
            let default_path = config::default_config_path();
            if default_path.exists() {
                debug!("Using config file {}", default_path.display());
                RcptConfig::from_file(&default_path)?
            } else {
                RcptConfig::default().with_model_dir(models::default_model_dir())
            }
        }
    };

    Ok(match model_dir {
        Some(dir) => config.with_model_dir(dir),
        None => config,
    })
}
