use std::path::PathBuf;

use thiserror::Error;

use crate::engine::EngineError;
use crate::validator::ValidationResult;

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not open {}: {source}", .path.display())]
    Open { path: PathBuf, source: EngineError },

    #[error("unsupported channel count: {0}")]
    UnsupportedChannels(usize),

    #[error("Unsupported format: {0}")]
    Unsupported(ValidationResult),

    #[error("decoding engine: {0}")]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration parse error: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("{field} = {value} is out of range ({min}..={max})")]
    OutOfRange {
        field: &'static str,
        value: usize,
        min: usize,
        max: usize,
    },
}
