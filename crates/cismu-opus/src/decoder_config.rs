use config::{Config, File, FileFormat};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{DEFAULT_PROBE_BYTES, MAX_CHUNK_FRAMES, MAX_PROBE_BYTES, MIN_PROBE_BYTES, error::ConfigError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[builder(setter(into), default)]
#[serde(default)]
pub struct DecoderConfig {
    /// Bytes del principio del fichero que lee el validador.
    pub probe_bytes: usize,
    /// Frames pedidos al motor por iteración (y por bloque en `OpusPcmStream`).
    pub chunk_frames: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        DecoderConfig {
            probe_bytes: DEFAULT_PROBE_BYTES,
            chunk_frames: MAX_CHUNK_FRAMES,
        }
    }
}

impl DecoderConfig {
    pub fn builder() -> DecoderConfigBuilder {
        DecoderConfigBuilder::default()
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_string_lossy().into_owned();
        let cfg = Config::builder()
            .add_source(File::new(&path, FileFormat::Toml))
            .build()
            .map_err(ConfigError::Parse)?;
        let dc = cfg.try_deserialize::<DecoderConfig>().map_err(ConfigError::Parse)?;
        dc.validate()?;
        Ok(dc)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("probe_bytes", self.probe_bytes, MIN_PROBE_BYTES, MAX_PROBE_BYTES)?;
        check_range("chunk_frames", self.chunk_frames, 1, MAX_CHUNK_FRAMES)
    }

    /// Valor efectivo, recortado al rango permitido.
    pub(crate) fn effective_probe_bytes(&self) -> usize {
        self.probe_bytes.clamp(MIN_PROBE_BYTES, MAX_PROBE_BYTES)
    }

    pub(crate) fn effective_chunk_frames(&self) -> usize {
        self.chunk_frames.clamp(1, MAX_CHUNK_FRAMES)
    }
}

fn check_range(field: &'static str, value: usize, min: usize, max: usize) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, value, min, max })
    }
}
