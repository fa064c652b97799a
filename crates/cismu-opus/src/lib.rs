//! Crate `cismu_opus`: validación y decodificación por bloques de ficheros Ogg Opus
//!
//! Flujo típico: [`classify`] decide si vale la pena abrir el fichero,
//! [`Decoder::open`] lo abre, [`Decoder::read_frames`] entrega muestras `f32`
//! intercaladas hasta que devuelve menos frames de los pedidos.

pub mod decoder;
pub mod decoder_config;
pub mod engine;
pub mod error;
pub mod source;
pub mod validator;

pub use decoder::Decoder;
pub use decoder_config::{DecoderConfig, DecoderConfigBuilder};
pub use error::{ConfigError, Error};
pub use source::{AudioDecoder, OpusAudioDecoder, OpusPcmStream, PcmStream, StreamInfo};
pub use validator::{ValidationResult, Validator, classify};

/// Opus siempre decodifica a 48 kHz, sin importar la frecuencia original.
pub const OPUS_SAMPLE_RATE: u32 = 48_000;

/// Mono o estéreo (familia de mapeo 0).
pub const MAX_CHANNELS: usize = 2;

/// Frames pedidos al motor como máximo en cada iteración de lectura.
pub const MAX_CHUNK_FRAMES: usize = 4096;

/// Bytes que lee el validador por defecto y el rango seguro permitido.
pub const DEFAULT_PROBE_BYTES: usize = 1024;
pub const MIN_PROBE_BYTES: usize = 512;
pub const MAX_PROBE_BYTES: usize = 4096;
