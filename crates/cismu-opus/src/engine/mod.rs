//! Motor de decodificación: la costura entre el adaptador y quien realmente
//! entiende Ogg Opus.

mod head;
mod native;
pub(crate) mod page;

use std::{io, path::Path};

use thiserror::Error;

pub use head::{OPUS_HEAD_MAGIC, OPUS_TAGS_MAGIC, OpusHead};
pub use native::{OggOpusEngine, OggOpusStream};

/// Resultado negativo de sondear la cabecera inicial de un flujo.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProbeError {
    #[error("not enough data to determine if it's an Opus stream")]
    NeedMoreData,

    #[error("internal failure while probing the stream")]
    Fault,

    #[error("stream uses unsupported Opus features")]
    Unimplemented,

    #[error("data is not a recognizable Opus stream")]
    NotFormat,

    #[error("unsupported Opus stream version {0}")]
    Version(u8),

    #[error("malformed or illegal Opus ID header")]
    BadHeader,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O: {0}")]
    Io(#[from] io::Error),

    #[error("ogg: {0}")]
    Ogg(#[from] ogg::OggReadError),

    #[error("opus: {0}")]
    Opus(#[from] opus::Error),

    #[error("the stream does not start with an Opus ID header")]
    NotOpus,

    #[error("bad Opus header: {0}")]
    BadHeader(#[from] ProbeError),

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

/// Primitivas que el adaptador consume del motor.
pub trait Engine {
    type Stream: EngineStream;

    /// Clasifica los primeros bytes de un fichero sin abrir el flujo completo.
    fn probe(&self, initial: &[u8]) -> Result<OpusHead, ProbeError>;

    fn open(&self, path: &Path) -> Result<Self::Stream, EngineError>;
}

/// Sesión de decodificación abierta. Liberarla es soltarla (`Drop`).
pub trait EngineStream {
    /// Canales del flujo lógico completo, fijo durante toda la sesión.
    fn channel_count(&self) -> usize;

    /// Decodifica como mucho `out.len() / channel_count()` frames intercalados
    /// en `out` y devuelve cuántos produjo. `Ok(0)` es fin de flujo.
    fn read(&mut self, out: &mut [i16]) -> Result<usize, EngineError>;

    /// Frames totales de todo el flujo lógico (todos los enlaces).
    fn total_frames(&self) -> u64;
}
