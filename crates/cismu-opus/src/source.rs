use std::path::Path;

use tracing::debug;

use crate::decoder::Decoder;
use crate::decoder_config::DecoderConfig;
use crate::engine::{EngineError, EngineStream, OggOpusEngine, OggOpusStream};
use crate::error::Error;
use crate::validator::{ValidationResult, Validator};

pub trait PcmStream {
    /// Devuelve frames intercalados (interleaved) en f32 [-1, 1).
    fn next_chunk(&mut self) -> Result<Option<Vec<f32>>, Error>;
    /// Info opcional: sample_rate, channels, etc.
    fn format(&self) -> Option<StreamInfo> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub sample_rate: u32,
    pub channels: u16,
}

pub trait AudioDecoder {
    fn open(&self, path: &Path) -> Result<Box<dyn PcmStream + Send>, Error>;
}

/// Fuente de audio para ficheros Ogg Opus.
#[derive(Debug, Clone, Default)]
pub struct OpusAudioDecoder {
    config: DecoderConfig,
    validate_first: bool,
}

impl OpusAudioDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: DecoderConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Clasifica el fichero antes de abrirlo y rechaza lo que no es Opus sin
    /// llegar a abrir el flujo. `Indeterminate` no se considera rechazo.
    pub fn validate_first(mut self, yes: bool) -> Self {
        self.validate_first = yes;
        self
    }
}

impl AudioDecoder for OpusAudioDecoder {
    fn open(&self, path: &Path) -> Result<Box<dyn PcmStream + Send>, Error> {
        if self.validate_first {
            let result = Validator::new(&self.config).classify(path);
            if !matches!(result, ValidationResult::Valid | ValidationResult::Indeterminate) {
                return Err(Error::Unsupported(result));
            }
        }
        let decoder = Decoder::open_with(&OggOpusEngine, path, &self.config)?;
        Ok(Box::new(OpusPcmStream::new(decoder)))
    }
}

/// Adapta un [`Decoder`] a [`PcmStream`]: un bloque de `chunk_frames` frames
/// por llamada hasta el fin del flujo.
///
/// Si el motor falla después de haber entregado frames en la misma lectura,
/// esos frames se devuelven y el error llega en la llamada siguiente.
pub struct OpusPcmStream<S: EngineStream = OggOpusStream> {
    decoder: Decoder<S>,
    info: StreamInfo,
    eof: bool,
    pending: Option<EngineError>,
}

impl<S: EngineStream> OpusPcmStream<S> {
    pub fn new(decoder: Decoder<S>) -> Self {
        let info = StreamInfo {
            sample_rate: decoder.sample_rate(),
            channels: decoder.channels(),
        };
        let eof = !decoder.is_open();
        Self {
            decoder,
            info,
            eof,
            pending: None,
        }
    }

    pub fn total_frames(&self) -> u64 {
        self.decoder.total_frames()
    }
}

impl<S: EngineStream> PcmStream for OpusPcmStream<S> {
    fn next_chunk(&mut self) -> Result<Option<Vec<f32>>, Error> {
        if let Some(e) = self.pending.take() {
            return Err(Error::Engine(e));
        }
        if self.eof {
            return Ok(None);
        }

        let frames = self.decoder.chunk_frames();
        let channels = usize::from(self.info.channels);
        let mut chunk = vec![0.0f32; frames * channels];
        let read = self.decoder.read_frames(frames, &mut chunk);
        let error = self.decoder.take_last_error();

        if read == 0 || error.is_some() {
            self.eof = true;
            self.decoder.release();
            debug!(read, stopped_by_error = error.is_some(), "pcm stream finished");
        }
        if read == 0 {
            return match error {
                Some(e) => Err(Error::Engine(e)),
                None => Ok(None),
            };
        }

        self.pending = error;
        chunk.truncate(read * channels);
        Ok(Some(chunk))
    }

    fn format(&self) -> Option<StreamInfo> {
        Some(self.info)
    }
}
