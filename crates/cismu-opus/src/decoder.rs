use std::{path::Path, time::Duration};

use tracing::{Level, debug, instrument, trace, warn};

use crate::decoder_config::DecoderConfig;
use crate::engine::{Engine, EngineError, EngineStream, OggOpusEngine, OggOpusStream};
use crate::error::Error;
use crate::{MAX_CHANNELS, MAX_CHUNK_FRAMES, OPUS_SAMPLE_RATE};

/// Capacidad del buffer nativo: el bloque más grande con el máximo de canales.
const SCRATCH_SAMPLES: usize = MAX_CHUNK_FRAMES * MAX_CHANNELS;

/// Escala de PCM de 16 bits a `f32` en [-1, 1).
const I16_SCALE: f32 = 32768.0;

/// Sesión de decodificación sobre un fichero abierto.
///
/// El flujo del motor se libera exactamente una vez: con [`Decoder::release`]
/// o al soltar el decodificador. Sin flujo, todas las operaciones devuelven
/// cero sin tocar nada.
pub struct Decoder<S: EngineStream = OggOpusStream> {
    stream: Option<S>,
    sample_rate: u32,
    channels: u16,
    chunk_frames: usize,
    last_error: Option<EngineError>,
}

impl Decoder {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Self::open_with(&OggOpusEngine, path, &DecoderConfig::default())
    }
}

impl<S: EngineStream> Decoder<S> {
    #[instrument(level = Level::TRACE, skip_all, fields(path = %path.as_ref().display()), err)]
    pub fn open_with<E, P>(engine: &E, path: P, config: &DecoderConfig) -> Result<Self, Error>
    where
        E: Engine<Stream = S>,
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let stream = engine.open(path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;

        // el buffer nativo es de tamaño fijo; más canales no caben
        let channels = stream.channel_count();
        if channels == 0 || channels > MAX_CHANNELS {
            return Err(Error::UnsupportedChannels(channels));
        }

        debug!(channels, total_frames = stream.total_frames(), "decoder ready");
        Ok(Decoder {
            stream: Some(stream),
            sample_rate: OPUS_SAMPLE_RATE,
            channels: channels as u16,
            chunk_frames: config.effective_chunk_frames(),
            last_error: None,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn chunk_frames(&self) -> usize {
        self.chunk_frames
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Error del motor que cortó la última lectura, si lo hubo.
    ///
    /// `read_frames` trata un error igual que el fin de flujo; esto permite
    /// distinguir ambos casos a quien le importe.
    pub fn last_error(&self) -> Option<&EngineError> {
        self.last_error.as_ref()
    }

    pub fn take_last_error(&mut self) -> Option<EngineError> {
        self.last_error.take()
    }

    /// Lee hasta `frame_count` frames intercalados en `out`, normalizados a
    /// [-1, 1). Devuelve los frames escritos; menos de los pedidos significa
    /// fin de flujo.
    ///
    /// Si `out` no tiene sitio para `frame_count * channels` muestras, se
    /// leen solo los frames completos que caben.
    pub fn read_frames(&mut self, frame_count: usize, out: &mut [f32]) -> usize {
        self.last_error = None;
        let Some(stream) = self.stream.as_mut() else {
            return 0;
        };

        let channels = usize::from(self.channels);
        let capacity = out.len() / channels;
        let wanted = frame_count.min(capacity);
        if wanted < frame_count {
            debug!(frame_count, capacity, "output buffer too small, clamping request");
        }

        let mut scratch = [0i16; SCRATCH_SAMPLES];
        let mut delivered = 0usize;

        while delivered < wanted {
            let request = (wanted - delivered).min(self.chunk_frames);
            let native = &mut scratch[..request * channels];

            let produced = match stream.read(native) {
                Ok(0) => break,
                Ok(n) if n > request => {
                    warn!(produced = n, request, "engine produced more frames than requested");
                    request
                }
                Ok(n) => n,
                Err(e) => {
                    warn!(error = %e, delivered, "engine stopped mid-stream, treating as end of stream");
                    self.last_error = Some(e);
                    break;
                }
            };

            let samples = produced * channels;
            let start = delivered * channels;
            let dst = &mut out[start..start + samples];
            for (d, &s) in dst.iter_mut().zip(&native[..samples]) {
                *d = f32::from(s) / I16_SCALE;
            }

            delivered += produced;
        }

        trace!(frame_count, delivered, "read_frames");
        delivered
    }

    /// Frames totales del flujo; 0 si el decodificador ya no está abierto.
    pub fn total_frames(&self) -> u64 {
        self.stream.as_ref().map_or(0, EngineStream::total_frames)
    }

    pub fn duration(&self) -> Duration {
        let frames = self.total_frames();
        let rate = u64::from(self.sample_rate);
        Duration::from_secs(frames / rate) + Duration::from_nanos((frames % rate) * 1_000_000_000 / rate)
    }

    /// Libera el flujo del motor. Llamarlo otra vez no hace nada.
    pub fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            trace!("releasing decoder stream");
            drop(stream);
        }
    }
}
