use std::{
    fmt,
    fs::File,
    io::Read,
    path::Path,
};

use tracing::{Level, debug, instrument, warn};

use crate::decoder_config::DecoderConfig;
use crate::engine::{Engine, OggOpusEngine, ProbeError};

/// Clasificación de los primeros bytes de un fichero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationResult {
    /// Cabecera de identificación Opus reconocida.
    Valid,
    /// No hubo datos suficientes para decidir. No es un rechazo: con una
    /// lectura más larga podría resultar válido.
    Indeterminate,
    /// Es Opus, pero declara capacidades que el motor no decodifica.
    UnsupportedFeatures,
    NotRecognizedFormat,
    UnsupportedVersion,
    MalformedHeader,
    /// Fallo interno del sondeo, independiente del contenido.
    EngineFault,
    OpenFailed,
    EmptyOrUnreadable,
}

impl ValidationResult {
    pub fn is_valid(self) -> bool {
        self == ValidationResult::Valid
    }

    /// `true` solo para los rechazos basados en el contenido del fichero.
    pub fn is_rejection(self) -> bool {
        matches!(
            self,
            ValidationResult::NotRecognizedFormat
                | ValidationResult::UnsupportedVersion
                | ValidationResult::MalformedHeader
                | ValidationResult::UnsupportedFeatures
        )
    }
}

impl From<ProbeError> for ValidationResult {
    fn from(err: ProbeError) -> Self {
        match err {
            ProbeError::NeedMoreData => ValidationResult::Indeterminate,
            ProbeError::Fault => ValidationResult::EngineFault,
            ProbeError::Unimplemented => ValidationResult::UnsupportedFeatures,
            ProbeError::NotFormat => ValidationResult::NotRecognizedFormat,
            ProbeError::Version(_) => ValidationResult::UnsupportedVersion,
            ProbeError::BadHeader => ValidationResult::MalformedHeader,
        }
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ValidationResult::Valid => "valid Opus stream",
            ValidationResult::Indeterminate => "not enough data to determine if it's an Opus stream",
            ValidationResult::UnsupportedFeatures => "stream uses unsupported Opus features",
            ValidationResult::NotRecognizedFormat => "file is not a recognizable Opus stream",
            ValidationResult::UnsupportedVersion => "unsupported Opus stream version",
            ValidationResult::MalformedHeader => "malformed or illegal Opus ID header",
            ValidationResult::EngineFault => "internal failure in the decoding engine",
            ValidationResult::OpenFailed => "could not open file",
            ValidationResult::EmptyOrUnreadable => "failed to read from file or file is empty",
        };
        f.write_str(msg)
    }
}

/// Clasifica `path` con el motor y la configuración por defecto.
pub fn classify<P: AsRef<Path>>(path: P) -> ValidationResult {
    Validator::default().classify(path)
}

#[derive(Debug, Clone)]
pub struct Validator<E: Engine = OggOpusEngine> {
    engine: E,
    probe_bytes: usize,
}

impl Validator {
    pub fn new(config: &DecoderConfig) -> Self {
        Self::with_engine(OggOpusEngine, config)
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(&DecoderConfig::default())
    }
}

impl<E: Engine> Validator<E> {
    pub fn with_engine(engine: E, config: &DecoderConfig) -> Self {
        Validator {
            engine,
            probe_bytes: config.effective_probe_bytes(),
        }
    }

    pub fn probe_bytes(&self) -> usize {
        self.probe_bytes
    }

    #[instrument(level = Level::TRACE, skip_all, fields(path = %path.as_ref().display()))]
    pub fn classify<P: AsRef<Path>>(&self, path: P) -> ValidationResult {
        let prefix = match self.read_prefix(path.as_ref()) {
            Ok(prefix) => prefix,
            Err(result) => return result,
        };

        let result = match self.engine.probe(&prefix) {
            Ok(_) => ValidationResult::Valid,
            Err(e) => e.into(),
        };
        debug!(%result, bytes = prefix.len(), "classified");
        result
    }

    /// Lee como mucho `probe_bytes` y cierra el fichero antes de devolver.
    fn read_prefix(&self, path: &Path) -> Result<Vec<u8>, ValidationResult> {
        let file = File::open(path).map_err(|e| {
            warn!(error = %e, "could not open file");
            ValidationResult::OpenFailed
        })?;

        let mut prefix = Vec::with_capacity(self.probe_bytes);
        let read = file.take(self.probe_bytes as u64).read_to_end(&mut prefix);

        match read {
            Ok(_) if !prefix.is_empty() => Ok(prefix),
            Ok(_) => {
                warn!("file is empty");
                Err(ValidationResult::EmptyOrUnreadable)
            }
            // lo leído antes del error sigue sirviendo para sondear
            Err(e) if !prefix.is_empty() => {
                debug!(error = %e, bytes = prefix.len(), "short read, probing what we got");
                Ok(prefix)
            }
            Err(e) => {
                warn!(error = %e, "failed to read from file");
                Err(ValidationResult::EmptyOrUnreadable)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineError, EngineStream, OpusHead};
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Motor que devuelve siempre el mismo resultado de sondeo.
    #[derive(Debug, Clone)]
    struct FixedProbe(Result<(), ProbeError>);

    struct NoStream;

    impl EngineStream for NoStream {
        fn channel_count(&self) -> usize {
            1
        }
        fn read(&mut self, _out: &mut [i16]) -> Result<usize, EngineError> {
            Ok(0)
        }
        fn total_frames(&self) -> u64 {
            0
        }
    }

    impl Engine for FixedProbe {
        type Stream = NoStream;

        fn probe(&self, _initial: &[u8]) -> Result<OpusHead, ProbeError> {
            self.0.map(|_| OpusHead {
                version: 1,
                channel_count: 2,
                pre_skip: 0,
                input_sample_rate: 48_000,
                output_gain: 0,
                mapping_family: 0,
                stream_count: 1,
                coupled_count: 1,
            })
        }

        fn open(&self, _path: &Path) -> Result<NoStream, EngineError> {
            Ok(NoStream)
        }
    }

    fn file_with(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file
    }

    #[test]
    fn every_probe_error_has_its_own_classification() {
        let cases = [
            (ProbeError::NeedMoreData, ValidationResult::Indeterminate),
            (ProbeError::Fault, ValidationResult::EngineFault),
            (ProbeError::Unimplemented, ValidationResult::UnsupportedFeatures),
            (ProbeError::NotFormat, ValidationResult::NotRecognizedFormat),
            (ProbeError::Version(16), ValidationResult::UnsupportedVersion),
            (ProbeError::BadHeader, ValidationResult::MalformedHeader),
        ];
        let file = file_with(b"anything");
        for (err, expected) in cases {
            let validator = Validator::with_engine(FixedProbe(Err(err)), &DecoderConfig::default());
            assert_eq!(validator.classify(file.path()), expected);
        }
    }

    #[test]
    fn engine_fault_is_not_a_rejection() {
        assert!(!ValidationResult::EngineFault.is_rejection());
        assert!(!ValidationResult::Indeterminate.is_rejection());
        assert!(!ValidationResult::OpenFailed.is_rejection());
        assert!(ValidationResult::MalformedHeader.is_rejection());
        assert!(ValidationResult::Valid.is_valid());
    }

    #[test]
    fn missing_and_empty_files() {
        let validator = Validator::with_engine(FixedProbe(Ok(())), &DecoderConfig::default());
        assert_eq!(
            validator.classify("/no/such/dir/track.opus"),
            ValidationResult::OpenFailed
        );

        let empty = file_with(b"");
        assert_eq!(validator.classify(empty.path()), ValidationResult::EmptyOrUnreadable);
    }

    #[test]
    fn directory_is_unreadable_or_unopenable() {
        let dir = tempfile::tempdir().unwrap();
        let result = classify(dir.path());
        assert!(matches!(
            result,
            ValidationResult::EmptyOrUnreadable | ValidationResult::OpenFailed
        ));
    }

    #[test]
    fn probe_length_is_clamped_to_safe_range() {
        let small = DecoderConfig { probe_bytes: 16, ..DecoderConfig::default() };
        assert_eq!(Validator::new(&small).probe_bytes(), crate::MIN_PROBE_BYTES);

        let big = DecoderConfig { probe_bytes: 1 << 20, ..DecoderConfig::default() };
        assert_eq!(Validator::new(&big).probe_bytes(), crate::MAX_PROBE_BYTES);
    }

    #[test]
    fn plain_text_is_not_opus() {
        let file = file_with(&b"just some notes about a song, nothing to decode here. ".repeat(4));
        assert_eq!(classify(file.path()), ValidationResult::NotRecognizedFormat);
    }

    #[test]
    fn display_is_human_readable() {
        assert_eq!(
            ValidationResult::Indeterminate.to_string(),
            "not enough data to determine if it's an Opus stream"
        );
    }
}
