use std::{path::Path, process::ExitCode};

use anyhow::{Context, Result};
use cismu_opus::{Decoder, DecoderConfig, ValidationResult, Validator, engine::OggOpusEngine};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Fichero TOML opcional con un `DecoderConfig`.
const ENV_CONFIG: &str = "CISMU_OPUS_CONFIG";

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{e:#}");
            return ExitCode::FAILURE;
        }
    };

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        eprintln!("uso: opus-probe <fichero.opus>...");
        return ExitCode::FAILURE;
    }

    let validator = Validator::new(&config);
    let mut failed = false;
    for path in &paths {
        let path = Path::new(path);
        let result = validator.classify(path);
        println!("{}: {}", path.display(), result);

        if result != ValidationResult::Valid {
            continue;
        }
        if let Err(e) = decode_to_end(path, &config) {
            error!("{e:#}");
            failed = true;
        }
    }

    if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

fn load_config() -> Result<DecoderConfig> {
    match std::env::var(ENV_CONFIG) {
        Ok(file) => {
            info!("Cargando configuración desde {file}");
            DecoderConfig::from_file(&file).with_context(|| format!("loading {ENV_CONFIG}={file}"))
        }
        Err(_) => Ok(DecoderConfig::default()),
    }
}

fn decode_to_end(path: &Path, config: &DecoderConfig) -> Result<()> {
    let mut decoder = Decoder::open_with(&OggOpusEngine, path, config)
        .with_context(|| format!("opening {}", path.display()))?;

    let channels = usize::from(decoder.channels());
    println!(
        "  {} canal(es) a {} Hz, {} frames ({:.3} s)",
        channels,
        decoder.sample_rate(),
        decoder.total_frames(),
        decoder.duration().as_secs_f64()
    );

    let frames = decoder.chunk_frames();
    let mut buf = vec![0.0f32; frames * channels];
    let mut decoded = 0u64;
    let mut peak = 0.0f32;
    loop {
        let n = decoder.read_frames(frames, &mut buf);
        peak = buf[..n * channels].iter().fold(peak, |p, &s| p.max(s.abs()));
        decoded += n as u64;
        if n < frames {
            break;
        }
    }

    if let Some(e) = decoder.take_last_error() {
        decoder.release();
        return Err(e).with_context(|| format!("decoding {} stopped after {decoded} frames", path.display()));
    }
    decoder.release();

    println!("  decodificados {decoded} frames, pico {peak:.4}");
    Ok(())
}
