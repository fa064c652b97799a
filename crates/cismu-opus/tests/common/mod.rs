//! Generador de ficheros Ogg Opus para las pruebas: codifica una senoidal con
//! libopus y la encapsula con el escritor de paquetes de `ogg`.
#![allow(dead_code)]

use std::{
    f32::consts::PI,
    fs::{self, File},
    io::BufReader,
    path::Path,
};

use ogg::{PacketReader, PacketWriteEndInfo, PacketWriter};
use opus::{Application, Channels, Encoder};

pub const FRAME_SIZE: usize = 960;
/// Paquetes de audio por página; así cada enlace ocupa varias páginas.
pub const PACKETS_PER_PAGE: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct Link {
    pub serial: u32,
    pub channels: u8,
    pub frames: usize,
}

impl Link {
    pub fn new(serial: u32, channels: u8, frames: usize) -> Self {
        Link { serial, channels, frames }
    }
}

pub fn opus_head(version: u8, channels: u8, pre_skip: u16, family: u8) -> Vec<u8> {
    let mut h = b"OpusHead".to_vec();
    h.push(version);
    h.push(channels);
    h.extend_from_slice(&pre_skip.to_le_bytes());
    h.extend_from_slice(&44_100u32.to_le_bytes());
    h.extend_from_slice(&0i16.to_le_bytes());
    h.push(family);
    h
}

pub fn opus_tags() -> Vec<u8> {
    let vendor = b"cismu-tests";
    let mut t = b"OpusTags".to_vec();
    t.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    t.extend_from_slice(vendor);
    t.extend_from_slice(&0u32.to_le_bytes());
    t
}

fn sample(n: usize, channel: usize) -> i16 {
    let freq = 440.0 * (channel + 1) as f32;
    ((2.0 * PI * freq * n as f32 / 48_000.0).sin() * 8_000.0) as i16
}

/// Escribe uno o más enlaces encadenados en `path`. La posición de gránulo de
/// la última página de cada enlace es exactamente `pre_skip + frames`.
pub fn write_opus_file(path: &Path, links: &[Link]) {
    let file = File::create(path).unwrap();
    let mut writer = PacketWriter::new(file);

    for link in links {
        let ch = usize::from(link.channels);
        let layout = if ch == 1 { Channels::Mono } else { Channels::Stereo };
        let mut encoder = Encoder::new(48_000, layout, Application::Audio).unwrap();
        let pre_skip = encoder.get_lookahead().unwrap() as usize;

        writer
            .write_packet(opus_head(1, link.channels, pre_skip as u16, 0), link.serial, PacketWriteEndInfo::EndPage, 0)
            .unwrap();
        writer
            .write_packet(opus_tags(), link.serial, PacketWriteEndInfo::EndPage, 0)
            .unwrap();

        let packets = (link.frames + pre_skip).div_ceil(FRAME_SIZE);
        let mut pcm = vec![0i16; FRAME_SIZE * ch];
        let mut out = vec![0u8; 4_000];

        for p in 0..packets {
            for f in 0..FRAME_SIZE {
                let n = p * FRAME_SIZE + f;
                for c in 0..ch {
                    pcm[f * ch + c] = if n < link.frames { sample(n, c) } else { 0 };
                }
            }
            let len = encoder.encode(&pcm, &mut out).unwrap();

            let last = p + 1 == packets;
            let (info, granule) = if last {
                (PacketWriteEndInfo::EndStream, (pre_skip + link.frames) as u64)
            } else if (p + 1) % PACKETS_PER_PAGE == 0 {
                (PacketWriteEndInfo::EndPage, ((p + 1) * FRAME_SIZE) as u64)
            } else {
                (PacketWriteEndInfo::NormalPacket, ((p + 1) * FRAME_SIZE) as u64)
            };
            writer.write_packet(out[..len].to_vec(), link.serial, info, granule).unwrap();
        }
    }
}

/// Un único paquete BOS con cabecera arbitraria seguido de unos datos.
pub fn write_with_head(path: &Path, head: Vec<u8>) {
    let file = File::create(path).unwrap();
    let mut writer = PacketWriter::new(file);
    writer.write_packet(head, 1, PacketWriteEndInfo::EndPage, 0).unwrap();
    writer.write_packet(opus_tags(), 1, PacketWriteEndInfo::EndPage, 0).unwrap();
    writer.write_packet(vec![0u8; 64], 1, PacketWriteEndInfo::EndStream, 960).unwrap();
}

/// Enlace con cabecera arbitraria y `packets` paquetes de relleno de 960
/// frames cada uno.
pub fn write_raw_link(path: &Path, serial: u32, head: Vec<u8>, packets: usize) {
    let pre_skip = u64::from(u16::from_le_bytes([head[10], head[11]]));
    let file = File::create(path).unwrap();
    let mut writer = PacketWriter::new(file);
    writer.write_packet(head, serial, PacketWriteEndInfo::EndPage, 0).unwrap();
    writer.write_packet(opus_tags(), serial, PacketWriteEndInfo::EndPage, 0).unwrap();
    for p in 0..packets {
        let info = if p + 1 == packets { PacketWriteEndInfo::EndStream } else { PacketWriteEndInfo::NormalPacket };
        let granule = pre_skip + ((p + 1) * FRAME_SIZE) as u64;
        writer.write_packet(vec![0u8; 64], serial, info, granule).unwrap();
    }
}

/// Flujo Ogg con cabecera tipo Vorbis: Ogg válido, pero no Opus.
pub fn write_vorbis_like(path: &Path) {
    let mut ident = b"\x01vorbis".to_vec();
    ident.extend_from_slice(&[0u8; 23]);

    let file = File::create(path).unwrap();
    let mut writer = PacketWriter::new(file);
    writer.write_packet(ident, 7, PacketWriteEndInfo::EndPage, 0).unwrap();
    writer.write_packet(b"\x03vorbis comments".to_vec(), 7, PacketWriteEndInfo::EndPage, 0).unwrap();
    writer.write_packet(vec![0u8; 200], 7, PacketWriteEndInfo::EndStream, 1_024).unwrap();
}

pub fn truncate_copy(src: &Path, dst: &Path, len: usize) {
    let bytes = fs::read(src).unwrap();
    fs::write(dst, &bytes[..len.min(bytes.len())]).unwrap();
}

/// Encadena ficheros Ogg completos uno detrás de otro.
pub fn concat(parts: &[&Path], dst: &Path) {
    let mut bytes = Vec::new();
    for part in parts {
        bytes.extend(fs::read(part).unwrap());
    }
    fs::write(dst, bytes).unwrap();
}

/// Copia `src` en `dst` metiendo `junk` justo delante de la página `index`.
pub fn splice_before_page(src: &Path, dst: &Path, index: usize, junk: &[u8]) {
    let bytes = fs::read(src).unwrap();
    let at = bytes
        .windows(4)
        .enumerate()
        .filter(|(_, w)| w[..] == b"OggS"[..])
        .map(|(i, _)| i)
        .nth(index)
        .unwrap();

    let mut out = bytes[..at].to_vec();
    out.extend_from_slice(junk);
    out.extend_from_slice(&bytes[at..]);
    fs::write(dst, out).unwrap();
}

/// Paquetes que entrega `ogg::PacketReader` para el fichero completo.
pub fn packet_count(path: &Path) -> usize {
    let mut reader = PacketReader::new(BufReader::new(File::open(path).unwrap()));
    let mut count = 0;
    while reader.read_packet().unwrap().is_some() {
        count += 1;
    }
    count
}
