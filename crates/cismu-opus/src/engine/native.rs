use std::{
    fs::File,
    io::{BufReader, Seek, SeekFrom},
    path::Path,
};

use ogg::PacketReader;
use opus::Channels;
use tracing::{Level, debug, instrument, trace};

use crate::engine::page::{self, LinkInfo};
use crate::engine::{Engine, EngineError, EngineStream, OpusHead, ProbeError};
use crate::OPUS_SAMPLE_RATE;

/// 120 ms a 48 kHz, el paquete Opus más largo posible.
const MAX_PACKET_FRAMES: usize = 5760;

/// Motor Ogg Opus: `ogg` para las páginas y paquetes, libopus (crate `opus`)
/// para decodificar cada paquete.
#[derive(Debug, Clone, Copy, Default)]
pub struct OggOpusEngine;

impl Engine for OggOpusEngine {
    type Stream = OggOpusStream;

    fn probe(&self, initial: &[u8]) -> Result<OpusHead, ProbeError> {
        let head = page::probe(initial)?;
        if !head.is_single_stream() {
            return Err(ProbeError::Unimplemented);
        }
        Ok(head)
    }

    fn open(&self, path: &Path) -> Result<OggOpusStream, EngineError> {
        OggOpusStream::open(path)
    }
}

pub struct OggOpusStream {
    reader: PacketReader<BufReader<File>>,
    links: Vec<LinkInfo>,
    channels: usize,

    // enlace actual
    serial: u32,
    next_link: usize,
    decoder: opus::Decoder,
    awaiting_tags: bool,
    skip: usize,
    limit: Option<u64>,
    emitted: u64,

    // último paquete decodificado; frames pendientes en pcm[pos..end]
    pcm: Vec<i16>,
    pos: usize,
    end: usize,
}

impl OggOpusStream {
    #[instrument(level = Level::TRACE, err)]
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        let mut file = File::open(path)?;
        let links = page::scan_links(&mut BufReader::new(&mut file))?;
        file.seek(SeekFrom::Start(0))?;

        let mut reader = PacketReader::new(BufReader::new(file));
        let first = reader.read_packet()?.ok_or(EngineError::NotOpus)?;
        if !first.first_in_stream() {
            return Err(EngineError::NotOpus);
        }
        let head = OpusHead::parse(&first.data).map_err(|e| match e {
            ProbeError::NotFormat => EngineError::NotOpus,
            other => EngineError::BadHeader(other),
        })?;
        if !head.is_single_stream() {
            return Err(EngineError::Unsupported("only mono and stereo (mapping family 0) streams"));
        }

        let channels = usize::from(head.channel_count);
        let serial = first.stream_serial();
        let mut stream = OggOpusStream {
            reader,
            channels,
            serial,
            next_link: 1,
            decoder: link_decoder(&head, channels)?,
            awaiting_tags: true,
            skip: usize::from(head.pre_skip),
            limit: link_limit(&links, 0, serial),
            emitted: 0,
            links,
            pcm: vec![0; MAX_PACKET_FRAMES * channels],
            pos: 0,
            end: 0,
        };
        stream.read_tags()?;

        debug!(
            channels,
            links = stream.links.len(),
            total_frames = stream.total_frames(),
            "opened ogg opus stream"
        );
        Ok(stream)
    }

    fn read_tags(&mut self) -> Result<(), EngineError> {
        while let Some(packet) = self.reader.read_packet()? {
            if packet.stream_serial() != self.serial {
                continue;
            }
            if !OpusHead::is_tags_packet(&packet.data) {
                return Err(EngineError::BadHeader(ProbeError::BadHeader));
            }
            self.awaiting_tags = false;
            return Ok(());
        }
        Err(EngineError::BadHeader(ProbeError::BadHeader))
    }

    fn start_link(&mut self, serial: u32, head: &OpusHead) -> Result<(), EngineError> {
        trace!(serial, channels = head.channel_count, pre_skip = head.pre_skip, "chained link");
        self.decoder = link_decoder(head, self.channels)?;
        self.serial = serial;
        self.awaiting_tags = true;
        self.skip = usize::from(head.pre_skip);
        self.limit = link_limit(&self.links, self.next_link, serial);
        self.emitted = 0;
        self.next_link += 1;
        Ok(())
    }

    /// Decodifica paquetes hasta tener frames pendientes. `false` en fin de fichero.
    fn decode_next(&mut self) -> Result<bool, EngineError> {
        while let Some(packet) = self.reader.read_packet()? {
            if packet.first_in_stream() {
                match OpusHead::parse(&packet.data) {
                    Ok(head) if head.is_single_stream() => self.start_link(packet.stream_serial(), &head)?,
                    // sus paquetes se descartan solos: el serial activo no cambia
                    Ok(head) => debug!(
                        serial = packet.stream_serial(),
                        family = head.mapping_family,
                        channels = head.channel_count,
                        "skipping chained link with unsupported channel mapping"
                    ),
                    Err(e) => trace!(serial = packet.stream_serial(), %e, "skipping non-opus logical stream"),
                }
                continue;
            }
            if packet.stream_serial() != self.serial {
                continue;
            }
            if self.awaiting_tags {
                if !OpusHead::is_tags_packet(&packet.data) {
                    return Err(EngineError::BadHeader(ProbeError::BadHeader));
                }
                self.awaiting_tags = false;
                continue;
            }

            let frames = self.decoder.decode(&packet.data, &mut self.pcm, false)?;
            let skipped = self.skip.min(frames);
            self.skip -= skipped;

            let mut available = (frames - skipped) as u64;
            if let Some(limit) = self.limit {
                available = available.min(limit.saturating_sub(self.emitted));
            }
            self.emitted += available;

            self.pos = skipped;
            self.end = skipped + available as usize;
            if self.pos < self.end {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl EngineStream for OggOpusStream {
    fn channel_count(&self) -> usize {
        self.channels
    }

    fn read(&mut self, out: &mut [i16]) -> Result<usize, EngineError> {
        let ch = self.channels;
        let max_frames = out.len() / ch;
        if max_frames == 0 {
            return Ok(0);
        }
        if self.pos == self.end && !self.decode_next()? {
            return Ok(0);
        }

        let frames = (self.end - self.pos).min(max_frames);
        out[..frames * ch].copy_from_slice(&self.pcm[self.pos * ch..(self.pos + frames) * ch]);
        self.pos += frames;
        Ok(frames)
    }

    fn total_frames(&self) -> u64 {
        self.links.iter().filter_map(LinkInfo::frames).sum()
    }
}

impl Drop for OggOpusStream {
    fn drop(&mut self) {
        trace!(serial = self.serial, "freeing ogg opus stream");
    }
}

/// Un decodificador libopus por enlace; siempre con la disposición de canales
/// del primer enlace para que la salida no cambie a mitad de flujo.
fn link_decoder(head: &OpusHead, channels: usize) -> Result<opus::Decoder, EngineError> {
    let layout = if channels == 1 { Channels::Mono } else { Channels::Stereo };
    let mut decoder = opus::Decoder::new(OPUS_SAMPLE_RATE, layout)?;
    if head.output_gain != 0 {
        decoder.set_gain(i32::from(head.output_gain))?;
    }
    Ok(decoder)
}

fn link_limit(links: &[LinkInfo], index: usize, serial: u32) -> Option<u64> {
    links
        .get(index)
        .filter(|l| l.serial == serial)
        .and_then(LinkInfo::frames)
}
