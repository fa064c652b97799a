//! Sincronización de páginas Ogg (RFC 3533) y recorrido de cabeceras de
//! página. La validación de cada página (versión y CRC) la hace
//! `ogg::reading::PageParser`.

use std::io::{self, Cursor, Read, Seek, SeekFrom};

use ogg::OggReadError;
use ogg::reading::PageParser;
use tracing::trace;

use crate::engine::{OpusHead, ProbeError};

const CAPTURE: &[u8; 4] = b"OggS";
const HEADER_LEN: usize = 27;
const FLAG_CONTINUED: u8 = 0x01;
const FLAG_BOS: u8 = 0x02;

/// Primera página mínima de un fichero Opus: 27 bytes de cabecera, 1 valor de
/// lacing y 19 bytes de OpusHead con familia 0.
pub(crate) const MIN_PROBE_BYTES: usize = 47;

/// Una página ya validada. Solo se conserva el cuerpo del primer paquete de
/// las páginas BOS, que es donde viven las cabeceras de identificación.
#[derive(Debug, Clone)]
pub(crate) struct Page {
    header_type: u8,
    granule: u64,
    serial: u32,
    ends_packet: bool,
    bos_packet: Option<Vec<u8>>,
}

impl Page {
    pub(crate) fn is_bos(&self) -> bool {
        self.header_type & FLAG_BOS != 0
    }

    pub(crate) fn is_continued(&self) -> bool {
        self.header_type & FLAG_CONTINUED != 0
    }
}

fn first_packet_len(segments: &[u8]) -> Option<usize> {
    let mut len = 0;
    for &lace in segments {
        len += usize::from(lace);
        if lace < 255 {
            return Some(len);
        }
    }
    None
}

enum PageSync {
    Page(Page),
    /// Se acabaron los datos a mitad de página.
    Truncated,
    /// Versión desconocida o CRC incorrecto.
    Invalid(OggReadError),
}

/// Siguiente página válida a partir de la posición actual.
///
/// Basura entre páginas, páginas corruptas y páginas cortadas se tratan como
/// huecos: se busca el siguiente patrón de captura desde el byte posterior
/// al que se descartó, igual que hace `ogg::PacketReader` al leer. `None`
/// cuando ya no queda ninguna página completa.
pub(crate) fn next_page<R: Read + Seek>(reader: &mut R) -> io::Result<Option<Page>> {
    loop {
        if !find_capture(reader)? {
            return Ok(None);
        }
        let start = reader.stream_position()? - CAPTURE.len() as u64;
        match read_page(reader)? {
            PageSync::Page(page) => return Ok(Some(page)),
            PageSync::Truncated => trace!(offset = start, "truncated ogg page, resyncing"),
            PageSync::Invalid(e) => trace!(offset = start, %e, "invalid ogg page, resyncing"),
        }
        reader.seek(SeekFrom::Start(start + 1))?;
    }
}

/// Avanza hasta justo después del siguiente "OggS".
fn find_capture<R: Read>(reader: &mut R) -> io::Result<bool> {
    let mut matched = 0;
    for byte in reader.by_ref().bytes() {
        let byte = byte?;
        matched = if byte == CAPTURE[matched] {
            matched + 1
        } else {
            usize::from(byte == CAPTURE[0])
        };
        if matched == CAPTURE.len() {
            return Ok(true);
        }
    }
    Ok(false)
}

fn read_page<R: Read>(reader: &mut R) -> io::Result<PageSync> {
    let mut header = [0u8; HEADER_LEN];
    header[..CAPTURE.len()].copy_from_slice(CAPTURE);
    if !read_full(reader, &mut header[CAPTURE.len()..])? {
        return Ok(PageSync::Truncated);
    }
    let (mut parser, nsegs) = match PageParser::new(header) {
        Ok(parsed) => parsed,
        Err(e) => return Ok(PageSync::Invalid(e)),
    };

    let mut segments = vec![0u8; nsegs];
    if !read_full(reader, &mut segments)? {
        return Ok(PageSync::Truncated);
    }
    let first_len = first_packet_len(&segments);
    let body_len = parser.parse_segments(segments);

    let mut body = vec![0u8; body_len];
    if !read_full(reader, &mut body)? {
        return Ok(PageSync::Truncated);
    }

    let header_type = header[5];
    let bos_packet = match first_len {
        Some(len) if header_type & FLAG_BOS != 0 && header_type & FLAG_CONTINUED == 0 => {
            Some(body[..len].to_vec())
        }
        _ => None,
    };
    if let Err(e) = parser.parse_packet_data(body) {
        return Ok(PageSync::Invalid(e));
    }

    Ok(PageSync::Page(Page {
        header_type,
        granule: u64::from_le_bytes([
            header[6], header[7], header[8], header[9], header[10], header[11], header[12], header[13],
        ]),
        serial: u32::from_le_bytes([header[14], header[15], header[16], header[17]]),
        ends_packet: first_len.is_some(),
        bos_packet,
    }))
}

/// Busca una cabecera OpusHead en los primeros bytes de un fichero.
pub(crate) fn probe(initial: &[u8]) -> Result<OpusHead, ProbeError> {
    if initial.len() < MIN_PROBE_BYTES {
        return Err(ProbeError::NeedMoreData);
    }
    // evita perder tiempo buscando páginas en ficheros que no son Ogg
    if !initial.starts_with(CAPTURE) {
        return Err(ProbeError::NotFormat);
    }

    let mut cursor = Cursor::new(initial);
    loop {
        let page = match next_page(&mut cursor) {
            Ok(Some(page)) => page,
            Ok(None) => break,
            Err(_) => return Err(ProbeError::Fault),
        };
        if page.is_continued() || !page.ends_packet {
            continue;
        }
        let Some(packet) = page.bos_packet else {
            // ya pasaron todas las cabeceras BOS sin rastro de Opus
            return Err(ProbeError::NotFormat);
        };
        match OpusHead::parse(&packet) {
            Err(ProbeError::NotFormat) => continue,
            other => return other,
        }
    }

    Err(ProbeError::NeedMoreData)
}

/// Un enlace Opus dentro de un fichero (posiblemente encadenado).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LinkInfo {
    pub serial: u32,
    pub pre_skip: u16,
    pub last_granule: Option<u64>,
}

impl LinkInfo {
    pub(crate) fn frames(&self) -> Option<u64> {
        self.last_granule
            .map(|g| g.saturating_sub(u64::from(self.pre_skip)))
    }
}

/// Recorre todas las páginas para conocer cada enlace Opus decodificable y su
/// última posición de gránulo. Los enlaces multicanal se ignoran, como al
/// decodificar. Salta los mismos huecos que el lector de paquetes,
/// así que la duración coincide con lo que se decodifica.
pub(crate) fn scan_links<R: Read + Seek>(reader: &mut R) -> io::Result<Vec<LinkInfo>> {
    let mut links: Vec<LinkInfo> = Vec::new();

    while let Some(page) = next_page(reader)? {
        if page.is_bos() {
            let head = page.bos_packet.as_deref().and_then(|p| OpusHead::parse(p).ok());
            if let Some(head) = head.filter(OpusHead::is_single_stream) {
                trace!(serial = page.serial, pre_skip = head.pre_skip, "found opus link");
                links.push(LinkInfo {
                    serial: page.serial,
                    pre_skip: head.pre_skip,
                    last_granule: None,
                });
            }
            continue;
        }

        // -1 (todo unos) marca páginas donde no termina ningún paquete
        if page.granule != u64::MAX {
            if let Some(link) = links.iter_mut().rev().find(|l| l.serial == page.serial) {
                link.last_granule = Some(page.granule);
            }
        }
    }

    Ok(links)
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}
