use crate::MAX_CHANNELS;
use crate::engine::ProbeError;

pub const OPUS_HEAD_MAGIC: &[u8; 8] = b"OpusHead";
pub const OPUS_TAGS_MAGIC: &[u8; 8] = b"OpusTags";

/// Cabecera de identificación de un flujo Opus (RFC 7845, sección 5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpusHead {
    pub version: u8,
    pub channel_count: u8,
    pub pre_skip: u16,
    pub input_sample_rate: u32,
    /// Ganancia de salida en dB, formato Q7.8.
    pub output_gain: i16,
    pub mapping_family: u8,
    pub stream_count: u8,
    pub coupled_count: u8,
}

impl OpusHead {
    pub fn parse(data: &[u8]) -> Result<Self, ProbeError> {
        if data.len() < OPUS_HEAD_MAGIC.len() || &data[..8] != OPUS_HEAD_MAGIC {
            return Err(ProbeError::NotFormat);
        }
        if data.len() < 9 {
            return Err(ProbeError::BadHeader);
        }

        let version = data[8];
        // solo se rechaza el nibble alto; 1..=15 son compatibles hacia atrás
        if version > 15 {
            return Err(ProbeError::Version(version));
        }
        if data.len() < 19 {
            return Err(ProbeError::BadHeader);
        }

        let channel_count = data[9];
        let pre_skip = u16::from_le_bytes([data[10], data[11]]);
        let input_sample_rate = u32::from_le_bytes([data[12], data[13], data[14], data[15]]);
        let output_gain = i16::from_le_bytes([data[16], data[17]]);
        let mapping_family = data[18];

        let (stream_count, coupled_count) = match mapping_family {
            0 => {
                if !(1..=2).contains(&channel_count) {
                    return Err(ProbeError::BadHeader);
                }
                if version <= 1 && data.len() > 19 {
                    return Err(ProbeError::BadHeader);
                }
                (1, channel_count - 1)
            }
            1 => {
                if !(1..=8).contains(&channel_count) {
                    return Err(ProbeError::BadHeader);
                }
                let size = 21 + usize::from(channel_count);
                if data.len() < size || (version <= 1 && data.len() > size) {
                    return Err(ProbeError::BadHeader);
                }
                let stream_count = data[19];
                let coupled_count = data[20];
                if stream_count < 1 || coupled_count > stream_count {
                    return Err(ProbeError::BadHeader);
                }
                let limit = usize::from(stream_count) + usize::from(coupled_count);
                if data[21..size].iter().any(|&m| m != 255 && usize::from(m) >= limit) {
                    return Err(ProbeError::BadHeader);
                }
                (stream_count, coupled_count)
            }
            // los reproductores de propósito general no deben tocar la familia 255
            255 => return Err(ProbeError::Unimplemented),
            _ => return Err(ProbeError::BadHeader),
        };

        Ok(OpusHead {
            version,
            channel_count,
            pre_skip,
            input_sample_rate,
            output_gain,
            mapping_family,
            stream_count,
            coupled_count,
        })
    }

    /// Mono o estéreo con familia 0: lo que cabe en un único `opus::Decoder`.
    pub fn is_single_stream(&self) -> bool {
        self.mapping_family == 0 && usize::from(self.channel_count) <= MAX_CHANNELS
    }

    pub fn is_tags_packet(data: &[u8]) -> bool {
        data.starts_with(OPUS_TAGS_MAGIC)
    }
}
