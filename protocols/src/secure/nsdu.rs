use serde::Deserialize;

use super::apdu::Apdu;
use crate::error::{FrameError, ensure_len};

pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;
/// STX plus the 16-bit APDU length.
pub const NSDU_HEADER_LEN: usize = 3;

/// Broadband frames carry no crc; narrowband frames add a 16-bit one before ETX.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    #[default]
    Bb,
    Nb,
}

impl NetworkType {
    /// Bytes that follow the APDU: optional crc, then ETX.
    pub fn trailer_len(self) -> usize {
        match self {
            NetworkType::Bb => 1,
            NetworkType::Nb => 3,
        }
    }
}

/// Low 16 bits of CRC-32 over the length field and the APDU.
pub fn crc(len_bytes: [u8; 2], apdu: &[u8]) -> u16 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&len_bytes);
    hasher.update(apdu);
    (hasher.finalize() & 0xFFFF) as u16
}

pub fn encode(apdu: &Apdu, network: NetworkType) -> Result<Vec<u8>, FrameError> {
    let body: Vec<u8> = apdu.encode()?;
    let len: u16 = u16::try_from(body.len()).map_err(|_| FrameError::TooLarge(body.len()))?;
    let len_bytes: [u8; 2] = len.to_be_bytes();

    let mut buffer: Vec<u8> =
        Vec::with_capacity(NSDU_HEADER_LEN + body.len() + network.trailer_len());
    buffer.push(STX);
    buffer.extend_from_slice(&len_bytes);
    buffer.extend_from_slice(&body);
    if network == NetworkType::Nb {
        buffer.extend_from_slice(&crc(len_bytes, &body).to_be_bytes());
    }
    buffer.push(ETX);
    Ok(buffer)
}

/// Decodes one complete NSDU.
pub fn decode(buf: &[u8], network: NetworkType) -> Result<Apdu, FrameError> {
    ensure_len(buf, NSDU_HEADER_LEN)?;
    if buf[0] != STX {
        return Err(FrameError::Delimiter("STX"));
    }

    let len_bytes: [u8; 2] = [buf[1], buf[2]];
    let len: usize = usize::from(u16::from_be_bytes(len_bytes));
    let body_end: usize = NSDU_HEADER_LEN + len;
    ensure_len(buf, body_end + network.trailer_len())?;
    let body: &[u8] = &buf[NSDU_HEADER_LEN..body_end];

    let mut cursor: usize = body_end;
    if network == NetworkType::Nb {
        let received: u16 = u16::from_be_bytes([buf[cursor], buf[cursor + 1]]);
        let computed: u16 = crc(len_bytes, body);
        if received != computed {
            return Err(FrameError::Crc { computed, received });
        }
        cursor += 2;
    }

    if buf[cursor] != ETX {
        return Err(FrameError::Delimiter("ETX"));
    }

    Apdu::decode(body)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
