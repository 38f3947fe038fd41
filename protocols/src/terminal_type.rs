//! `GetTerminalType` exchange used to identify a terminal after a scan hit.
//!
//! Messages are `u16 type | u16 payload length | payload`, big-endian.

use crate::error::{FrameError, ensure_len};

pub const REQUEST_TYPE: u16 = 0x4032;
pub const RESPONSE_TYPE: u16 = 0x8032;
pub const MESSAGE_HEADER_LEN: usize = 4;
pub const RESPONSE_PAYLOAD_LEN: usize = 36;

pub fn request() -> [u8; MESSAGE_HEADER_LEN] {
    let mut buffer: [u8; MESSAGE_HEADER_LEN] = [0u8; MESSAGE_HEADER_LEN];
    buffer[0..2].copy_from_slice(&REQUEST_TYPE.to_be_bytes());
    buffer
}

/// Splits a message header into its type and payload length.
pub fn parse_header(header: &[u8]) -> Result<(u16, usize), FrameError> {
    ensure_len(header, MESSAGE_HEADER_LEN)?;
    let message_type: u16 = u16::from_be_bytes([header[0], header[1]]);
    let size: usize = usize::from(u16::from_be_bytes([header[2], header[3]]));
    Ok((message_type, size))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalType {
    pub protocol_version: u32,
    pub model_id: String,
    pub model_sub_id: String,
    pub serial: String,
    pub software_version: String,
    pub bb_index: u16,
    pub printer_version: String,
}

impl TerminalType {
    /// Decodes a whole response message, header included.
    pub fn decode(message: &[u8]) -> Result<Self, FrameError> {
        let (message_type, size) = parse_header(message)?;
        if message_type != RESPONSE_TYPE {
            return Err(FrameError::UnexpectedMessage(message_type));
        }

        let payload: &[u8] = &message[MESSAGE_HEADER_LEN..];
        ensure_len(payload, size.max(RESPONSE_PAYLOAD_LEN))?;

        Ok(Self {
            protocol_version: u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]),
            model_id: ascii(&payload[4..6]),
            model_sub_id: ascii(&payload[6..8]),
            serial: ascii(&payload[8..16]),
            software_version: ascii(&payload[16..24]),
            bb_index: u16::from_be_bytes([payload[24], payload[25]]),
            printer_version: ascii(&payload[28..32]),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buffer: Vec<u8> = vec![0u8; MESSAGE_HEADER_LEN + RESPONSE_PAYLOAD_LEN];
        buffer[0..2].copy_from_slice(&RESPONSE_TYPE.to_be_bytes());
        buffer[2..4].copy_from_slice(&(RESPONSE_PAYLOAD_LEN as u16).to_be_bytes());

        let payload: &mut [u8] = &mut buffer[MESSAGE_HEADER_LEN..];
        payload[0..4].copy_from_slice(&self.protocol_version.to_be_bytes());
        put_ascii(&mut payload[4..6], &self.model_id);
        put_ascii(&mut payload[6..8], &self.model_sub_id);
        put_ascii(&mut payload[8..16], &self.serial);
        put_ascii(&mut payload[16..24], &self.software_version);
        payload[24..26].copy_from_slice(&self.bb_index.to_be_bytes());
        put_ascii(&mut payload[28..32], &self.printer_version);
        buffer
    }
}

fn ascii(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(['\0', ' '])
        .to_string()
}

fn put_ascii(field: &mut [u8], value: &str) {
    let len: usize = value.len().min(field.len());
    field[..len].copy_from_slice(&value.as_bytes()[..len]);
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
