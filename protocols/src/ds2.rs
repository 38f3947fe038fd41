//! # DS2 Frames
//!
//! Control-channel frames of the dual-channel protocol. Every frame starts with
//! the `"DS2\0"` magic and a big-endian opcode, and all fixed-size frames end in
//! a 32-bit checksum over the bytes before it.
//!
//! | Frame    | Body after the header                                   | Total |
//! |----------|---------------------------------------------------------|-------|
//! | DS2INFO  | addr, mac[6], pad[2], serial[8], throughput, token group, essid[32], wlan type | 0x4C |
//! | RTS      | directory, file, size, serial                           | 0x1C |
//! | CTS      | total, done, block                                      | 0x18 |
//! | ERRORCTS | total, done, block, 4 unchecked bytes, text up to `\n`  | ≥ 0x18 |

use std::fmt;

use crate::error::{FrameError, ensure_len};

pub const MAGIC: [u8; 4] = *b"DS2\0";
pub const HEADER_LEN: usize = 8;

pub const INFO_LEN: usize = 0x4C;
pub const RTS_LEN: usize = 0x1C;
pub const CTS_LEN: usize = 0x18;
/// Fixed part of an ERRORCTS; the message text follows it.
pub const ERROR_CTS_LEN: usize = 0x18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Info,
    Rts,
    Cts,
    ErrorCts,
}

impl Opcode {
    pub fn from_u32(value: u32) -> Result<Self, FrameError> {
        match value {
            0 => Ok(Opcode::Info),
            1 => Ok(Opcode::Rts),
            2 => Ok(Opcode::Cts),
            0x8000_0002 => Ok(Opcode::ErrorCts),
            other => Err(FrameError::UnknownOpcode(other)),
        }
    }

    pub fn to_u32(self) -> u32 {
        match self {
            Opcode::Info => 0,
            Opcode::Rts => 1,
            Opcode::Cts => 2,
            Opcode::ErrorCts => 0x8000_0002,
        }
    }

    /// Bytes on the wire, header and checksum included. ERRORCTS text is extra.
    pub fn frame_len(self) -> usize {
        match self {
            Opcode::Info => INFO_LEN,
            Opcode::Rts => RTS_LEN,
            Opcode::Cts => CTS_LEN,
            Opcode::ErrorCts => ERROR_CTS_LEN,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Opcode::Info => "DS2INFO",
            Opcode::Rts => "RTS",
            Opcode::Cts => "CTS",
            Opcode::ErrorCts => "ERRORCTS",
        }
    }
}

/// Sum of big-endian 32-bit words (last one zero-padded), inverted.
pub fn checksum(data: &[u8]) -> u32 {
    let sum: u32 = data.chunks(4).fold(0u32, |sum, chunk| {
        let mut word: [u8; 4] = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        sum.wrapping_add(u32::from_be_bytes(word))
    });
    !sum
}

/// Greeting a terminal may send when the control channel opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalInfo {
    pub address: u32,
    pub mac: [u8; 6],
    pub serial: [u8; 8],
    pub throughput: u32,
    pub token_group: u32,
    pub essid: [u8; 32],
    pub wlan_type: u32,
}

impl TerminalInfo {
    pub fn essid_lossy(&self) -> String {
        trim_text(&self.essid)
    }

    pub fn serial_lossy(&self) -> String {
        trim_text(&self.serial)
    }
}

/// Request to send: opens a retrieve (`size == 0`) or a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rts {
    pub directory: u32,
    pub file: u32,
    pub size: u32,
    pub serial: u32,
}

/// Clear to send: where a transfer stands and how big the next block is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cts {
    pub total: u32,
    pub done: u32,
    pub block: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCts {
    pub total: u32,
    pub done: u32,
    pub block: u32,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Info(TerminalInfo),
    Rts(Rts),
    Cts(Cts),
    ErrorCts(ErrorCts),
}

impl Frame {
    pub fn opcode(&self) -> Opcode {
        match self {
            Frame::Info(_) => Opcode::Info,
            Frame::Rts(_) => Opcode::Rts,
            Frame::Cts(_) => Opcode::Cts,
            Frame::ErrorCts(_) => Opcode::ErrorCts,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let opcode: Opcode = self.opcode();
        let mut buffer: Vec<u8> = vec![0u8; opcode.frame_len()];
        buffer[0..4].copy_from_slice(&MAGIC);
        put_u32(&mut buffer, 4, opcode.to_u32());

        match self {
            Frame::Info(info) => {
                put_u32(&mut buffer, 8, info.address);
                buffer[12..18].copy_from_slice(&info.mac);
                buffer[20..28].copy_from_slice(&info.serial);
                put_u32(&mut buffer, 28, info.throughput);
                put_u32(&mut buffer, 32, info.token_group);
                buffer[36..68].copy_from_slice(&info.essid);
                put_u32(&mut buffer, 68, info.wlan_type);
            }
            Frame::Rts(rts) => {
                put_u32(&mut buffer, 8, rts.directory);
                put_u32(&mut buffer, 12, rts.file);
                put_u32(&mut buffer, 16, rts.size);
                put_u32(&mut buffer, 20, rts.serial);
            }
            Frame::Cts(cts) => {
                put_u32(&mut buffer, 8, cts.total);
                put_u32(&mut buffer, 12, cts.done);
                put_u32(&mut buffer, 16, cts.block);
            }
            Frame::ErrorCts(err) => {
                put_u32(&mut buffer, 8, err.total);
                put_u32(&mut buffer, 12, err.done);
                put_u32(&mut buffer, 16, err.block);
            }
        }

        let body_end: usize = buffer.len() - 4;
        let sum: u32 = checksum(&buffer[..body_end]);
        put_u32(&mut buffer, body_end, sum);

        if let Frame::ErrorCts(err) = self {
            if !err.message.is_empty() {
                buffer.extend_from_slice(err.message.as_bytes());
                buffer.push(b'\n');
            }
        }

        buffer
    }

    /// Decodes one complete frame, header included.
    ///
    /// Fixed-size frames must be exactly their length and carry a valid checksum.
    /// ERRORCTS is accepted with any text tail and its checksum is not verified.
    pub fn decode(buf: &[u8]) -> Result<Frame, FrameError> {
        ensure_len(buf, HEADER_LEN)?;

        let magic: [u8; 4] = [buf[0], buf[1], buf[2], buf[3]];
        if magic != MAGIC {
            return Err(FrameError::BadMagic(magic));
        }

        let opcode: Opcode = Opcode::from_u32(get_u32(buf, 4))?;

        match opcode {
            Opcode::Info => {
                verify_fixed(buf, opcode)?;
                Ok(Frame::Info(TerminalInfo {
                    address: get_u32(buf, 8),
                    mac: copy_array(&buf[12..18]),
                    serial: copy_array(&buf[20..28]),
                    throughput: get_u32(buf, 28),
                    token_group: get_u32(buf, 32),
                    essid: copy_array(&buf[36..68]),
                    wlan_type: get_u32(buf, 68),
                }))
            }
            Opcode::Rts => {
                verify_fixed(buf, opcode)?;
                Ok(Frame::Rts(Rts {
                    directory: get_u32(buf, 8),
                    file: get_u32(buf, 12),
                    size: get_u32(buf, 16),
                    serial: get_u32(buf, 20),
                }))
            }
            Opcode::Cts => {
                verify_fixed(buf, opcode)?;
                Ok(Frame::Cts(Cts {
                    total: get_u32(buf, 8),
                    done: get_u32(buf, 12),
                    block: get_u32(buf, 16),
                }))
            }
            Opcode::ErrorCts => {
                ensure_len(buf, ERROR_CTS_LEN)?;
                Ok(Frame::ErrorCts(ErrorCts {
                    total: get_u32(buf, 8),
                    done: get_u32(buf, 12),
                    block: get_u32(buf, 16),
                    message: error_text(&buf[ERROR_CTS_LEN..]),
                }))
            }
        }
    }
}

fn verify_fixed(buf: &[u8], opcode: Opcode) -> Result<(), FrameError> {
    let expected: usize = opcode.frame_len();
    if buf.len() != expected {
        return Err(FrameError::Length {
            kind: opcode.name(),
            expected,
            actual: buf.len(),
        });
    }

    let body_end: usize = expected - 4;
    let computed: u32 = checksum(&buf[..body_end]);
    let received: u32 = get_u32(buf, body_end);
    if computed != received {
        return Err(FrameError::Checksum { computed, received });
    }
    Ok(())
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Info(info) => write!(f, "DS2INFO(serial {})", info.serial_lossy()),
            Frame::Rts(rts) => write!(
                f,
                "RTS({}.{}, size {})",
                rts.directory, rts.file, rts.size
            ),
            Frame::Cts(cts) => write!(
                f,
                "CTS({}/{} block {})",
                cts.done, cts.total, cts.block
            ),
            Frame::ErrorCts(err) => write!(f, "ERRORCTS({:?})", err.message),
        }
    }
}

fn put_u32(buffer: &mut [u8], offset: usize, value: u32) {
    buffer[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

fn get_u32(buffer: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        buffer[offset],
        buffer[offset + 1],
        buffer[offset + 2],
        buffer[offset + 3],
    ])
}

fn copy_array<const N: usize>(src: &[u8]) -> [u8; N] {
    let mut out: [u8; N] = [0u8; N];
    out.copy_from_slice(src);
    out
}

fn error_text(tail: &[u8]) -> String {
    let line: &[u8] = tail.split(|byte| *byte == b'\n').next().unwrap_or_default();
    trim_text(line)
}

fn trim_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(['\0', '\r', ' '])
        .to_string()
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
