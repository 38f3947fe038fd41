use thiserror::Error;

/// Codec-level failures. None of them carry I/O; they describe bytes already in hand.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("bad frame magic {0:02x?}")]
    BadMagic([u8; 4]),

    #[error("unknown opcode 0x{0:08x}")]
    UnknownOpcode(u32),

    #[error("checksum mismatch: computed 0x{computed:08x}, frame carries 0x{received:08x}")]
    Checksum { computed: u32, received: u32 },

    #[error("{kind} frame must be {expected} bytes, got {actual}")]
    Length {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("missing {0} delimiter")]
    Delimiter(&'static str),

    #[error("crc mismatch: computed 0x{computed:04x}, frame carries 0x{received:04x}")]
    Crc { computed: u16, received: u16 },

    #[error("unknown APDU type 0x{0:04x}")]
    UnknownApdu(u16),

    #[error("malformed item list in {0}")]
    MalformedItems(&'static str),

    #[error("payload of {0} bytes does not fit a 16-bit length")]
    TooLarge(usize),

    #[error("unexpected message type 0x{0:04x}")]
    UnexpectedMessage(u16),

    #[error("invalid device profile: {0}")]
    Profile(String),
}

impl From<FrameError> for dknw_common::Error {
    fn from(err: FrameError) -> Self {
        dknw_common::Error::Protocol(err.to_string())
    }
}

/// Fails with [`FrameError::Truncated`] unless `buf` holds at least `needed` bytes.
pub(crate) fn ensure_len(buf: &[u8], needed: usize) -> Result<(), FrameError> {
    if buf.len() < needed {
        return Err(FrameError::Truncated {
            needed,
            available: buf.len(),
        });
    }
    Ok(())
}
