use crate::error::{FrameError, ensure_len};

pub const APDU_HEADER_LEN: usize = 4;
const ITEM_HEADER_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApduType {
    AConnect,
    AAccept,
    AReject,
    ARelease,
    ASync,
    AAuthent,
    AAuthentRsp,
    FStart,
    FReady,
    FFinal,
    FEnd,
    FData,
    FCancel,
    FAlive,
    FPurge,
    FPurgeRsp,
    FSkip,
    FSkipRsp,
}

impl ApduType {
    pub fn from_u16(value: u16) -> Result<Self, FrameError> {
        let kind: ApduType = match value {
            0x0000 => ApduType::AConnect,
            0x0001 => ApduType::AAccept,
            0x0002 => ApduType::AReject,
            0x0003 => ApduType::ARelease,
            0x0004 => ApduType::ASync,
            0x0005 => ApduType::AAuthent,
            0x0006 => ApduType::AAuthentRsp,
            0x0100 => ApduType::FStart,
            0x0101 => ApduType::FReady,
            0x0102 => ApduType::FFinal,
            0x0103 => ApduType::FEnd,
            0x0104 => ApduType::FData,
            0x0105 => ApduType::FCancel,
            0x0106 => ApduType::FAlive,
            0x0107 => ApduType::FPurge,
            0x0108 => ApduType::FPurgeRsp,
            0x0109 => ApduType::FSkip,
            0x010A => ApduType::FSkipRsp,
            other => return Err(FrameError::UnknownApdu(other)),
        };
        Ok(kind)
    }

    pub fn to_u16(self) -> u16 {
        match self {
            ApduType::AConnect => 0x0000,
            ApduType::AAccept => 0x0001,
            ApduType::AReject => 0x0002,
            ApduType::ARelease => 0x0003,
            ApduType::ASync => 0x0004,
            ApduType::AAuthent => 0x0005,
            ApduType::AAuthentRsp => 0x0006,
            ApduType::FStart => 0x0100,
            ApduType::FReady => 0x0101,
            ApduType::FFinal => 0x0102,
            ApduType::FEnd => 0x0103,
            ApduType::FData => 0x0104,
            ApduType::FCancel => 0x0105,
            ApduType::FAlive => 0x0106,
            ApduType::FPurge => 0x0107,
            ApduType::FPurgeRsp => 0x0108,
            ApduType::FSkip => 0x0109,
            ApduType::FSkipRsp => 0x010A,
        }
    }
}

/// Value of the FILE_OPERATION item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOperation {
    Idle = 0,
    Read = 1,
    Replace = 2,
    Append = 3,
    Delete = 4,
}

impl FileOperation {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(FileOperation::Idle),
            1 => Some(FileOperation::Read),
            2 => Some(FileOperation::Replace),
            3 => Some(FileOperation::Append),
            4 => Some(FileOperation::Delete),
            _ => None,
        }
    }

    pub fn to_bytes(self) -> [u8; 2] {
        (self as u16).to_be_bytes()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub code: u16,
    pub data: Vec<u8>,
}

impl Item {
    pub fn new(code: u16, data: impl Into<Vec<u8>>) -> Self {
        Self {
            code,
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Apdu {
    Generic { kind: ApduType, items: Vec<Item> },
    Data(Vec<u8>),
}

impl Apdu {
    pub fn generic(kind: ApduType, items: Vec<Item>) -> Self {
        Apdu::Generic { kind, items }
    }

    pub fn bare(kind: ApduType) -> Self {
        Apdu::Generic {
            kind,
            items: Vec::new(),
        }
    }

    pub fn kind(&self) -> ApduType {
        match self {
            Apdu::Generic { kind, .. } => *kind,
            Apdu::Data(_) => ApduType::FData,
        }
    }

    /// Data of the first item with `code`, if any.
    pub fn item(&self, code: u16) -> Option<&[u8]> {
        match self {
            Apdu::Generic { items, .. } => items
                .iter()
                .find(|item| item.code == code)
                .map(|item| item.data.as_slice()),
            Apdu::Data(_) => None,
        }
    }

    /// Big-endian integer held by the item with `code`, if it is 2 or 4 bytes wide.
    pub fn item_u32(&self, code: u16) -> Option<u32> {
        match self.item(code)? {
            [a, b] => Some(u32::from(u16::from_be_bytes([*a, *b]))),
            [a, b, c, d] => Some(u32::from_be_bytes([*a, *b, *c, *d])),
            _ => None,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let payload: Vec<u8> = match self {
            Apdu::Generic { items, .. } => {
                let mut payload: Vec<u8> = Vec::new();
                for item in items {
                    let len: u16 = u16::try_from(item.data.len())
                        .map_err(|_| FrameError::TooLarge(item.data.len()))?;
                    payload.extend_from_slice(&item.code.to_be_bytes());
                    payload.extend_from_slice(&len.to_be_bytes());
                    payload.extend_from_slice(&item.data);
                }
                payload
            }
            Apdu::Data(data) => data.clone(),
        };

        let len: u16 =
            u16::try_from(payload.len()).map_err(|_| FrameError::TooLarge(payload.len()))?;

        let mut buffer: Vec<u8> = Vec::with_capacity(APDU_HEADER_LEN + payload.len());
        buffer.extend_from_slice(&self.kind().to_u16().to_be_bytes());
        buffer.extend_from_slice(&len.to_be_bytes());
        buffer.extend_from_slice(&payload);
        Ok(buffer)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        ensure_len(buf, APDU_HEADER_LEN)?;
        let kind: ApduType = ApduType::from_u16(u16::from_be_bytes([buf[0], buf[1]]))?;
        let len: usize = usize::from(u16::from_be_bytes([buf[2], buf[3]]));
        ensure_len(buf, APDU_HEADER_LEN + len)?;
        let payload: &[u8] = &buf[APDU_HEADER_LEN..APDU_HEADER_LEN + len];

        if kind == ApduType::FData {
            return Ok(Apdu::Data(payload.to_vec()));
        }

        Ok(Apdu::Generic {
            kind,
            items: decode_items(payload)?,
        })
    }
}

fn decode_items(mut payload: &[u8]) -> Result<Vec<Item>, FrameError> {
    let mut items: Vec<Item> = Vec::new();

    while !payload.is_empty() {
        if payload.len() < ITEM_HEADER_LEN {
            return Err(FrameError::MalformedItems("item header"));
        }
        let code: u16 = u16::from_be_bytes([payload[0], payload[1]]);
        let len: usize = usize::from(u16::from_be_bytes([payload[2], payload[3]]));
        let end: usize = ITEM_HEADER_LEN + len;
        if payload.len() < end {
            return Err(FrameError::MalformedItems("item data"));
        }

        items.push(Item::new(code, &payload[ITEM_HEADER_LEN..end]));
        payload = &payload[end..];
    }

    Ok(items)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
