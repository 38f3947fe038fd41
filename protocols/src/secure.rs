//! # Secure File Transfer Codec
//!
//! Frames of the authenticated transfer protocol. An NSDU wraps one APDU between
//! STX and ETX; the APDU is either a list of typed items or a raw data chunk.
//! Item type codes and the challenge cipher table are device data and come from
//! a [`DeviceProfile`](profile::DeviceProfile).

pub mod apdu;
pub mod cipher;
pub mod nsdu;
pub mod profile;

pub use apdu::{Apdu, ApduType, FileOperation, Item};
pub use cipher::ChallengeCipher;
pub use nsdu::NetworkType;
pub use profile::{DeviceProfile, ItemCodes};

/// Largest F_DATA payload the client sends in one frame.
pub const DATA_CHUNK: usize = 0xFF8;
