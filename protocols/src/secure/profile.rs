//! Device profile for the secure protocol.
//!
//! Item type codes and the cipher table differ per firmware family, so they are
//! loaded from a TOML file instead of being compiled in:
//!
//! ```toml
//! network = "nb"
//! cipher_table = [0x3a, 0x91, ...] # 256 entries
//!
//! [items]
//! system_id = 0x0001
//! protocol_id = 0x0002
//! client_side = 0x0003
//! job_id = 0x0004
//! auth_req = 0x0010
//! auth_res = 0x0011
//! file_operation = 0x0020
//! file_number = 0x0021
//! expect_file_size = 0x0022
//! ```

use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use super::cipher::{ChallengeCipher, TABLE_LEN};
use super::nsdu::NetworkType;
use crate::error::FrameError;

/// APDU item type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ItemCodes {
    pub system_id: u16,
    pub protocol_id: u16,
    pub client_side: u16,
    pub job_id: u16,
    pub auth_req: u16,
    pub auth_res: u16,
    pub file_operation: u16,
    pub file_number: u16,
    pub expect_file_size: u16,
}

#[derive(Debug, Deserialize)]
struct ProfileFile {
    #[serde(default)]
    network: NetworkType,
    #[serde(default = "default_system_id")]
    system_id: String,
    #[serde(default = "default_protocol_id")]
    protocol_id: String,
    #[serde(default)]
    client_side: u16,
    #[serde(default = "default_job_id")]
    job_id: u16,
    items: ItemCodes,
    cipher_table: Vec<u8>,
}

fn default_system_id() -> String {
    "DKNW10".to_string()
}

fn default_protocol_id() -> String {
    "SFTP11".to_string()
}

fn default_job_id() -> u16 {
    0x0110
}

#[derive(Debug, Clone)]
pub struct DeviceProfile {
    pub network: NetworkType,
    pub system_id: String,
    pub protocol_id: String,
    pub client_side: u16,
    pub job_id: u16,
    pub items: ItemCodes,
    cipher: ChallengeCipher,
}

impl DeviceProfile {
    pub fn new(network: NetworkType, items: ItemCodes, cipher_table: [u8; TABLE_LEN]) -> Self {
        Self {
            network,
            system_id: default_system_id(),
            protocol_id: default_protocol_id(),
            client_side: 0,
            job_id: default_job_id(),
            items,
            cipher: ChallengeCipher::new(cipher_table),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self, FrameError> {
        let file: ProfileFile =
            toml::from_str(text).map_err(|e| FrameError::Profile(e.to_string()))?;

        let table: [u8; TABLE_LEN] = file.cipher_table.as_slice().try_into().map_err(|_| {
            FrameError::Profile(format!(
                "cipher_table needs {TABLE_LEN} entries, found {}",
                file.cipher_table.len()
            ))
        })?;

        Ok(Self {
            network: file.network,
            system_id: file.system_id,
            protocol_id: file.protocol_id,
            client_side: file.client_side,
            job_id: file.job_id,
            items: file.items,
            cipher: ChallengeCipher::new(table),
        })
    }

    pub fn load(path: &Path) -> Result<Self, FrameError> {
        let text: String = std::fs::read_to_string(path)
            .map_err(|e| FrameError::Profile(format!("{}: {e}", path.display())))?;
        let profile: DeviceProfile = Self::from_toml(&text)?;
        debug!(path = %path.display(), network = ?profile.network, "Loaded device profile");
        Ok(profile)
    }

    pub fn cipher(&self) -> &ChallengeCipher {
        &self.cipher
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
