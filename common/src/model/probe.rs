use std::fmt;
use std::path::PathBuf;

use super::address::Address;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeStatus {
    Present,
    Absent,
    Error,
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeStatus::Present => f.write_str("PRESENT"),
            ProbeStatus::Absent => f.write_str("ABSENT"),
            ProbeStatus::Error => f.write_str("ERROR"),
        }
    }
}

/// Outcome of probing one address during a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub address: Address,
    pub status: ProbeStatus,
    pub size: Option<u64>,
    pub error_detail: Option<String>,
    /// Where the payload was written, when the sweep downloads.
    pub saved_to: Option<PathBuf>,
}

impl ProbeResult {
    pub fn present(address: Address, size: u64) -> Self {
        Self {
            address,
            status: ProbeStatus::Present,
            size: Some(size),
            error_detail: None,
            saved_to: None,
        }
    }

    pub fn absent(address: Address) -> Self {
        Self {
            address,
            status: ProbeStatus::Absent,
            size: None,
            error_detail: None,
            saved_to: None,
        }
    }

    pub fn error(address: Address, detail: impl Into<String>) -> Self {
        Self {
            address,
            status: ProbeStatus::Error,
            size: None,
            error_detail: Some(detail.into()),
            saved_to: None,
        }
    }

    pub fn with_saved_to(mut self, path: PathBuf) -> Self {
        self.saved_to = Some(path);
        self
    }

    pub fn with_error_detail(mut self, detail: impl Into<String>) -> Self {
        self.error_detail = Some(detail.into());
        self
    }

    pub fn is_present(&self) -> bool {
        self.status == ProbeStatus::Present
    }
}
