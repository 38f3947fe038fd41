use std::time::Duration;

/// Compile-time defaults. Every one of them can be overridden from the command line.
pub mod defaults {
    use std::time::Duration;

    pub const DIRECTORY_MIN: u32 = 1000;
    pub const DIRECTORY_MAX: u32 = 9999;
    pub const FILE_MIN: u32 = 0;
    pub const FILE_MAX: u32 = 999_999;

    /// Port the terminal answers `GetTerminalType` on.
    pub const TERMINAL_PORT: u16 = 22960;
    pub const DS2_DATA_PORT: u16 = 23104;
    pub const DS2_CONTROL_PORT: u16 = 23105;

    pub const SCAN_TIMEOUT: Duration = Duration::from_secs(5);
    pub const SCAN_WORKERS: usize = 255;

    pub const TRANSPORT_TIMEOUT: Duration = Duration::from_secs(5);
    /// How long to wait for a trailing acknowledgement the firmware may omit.
    pub const TAIL_TIMEOUT: Duration = Duration::from_secs(1);
    /// How long to wait for the text line that follows an ERRORCTS frame.
    pub const ERROR_TEXT_TIMEOUT: Duration = Duration::from_millis(250);
    pub const SEARCH_WORKERS: usize = 4;

    pub const MAX_WORKERS: usize = 1000;
}

/// Resolved runtime settings shared by the commands.
#[derive(Debug, Clone)]
pub struct Config {
    /// 0 prints everything, 1 drops the banner and progress, 2 prints results only.
    pub quiet: u8,
    pub no_banner: bool,
    /// Per-operation timeout for transports.
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            quiet: 0,
            no_banner: false,
            timeout: defaults::TRANSPORT_TIMEOUT,
        }
    }
}

/// Checks a worker count against the supported ceiling.
pub fn validate_workers(workers: usize) -> crate::Result<usize> {
    if workers == 0 || workers > defaults::MAX_WORKERS {
        return Err(crate::Error::Configuration(format!(
            "worker count must be between 1 and {}, got {workers}",
            defaults::MAX_WORKERS
        )));
    }
    Ok(workers)
}

/// Turns a seconds value from the command line into a timeout.
pub fn timeout_from_secs(secs: f64) -> crate::Result<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(crate::Error::Configuration(format!(
            "timeout must be a positive number of seconds, got {secs}"
        )));
    }
    Ok(Duration::from_secs_f64(secs))
}
