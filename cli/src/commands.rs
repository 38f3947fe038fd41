pub mod download;
pub mod scan;
pub mod search;
pub mod upload;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand};
use dknw_common::config::{Config, defaults};
use dknw_common::model::{ProtocolKind, Terminal};
use dknw_common::network::target::Target;
use dknw_core::transport::{TerminalClientFactory, TransportOptions};
use dknw_protocols::secure::DeviceProfile;
use tracing::info;

#[derive(Parser)]
#[command(name = "dknw", version)]
#[command(about = "Finds karaoke terminals and moves files in and out of their numbered storage.")]
pub struct CommandLine {
    #[command(subcommand)]
    pub command: Commands,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Less output (-q hides banner and progress, -qq prints results only)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(long, global = true)]
    pub no_banner: bool,

    /// Network timeout in seconds
    #[arg(long, global = true, default_value_t = 5.0)]
    pub timeout: f64,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Find live terminals in a network
    #[command(alias = "sc")]
    Scan {
        /// CIDR block, host or range (10.0.0.1-40)
        target: Target,

        #[arg(long, default_value_t = defaults::TERMINAL_PORT)]
        port: u16,

        #[arg(long, default_value_t = defaults::SCAN_WORKERS)]
        workers: usize,

        /// Skip the GetTerminalType exchange
        #[arg(long)]
        no_identify: bool,
    },
    /// Sweep a terminal's storage for present entries
    #[command(alias = "se")]
    Search {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Download every present entry into this directory
        #[arg(long)]
        dest: Option<PathBuf>,

        #[arg(long, default_value_t = defaults::SEARCH_WORKERS)]
        workers: usize,

        #[arg(long, default_value_t = defaults::DIRECTORY_MIN)]
        dir_min: u32,

        #[arg(long, default_value_t = defaults::DIRECTORY_MAX)]
        dir_max: u32,

        #[arg(long, default_value_t = defaults::FILE_MIN)]
        file_min: u32,

        #[arg(long, default_value_t = defaults::FILE_MAX)]
        file_max: u32,

        /// Only try the usual file numbers (1, 2, .., 10, 20, .., 900000) and today's 1MMDD
        #[arg(long)]
        common: bool,

        /// Connect attempts per address
        #[arg(long, default_value_t = 3)]
        attempts: u32,
    },
    /// Fetch one entry
    #[command(alias = "dl")]
    Download {
        #[command(flatten)]
        connection: ConnectionArgs,

        directory: u32,

        file: u32,

        /// File or existing directory
        dest: PathBuf,

        /// Retries on connection-level failures
        #[arg(long, default_value_t = 0)]
        retries: u32,
    },
    /// Store one file
    #[command(alias = "ul")]
    Upload {
        #[command(flatten)]
        connection: ConnectionArgs,

        src: PathBuf,

        directory: u32,

        file: u32,

        /// Retries on connection-level failures
        #[arg(long, default_value_t = 0)]
        retries: u32,
    },
}

/// Where a terminal is and how to talk to it.
#[derive(Args)]
pub struct ConnectionArgs {
    pub host: String,

    pub port: u16,

    /// secure | dual-channel
    #[arg(long, default_value = "dual-channel")]
    pub protocol: ProtocolKind,

    /// Dual-channel control port (defaults to data port + 1)
    #[arg(long)]
    pub control_port: Option<u16>,

    /// Dual-channel data port (defaults to PORT)
    #[arg(long)]
    pub data_port: Option<u16>,

    /// Device profile TOML, required by the secure protocol
    #[arg(long)]
    pub profile: Option<PathBuf>,

    /// Require the DS2INFO greeting on connect
    #[arg(long)]
    pub greeting: bool,
}

impl ConnectionArgs {
    pub fn terminal(&self) -> anyhow::Result<Terminal> {
        Ok(Terminal::new(
            self.protocol,
            self.host.as_str(),
            self.port,
            self.control_port,
            self.data_port,
        )?)
    }

    pub fn factory(&self, cfg: &Config) -> anyhow::Result<Arc<TerminalClientFactory>> {
        let terminal: Terminal = self.terminal()?;
        let profile: Option<Arc<DeviceProfile>> = match &self.profile {
            Some(path) => {
                let profile: DeviceProfile = DeviceProfile::load(path)
                    .with_context(|| format!("loading device profile {}", path.display()))?;
                Some(Arc::new(profile))
            }
            None => None,
        };

        let options = TransportOptions {
            timeout: cfg.timeout,
            expect_greeting: self.greeting,
            profile,
            ..TransportOptions::default()
        };
        info!("Target terminal: {terminal}");
        Ok(Arc::new(TerminalClientFactory::new(&terminal, options)?))
    }
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
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
