//! The capability set every terminal transport offers: `stat`, `get`, `put`.
//!
//! Callers hold a `Box<dyn TransportClient>` built by a [`ClientFactory`] and never
//! branch on the wire protocol. Every operation takes `&mut self`, so a session
//! can only ever run one command at a time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dknw_common::config::defaults;
use dknw_common::error::{Error, Result};
use dknw_common::model::{Address, Protocol, Terminal};
use dknw_protocols::secure::DeviceProfile;

pub mod dual_channel;
pub mod secure;

pub use dual_channel::{DualChannelClient, DualChannelConfig, SessionState};
pub use secure::{SecureConfig, SecureFileClient};

#[async_trait]
pub trait TransportClient: Send {
    /// Opens the session. Calling it on an open session is a no-op.
    async fn connect(&mut self) -> Result<()>;

    /// Size of the entry at `address`, or [`Error::NotFound`].
    async fn stat(&mut self, address: Address) -> Result<u64>;

    /// The full payload at `address`. Partial payloads are never returned.
    async fn get(&mut self, address: Address) -> Result<Vec<u8>>;

    /// Stores `payload` at `address` and returns the byte count the terminal accepted.
    async fn put(&mut self, address: Address, payload: &[u8]) -> Result<u64>;

    /// Releases the session. Safe to call on a closed session.
    async fn close(&mut self) -> Result<()>;

    fn is_connected(&self) -> bool;
}

/// Builds fresh, unconnected clients. Workers each own the clients they create.
pub trait ClientFactory: Send + Sync {
    fn create(&self) -> Box<dyn TransportClient>;
}

impl<F> ClientFactory for F
where
    F: Fn() -> Box<dyn TransportClient> + Send + Sync,
{
    fn create(&self) -> Box<dyn TransportClient> {
        self()
    }
}

/// Timeouts and protocol switches shared by both transports.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub timeout: Duration,
    pub tail_timeout: Duration,
    pub error_text_timeout: Duration,
    /// Require a DS2INFO greeting on the dual-channel control connection.
    pub expect_greeting: bool,
    /// Required for the secure protocol.
    pub profile: Option<Arc<DeviceProfile>>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout: defaults::TRANSPORT_TIMEOUT,
            tail_timeout: defaults::TAIL_TIMEOUT,
            error_text_timeout: defaults::ERROR_TEXT_TIMEOUT,
            expect_greeting: false,
            profile: None,
        }
    }
}

#[derive(Debug, Clone)]
enum Variant {
    Secure(SecureConfig),
    DualChannel(DualChannelConfig),
}

/// The one place that knows which client a [`Terminal`] needs.
#[derive(Debug, Clone)]
pub struct TerminalClientFactory {
    variant: Variant,
}

impl TerminalClientFactory {
    pub fn new(terminal: &Terminal, options: TransportOptions) -> Result<Self> {
        let variant: Variant = match terminal.protocol() {
            Protocol::Secure => {
                let profile: Arc<DeviceProfile> = options.profile.clone().ok_or_else(|| {
                    Error::Configuration(
                        "the secure protocol needs a device profile (--profile)".to_string(),
                    )
                })?;
                Variant::Secure(SecureConfig {
                    host: terminal.host().to_string(),
                    port: terminal.port(),
                    timeout: options.timeout,
                    profile,
                })
            }
            Protocol::DualChannel {
                control_port,
                data_port,
            } => Variant::DualChannel(DualChannelConfig {
                host: terminal.host().to_string(),
                control_port,
                data_port,
                timeout: options.timeout,
                tail_timeout: options.tail_timeout,
                error_text_timeout: options.error_text_timeout,
                expect_greeting: options.expect_greeting,
            }),
        };

        Ok(Self { variant })
    }
}

impl ClientFactory for TerminalClientFactory {
    fn create(&self) -> Box<dyn TransportClient> {
        match &self.variant {
            Variant::Secure(config) => Box::new(SecureFileClient::new(config.clone())),
            Variant::DualChannel(config) => Box::new(DualChannelClient::new(config.clone())),
        }
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
