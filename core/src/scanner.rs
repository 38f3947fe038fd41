//! # Terminal Scanner
//!
//! Finds live terminals by connecting to their service port. A fixed pool of
//! workers pulls addresses from one shared queue, so the worker count is also
//! the ceiling on sockets in flight. Hits are delivered in completion order.
//!
//! How an address is probed is behind the [`Prober`] trait; [`TcpProber`] is the
//! real one and optionally identifies the terminal with `GetTerminalType`.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dknw_common::config::{defaults, validate_workers};
use dknw_common::error::{Error, Result};
use dknw_common::signal::StopSignal;
use dknw_protocols::terminal_type::{self, MESSAGE_HEADER_LEN, TerminalType};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::network::tcp::{connect_within, within};

type AddressQueue = Arc<Mutex<Box<dyn Iterator<Item = Ipv4Addr> + Send>>>;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub port: u16,
    pub timeout: Duration,
    pub workers: usize,
    /// Ask every live host for its terminal type.
    pub identify: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            port: defaults::TERMINAL_PORT,
            timeout: defaults::SCAN_TIMEOUT,
            workers: defaults::SCAN_WORKERS,
            identify: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LiveHost {
    pub ip: Ipv4Addr,
    pub port: u16,
    pub terminal_type: Option<TerminalType>,
    /// Time from dispatch until the probe finished.
    pub elapsed: Duration,
}

#[async_trait]
pub trait Prober: Send + Sync + 'static {
    /// `Some` when `ip` accepted a connection. Unreachable hosts are `None`.
    async fn probe(&self, ip: Ipv4Addr) -> Option<LiveHost>;
}

pub struct TcpProber {
    port: u16,
    timeout: Duration,
    identify: bool,
}

impl TcpProber {
    pub fn new(options: &ScanOptions) -> Self {
        Self {
            port: options.port,
            timeout: options.timeout,
            identify: options.identify,
        }
    }

    async fn identify(&self, stream: &mut TcpStream) -> Result<TerminalType> {
        within(self.timeout, "GetTerminalType request", async {
            stream.write_all(&terminal_type::request()).await?;
            stream.flush().await
        })
        .await?;

        let mut message: Vec<u8> = vec![0u8; MESSAGE_HEADER_LEN];
        within(
            self.timeout,
            "GetTerminalType header",
            stream.read_exact(&mut message),
        )
        .await?;

        let (_, size) = terminal_type::parse_header(&message)?;
        message.resize(MESSAGE_HEADER_LEN + size, 0);
        within(
            self.timeout,
            "GetTerminalType payload",
            stream.read_exact(&mut message[MESSAGE_HEADER_LEN..]),
        )
        .await?;

        Ok(TerminalType::decode(&message)?)
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, ip: Ipv4Addr) -> Option<LiveHost> {
        let started: Instant = Instant::now();
        let host: String = ip.to_string();
        let mut stream: TcpStream = match connect_within(&host, self.port, self.timeout).await {
            Ok(stream) => stream,
            Err(e) => {
                trace!("{e}");
                return None;
            }
        };

        let terminal_type: Option<TerminalType> = if self.identify {
            match self.identify(&mut stream).await {
                Ok(kind) => Some(kind),
                Err(e) => {
                    debug!("{ip} accepted but did not identify: {e}");
                    None
                }
            }
        } else {
            None
        };

        Some(LiveHost {
            ip,
            port: self.port,
            terminal_type,
            elapsed: started.elapsed(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Addresses handed to the prober.
    pub probed: u64,
    pub cancelled: bool,
}

pub struct TerminalScanner {
    prober: Arc<dyn Prober>,
    workers: usize,
    /// Hard ceiling on a single probe, whatever the prober does.
    bound: Duration,
}

impl TerminalScanner {
    pub fn new(options: &ScanOptions) -> Result<Self> {
        let prober: Arc<dyn Prober> = Arc::new(TcpProber::new(options));
        // Connect and identify each get the full timeout.
        Self::with_prober(prober, options.workers, options.timeout * 2)
    }

    pub fn with_prober(prober: Arc<dyn Prober>, workers: usize, bound: Duration) -> Result<Self> {
        if bound.is_zero() {
            return Err(Error::Configuration("probe timeout must be positive".into()));
        }
        Ok(Self {
            prober,
            workers: validate_workers(workers)?,
            bound,
        })
    }

    /// Starts the worker pool over `addresses`. Each call is an independent scan.
    pub fn scan<I>(&self, addresses: I, stop: StopSignal) -> ScanHandle
    where
        I: Iterator<Item = Ipv4Addr> + Send + 'static,
    {
        let queue: AddressQueue = Arc::new(Mutex::new(Box::new(addresses)));
        let (sender, receiver) = mpsc::channel::<LiveHost>(self.workers);

        let workers: Vec<JoinHandle<u64>> = (0..self.workers)
            .map(|_| {
                tokio::spawn(scan_worker(
                    Arc::clone(&self.prober),
                    Arc::clone(&queue),
                    sender.clone(),
                    stop.clone(),
                    self.bound,
                ))
            })
            .collect();

        debug!("Scanning with {} workers", self.workers);
        ScanHandle {
            receiver,
            workers,
            stop,
        }
    }
}

async fn scan_worker(
    prober: Arc<dyn Prober>,
    queue: AddressQueue,
    sender: mpsc::Sender<LiveHost>,
    stop: StopSignal,
    bound: Duration,
) -> u64 {
    let mut probed: u64 = 0;
    loop {
        if stop.is_stopped() {
            break;
        }
        // A poisoned queue ends the scan like an exhausted one.
        let next: Option<Ipv4Addr> = queue.lock().ok().and_then(|mut q| q.next());
        let Some(ip) = next else {
            break;
        };
        probed += 1;

        tokio::select! {
            biased;
            _ = stop.stopped() => break,
            outcome = timeout(bound, prober.probe(ip)) => {
                let Ok(Some(host)) = outcome else {
                    continue;
                };
                if sender.send(host).await.is_err() {
                    break;
                }
            }
        }
    }
    probed
}

pub struct ScanHandle {
    receiver: mpsc::Receiver<LiveHost>,
    workers: Vec<JoinHandle<u64>>,
    stop: StopSignal,
}

impl ScanHandle {
    /// The next live host, or `None` once every worker is done.
    pub async fn next(&mut self) -> Option<LiveHost> {
        self.receiver.recv().await
    }

    /// Stops delivery and waits for the workers to wind down.
    pub async fn finish(mut self) -> ScanSummary {
        self.receiver.close();
        let mut summary = ScanSummary {
            probed: 0,
            cancelled: self.stop.is_stopped(),
        };
        for worker in self.workers.drain(..) {
            match worker.await {
                Ok(probed) => summary.probed += probed,
                Err(e) => debug!("Scan worker ended abnormally: {e}"),
            }
        }
        summary
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
