//! # Enumeration Engine
//!
//! The terminals cannot list their storage, so a sweep asks about every address
//! of an [`AddressSpace`]. Workers pull the next address from one shared cursor
//! in canonical order and each owns a lazily opened session. Results are
//! delivered in completion order.
//!
//! A session-fatal error marks the address in hand as ERROR, tears the session
//! down, and the worker reconnects with jittered back-off before its next
//! address. One bad address never ends the sweep.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dknw_common::config::{defaults, validate_workers};
use dknw_common::error::{Error, Result};
use dknw_common::model::{Address, AddressIter, AddressSpace, ProbeResult, ProbeStatus};
use dknw_common::signal::StopSignal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::retry::RetryPolicy;
use crate::transfer::write_atomically;
use crate::transport::{ClientFactory, TransportClient};

#[derive(Debug, Clone)]
pub struct EnumerationOptions {
    pub concurrency: usize,
    /// Download every present entry into this directory instead of only sizing it.
    pub dest: Option<PathBuf>,
    /// Connect attempts per address and the back-off between them.
    pub retry: RetryPolicy,
}

impl Default for EnumerationOptions {
    fn default() -> Self {
        Self {
            concurrency: defaults::SEARCH_WORKERS,
            dest: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// Live counters for progress reporting.
#[derive(Debug, Default)]
pub struct Progress {
    processed: AtomicU64,
    present: AtomicU64,
    errors: AtomicU64,
}

impl Progress {
    fn record(&self, result: &ProbeResult) {
        match result.status {
            ProbeStatus::Present => self.present.fetch_add(1, Ordering::Relaxed),
            ProbeStatus::Error => self.errors.fetch_add(1, Ordering::Relaxed),
            ProbeStatus::Absent => 0,
        };
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn present(&self) -> u64 {
        self.present.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnumerationSummary {
    pub processed: u64,
    pub present: u64,
    pub absent: u64,
    pub errors: u64,
    pub cancelled: bool,
}

/// Starts a sweep over `space`. Fails only on bad options.
pub fn enumerate(
    factory: Arc<dyn ClientFactory>,
    space: &AddressSpace,
    options: EnumerationOptions,
    stop: StopSignal,
) -> Result<EnumerationHandle> {
    let concurrency: usize = validate_workers(options.concurrency)?;
    if let Some(dest) = &options.dest {
        if !dest.is_dir() {
            return Err(Error::Configuration(format!(
                "destination {} is not a directory",
                dest.display()
            )));
        }
    }

    let total: u64 = space.len();
    let workers_needed: usize = usize::try_from(total).unwrap_or(usize::MAX).min(concurrency);
    let cursor: Arc<Mutex<AddressIter>> = Arc::new(Mutex::new(space.iter()));
    let progress: Arc<Progress> = Arc::new(Progress::default());
    let (sender, receiver) = mpsc::channel::<ProbeResult>(concurrency);

    let workers: Vec<JoinHandle<()>> = (0..workers_needed)
        .map(|id| {
            let worker = Worker {
                id,
                factory: Arc::clone(&factory),
                cursor: Arc::clone(&cursor),
                sender: sender.clone(),
                stop: stop.clone(),
                dest: options.dest.clone(),
                retry: options.retry,
                progress: Arc::clone(&progress),
                session: None,
                reconnecting: false,
            };
            tokio::spawn(worker.run())
        })
        .collect();

    debug!("Sweeping {total} addresses with {workers_needed} workers");
    Ok(EnumerationHandle {
        receiver,
        workers,
        progress,
        stop,
        total,
    })
}

pub struct EnumerationHandle {
    receiver: mpsc::Receiver<ProbeResult>,
    workers: Vec<JoinHandle<()>>,
    progress: Arc<Progress>,
    stop: StopSignal,
    total: u64,
}

impl EnumerationHandle {
    /// The next finished address, or `None` once the sweep is over.
    pub async fn next(&mut self) -> Option<ProbeResult> {
        self.receiver.recv().await
    }

    pub fn progress(&self) -> Arc<Progress> {
        Arc::clone(&self.progress)
    }

    /// Number of addresses in the sweep.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Stops delivery, waits for every worker to close its session, and tallies.
    pub async fn finish(mut self) -> EnumerationSummary {
        self.receiver.close();
        for worker in self.workers.drain(..) {
            if let Err(e) = worker.await {
                warn!("Sweep worker ended abnormally: {e}");
            }
        }

        let processed: u64 = self.progress.processed();
        let present: u64 = self.progress.present();
        let errors: u64 = self.progress.errors();
        EnumerationSummary {
            processed,
            present,
            absent: processed - present - errors,
            errors,
            cancelled: self.stop.is_stopped(),
        }
    }
}

struct Worker {
    id: usize,
    factory: Arc<dyn ClientFactory>,
    cursor: Arc<Mutex<AddressIter>>,
    sender: mpsc::Sender<ProbeResult>,
    stop: StopSignal,
    dest: Option<PathBuf>,
    retry: RetryPolicy,
    progress: Arc<Progress>,
    session: Option<Box<dyn TransportClient>>,
    /// The last session died; pause before opening the next one.
    reconnecting: bool,
}

impl Worker {
    async fn run(mut self) {
        let stop: StopSignal = self.stop.clone();
        loop {
            if stop.is_stopped() {
                break;
            }
            let next: Option<Address> = self.cursor.lock().ok().and_then(|mut c| c.next());
            let Some(address) = next else {
                break;
            };

            // Cancellation drops the in-flight command and whatever it fetched.
            let result: ProbeResult = tokio::select! {
                biased;
                _ = stop.stopped() => break,
                result = self.process(address) => result,
            };

            self.progress.record(&result);
            if self.sender.send(result).await.is_err() {
                break;
            }
        }

        self.drop_session().await;
        debug!("Worker {} done", self.id);
    }

    async fn process(&mut self, address: Address) -> ProbeResult {
        if let Err(e) = self.ensure_session().await {
            return ProbeResult::error(address, format!("connect failed: {e}"));
        }
        let Some(client) = self.session.as_mut() else {
            return ProbeResult::error(address, "no session");
        };

        let outcome: Result<(u64, Option<Vec<u8>>)> = match &self.dest {
            None => client.stat(address).await.map(|size| (size, None)),
            Some(_) => client
                .get(address)
                .await
                .map(|payload| (payload.len() as u64, Some(payload))),
        };

        match outcome {
            Ok((size, None)) => ProbeResult::present(address, size),
            Ok((size, Some(payload))) => match &self.dest {
                Some(dest) => save_entry(dest, address, size, &payload).await,
                None => ProbeResult::present(address, size),
            },
            Err(e) if e.is_not_found() => ProbeResult::absent(address),
            Err(e) => {
                if e.is_session_fatal() {
                    debug!("Worker {}: {address} broke the session: {e}", self.id);
                    self.drop_session().await;
                    self.reconnecting = true;
                }
                ProbeResult::error(address, e.to_string())
            }
        }
    }

    async fn ensure_session(&mut self) -> Result<()> {
        if self.session.as_ref().is_some_and(|s| s.is_connected()) {
            return Ok(());
        }

        let attempts: u32 = self.retry.max_attempts.max(1);
        let mut client: Box<dyn TransportClient> = self.factory.create();
        let mut attempt: u32 = 1;
        loop {
            if self.reconnecting || attempt > 1 {
                let pause: Duration = self.retry.delay_for(attempt);
                tokio::time::sleep(pause).await;
            }
            match client.connect().await {
                Ok(()) => {
                    self.reconnecting = false;
                    self.session = Some(client);
                    return Ok(());
                }
                Err(e) if attempt < attempts => {
                    debug!("Worker {}: connect attempt {attempt} failed: {e}", self.id);
                    self.reconnecting = true;
                    attempt += 1;
                }
                Err(e) => {
                    self.reconnecting = true;
                    return Err(e);
                }
            }
        }
    }

    async fn drop_session(&mut self) {
        if let Some(mut client) = self.session.take() {
            if let Err(e) = client.close().await {
                debug!("Worker {}: close failed: {e}", self.id);
            }
        }
    }
}

/// Writes a fetched payload under `dest`. A failed write keeps the entry PRESENT.
async fn save_entry(dest: &Path, address: Address, size: u64, payload: &[u8]) -> ProbeResult {
    let found: ProbeResult = ProbeResult::present(address, size);
    let path: PathBuf = dest.join(address.file_name());
    match write_atomically(&path, payload).await {
        Ok(()) => found.with_saved_to(path),
        Err(e) => found.with_error_detail(format!("could not save {}: {e}", path.display())),
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
