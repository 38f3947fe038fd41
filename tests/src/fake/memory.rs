//! An in-process terminal with instrumentation, for the engine properties.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dknw_common::error::{Error, Result};
use dknw_common::model::Address;
use dknw_core::transport::{ClientFactory, TransportClient};

#[derive(Default)]
pub struct MemoryTerminal {
    entries: Mutex<BTreeMap<Address, Vec<u8>>>,
    /// Addresses whose every access breaks the session.
    poisoned: Mutex<BTreeSet<Address>>,
    latency: Mutex<Duration>,
    open: AtomicUsize,
    peak_open: AtomicUsize,
    busy: AtomicUsize,
    peak_busy: AtomicUsize,
    connects: AtomicUsize,
    commands: AtomicUsize,
}

impl MemoryTerminal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, address: Address, payload: Vec<u8>) {
        self.entries.lock().unwrap().insert(address, payload);
    }

    pub fn entry(&self, address: Address) -> Option<Vec<u8>> {
        self.entries.lock().unwrap().get(&address).cloned()
    }

    pub fn present(&self) -> Vec<Address> {
        self.entries.lock().unwrap().keys().copied().collect()
    }

    pub fn poison(&self, address: Address) {
        self.poisoned.lock().unwrap().insert(address);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn peak_sessions(&self) -> usize {
        self.peak_open.load(Ordering::SeqCst)
    }

    pub fn open_sessions(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_busy.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> usize {
        self.commands.load(Ordering::SeqCst)
    }

    fn opened(&self) {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let now: usize = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_open.fetch_max(now, Ordering::SeqCst);
    }

    fn closed(&self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }

    fn latency(&self) -> Duration {
        *self.latency.lock().unwrap()
    }
}

pub struct MemoryFactory(pub Arc<MemoryTerminal>);

impl ClientFactory for MemoryFactory {
    fn create(&self) -> Box<dyn TransportClient> {
        Box::new(MemoryClient {
            terminal: Arc::clone(&self.0),
            connected: false,
        })
    }
}

struct MemoryClient {
    terminal: Arc<MemoryTerminal>,
    connected: bool,
}

impl MemoryClient {
    fn disconnect(&mut self) {
        if self.connected {
            self.connected = false;
            self.terminal.closed();
        }
    }

    async fn command<T>(
        &mut self,
        address: Address,
        op: impl FnOnce(&MemoryTerminal) -> Result<T>,
    ) -> Result<T> {
        if !self.connected {
            return Err(Error::Protocol("session is not connected".into()));
        }
        let terminal: Arc<MemoryTerminal> = Arc::clone(&self.terminal);
        terminal.commands.fetch_add(1, Ordering::SeqCst);
        let busy: usize = terminal.busy.fetch_add(1, Ordering::SeqCst) + 1;
        terminal.peak_busy.fetch_max(busy, Ordering::SeqCst);

        let latency: Duration = terminal.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let poisoned: bool = terminal.poisoned.lock().unwrap().contains(&address);
        terminal.busy.fetch_sub(1, Ordering::SeqCst);

        if poisoned {
            self.disconnect();
            return Err(Error::Protocol(format!("connection reset while handling {address}")));
        }
        op(&terminal)
    }
}

#[async_trait]
impl TransportClient for MemoryClient {
    async fn connect(&mut self) -> Result<()> {
        if !self.connected {
            self.connected = true;
            self.terminal.opened();
        }
        Ok(())
    }

    async fn stat(&mut self, address: Address) -> Result<u64> {
        Ok(self.get(address).await?.len() as u64)
    }

    async fn get(&mut self, address: Address) -> Result<Vec<u8>> {
        self.command(address, |terminal| {
            terminal
                .entry(address)
                .ok_or_else(|| Error::NotFound(address.to_string()))
        })
        .await
    }

    async fn put(&mut self, address: Address, payload: &[u8]) -> Result<u64> {
        let owned: Vec<u8> = payload.to_vec();
        self.command(address, move |terminal| {
            let len: u64 = owned.len() as u64;
            terminal.insert(address, owned);
            Ok(len)
        })
        .await
    }

    async fn close(&mut self) -> Result<()> {
        self.disconnect();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

impl Drop for MemoryClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}
