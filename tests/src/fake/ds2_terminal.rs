//! A dual-channel terminal on loopback sockets.
//!
//! Control and data connections are paired by accept order, so tests drive it
//! with one session at a time.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dknw_common::model::{Address, Terminal};
use dknw_core::transport::dual_channel::{read_frame, write_frame};
use dknw_core::transport::DualChannelConfig;
use dknw_protocols::ds2::{Cts, ErrorCts, Frame};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const TEXT_TIMEOUT: Duration = Duration::from_millis(250);
/// Raw codes the fake puts in the block field of its ERRORCTS frames.
pub const NO_ENTRY_CODE: u32 = 2;
pub const WRITE_PROTECTED_CODE: u32 = 7;

type Entries = Arc<Mutex<BTreeMap<Address, Vec<u8>>>>;

#[derive(Debug, Clone)]
pub struct Ds2Behaviour {
    pub block: u32,
    /// Sent on the control channel right after it is accepted.
    pub greeting: Option<Frame>,
    /// Skip the CTS that closes a transfer, like some firmware does.
    pub omit_final_ack: bool,
    /// Write line noise in front of every control frame.
    pub noise: bool,
    /// Send half of the first block of this address, then hang up.
    pub truncate: Option<Address>,
    pub reject_stores: bool,
}

impl Default for Ds2Behaviour {
    fn default() -> Self {
        Self {
            block: 4096,
            greeting: None,
            omit_final_ack: false,
            noise: false,
            truncate: None,
            reject_stores: false,
        }
    }
}

pub struct Ds2Terminal {
    pub control_port: u16,
    pub data_port: u16,
    entries: Entries,
    sessions: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl Ds2Terminal {
    pub async fn start(behaviour: Ds2Behaviour) -> Self {
        let control = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let data = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let control_port: u16 = control.local_addr().unwrap().port();
        let data_port: u16 = data.local_addr().unwrap().port();

        let entries: Entries = Arc::default();
        let sessions: Arc<AtomicUsize> = Arc::default();
        let task = tokio::spawn(accept_loop(
            control,
            data,
            Arc::clone(&entries),
            Arc::clone(&sessions),
            behaviour,
        ));

        Self {
            control_port,
            data_port,
            entries,
            sessions,
            task,
        }
    }

    pub fn insert(&self, address: Address, payload: Vec<u8>) {
        self.entries.lock().unwrap().insert(address, payload);
    }

    pub fn entry(&self, address: Address) -> Option<Vec<u8>> {
        self.entries.lock().unwrap().get(&address).cloned()
    }

    /// Sessions that got both channels.
    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    pub fn terminal(&self) -> Terminal {
        Terminal::dual_channel("127.0.0.1", self.data_port, Some(self.control_port), None)
            .unwrap()
    }

    pub fn config(&self) -> DualChannelConfig {
        DualChannelConfig {
            host: "127.0.0.1".into(),
            control_port: self.control_port,
            data_port: self.data_port,
            timeout: Duration::from_secs(2),
            tail_timeout: Duration::from_millis(200),
            error_text_timeout: TEXT_TIMEOUT,
            expect_greeting: false,
        }
    }
}

impl Drop for Ds2Terminal {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn accept_loop(
    control: TcpListener,
    data: TcpListener,
    entries: Entries,
    sessions: Arc<AtomicUsize>,
    behaviour: Ds2Behaviour,
) {
    loop {
        let Ok((mut control_stream, _)) = control.accept().await else {
            return;
        };
        if let Some(greeting) = &behaviour.greeting {
            if write_frame(&mut control_stream, greeting).await.is_err() {
                continue;
            }
        }
        let Ok((data_stream, _)) = data.accept().await else {
            return;
        };
        sessions.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(serve(
            BufReader::new(control_stream),
            data_stream,
            Arc::clone(&entries),
            behaviour.clone(),
        ));
    }
}

async fn send(control: &mut BufReader<TcpStream>, frame: Frame, noise: bool) -> bool {
    if noise && control.get_mut().write_all(b"\x00\x13DS\x7f").await.is_err() {
        return false;
    }
    write_frame(control, &frame).await.is_ok()
}

fn cts(total: u32, done: usize, block: u32) -> Frame {
    Frame::Cts(Cts {
        total,
        done: done as u32,
        block,
    })
}

async fn serve(
    mut control: BufReader<TcpStream>,
    mut data: TcpStream,
    entries: Entries,
    behaviour: Ds2Behaviour,
) {
    let block: u32 = behaviour.block;
    let noise: bool = behaviour.noise;

    while let Ok(frame) = read_frame(&mut control, TEXT_TIMEOUT).await {
        let Frame::Rts(rts) = frame else {
            return;
        };
        let address = Address::new(rts.directory, rts.file);

        if rts.size == 0 {
            let found: Option<Vec<u8>> = entries.lock().unwrap().get(&address).cloned();
            let Some(payload) = found else {
                let refusal = Frame::ErrorCts(ErrorCts {
                    total: 0,
                    done: 0,
                    block: NO_ENTRY_CODE,
                    message: format!("no such entry {address}"),
                });
                if !send(&mut control, refusal, noise).await {
                    return;
                }
                continue;
            };

            let total: u32 = payload.len() as u32;
            if !send(&mut control, cts(total, 0, block), noise).await {
                return;
            }
            if total == 0 {
                continue;
            }

            let mut done: usize = 0;
            loop {
                match read_frame(&mut control, TEXT_TIMEOUT).await {
                    Ok(Frame::Cts(_)) => {}
                    _ => return,
                }
                let end: usize = (done + block as usize).min(payload.len());
                if behaviour.truncate == Some(address) {
                    let _ = data.write_all(&payload[done..done + (end - done) / 2]).await;
                    return;
                }
                if data.write_all(&payload[done..end]).await.is_err() {
                    return;
                }
                done = end;

                if done < payload.len() {
                    if !send(&mut control, cts(total, done, block), noise).await {
                        return;
                    }
                } else {
                    if !behaviour.omit_final_ack
                        && !send(&mut control, cts(total, done, block), noise).await
                    {
                        return;
                    }
                    break;
                }
            }
        } else {
            if behaviour.reject_stores {
                let refusal = Frame::ErrorCts(ErrorCts {
                    total: rts.size,
                    done: 0,
                    block: WRITE_PROTECTED_CODE,
                    message: "storage is write protected".into(),
                });
                if !send(&mut control, refusal, noise).await {
                    return;
                }
                continue;
            }

            let size: usize = rts.size as usize;
            if !send(&mut control, cts(rts.size, 0, block), noise).await {
                return;
            }
            let mut received: Vec<u8> = Vec::with_capacity(size);
            while received.len() < size {
                let start: usize = received.len();
                let n: usize = (block as usize).min(size - start);
                received.resize(start + n, 0);
                if data.read_exact(&mut received[start..]).await.is_err() {
                    return;
                }
                if received.len() < size
                    && !send(&mut control, cts(rts.size, received.len(), block), noise).await
                {
                    return;
                }
            }

            entries.lock().unwrap().insert(address, received);
            if !behaviour.omit_final_ack && !send(&mut control, cts(rts.size, size, block), noise).await
            {
                return;
            }
        }
    }
}
