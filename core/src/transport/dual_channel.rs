//! # Dual-Channel Client
//!
//! Commands and acknowledgements travel as DS2 frames on a control connection;
//! payload bytes travel raw on a second, data connection. Both stay open for the
//! life of the session and a session runs one command at a time:
//!
//! ```text
//! Disconnected -> ControlConnected -> Ready <-> Busy
//!       ^                                |
//!       +------ close / fatal error -----+
//! ```

use std::mem;
use std::time::Duration;

use async_trait::async_trait;
use dknw_common::error::{Error, Result, TransferFailure};
use dknw_common::model::Address;
use dknw_protocols::ds2::{self, Cts, ErrorCts, Frame, Opcode, Rts, TerminalInfo};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::TransportClient;
use crate::network::tcp::connect_within;

/// Garbage tolerated in front of a frame before the channel is declared lost.
const MAX_RESYNC_BYTES: usize = 64 * 1024;
/// Blocks reserved up front when a retrieve starts.
const PREALLOC_BLOCKS: usize = 16;

#[derive(Debug, Clone)]
pub struct DualChannelConfig {
    pub host: String,
    pub control_port: u16,
    pub data_port: u16,
    pub timeout: Duration,
    pub tail_timeout: Duration,
    pub error_text_timeout: Duration,
    pub expect_greeting: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    ControlConnected,
    Ready,
    Busy,
}

enum State {
    Disconnected,
    ControlConnected(BufReader<TcpStream>),
    Ready(Channels),
    /// A command owns the channels. Seen from outside only if that command was dropped.
    Busy,
}

pub struct DualChannelClient {
    config: DualChannelConfig,
    state: State,
    info: Option<TerminalInfo>,
}

impl DualChannelClient {
    pub fn new(config: DualChannelConfig) -> Self {
        Self {
            config,
            state: State::Disconnected,
            info: None,
        }
    }

    pub fn state(&self) -> SessionState {
        match self.state {
            State::Disconnected => SessionState::Disconnected,
            State::ControlConnected(_) => SessionState::ControlConnected,
            State::Ready(_) => SessionState::Ready,
            State::Busy => SessionState::Busy,
        }
    }

    /// The DS2INFO greeting, when the terminal sent one.
    pub fn terminal_info(&self) -> Option<&TerminalInfo> {
        self.info.as_ref()
    }

    async fn establish(&mut self) -> Result<()> {
        let control: TcpStream =
            connect_within(&self.config.host, self.config.control_port, self.config.timeout)
                .await?;
        self.state = State::ControlConnected(BufReader::new(control));
        debug!(
            host = %self.config.host,
            port = self.config.control_port,
            "Control channel open"
        );

        self.handshake().await?;

        let State::ControlConnected(control) = mem::replace(&mut self.state, State::Disconnected)
        else {
            return Err(Error::Handshake("control channel closed during handshake".into()));
        };
        let data: TcpStream =
            connect_within(&self.config.host, self.config.data_port, self.config.timeout).await?;
        self.state = State::Ready(Channels { control, data });

        info!(
            "Connected to {} (control {}, data {})",
            self.config.host, self.config.control_port, self.config.data_port
        );
        Ok(())
    }

    async fn handshake(&mut self) -> Result<()> {
        if !self.config.expect_greeting {
            return Ok(());
        }

        let State::ControlConnected(control) = &mut self.state else {
            return Err(Error::Handshake("control channel is not open".into()));
        };

        let greeting = timeout(
            self.config.timeout,
            read_frame(control, self.config.error_text_timeout),
        )
        .await;

        match greeting {
            Ok(Ok(Frame::Info(info))) => {
                info!(
                    serial = %info.serial_lossy(),
                    essid = %info.essid_lossy(),
                    "Terminal greeted"
                );
                self.info = Some(info);
                Ok(())
            }
            Ok(Ok(other)) => Err(Error::Handshake(format!(
                "expected a DS2INFO greeting, got {other}"
            ))),
            Ok(Err(e)) => Err(Error::Handshake(format!("unreadable greeting: {e}"))),
            Err(_elapsed) => Err(Error::Handshake(format!(
                "no greeting within {:?}",
                self.config.timeout
            ))),
        }
    }

    /// Ready -> Busy. Anything else refuses the command.
    fn begin(&mut self) -> Result<Channels> {
        match mem::replace(&mut self.state, State::Busy) {
            State::Ready(channels) => Ok(channels),
            State::Busy => {
                self.state = State::Disconnected;
                Err(Error::Protocol(
                    "previous command was abandoned mid-transfer; reconnect first".into(),
                ))
            }
            other => {
                self.state = other;
                Err(Error::Protocol("session is not connected".into()))
            }
        }
    }

    /// Busy -> Ready, or Busy -> Disconnected when the outcome broke the session.
    fn finish<T>(&mut self, channels: Channels, outcome: &Result<T>) {
        match outcome {
            Err(e) if e.is_session_fatal() => {
                debug!("Dropping dual-channel session: {e}");
                drop(channels);
                self.state = State::Disconnected;
            }
            _ => self.state = State::Ready(channels),
        }
    }
}

#[async_trait]
impl TransportClient for DualChannelClient {
    async fn connect(&mut self) -> Result<()> {
        if matches!(self.state, State::Ready(_)) {
            return Ok(());
        }

        self.state = State::Disconnected;
        let outcome: Result<()> = self.establish().await;
        if outcome.is_err() {
            self.state = State::Disconnected;
        }
        outcome
    }

    async fn stat(&mut self, address: Address) -> Result<u64> {
        // No verified cancel exists, so a stat is a retrieve that drops the bytes.
        let payload: Vec<u8> = self.get(address).await?;
        Ok(payload.len() as u64)
    }

    async fn get(&mut self, address: Address) -> Result<Vec<u8>> {
        let mut channels: Channels = self.begin()?;
        let outcome: Result<Vec<u8>> = channels.retrieve(address, &self.config).await;
        self.finish(channels, &outcome);
        outcome
    }

    async fn put(&mut self, address: Address, payload: &[u8]) -> Result<u64> {
        if payload.is_empty() {
            return Err(Error::Transfer(TransferFailure::Rejected(
                "a zero-length store reads as a retrieve on the dual-channel wire".into(),
            )));
        }
        let size: u32 = u32::try_from(payload.len()).map_err(|_| {
            Error::Configuration(format!(
                "{} bytes exceed the 32-bit size field",
                payload.len()
            ))
        })?;

        let mut channels: Channels = self.begin()?;
        let outcome: Result<u64> = channels.store(address, payload, size, &self.config).await;
        self.finish(channels, &outcome);
        outcome
    }

    async fn close(&mut self) -> Result<()> {
        match mem::replace(&mut self.state, State::Disconnected) {
            State::Ready(mut channels) => {
                channels.shutdown().await;
                info!("Closed session with {}", self.config.host);
            }
            State::ControlConnected(mut control) => {
                if let Err(e) = control.get_mut().shutdown().await {
                    debug!("Control shutdown failed: {e}");
                }
            }
            State::Disconnected | State::Busy => {}
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        matches!(self.state, State::Ready(_))
    }
}

struct Channels {
    control: BufReader<TcpStream>,
    data: TcpStream,
}

impl Channels {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        write_frame(&mut self.control, &frame).await
    }

    async fn reply(&mut self, config: &DualChannelConfig, what: &str) -> Result<Frame> {
        match timeout(
            config.timeout,
            read_frame(&mut self.control, config.error_text_timeout),
        )
        .await
        {
            Ok(frame) => frame,
            Err(_elapsed) => Err(Error::Timeout(what.to_string())),
        }
    }

    /// A frame the firmware may or may not send; `None` when it stays silent.
    async fn trailing(&mut self, config: &DualChannelConfig) -> Result<Option<Frame>> {
        match timeout(
            config.tail_timeout,
            read_frame(&mut self.control, config.error_text_timeout),
        )
        .await
        {
            Ok(frame) => frame.map(Some),
            Err(_elapsed) => Ok(None),
        }
    }

    /// The reply to an RTS. A completion CTS left over from the previous
    /// transfer (`done == total`, non-zero) is skipped.
    async fn opening(&mut self, config: &DualChannelConfig) -> Result<Frame> {
        loop {
            match self.reply(config, "CTS after RTS").await? {
                Frame::Cts(stale) if stale.done != 0 && stale.done == stale.total => {
                    debug!(total = stale.total, "Skipping completion CTS of the previous transfer");
                }
                frame => return Ok(frame),
            }
        }
    }

    async fn retrieve(&mut self, address: Address, config: &DualChannelConfig) -> Result<Vec<u8>> {
        self.send(Frame::Rts(Rts {
            directory: address.directory,
            file: address.file,
            size: 0,
            serial: 0,
        }))
        .await?;

        let mut cts: Cts = match self.opening(config).await? {
            Frame::Cts(cts) => cts,
            Frame::ErrorCts(err) => return Err(Error::NotFound(describe(address, &err))),
            other => return Err(unexpected(&other, "RTS")),
        };
        if cts.done != 0 {
            return Err(Error::Protocol(format!(
                "retrieve of {address} opened at offset {} instead of 0",
                cts.done
            )));
        }

        // The firmware answers an empty slot with a zero total.
        if cts.total == 0 {
            return Err(Error::NotFound(format!("{address}: empty")));
        }
        let total: usize = cts.total as usize;
        let mut payload: Vec<u8> = Vec::with_capacity(initial_capacity(total, cts.block));

        loop {
            if cts.block == 0 {
                return Err(Error::Protocol("terminal announced a zero block size".into()));
            }
            self.send(Frame::Cts(cts)).await?;

            let start: usize = payload.len();
            let block: usize = (cts.block as usize).min(total - start);
            payload.resize(start + block, 0);
            read_block(&mut self.data, &mut payload[start..], start, total, config.timeout).await?;

            if payload.len() == total {
                break;
            }

            cts = match self.reply(config, "CTS after data block").await? {
                Frame::Cts(next) => next,
                Frame::ErrorCts(err) => {
                    return Err(Error::Transfer(TransferFailure::Interrupted(format!(
                        "aborted after {} bytes, {}",
                        payload.len(),
                        describe(address, &err)
                    ))));
                }
                other => return Err(unexpected(&other, "data block")),
            };
            if cts.total as usize != total || cts.done as usize != payload.len() {
                return Err(Error::Protocol(format!(
                    "out of step: terminal reports {}/{} bytes, {} received",
                    cts.done,
                    cts.total,
                    payload.len()
                )));
            }
        }

        // A completion CTS may still follow; the next command skips it.
        debug!(%address, bytes = total, "Retrieved");
        Ok(payload)
    }

    async fn store(
        &mut self,
        address: Address,
        payload: &[u8],
        size: u32,
        config: &DualChannelConfig,
    ) -> Result<u64> {
        self.send(Frame::Rts(Rts {
            directory: address.directory,
            file: address.file,
            size,
            serial: 0,
        }))
        .await?;

        let mut cts: Cts = match self.opening(config).await? {
            Frame::Cts(cts) => cts,
            Frame::ErrorCts(err) => {
                return Err(Error::Transfer(TransferFailure::Rejected(describe(address, &err))));
            }
            other => return Err(unexpected(&other, "RTS")),
        };
        if cts.total != size {
            return Err(Error::Transfer(TransferFailure::LengthMismatch {
                expected: u64::from(size),
                actual: u64::from(cts.total),
            }));
        }

        let total: usize = payload.len();
        let mut sent: usize = cts.done as usize;
        if sent > total {
            return Err(Error::Protocol(format!(
                "terminal resumes at {sent}, beyond the {total} bytes offered"
            )));
        }

        loop {
            if cts.block == 0 {
                return Err(Error::Protocol("terminal announced a zero block size".into()));
            }

            let end: usize = (sent + cts.block as usize).min(total);
            write_block(&mut self.data, &payload[sent..end], config.timeout).await?;
            sent = end;

            if sent == total {
                break;
            }

            cts = match self.reply(config, "CTS after data block").await? {
                Frame::Cts(next) => next,
                Frame::ErrorCts(err) => {
                    return Err(Error::Transfer(TransferFailure::Rejected(describe(address, &err))));
                }
                other => return Err(unexpected(&other, "data block")),
            };
            if cts.done as usize != sent {
                return Err(Error::Protocol(format!(
                    "out of step: terminal acknowledged {} bytes, {sent} sent",
                    cts.done
                )));
            }
        }

        match self.trailing(config).await? {
            None => warn!(
                %address,
                bytes = total,
                "Terminal did not acknowledge the final block, assuming the store was accepted"
            ),
            Some(Frame::Cts(ack)) if ack.done >= ack.total && ack.done as usize == total => {}
            Some(Frame::Cts(ack)) => {
                return Err(Error::Transfer(TransferFailure::LengthMismatch {
                    expected: total as u64,
                    actual: u64::from(ack.done),
                }));
            }
            Some(Frame::ErrorCts(err)) => {
                return Err(Error::Transfer(TransferFailure::Rejected(describe(address, &err))));
            }
            Some(other) => return Err(unexpected(&other, "final block")),
        }

        debug!(%address, bytes = total, "Stored");
        Ok(total as u64)
    }

    async fn shutdown(&mut self) {
        if let Err(e) = self.data.shutdown().await {
            debug!("Data shutdown failed: {e}");
        }
        if let Err(e) = self.control.get_mut().shutdown().await {
            debug!("Control shutdown failed: {e}");
        }
    }
}

/// Reads one control frame, sliding over stray bytes until the magic lines up.
pub async fn read_frame<R>(reader: &mut R, text_timeout: Duration) -> Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    let mut window: [u8; 4] = [0u8; 4];
    reader.read_exact(&mut window).await?;

    let mut skipped: usize = 0;
    while window != ds2::MAGIC {
        if skipped == MAX_RESYNC_BYTES {
            return Err(Error::Protocol(format!(
                "no frame magic within {MAX_RESYNC_BYTES} bytes"
            )));
        }
        window.copy_within(1.., 0);
        window[3] = reader.read_u8().await?;
        skipped += 1;
    }
    if skipped > 0 {
        warn!(skipped, "Resynchronised control channel");
    }

    let raw_opcode: u32 = reader.read_u32().await?;
    let opcode: Opcode = Opcode::from_u32(raw_opcode)?;

    let mut buffer: Vec<u8> = vec![0u8; opcode.frame_len()];
    buffer[0..4].copy_from_slice(&ds2::MAGIC);
    buffer[4..8].copy_from_slice(&raw_opcode.to_be_bytes());
    reader.read_exact(&mut buffer[ds2::HEADER_LEN..]).await?;

    if opcode == Opcode::ErrorCts {
        let mut line: Vec<u8> = Vec::new();
        match timeout(text_timeout, reader.read_until(b'\n', &mut line)).await {
            Ok(read) => {
                read?;
            }
            Err(_elapsed) => debug!("ERRORCTS arrived without a text line"),
        }
        buffer.extend_from_slice(&line);
    }

    let frame: Frame = Frame::decode(&buffer)?;
    debug!("<- {frame}");
    Ok(frame)
}

pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    debug!("-> {frame}");
    writer.write_all(&frame.encode()).await?;
    writer.flush().await?;
    Ok(())
}

/// Fills `buf` from the data channel. `offset` bytes of `total` arrived earlier.
async fn read_block(
    data: &mut TcpStream,
    buf: &mut [u8],
    offset: usize,
    total: usize,
    limit: Duration,
) -> Result<()> {
    let mut filled: usize = 0;
    while filled < buf.len() {
        let read: usize = match timeout(limit, data.read(&mut buf[filled..])).await {
            Ok(Ok(read)) => read,
            Ok(Err(e)) => {
                return Err(Error::Transfer(TransferFailure::Interrupted(format!(
                    "data channel: {e}"
                ))));
            }
            Err(_elapsed) => return Err(Error::Timeout("data block".into())),
        };
        if read == 0 {
            return Err(Error::Transfer(TransferFailure::LengthMismatch {
                expected: total as u64,
                actual: (offset + filled) as u64,
            }));
        }
        filled += read;
    }
    Ok(())
}

async fn write_block(data: &mut TcpStream, block: &[u8], limit: Duration) -> Result<()> {
    match timeout(limit, data.write_all(block)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Error::Transfer(TransferFailure::Interrupted(format!(
            "data channel: {e}"
        )))),
        Err(_elapsed) => Err(Error::Timeout("data block write".into())),
    }
}

/// The terminal's refusal, text and raw code, for error details.
fn describe(address: Address, err: &ErrorCts) -> String {
    if err.message.is_empty() {
        format!("{address}: code {}", err.block)
    } else {
        format!("{address}: {} (code {})", err.message, err.block)
    }
}

/// Preallocation for a payload the terminal announced, bounded so a bogus
/// total cannot reserve gigabytes up front.
fn initial_capacity(total: usize, block: u32) -> usize {
    total.min((block as usize).saturating_mul(PREALLOC_BLOCKS))
}

fn unexpected(frame: &Frame, after: &str) -> Error {
    Error::Protocol(format!("unexpected {} after {after}", frame.opcode().name()))
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
