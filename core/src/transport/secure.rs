//! # Secure File Client
//!
//! One TCP connection carries NSDU-framed APDUs. The session opens with an
//! A_CONNECT / A_AUTHENT challenge / A_ACCEPT exchange and each transfer is an
//! F_START, F_READY, F_DATA*, F_FINAL, F_END conversation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dknw_common::error::{Error, Result, TransferFailure};
use dknw_common::model::Address;
use dknw_protocols::secure::nsdu::{self, NSDU_HEADER_LEN, STX};
use dknw_protocols::secure::{
    Apdu, ApduType, DATA_CHUNK, DeviceProfile, FileOperation, Item, ItemCodes, NetworkType,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::TransportClient;
use crate::network::tcp::connect_within;

/// F_DATA chunks reserved up front when a retrieve starts.
const PREALLOC_CHUNKS: usize = 16;

#[derive(Debug, Clone)]
pub struct SecureConfig {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
    pub profile: Arc<DeviceProfile>,
}

pub struct SecureFileClient {
    config: SecureConfig,
    stream: Option<BufReader<TcpStream>>,
}

impl SecureFileClient {
    pub fn new(config: SecureConfig) -> Self {
        Self {
            config,
            stream: None,
        }
    }

    fn items(&self) -> ItemCodes {
        self.config.profile.items
    }

    fn stream(&mut self) -> Result<&mut BufReader<TcpStream>> {
        self.stream
            .as_mut()
            .ok_or_else(|| Error::Protocol("session is not connected".into()))
    }

    async fn send(&mut self, apdu: &Apdu) -> Result<()> {
        let network: NetworkType = self.config.profile.network;
        let limit: Duration = self.config.timeout;
        let stream = self.stream()?;
        match timeout(limit, write_apdu(stream, apdu, network)).await {
            Ok(sent) => sent,
            Err(_elapsed) => Err(Error::Timeout(format!("sending {:?}", apdu.kind()))),
        }
    }

    async fn receive(&mut self, what: &str) -> Result<Apdu> {
        let network: NetworkType = self.config.profile.network;
        let limit: Duration = self.config.timeout;
        let stream = self.stream()?;
        match timeout(limit, read_apdu(stream, network)).await {
            Ok(received) => received,
            Err(_elapsed) => Err(Error::Timeout(what.to_string())),
        }
    }

    async fn exchange(&mut self, apdu: &Apdu, what: &str) -> Result<Apdu> {
        self.send(apdu).await?;
        self.receive(what).await
    }

    fn file_number(&self, address: Address) -> Result<Item> {
        let directory: u16 = u16::try_from(address.directory).map_err(|_| {
            Error::Configuration(format!(
                "directory {} does not fit the 16-bit FILE_NUMBER field",
                address.directory
            ))
        })?;

        let mut designator: Vec<u8> = Vec::with_capacity(6);
        designator.extend_from_slice(&directory.to_be_bytes());
        designator.extend_from_slice(&address.file.to_be_bytes());
        Ok(Item::new(self.items().file_number, designator))
    }

    async fn handshake(&mut self) -> Result<()> {
        let profile: Arc<DeviceProfile> = Arc::clone(&self.config.profile);
        let items: ItemCodes = profile.items;

        let connect = Apdu::generic(
            ApduType::AConnect,
            vec![
                Item::new(items.system_id, profile.system_id.as_bytes()),
                Item::new(items.protocol_id, profile.protocol_id.as_bytes()),
                Item::new(items.client_side, profile.client_side.to_be_bytes()),
                Item::new(items.job_id, profile.job_id.to_be_bytes()),
            ],
        );
        let challenge = self.exchange(&connect, "A_AUTHENT").await?;
        if challenge.kind() != ApduType::AAuthent {
            return Err(Error::Handshake(format!(
                "expected A_AUTHENT, got {:?}",
                challenge.kind()
            )));
        }
        let Some(request) = challenge.item(items.auth_req) else {
            return Err(Error::Handshake("A_AUTHENT carries no challenge".into()));
        };

        let answer: Vec<u8> = profile.cipher().respond(request);
        let response = Apdu::generic(
            ApduType::AAuthentRsp,
            vec![Item::new(items.auth_res, answer)],
        );
        let verdict = self.exchange(&response, "A_ACCEPT").await?;
        if verdict.kind() != ApduType::AAccept {
            return Err(Error::Handshake(format!(
                "terminal answered the challenge with {:?}",
                verdict.kind()
            )));
        }
        Ok(())
    }

    async fn retrieve(&mut self, address: Address) -> Result<Vec<u8>> {
        let items: ItemCodes = self.items();
        let start = Apdu::generic(
            ApduType::FStart,
            vec![
                Item::new(items.file_operation, FileOperation::Read.to_bytes()),
                self.file_number(address)?,
            ],
        );

        let ready = self.exchange(&start, "F_READY").await?;
        let expected: Option<u32> = match &ready {
            Apdu::Generic {
                kind: ApduType::FReady,
                ..
            } => ready.item_u32(items.expect_file_size),
            Apdu::Generic { kind, .. } => {
                return Err(Error::NotFound(format!(
                    "{address}: terminal answered {kind:?}"
                )));
            }
            Apdu::Data(_) => return Err(Error::Protocol("F_DATA before F_READY".into())),
        };

        let reserve: usize = (expected.unwrap_or(0) as usize).min(DATA_CHUNK * PREALLOC_CHUNKS);
        let mut payload: Vec<u8> = Vec::with_capacity(reserve);
        loop {
            match self.receive("F_DATA").await.map_err(interrupted)? {
                Apdu::Data(chunk) => payload.extend_from_slice(&chunk),
                Apdu::Generic {
                    kind: ApduType::FFinal,
                    ..
                } => break,
                Apdu::Generic { kind, .. } => {
                    return Err(Error::Protocol(format!(
                        "unexpected {kind:?} while receiving {address}"
                    )));
                }
            }
        }
        self.send(&Apdu::bare(ApduType::FEnd)).await?;

        if let Some(expected) = expected {
            if expected as usize != payload.len() {
                return Err(Error::Transfer(TransferFailure::LengthMismatch {
                    expected: u64::from(expected),
                    actual: payload.len() as u64,
                }));
            }
        }

        debug!(%address, bytes = payload.len(), "Retrieved");
        Ok(payload)
    }

    async fn store(&mut self, address: Address, payload: &[u8]) -> Result<u64> {
        let size: u32 = u32::try_from(payload.len()).map_err(|_| {
            Error::Configuration(format!(
                "{} bytes exceed the 32-bit EXPECT_FILE_SIZE field",
                payload.len()
            ))
        })?;

        let items: ItemCodes = self.items();
        let start = Apdu::generic(
            ApduType::FStart,
            vec![
                Item::new(items.file_operation, FileOperation::Replace.to_bytes()),
                self.file_number(address)?,
                Item::new(items.expect_file_size, size.to_be_bytes()),
            ],
        );

        let ready = self.exchange(&start, "F_READY").await?;
        match ready.kind() {
            ApduType::FReady => match ready.item_u32(items.expect_file_size) {
                Some(echo) if echo == size => {}
                Some(echo) => {
                    return Err(Error::Transfer(TransferFailure::LengthMismatch {
                        expected: u64::from(size),
                        actual: u64::from(echo),
                    }));
                }
                None => {
                    return Err(Error::Transfer(TransferFailure::Rejected(
                        "F_READY did not echo the file size".into(),
                    )));
                }
            },
            ApduType::FData => return Err(Error::Protocol("F_DATA before F_READY".into())),
            other => {
                return Err(Error::Transfer(TransferFailure::Rejected(format!(
                    "{address}: terminal answered {other:?}"
                ))));
            }
        }

        for chunk in payload.chunks(DATA_CHUNK) {
            self.send(&Apdu::Data(chunk.to_vec()))
                .await
                .map_err(interrupted)?;
        }

        let end = self.exchange(&Apdu::bare(ApduType::FFinal), "F_END").await?;
        if end.kind() != ApduType::FEnd {
            return Err(Error::Transfer(TransferFailure::Rejected(format!(
                "{address}: terminal closed the store with {:?}",
                end.kind()
            ))));
        }

        debug!(%address, bytes = size, "Stored");
        Ok(u64::from(size))
    }

    /// Drops the connection when `outcome` left it unusable.
    fn settle<T>(&mut self, outcome: &Result<T>) {
        if let Err(e) = outcome {
            if e.is_session_fatal() && self.stream.take().is_some() {
                debug!("Dropping secure session: {e}");
            }
        }
    }
}

#[async_trait]
impl TransportClient for SecureFileClient {
    async fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let stream: TcpStream =
            connect_within(&self.config.host, self.config.port, self.config.timeout).await?;
        self.stream = Some(BufReader::new(stream));

        let outcome: Result<()> = self.handshake().await.map_err(|e| match e {
            Error::Protocol(detail) | Error::Timeout(detail) => Error::Handshake(detail),
            other => other,
        });
        if outcome.is_err() {
            self.stream = None;
        } else {
            info!(
                "Authenticated with {}:{}",
                self.config.host, self.config.port
            );
        }
        outcome
    }

    async fn stat(&mut self, address: Address) -> Result<u64> {
        let payload: Vec<u8> = self.get(address).await?;
        Ok(payload.len() as u64)
    }

    async fn get(&mut self, address: Address) -> Result<Vec<u8>> {
        let outcome: Result<Vec<u8>> = self.retrieve(address).await;
        self.settle(&outcome);
        outcome
    }

    async fn put(&mut self, address: Address, payload: &[u8]) -> Result<u64> {
        let outcome: Result<u64> = self.store(address, payload).await;
        self.settle(&outcome);
        outcome
    }

    async fn close(&mut self) -> Result<()> {
        if self.stream.is_none() {
            return Ok(());
        }

        let released: Result<Apdu> = self
            .exchange(&Apdu::bare(ApduType::ARelease), "A_SYNC")
            .await;

        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.get_mut().shutdown().await {
                debug!("Shutdown failed: {e}");
            }
        }

        match released {
            Ok(reply) if reply.kind() == ApduType::ASync => Ok(()),
            Ok(reply) => {
                warn!("Release answered with {:?} instead of A_SYNC", reply.kind());
                Err(Error::Protocol(format!(
                    "expected A_SYNC, got {:?}",
                    reply.kind()
                )))
            }
            Err(e) => Err(e),
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

/// Reads one NSDU and returns the APDU inside it.
pub async fn read_apdu<R>(reader: &mut R, network: NetworkType) -> Result<Apdu>
where
    R: AsyncRead + Unpin,
{
    let mut header: [u8; NSDU_HEADER_LEN] = [0u8; NSDU_HEADER_LEN];
    reader.read_exact(&mut header).await?;
    if header[0] != STX {
        return Err(Error::Protocol(format!(
            "expected STX, got 0x{:02x}",
            header[0]
        )));
    }

    let len: usize = usize::from(u16::from_be_bytes([header[1], header[2]]));
    let mut frame: Vec<u8> = vec![0u8; NSDU_HEADER_LEN + len + network.trailer_len()];
    frame[..NSDU_HEADER_LEN].copy_from_slice(&header);
    reader.read_exact(&mut frame[NSDU_HEADER_LEN..]).await?;

    let apdu: Apdu = nsdu::decode(&frame, network)?;
    match &apdu {
        Apdu::Data(chunk) => debug!("<- F_DATA ({} bytes)", chunk.len()),
        Apdu::Generic { kind, .. } => debug!("<- {kind:?}"),
    }
    Ok(apdu)
}

pub async fn write_apdu<W>(writer: &mut W, apdu: &Apdu, network: NetworkType) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame: Vec<u8> = nsdu::encode(apdu, network)?;
    debug!("-> {:?}", apdu.kind());
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

fn interrupted(err: Error) -> Error {
    match err {
        Error::Io(e) => Error::Transfer(TransferFailure::Interrupted(e.to_string())),
        other => other,
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
