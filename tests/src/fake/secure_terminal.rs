//! A secure-protocol terminal on a loopback socket.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dknw_common::model::{Address, Terminal};
use dknw_core::transport::secure::{read_apdu, write_apdu};
use dknw_core::transport::SecureConfig;
use dknw_protocols::secure::{
    Apdu, ApduType, DeviceProfile, FileOperation, Item, NetworkType, DATA_CHUNK,
};
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

type Entries = Arc<Mutex<BTreeMap<Address, Vec<u8>>>>;

pub const CHALLENGE: &[u8] = b"\x5a\x01\xc3\x7e\x10\x99\x00\xff";

#[derive(Debug, Clone, Default)]
pub struct SecureBehaviour {
    /// Announce this many bytes more than the entry holds on every read.
    pub overstate_size: u32,
    /// Answer A_CONNECT with A_REJECT.
    pub refuse_connect: bool,
}

pub struct SecureTerminal {
    pub port: u16,
    profile: Arc<DeviceProfile>,
    entries: Entries,
    task: JoinHandle<()>,
}

impl SecureTerminal {
    pub async fn start(profile: DeviceProfile, behaviour: SecureBehaviour) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port: u16 = listener.local_addr().unwrap().port();
        let profile: Arc<DeviceProfile> = Arc::new(profile);
        let entries: Entries = Arc::default();

        let task = {
            let profile: Arc<DeviceProfile> = Arc::clone(&profile);
            let entries: Entries = Arc::clone(&entries);
            tokio::spawn(async move {
                while let Ok((socket, _)) = listener.accept().await {
                    tokio::spawn(serve(
                        BufReader::new(socket),
                        Arc::clone(&profile),
                        Arc::clone(&entries),
                        behaviour.clone(),
                    ));
                }
            })
        };

        Self {
            port,
            profile,
            entries,
            task,
        }
    }

    pub fn insert(&self, address: Address, payload: Vec<u8>) {
        self.entries.lock().unwrap().insert(address, payload);
    }

    pub fn entry(&self, address: Address) -> Option<Vec<u8>> {
        self.entries.lock().unwrap().get(&address).cloned()
    }

    pub fn profile(&self) -> Arc<DeviceProfile> {
        Arc::clone(&self.profile)
    }

    pub fn terminal(&self) -> Terminal {
        Terminal::secure("127.0.0.1", self.port)
    }

    pub fn config(&self) -> SecureConfig {
        SecureConfig {
            host: "127.0.0.1".into(),
            port: self.port,
            timeout: Duration::from_secs(2),
            profile: self.profile(),
        }
    }
}

impl Drop for SecureTerminal {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn file_number(apdu: &Apdu, code: u16) -> Option<Address> {
    let raw: &[u8] = apdu.item(code)?;
    if raw.len() != 6 {
        return None;
    }
    let directory = u16::from_be_bytes([raw[0], raw[1]]);
    let file = u32::from_be_bytes([raw[2], raw[3], raw[4], raw[5]]);
    Some(Address::new(u32::from(directory), file))
}

async fn serve(
    mut socket: BufReader<TcpStream>,
    profile: Arc<DeviceProfile>,
    entries: Entries,
    behaviour: SecureBehaviour,
) {
    let network: NetworkType = profile.network;
    let items = profile.items;

    macro_rules! reply {
        ($apdu:expr) => {
            if write_apdu(&mut socket, &$apdu, network).await.is_err() {
                return;
            }
        };
    }
    macro_rules! receive {
        () => {
            match read_apdu(&mut socket, network).await {
                Ok(apdu) => apdu,
                Err(_) => return,
            }
        };
    }

    let hello = receive!();
    if hello.kind() != ApduType::AConnect || behaviour.refuse_connect {
        reply!(Apdu::bare(ApduType::AReject));
        return;
    }
    reply!(Apdu::generic(
        ApduType::AAuthent,
        vec![Item::new(items.auth_req, CHALLENGE)],
    ));

    let answer = receive!();
    let expected: Vec<u8> = profile.cipher().respond(CHALLENGE);
    if answer.kind() != ApduType::AAuthentRsp || answer.item(items.auth_res) != Some(&expected[..]) {
        reply!(Apdu::bare(ApduType::AReject));
        return;
    }
    reply!(Apdu::bare(ApduType::AAccept));

    loop {
        let request = receive!();
        match request.kind() {
            ApduType::ARelease => {
                reply!(Apdu::bare(ApduType::ASync));
                return;
            }
            ApduType::FStart => {}
            _ => {
                reply!(Apdu::bare(ApduType::AReject));
                return;
            }
        }

        let operation = request
            .item(items.file_operation)
            .and_then(|raw| (raw.len() == 2).then(|| u16::from_be_bytes([raw[0], raw[1]])))
            .and_then(FileOperation::from_u16);
        let Some(address) = file_number(&request, items.file_number) else {
            reply!(Apdu::bare(ApduType::FCancel));
            continue;
        };

        match operation {
            Some(FileOperation::Read) => {
                let found: Option<Vec<u8>> = entries.lock().unwrap().get(&address).cloned();
                let Some(payload) = found else {
                    reply!(Apdu::bare(ApduType::AReject));
                    continue;
                };
                let announced: u32 = payload.len() as u32 + behaviour.overstate_size;
                reply!(Apdu::generic(
                    ApduType::FReady,
                    vec![Item::new(items.expect_file_size, announced.to_be_bytes())],
                ));
                for chunk in payload.chunks(DATA_CHUNK) {
                    reply!(Apdu::Data(chunk.to_vec()));
                }
                reply!(Apdu::bare(ApduType::FFinal));
                if receive!().kind() != ApduType::FEnd {
                    return;
                }
            }
            Some(FileOperation::Replace) => {
                let Some(size) = request.item_u32(items.expect_file_size) else {
                    reply!(Apdu::bare(ApduType::FCancel));
                    continue;
                };
                reply!(Apdu::generic(
                    ApduType::FReady,
                    vec![Item::new(items.expect_file_size, size.to_be_bytes())],
                ));

                let mut received: Vec<u8> = Vec::with_capacity(size as usize);
                loop {
                    match receive!() {
                        Apdu::Data(chunk) => received.extend_from_slice(&chunk),
                        Apdu::Generic {
                            kind: ApduType::FFinal,
                            ..
                        } => break,
                        Apdu::Generic { .. } => return,
                    }
                }
                if received.len() != size as usize {
                    reply!(Apdu::bare(ApduType::FCancel));
                    continue;
                }
                entries.lock().unwrap().insert(address, received);
                reply!(Apdu::bare(ApduType::FEnd));
            }
            _ => reply!(Apdu::bare(ApduType::FCancel)),
        }
    }
}
