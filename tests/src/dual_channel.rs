use std::sync::Arc;
use std::time::{Duration, Instant};

use dknw_common::error::{Error, TransferFailure};
use dknw_common::model::{Address, AddressSpace, ProbeStatus};
use dknw_common::signal::StopSignal;
use dknw_core::enumeration::{enumerate, EnumerationOptions};
use dknw_core::retry::RetryPolicy;
use dknw_core::transport::{
    ClientFactory, DualChannelClient, DualChannelConfig, SessionState, TerminalClientFactory,
    TransportClient, TransportOptions,
};
use dknw_protocols::ds2::{Cts, Frame, TerminalInfo};

use crate::fake::ds2_terminal::WRITE_PROTECTED_CODE;
use crate::fake::{payload, Ds2Behaviour, Ds2Terminal};

fn greeting() -> TerminalInfo {
    let mut essid = [0u8; 32];
    essid[..7].copy_from_slice(b"KARAOKE");
    TerminalInfo {
        address: u32::from_be_bytes([192, 168, 1, 20]),
        mac: [0x00, 0x1b, 0x44, 0x11, 0x3a, 0xb7],
        serial: *b"DK123456",
        throughput: 54,
        token_group: 3,
        essid,
        wlan_type: 2,
    }
}

async fn connected(terminal: &Ds2Terminal) -> DualChannelClient {
    let mut client = DualChannelClient::new(terminal.config());
    client.connect().await.unwrap();
    assert_eq!(client.state(), SessionState::Ready);
    client
}

#[tokio::test]
async fn greeting_is_recorded_when_required() {
    let behaviour = Ds2Behaviour {
        greeting: Some(Frame::Info(greeting())),
        ..Ds2Behaviour::default()
    };
    let terminal = Ds2Terminal::start(behaviour).await;
    let mut config = terminal.config();
    config.expect_greeting = true;

    let mut client = DualChannelClient::new(config);
    client.connect().await.unwrap();

    let info = client.terminal_info().unwrap();
    assert_eq!(info.serial_lossy(), "DK123456");
    assert_eq!(info.essid_lossy(), "KARAOKE");
    client.close().await.unwrap();
    assert_eq!(client.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn wrong_greeting_fails_the_handshake() {
    let behaviour = Ds2Behaviour {
        greeting: Some(Frame::Cts(Cts {
            total: 1,
            done: 0,
            block: 1,
        })),
        ..Ds2Behaviour::default()
    };
    let terminal = Ds2Terminal::start(behaviour).await;
    let mut config = terminal.config();
    config.expect_greeting = true;

    let mut client = DualChannelClient::new(config);
    let result = client.connect().await;

    assert!(matches!(result, Err(Error::Handshake(_))));
    assert_eq!(client.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn silent_terminal_fails_a_required_greeting() {
    let terminal = Ds2Terminal::start(Ds2Behaviour::default()).await;
    let mut config = terminal.config();
    config.expect_greeting = true;
    config.timeout = Duration::from_millis(200);

    let mut client = DualChannelClient::new(config);
    assert!(matches!(client.connect().await, Err(Error::Handshake(_))));
}

#[tokio::test]
async fn unknown_entries_keep_the_session() {
    let terminal = Ds2Terminal::start(Ds2Behaviour::default()).await;
    let present = Address::new(1000, 2);
    terminal.insert(present, payload(2, 300));
    let mut client = connected(&terminal).await;

    let missing = client.get(Address::new(1000, 1)).await;
    assert!(matches!(missing, Err(Error::NotFound(_))));
    assert_eq!(client.state(), SessionState::Ready);

    assert_eq!(client.get(present).await.unwrap(), payload(2, 300));
    assert_eq!(terminal.sessions(), 1);
}

#[tokio::test]
async fn stat_is_stable_and_matches_get() {
    let terminal = Ds2Terminal::start(Ds2Behaviour::default()).await;
    let address = Address::new(2000, 10);
    terminal.insert(address, payload(1, 9000));
    let mut client = connected(&terminal).await;

    let first = client.stat(address).await.unwrap();
    let second = client.stat(address).await.unwrap();
    let body = client.get(address).await.unwrap();

    assert_eq!(first, 9000);
    assert_eq!(first, second);
    assert_eq!(body.len() as u64, first);
}

#[tokio::test]
async fn empty_entries_count_as_absent() {
    let terminal = Ds2Terminal::start(Ds2Behaviour::default()).await;
    let empty = Address::new(1000, 0);
    let stocked = Address::new(1000, 1);
    terminal.insert(empty, Vec::new());
    terminal.insert(stocked, payload(1, 40));
    let mut client = connected(&terminal).await;

    assert!(matches!(client.stat(empty).await, Err(Error::NotFound(_))));
    assert!(matches!(client.get(empty).await, Err(Error::NotFound(_))));
    assert_eq!(client.state(), SessionState::Ready);
    assert_eq!(client.get(stocked).await.unwrap(), payload(1, 40));
}

#[tokio::test]
async fn retrieves_do_not_wait_for_the_completion_ack() {
    let terminal = Ds2Terminal::start(Ds2Behaviour::default()).await;
    let first = Address::new(1200, 1);
    let second = Address::new(1200, 2);
    terminal.insert(first, payload(1, 9000));
    terminal.insert(second, payload(2, 10));
    let config = DualChannelConfig {
        tail_timeout: Duration::from_secs(5),
        ..terminal.config()
    };
    let mut client = DualChannelClient::new(config);
    client.connect().await.unwrap();

    let started = Instant::now();
    assert_eq!(client.get(first).await.unwrap(), payload(1, 9000));
    assert_eq!(client.stat(second).await.unwrap(), 10);
    assert_eq!(client.get(first).await.unwrap(), payload(1, 9000));
    client.put(Address::new(1200, 3), &payload(3, 500)).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
    assert_eq!(terminal.entry(Address::new(1200, 3)).unwrap(), payload(3, 500));
    assert_eq!(client.state(), SessionState::Ready);
}

#[tokio::test]
async fn line_noise_is_skipped() {
    let behaviour = Ds2Behaviour {
        noise: true,
        block: 1000,
        ..Ds2Behaviour::default()
    };
    let terminal = Ds2Terminal::start(behaviour).await;
    let address = Address::new(1500, 77);
    terminal.insert(address, payload(77, 4321));
    let mut client = connected(&terminal).await;

    assert_eq!(client.get(address).await.unwrap(), payload(77, 4321));
    client.put(Address::new(1500, 78), &payload(78, 2500)).await.unwrap();
    assert_eq!(terminal.entry(Address::new(1500, 78)).unwrap(), payload(78, 2500));
}

#[tokio::test]
async fn short_payload_is_a_length_mismatch_and_drops_the_session() {
    let address = Address::new(1000, 5);
    let behaviour = Ds2Behaviour {
        truncate: Some(address),
        ..Ds2Behaviour::default()
    };
    let terminal = Ds2Terminal::start(behaviour).await;
    terminal.insert(address, payload(5, 5000));
    terminal.insert(Address::new(1000, 6), payload(6, 50));
    let mut client = connected(&terminal).await;

    let result = client.get(address).await;
    assert!(matches!(
        result,
        Err(Error::Transfer(TransferFailure::LengthMismatch { .. }))
    ));
    assert_eq!(client.state(), SessionState::Disconnected);
    assert!(matches!(
        client.get(Address::new(1000, 6)).await,
        Err(Error::Protocol(_))
    ));

    client.connect().await.unwrap();
    assert_eq!(client.get(Address::new(1000, 6)).await.unwrap(), payload(6, 50));
}

#[tokio::test]
async fn missing_final_acknowledgement_is_tolerated() {
    let behaviour = Ds2Behaviour {
        omit_final_ack: true,
        ..Ds2Behaviour::default()
    };
    let terminal = Ds2Terminal::start(behaviour).await;
    let address = Address::new(3000, 1);
    let mut client = connected(&terminal).await;

    let accepted = client.put(address, &payload(3, 10_000)).await.unwrap();
    assert_eq!(accepted, 10_000);
    assert_eq!(terminal.entry(address).unwrap(), payload(3, 10_000));

    assert_eq!(client.get(address).await.unwrap(), payload(3, 10_000));
    assert_eq!(client.state(), SessionState::Ready);
}

#[tokio::test]
async fn refused_store_keeps_the_session() {
    let behaviour = Ds2Behaviour {
        reject_stores: true,
        ..Ds2Behaviour::default()
    };
    let terminal = Ds2Terminal::start(behaviour).await;
    let mut client = connected(&terminal).await;

    let result = client.put(Address::new(1000, 1), b"abc").await;

    let detail: String = match result {
        Err(Error::Transfer(TransferFailure::Rejected(detail))) => detail,
        other => panic!("expected a rejection, got {other:?}"),
    };
    assert!(detail.contains("write protected"), "{detail}");
    assert!(detail.contains(&format!("(code {WRITE_PROTECTED_CODE})")), "{detail}");
    assert_eq!(client.state(), SessionState::Ready);
}

#[tokio::test]
async fn sweep_over_the_wire_finds_what_is_stored() {
    let terminal = Ds2Terminal::start(Ds2Behaviour::default()).await;
    terminal.insert(Address::new(1000, 3), payload(3, 100));
    terminal.insert(Address::new(1001, 0), payload(4, 5000));
    terminal.insert(Address::new(1000, 4), Vec::new());
    let factory: Arc<dyn ClientFactory> = Arc::new(
        TerminalClientFactory::new(&terminal.terminal(), TransportOptions::default()).unwrap(),
    );
    let space = AddressSpace::new(1000, 1001, 0, 9).unwrap();
    let options = EnumerationOptions {
        concurrency: 1,
        dest: None,
        retry: RetryPolicy::none(),
    };

    let mut handle = enumerate(factory, &space, options, StopSignal::new()).unwrap();
    let mut present: Vec<(Address, Option<u64>)> = Vec::new();
    let mut total = 0;
    while let Some(result) = handle.next().await {
        total += 1;
        assert_ne!(result.status, ProbeStatus::Error, "{:?}", result);
        if result.address == Address::new(1000, 4) {
            assert_eq!(result.status, ProbeStatus::Absent);
        }
        if result.is_present() {
            present.push((result.address, result.size));
        }
    }
    handle.finish().await;

    assert_eq!(total, 20);
    assert_eq!(
        present,
        vec![
            (Address::new(1000, 3), Some(100)),
            (Address::new(1001, 0), Some(5000)),
        ]
    );
    assert_eq!(terminal.sessions(), 1);
}
