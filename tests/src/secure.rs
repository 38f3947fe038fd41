use std::sync::Arc;

use dknw_common::error::{Error, TransferFailure};
use dknw_common::model::{Address, AddressSpace};
use dknw_common::signal::StopSignal;
use dknw_core::enumeration::{enumerate, EnumerationOptions};
use dknw_core::retry::RetryPolicy;
use dknw_core::transport::{
    ClientFactory, SecureConfig, SecureFileClient, TerminalClientFactory, TransportClient,
    TransportOptions,
};
use dknw_protocols::secure::{DeviceProfile, NetworkType};

use crate::fake::{payload, test_profile, SecureBehaviour, SecureTerminal};

async fn connected(terminal: &SecureTerminal) -> SecureFileClient {
    let mut client = SecureFileClient::new(terminal.config());
    client.connect().await.unwrap();
    client
}

#[tokio::test]
async fn authenticated_session_moves_files_both_ways() {
    for network in [NetworkType::Bb, NetworkType::Nb] {
        let terminal = SecureTerminal::start(test_profile(network), SecureBehaviour::default()).await;
        let address = Address::new(4000, 123_456);
        let mut client = connected(&terminal).await;

        let body = payload(11, 20_000);
        assert_eq!(client.put(address, &body).await.unwrap(), 20_000);
        assert_eq!(terminal.entry(address).unwrap(), body);
        assert_eq!(client.get(address).await.unwrap(), body);
        assert_eq!(client.stat(address).await.unwrap(), 20_000);

        client.close().await.unwrap();
        assert!(!client.is_connected());
    }
}

#[tokio::test]
async fn wrong_cipher_table_is_refused() {
    let terminal =
        SecureTerminal::start(test_profile(NetworkType::Nb), SecureBehaviour::default()).await;
    let genuine = test_profile(NetworkType::Nb);
    let impostor = Arc::new(DeviceProfile::new(NetworkType::Nb, genuine.items, [0x42; 256]));
    let mut client = SecureFileClient::new(SecureConfig {
        profile: impostor,
        ..terminal.config()
    });

    let result = client.connect().await;

    assert!(matches!(result, Err(Error::Handshake(_))));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn rejected_connect_is_a_handshake_error() {
    let behaviour = SecureBehaviour {
        refuse_connect: true,
        ..SecureBehaviour::default()
    };
    let terminal = SecureTerminal::start(test_profile(NetworkType::Bb), behaviour).await;
    let mut client = SecureFileClient::new(terminal.config());

    assert!(matches!(client.connect().await, Err(Error::Handshake(_))));
}

#[tokio::test]
async fn missing_entry_is_not_found_and_session_survives() {
    let terminal =
        SecureTerminal::start(test_profile(NetworkType::Nb), SecureBehaviour::default()).await;
    let present = Address::new(1000, 8);
    terminal.insert(present, payload(8, 64));
    let mut client = connected(&terminal).await;

    let missing = client.get(Address::new(1000, 7)).await;
    assert!(matches!(missing, Err(Error::NotFound(_))));
    assert!(client.is_connected());
    assert_eq!(client.get(present).await.unwrap(), payload(8, 64));
}

#[tokio::test]
async fn announced_size_must_match_the_data() {
    let behaviour = SecureBehaviour {
        overstate_size: 10,
        ..SecureBehaviour::default()
    };
    let terminal = SecureTerminal::start(test_profile(NetworkType::Nb), behaviour).await;
    let address = Address::new(1000, 1);
    terminal.insert(address, payload(1, 100));
    let mut client = connected(&terminal).await;

    let result = client.get(address).await;

    assert!(matches!(
        result,
        Err(Error::Transfer(TransferFailure::LengthMismatch {
            expected: 110,
            actual: 100
        }))
    ));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn concurrent_sweep_over_secure_sessions() {
    let terminal =
        SecureTerminal::start(test_profile(NetworkType::Nb), SecureBehaviour::default()).await;
    terminal.insert(Address::new(1000, 10), payload(10, 10));
    terminal.insert(Address::new(1002, 0), payload(20, 0));
    let options = TransportOptions {
        profile: Some(terminal.profile()),
        ..TransportOptions::default()
    };
    let factory: Arc<dyn ClientFactory> =
        Arc::new(TerminalClientFactory::new(&terminal.terminal(), options).unwrap());
    let space = AddressSpace::new(1000, 1002, 0, 19).unwrap();
    let sweep = EnumerationOptions {
        concurrency: 3,
        dest: None,
        retry: RetryPolicy::none(),
    };

    let mut handle = enumerate(factory, &space, sweep, StopSignal::new()).unwrap();
    let mut present: Vec<Address> = Vec::new();
    while let Some(result) = handle.next().await {
        if result.is_present() {
            present.push(result.address);
        }
    }
    let summary = handle.finish().await;
    present.sort();

    assert_eq!(summary.processed, 60);
    assert_eq!(summary.errors, 0);
    assert_eq!(present, vec![Address::new(1000, 10), Address::new(1002, 0)]);
}

#[tokio::test]
async fn absurd_announced_size_fails_cleanly() {
    let behaviour = SecureBehaviour {
        overstate_size: u32::MAX - 100,
        ..SecureBehaviour::default()
    };
    let terminal = SecureTerminal::start(test_profile(NetworkType::Bb), behaviour).await;
    let address = Address::new(1000, 2);
    terminal.insert(address, payload(2, 100));
    let mut client = connected(&terminal).await;

    let result = client.get(address).await;

    assert!(matches!(
        result,
        Err(Error::Transfer(TransferFailure::LengthMismatch {
            expected,
            actual: 100
        })) if expected == u64::from(u32::MAX)
    ));
}
