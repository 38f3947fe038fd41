use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dknw_common::network::range::{cidr_range, IpCollection, Ipv4Range};
use dknw_common::signal::StopSignal;
use dknw_core::scanner::{LiveHost, Prober, ScanOptions, TerminalScanner};
use dknw_protocols::terminal_type::{self, TerminalType, MESSAGE_HEADER_LEN};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Answers for every address after a pause, counting dispatches and overlap.
#[derive(Default)]
struct CountingProber {
    dispatched: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl Prober for CountingProber {
    async fn probe(&self, ip: Ipv4Addr) -> Option<LiveHost> {
        self.dispatched.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Some(LiveHost {
            ip,
            port: 22960,
            terminal_type: None,
            elapsed: Duration::from_millis(20),
        })
    }
}

#[tokio::test]
async fn cancelled_scan_stops_dispatching() {
    let prober = Arc::new(CountingProber::default());
    let scanner =
        TerminalScanner::with_prober(prober.clone(), 50, Duration::from_secs(1)).unwrap();
    let block = cidr_range(Ipv4Addr::new(10, 20, 0, 0), 16).unwrap();
    let stop = StopSignal::new();

    let mut handle = scanner.scan(block.to_iter(), stop.clone());
    let mut found: usize = 0;
    while handle.next().await.is_some() {
        found += 1;
        if found == 100 {
            stop.stop();
        }
    }
    let summary = handle.finish().await;
    let dispatched = prober.dispatched.load(Ordering::SeqCst);

    assert!(summary.cancelled);
    assert!(dispatched < 65_536 / 4, "dispatched {dispatched}");
    assert_eq!(summary.probed as usize, dispatched);
    assert!(prober.peak.load(Ordering::SeqCst) <= 50);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(prober.dispatched.load(Ordering::SeqCst), dispatched);
}

#[tokio::test]
async fn finished_scan_covers_every_address() {
    let prober = Arc::new(CountingProber::default());
    let scanner = TerminalScanner::with_prober(prober.clone(), 16, Duration::from_secs(1)).unwrap();
    let mut targets = IpCollection::new();
    targets.add_range(Ipv4Range::new(
        Ipv4Addr::new(192, 168, 7, 1),
        Ipv4Addr::new(192, 168, 7, 100),
    ));
    targets.add_single(Ipv4Addr::new(224, 0, 0, 1));

    let mut handle = scanner.scan(targets.into_scannable(), StopSignal::new());
    let mut ips: Vec<Ipv4Addr> = Vec::new();
    while let Some(host) = handle.next().await {
        ips.push(host.ip);
    }
    let summary = handle.finish().await;
    ips.sort();

    assert_eq!(summary.probed, 100);
    assert_eq!(ips.len(), 100);
    assert!(!ips.contains(&Ipv4Addr::new(224, 0, 0, 1)));
    assert!(prober.peak.load(Ordering::SeqCst) <= 16);
}

#[tokio::test]
async fn loopback_terminal_is_found_and_identified() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let identity = TerminalType {
        protocol_version: 2,
        model_id: "DK".into(),
        model_sub_id: "40".into(),
        serial: "B7654321".into(),
        software_version: "1.12.000".into(),
        bb_index: 1,
        printer_version: "".into(),
    };
    let reply = identity.encode();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut request = [0u8; MESSAGE_HEADER_LEN];
            if socket.read_exact(&mut request).await.is_ok()
                && request == terminal_type::request()
            {
                let _ = socket.write_all(&reply).await;
            }
        }
    });

    let options = ScanOptions {
        port,
        timeout: Duration::from_secs(1),
        workers: 4,
        identify: true,
    };
    let scanner = TerminalScanner::new(&options).unwrap();
    let mut handle = scanner.scan(std::iter::once(Ipv4Addr::LOCALHOST), StopSignal::new());

    let host = handle.next().await.unwrap();
    assert_eq!(host.ip, Ipv4Addr::LOCALHOST);
    assert_eq!(host.terminal_type, Some(identity));
    assert!(handle.next().await.is_none());
    assert_eq!(handle.finish().await.probed, 1);
}
