use std::time::{Duration, Instant};

use colored::*;
use dknw_common::config::Config;
use dknw_common::network::range::IpCollection;
use dknw_common::network::target::Target;
use dknw_common::signal::StopSignal;
use dknw_common::success;
use dknw_core::scanner::{LiveHost, ScanOptions, ScanSummary, TerminalScanner};
use tracing::{Span, warn};

use crate::mprint;
use crate::terminal::{colors, format, print, progress};

pub async fn scan(
    target: Target,
    options: ScanOptions,
    cfg: &Config,
    stop: StopSignal,
) -> anyhow::Result<()> {
    let addresses: IpCollection = target.into_collection();
    let len: u64 = addresses.len();
    let noun: &str = if len == 1 { "address" } else { "addresses" };
    success!("Target covers {len} {noun}");
    let scanner: TerminalScanner = TerminalScanner::new(&options)?;

    print::header("scanning for terminals", cfg.quiet);
    let span: Option<Span> = progress::scan_span(cfg.quiet);
    let start_time: Instant = Instant::now();

    let mut handle = scanner.scan(addresses.into_scannable(), stop);
    let mut hosts: Vec<LiveHost> = Vec::new();
    while let Some(host) = handle.next().await {
        match cfg.quiet {
            0 => {
                if !hosts.is_empty() {
                    mprint!();
                }
                format::print_live_host(&host, hosts.len());
            }
            _ => mprint!(&host.ip.to_string()),
        }
        hosts.push(host);
        progress::report_hosts(span.as_ref(), hosts.len());
    }
    let summary: ScanSummary = handle.finish().await;
    drop(span);

    scan_ends(&hosts, summary, start_time.elapsed(), cfg);
    Ok(())
}

fn scan_ends(hosts: &[LiveHost], summary: ScanSummary, total_time: Duration, cfg: &Config) {
    if summary.cancelled {
        warn!("Scan interrupted after {} probes", summary.probed);
    }

    if hosts.is_empty() {
        if cfg.quiet == 0 {
            print::header("zero terminals detected", cfg.quiet);
            print::no_results();
        }
        return;
    }

    let found: ColoredString = format!("{} terminals", hosts.len()).bold().green();
    let probed: ColoredString = format!("{} addresses", summary.probed).bold();
    let total_time: ColoredString = format!("{:.2}s", total_time.as_secs_f64()).bold().yellow();
    let output: ColoredString = format!("Scan complete: {found} among {probed} in {total_time}")
        .color(colors::TEXT_DEFAULT);

    match cfg.quiet {
        0 => {
            print::fat_separator();
            print::centerln(&output.to_string());
        }
        1 => success!("{}", output),
        _ => {}
    }
}
