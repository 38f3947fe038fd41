use colored::*;
use dknw_common::model::{ProbeResult, ProbeStatus};
use dknw_core::scanner::LiveHost;

use crate::terminal::{colors, print};

type Detail = (String, ColoredString);

pub fn status(status: ProbeStatus) -> ColoredString {
    let label: String = format!("{:<7}", status.to_string());
    match status {
        ProbeStatus::Present => label.green().bold(),
        ProbeStatus::Absent => label.bright_black(),
        ProbeStatus::Error => label.red().bold(),
    }
}

pub fn size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value: f64 = bytes as f64;
    let mut unit: usize = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    match unit {
        0 => format!("{bytes} B"),
        _ => format!("{value:.1} {}", UNITS[unit]),
    }
}

/// One line per sweep result: status, address, then whatever is known.
pub fn probe_line(result: &ProbeResult) -> String {
    let address: ColoredString = format!("{:<14}", result.address.to_string()).color(colors::ADDRESS);
    let mut line: String = format!("{} {}", status(result.status), address);

    if let Some(bytes) = result.size {
        line.push_str(&format!(" {}", size(bytes).color(colors::TEXT_DEFAULT)));
    }
    if let Some(path) = &result.saved_to {
        line.push_str(&format!(" {} {}", "->".color(colors::SEPARATOR), path.display()));
    }
    if let Some(detail) = &result.error_detail {
        line.push_str(&format!(" {}", detail.yellow()));
    }
    line
}

pub fn live_host_details(host: &LiveHost) -> Vec<Detail> {
    let mut details: Vec<Detail> = vec![
        ("IPv4".to_string(), host.ip.to_string().color(colors::IPV4_ADDR)),
        ("Port".to_string(), host.port.to_string().normal()),
        (
            "Latency".to_string(),
            format!("{}ms", host.elapsed.as_millis()).normal(),
        ),
    ];

    match &host.terminal_type {
        Some(kind) => {
            details.push((
                "Model".to_string(),
                format!("{}-{}", kind.model_id, kind.model_sub_id).color(colors::ACCENT),
            ));
            details.push(("Serial".to_string(), kind.serial.clone().normal()));
            details.push(("Software".to_string(), kind.software_version.clone().normal()));
            details.push(("Protocol".to_string(), kind.protocol_version.to_string().normal()));
        }
        None => details.push(("Model".to_string(), "unidentified".dimmed())),
    }
    details
}

pub fn print_live_host(host: &LiveHost, idx: usize) {
    print::tree_head(idx, &host.ip.to_string());
    print::as_tree_one_level(live_host_details(host));
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
