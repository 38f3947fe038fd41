//! Progress bars hung on tracing spans, drawn by the indicatif layer.

use colored::*;
use indicatif::ProgressStyle;
use tracing::{Span, info_span};
use tracing_indicatif::span_ext::IndicatifSpanExt;

const TICKS: &[&str] = &[
    "▁▁▁▁▁",
    "▁▂▂▂▁",
    "▁▄▂▄▁",
    "▂▄▆▄▂",
    "▄▆█▆▄",
    "▂▄▆▄▂",
    "▁▄▂▄▁",
    "▁▂▂▂▁",
];

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.blue} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(TICKS)
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.blue} [{bar:32.green/bright_black}] {pos}/{len} {msg} ({eta})",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .tick_strings(TICKS)
    .progress_chars("━╸ ")
}

/// Spinner shown while a scan runs. Hidden when quiet.
pub fn scan_span(quiet: u8) -> Option<Span> {
    if quiet > 0 {
        return None;
    }
    let span: Span = info_span!("scan", indicatif.pb_show = true);
    span.pb_set_style(&spinner_style());
    span.pb_set_message("Probing...");
    span.pb_start();
    Some(span)
}

pub fn report_hosts(span: Option<&Span>, count: usize) {
    if let Some(span) = span {
        span.pb_set_message(&format!(
            "Found {} so far...",
            format!("{count} terminals").green().bold()
        ));
    }
}

/// Bar over the addresses of a sweep. Hidden when quiet.
pub fn sweep_span(total: u64, quiet: u8) -> Option<Span> {
    if quiet > 0 {
        return None;
    }
    let span: Span = info_span!("sweep", indicatif.pb_show = true);
    span.pb_set_style(&bar_style());
    span.pb_set_length(total);
    span.pb_start();
    Some(span)
}

pub fn report_sweep(span: Option<&Span>, processed: u64, present: u64, errors: u64) {
    if let Some(span) = span {
        span.pb_set_position(processed);
        span.pb_set_message(&format!(
            "{} present, {} errors",
            present.to_string().green().bold(),
            errors.to_string().red()
        ));
    }
}
