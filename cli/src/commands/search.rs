use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Datelike, Local};
use colored::*;
use dknw_common::config::{Config, validate_workers};
use dknw_common::model::{AddressSpace, ProbeResult, ProbeStatus, ProtocolKind};
use dknw_common::signal::StopSignal;
use dknw_common::success;
use dknw_core::enumeration::{self, EnumerationOptions, EnumerationSummary, Progress};
use dknw_core::retry::RetryPolicy;
use dknw_core::transport::ClientFactory;
use tracing::{Span, debug, warn};

use crate::commands::ConnectionArgs;
use crate::mprint;
use crate::terminal::{colors, format, print, progress};

pub struct SearchArgs {
    pub connection: ConnectionArgs,
    pub dest: Option<PathBuf>,
    pub workers: usize,
    pub dir_min: u32,
    pub dir_max: u32,
    pub file_min: u32,
    pub file_max: u32,
    pub common: bool,
    pub attempts: u32,
}

/// The date-derived file number some firmware uses for the day's additions: `1MMDD`.
fn todays_file_number() -> u32 {
    let today = Local::now();
    10_000 + today.month() * 100 + today.day()
}

pub fn address_space(args: &SearchArgs) -> anyhow::Result<AddressSpace> {
    let space: AddressSpace = if args.common {
        AddressSpace::common(
            args.dir_min,
            args.dir_max,
            args.file_min,
            args.file_max,
            &[todays_file_number()],
        )?
    } else {
        AddressSpace::new(args.dir_min, args.dir_max, args.file_min, args.file_max)?
    };

    if args.connection.protocol == ProtocolKind::Secure {
        space.ensure_directory_fits_u16()?;
    }
    Ok(space)
}

pub async fn search(args: SearchArgs, cfg: &Config, stop: StopSignal) -> anyhow::Result<()> {
    let space: AddressSpace = address_space(&args)?;
    let factory: Arc<dyn ClientFactory> = args.connection.factory(cfg)?;
    let options = EnumerationOptions {
        concurrency: validate_workers(args.workers)?,
        dest: args.dest.clone(),
        retry: RetryPolicy::default().with_attempts(args.attempts),
    };

    print::header("sweeping terminal storage", cfg.quiet);
    if cfg.quiet == 0 {
        if let (Some(first), Some(last)) = (space.first(), space.last()) {
            print::aligned_line("Range", format!("{first} .. {last}"));
        }
        print::aligned_line("Addresses", space.len().to_string());
        print::aligned_line("Workers", options.concurrency.to_string());
        if let Some(dest) = &options.dest {
            print::aligned_line("Saving to", dest.display().to_string());
        }
    }

    let start_time: Instant = Instant::now();
    let mut handle = enumeration::enumerate(factory, &space, options, stop)?;
    let counters: Arc<Progress> = handle.progress();
    let span: Option<Span> = progress::sweep_span(handle.total(), cfg.quiet);

    while let Some(result) = handle.next().await {
        report(&result);
        progress::report_sweep(
            span.as_ref(),
            counters.processed(),
            counters.present(),
            counters.errors(),
        );
    }
    let summary: EnumerationSummary = handle.finish().await;
    drop(span);

    print_summary(summary, start_time.elapsed().as_secs_f64(), cfg);
    Ok(())
}

fn report(result: &ProbeResult) {
    match result.status {
        ProbeStatus::Absent => debug!("{} absent", result.address),
        _ => mprint!(&format::probe_line(result)),
    }
}

fn print_summary(summary: EnumerationSummary, secs: f64, cfg: &Config) {
    if summary.cancelled {
        warn!("Sweep interrupted after {} addresses", summary.processed);
    }
    if summary.present == 0 && cfg.quiet == 0 {
        print::header("nothing found", cfg.quiet);
        print::no_results();
    }

    let present: ColoredString = format!("{} present", summary.present).bold().green();
    let errors: ColoredString = format!("{} errors", summary.errors).bold().red();
    let total_time: ColoredString = format!("{secs:.2}s").bold().yellow();
    let output: ColoredString = format!(
        "Sweep complete: {present}, {errors}, {} absent in {total_time}",
        summary.absent
    )
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
