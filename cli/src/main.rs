mod commands;
mod terminal;

use std::process::ExitCode;

use commands::search::SearchArgs;
use commands::{CommandLine, Commands, download, scan, search, upload};
use dknw_common::config::{Config, timeout_from_secs};
use dknw_common::model::Address;
use dknw_common::signal::StopSignal;
use dknw_core::scanner::ScanOptions;
use terminal::{logging, print};
use tracing::{error, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let commands = CommandLine::parse_args();

    if let Err(e) = logging::init(commands.verbose, commands.quiet) {
        eprintln!("could not set up logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(commands).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(commands: CommandLine) -> anyhow::Result<()> {
    let cfg = Config {
        quiet: commands.quiet,
        no_banner: commands.no_banner,
        timeout: timeout_from_secs(commands.timeout)?,
    };
    print::banner(cfg.no_banner, cfg.quiet);

    let stop: StopSignal = StopSignal::new();
    stop_on_ctrl_c(stop.clone());

    match commands.command {
        Commands::Scan {
            target,
            port,
            workers,
            no_identify,
        } => {
            let options = ScanOptions {
                port,
                timeout: cfg.timeout,
                workers,
                identify: !no_identify,
            };
            scan::scan(target, options, &cfg, stop).await
        }
        Commands::Search {
            connection,
            dest,
            workers,
            dir_min,
            dir_max,
            file_min,
            file_max,
            common,
            attempts,
        } => {
            let args = SearchArgs {
                connection,
                dest,
                workers,
                dir_min,
                dir_max,
                file_min,
                file_max,
                common,
                attempts,
            };
            search::search(args, &cfg, stop).await
        }
        Commands::Download {
            connection,
            directory,
            file,
            dest,
            retries,
        } => {
            let address = Address::new(directory, file);
            download::download(connection, address, &dest, retries, &cfg).await
        }
        Commands::Upload {
            connection,
            src,
            directory,
            file,
            retries,
        } => {
            let address = Address::new(directory, file);
            upload::upload(connection, &src, address, retries, &cfg).await
        }
    }
}

fn stop_on_ctrl_c(stop: StopSignal) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, winding down");
            stop.stop();
        }
    });
}
