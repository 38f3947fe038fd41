use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use dknw_common::config::Config;
use dknw_common::model::Address;
use dknw_core::retry::RetryPolicy;
use dknw_core::transfer;
use dknw_core::transport::{ClientFactory, TerminalClientFactory};

use crate::commands::ConnectionArgs;
use crate::terminal::{format, print};

pub async fn download(
    connection: ConnectionArgs,
    address: Address,
    dest: &Path,
    retries: u32,
    cfg: &Config,
) -> anyhow::Result<()> {
    let factory: Arc<TerminalClientFactory> = connection.factory(cfg)?;
    let factory: &dyn ClientFactory = factory.as_ref();

    print::header(&format!("downloading {address}"), cfg.quiet);
    let written: u64 = RetryPolicy::default()
        .with_attempts(retries.saturating_add(1))
        .run(move || transfer::download(factory, address, dest))
        .await
        .with_context(|| format!("downloading {address} from {}", connection.host))?;

    if cfg.quiet == 0 {
        print::aligned_line("Written", format::size(written));
    }
    Ok(())
}
