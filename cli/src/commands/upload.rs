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

pub async fn upload(
    connection: ConnectionArgs,
    src: &Path,
    address: Address,
    retries: u32,
    cfg: &Config,
) -> anyhow::Result<()> {
    let factory: Arc<TerminalClientFactory> = connection.factory(cfg)?;
    let factory: &dyn ClientFactory = factory.as_ref();

    print::header(&format!("uploading to {address}"), cfg.quiet);
    let accepted: u64 = RetryPolicy::default()
        .with_attempts(retries.saturating_add(1))
        .run(move || transfer::upload(factory, src, address))
        .await
        .with_context(|| format!("uploading {} to {address}", src.display()))?;

    if cfg.quiet == 0 {
        print::aligned_line("Accepted", format::size(accepted));
    }
    Ok(())
}
