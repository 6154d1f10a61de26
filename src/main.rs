//! sunmoon - resolve city names to coordinates and timezones
//!
//! Results are cached in `~/.sunmoon-cache.json` so later runs, including
//! offline ones, skip the network.

use std::io;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use sunmoon::cache::CacheStore;
use sunmoon::cli::{CacheCommand, Cli, Command, StartupConfig};
use sunmoon::commands;
use sunmoon::data::{NominatimGeocoder, OpenMeteoTimezone};
use sunmoon::logging;
use sunmoon::prepare::CityResolver;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = StartupConfig::from_cli(&cli)?;
    logging::init(&config.log);

    let store = CacheStore::new(config.cache);
    let mut stdout = io::stdout().lock();

    match &cli.command {
        Command::Resolve(args) => {
            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupted, stopping");
                    on_interrupt.cancel();
                }
            });

            let resolver = CityResolver::new(store, NominatimGeocoder::new(), OpenMeteoTimezone::new())
                .with_cancellation(cancel);
            let ctx = resolver.prepare(&args.city(), args.mode()).await?;
            commands::print_context(&ctx, &mut stdout)?;
        }
        Command::Cache {
            action: CacheCommand::List,
        } => {
            commands::list_entries(&store.load(), &mut stdout)?;
        }
        Command::Cache {
            action: CacheCommand::Clear { yes },
        } => {
            let mut stdin = io::stdin().lock();
            commands::clear_cache(&store, *yes, &mut stdin, &mut stdout)?;
        }
    }

    Ok(())
}
