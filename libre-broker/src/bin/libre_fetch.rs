//! `libre-fetch` entry point.
//!
//! Prints one JSON line per target to stdout; logs go to stderr.

use std::sync::Arc;

use libre_broker::cli::{self, Invocation};
use libre_broker::telemetry::{init_tracing, DEFAULT_FILTER};
use libre_broker::{
    Broker, ChannelRegistry, FileStateStore, GithubCommitSource, HttpTransport, VersionGuard,
    VideoServices,
};
use libre_core::{LibreConfig, LibreError, SystemClock};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), LibreError> {
    init_tracing(DEFAULT_FILTER);

    let invocation = Invocation::parse(std::env::args().skip(1))?;
    let config = LibreConfig::load()?;
    let broker_config = config.broker_config();
    let transport = HttpTransport::from_config(&broker_config)?;

    if let Some(upstream) = &config.upstream {
        let guard = VersionGuard::new(
            Arc::new(GithubCommitSource::new(&transport, upstream)),
            Arc::new(FileStateStore::new(&config.state_path)),
            upstream.version_key.clone(),
        );
        let check = guard.check().await;
        info!(outcome = ?check, "Upstream version checked");
    }

    let channels = ChannelRegistry::new();
    let channel = channels.channel(&broker_config.channel_name, broker_config.channel_capacity);
    let broker = Broker::new(
        broker_config,
        Arc::new(transport),
        channel,
        Arc::new(SystemClock),
    )?;
    broker.spawn_sweeper();

    let services = VideoServices::from_config(broker.clone(), &config);
    for target in &invocation.targets {
        let result = cli::lookup(&services, invocation.command, target).await;
        println!("{}", cli::render(invocation.command, target, result));
    }

    let stats = broker.stats();
    info!(
        cache_misses = stats.cache.misses,
        cache_hits = stats.cache.hits,
        tokens_remaining = stats.tokens_remaining,
        "Done"
    );
    broker.shutdown();
    Ok(())
}
