use std::sync::Arc;

use log::error;

use ballotstream::Result;
use ballotstream::broker::VoteSubscriber;
use ballotstream::config::Config;
use ballotstream::shutdown::{self, Shutdown};
use ballotstream::store::Store;
use ballotstream::tally::Tally;
use ballotstream::{aggregator, flusher};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();

    if let Err(e) = run().await {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = Config::from_env()?;

    let store = Arc::new(Store::connect(&config.database_url).await?);
    let subscriber = VoteSubscriber::subscribe(&config.broker_url, &config.consumer_group).await?;

    let tally = Arc::new(Tally::new());
    let shutdown = Shutdown::new();
    tokio::spawn(shutdown::listen(shutdown.clone()));

    let flusher = tokio::spawn(flusher::run(
        Arc::clone(&tally),
        Arc::clone(&store),
        config.flush_interval,
        shutdown.token(),
    ));

    aggregator::run(subscriber, Arc::clone(&tally), shutdown.token()).await;

    // the flusher commits remaining counts before it exits
    let _ = flusher.await;
    store.close().await;
    Ok(())
}
