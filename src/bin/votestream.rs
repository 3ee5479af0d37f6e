use log::{error, info, warn};
use tokio::sync::{mpsc, oneshot};

use ballotstream::Result;
use ballotstream::broker::VotePublisher;
use ballotstream::config::Config;
use ballotstream::publisher;
use ballotstream::shutdown::{self, Shutdown};
use ballotstream::store::Store;
use ballotstream::stream::StreamFilter;

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

    let store = Store::connect(&config.database_url).await?;
    let options = store.load_options().await?;
    info!("Loaded {} tracked option(s)", options.len());
    if options.is_empty() {
        warn!("no polls in the store; the filter will emit nothing");
    }

    let sink = VotePublisher::connect(&config.broker_url).await?;
    let filter = StreamFilter::new(config.stream_url, options, config.reconnect_interval)?;

    let shutdown = Shutdown::new();
    tokio::spawn(shutdown::listen(shutdown.clone()));

    let (votes_tx, votes_rx) = mpsc::channel(64);
    let (done_tx, done_rx) = oneshot::channel();
    tokio::spawn(publisher::run(votes_rx, sink, done_tx));

    // runs until shutdown; dropping the sender on return closes the channel
    // and lets the publisher drain
    filter.run(votes_tx, shutdown.token()).await;

    let _ = done_rx.await;
    store.close().await;
    Ok(())
}
