use std::sync::Arc;

use log::error;

use ballotstream::Result;
use ballotstream::api;
use ballotstream::config::Config;
use ballotstream::shutdown::{self, Shutdown};
use ballotstream::store::Store;

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

    let shutdown = Shutdown::new();
    tokio::spawn(shutdown::listen(shutdown.clone()));

    api::serve(Arc::clone(&store), &config.api_addr, shutdown.token()).await?;

    store.close().await;
    Ok(())
}
