//! Broker boundary over Redis Streams: the producer side appends votes to
//! the `votes` stream, the consumer side reads them through a consumer
//! group so multiple counter instances compete for messages.

use std::collections::HashMap;

use async_trait::async_trait;
use log::info;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Client};
use uuid::Uuid;

use crate::error::Result;
use crate::publisher::VoteSink;

pub const VOTES_TOPIC: &str = "votes";

// Stream entries carry the option string under this single field; there is
// no other framing or metadata on the wire.
const VOTE_FIELD: &str = "vote";

const READ_BLOCK_MS: usize = 5_000;
const READ_COUNT: usize = 64;

async fn connect(broker_url: &str) -> Result<ConnectionManager> {
    let client = Client::open(broker_url)?;
    Ok(client.get_connection_manager().await?)
}

pub struct VotePublisher {
    conn: ConnectionManager,
}

impl VotePublisher {
    pub async fn connect(broker_url: &str) -> Result<Self> {
        let conn = connect(broker_url).await?;
        info!("Connected to broker as vote publisher");
        Ok(Self { conn })
    }
}

#[async_trait]
impl VoteSink for VotePublisher {
    async fn publish(&mut self, vote: &str) -> Result<()> {
        let _: String = self.conn.xadd(VOTES_TOPIC, "*", &[(VOTE_FIELD, vote)]).await?;
        Ok(())
    }

    async fn stop(&mut self) {
        // the connection manager has no explicit teardown; dropping the last
        // handle closes the connection
    }
}

#[derive(Debug)]
pub struct VoteEntry {
    pub id: String,
    pub vote: Option<String>,
}

pub struct VoteSubscriber {
    conn: ConnectionManager,
    group: String,
    consumer: String,
}

impl VoteSubscriber {
    pub async fn subscribe(broker_url: &str, group: &str) -> Result<Self> {
        let mut conn = connect(broker_url).await?;

        // MKSTREAM lets the counter start before the first vote is published
        let created: redis::RedisResult<String> = conn
            .xgroup_create_mkstream(VOTES_TOPIC, group, "$")
            .await;
        if let Err(e) = created {
            if e.code() != Some("BUSYGROUP") {
                return Err(e.into());
            }
        }

        let consumer = format!("{}-{}", group, Uuid::new_v4());
        info!("Subscribed to {} as {}/{}", VOTES_TOPIC, group, consumer);
        Ok(Self {
            conn,
            group: group.to_string(),
            consumer,
        })
    }

    /// Reads the next batch of undelivered votes for this consumer. Blocks
    /// up to a few seconds and returns an empty batch on timeout.
    pub async fn read_batch(&mut self) -> Result<Vec<VoteEntry>> {
        let opts = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .block(READ_BLOCK_MS)
            .count(READ_COUNT);
        let reply: StreamReadReply = self
            .conn
            .xread_options(&[VOTES_TOPIC], &[">"], &opts)
            .await?;

        let mut batch = Vec::new();
        for key in reply.keys {
            for entry in key.ids {
                batch.push(VoteEntry {
                    vote: vote_from_entry(&entry.map),
                    id: entry.id,
                });
            }
        }
        Ok(batch)
    }

    pub async fn ack(&mut self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let _: u64 = self.conn.xack(VOTES_TOPIC, &self.group, ids).await?;
        Ok(())
    }
}

fn vote_from_entry(map: &HashMap<String, redis::Value>) -> Option<String> {
    map.get(VOTE_FIELD)
        .and_then(|value| redis::from_redis_value::<String>(value).ok())
}
