use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use sqlx::{
    Row, Sqlite,
    migrate::MigrateDatabase,
    sqlite::{SqlitePool, SqlitePoolOptions},
};

use crate::error::{Error, Result};
use crate::flusher::ResultsSink;
use crate::models::Poll;

/// Shared poll store. The producer only reads the option catalog, the
/// counter only increments results, and the API owns the CRUD surface.
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(db_url: &str) -> Result<Self> {
        // Create database if it doesn't exist
        if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
            Sqlite::create_database(db_url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await?;

        Self::init_schema(&pool).await?;

        Ok(Self { pool })
    }

    pub async fn close(&self) {
        info!("Closing store connection...");
        self.pool.close().await;
    }

    async fn init_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS polls (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS poll_options (
                poll_id TEXT NOT NULL,
                text TEXT NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (poll_id, position),
                FOREIGN KEY (poll_id) REFERENCES polls(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS poll_results (
                poll_id TEXT NOT NULL,
                option TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (poll_id, option),
                FOREIGN KEY (poll_id) REFERENCES polls(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// One-shot catalog read at producer startup: every option of every
    /// poll, in poll order. Duplicates across polls are kept as-is.
    pub async fn load_options(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT text
            FROM poll_options
            ORDER BY poll_id, position
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| row.get::<String, _>("text"))
            .collect())
    }

    /// Adds `count` to the result row of every poll that carries `option`.
    /// Result rows are created on first increment.
    pub async fn increment_results(&self, option: &str, count: u64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO poll_results (poll_id, option, count)
            SELECT DISTINCT poll_id, ?1, ?2
            FROM poll_options
            WHERE text = ?1
            ON CONFLICT(poll_id, option) DO UPDATE SET count = count + excluded.count
            "#,
        )
        .bind(option)
        .bind(count as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn create_poll(&self, poll: &Poll) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO polls (id, title, created_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&poll.id)
        .bind(&poll.title)
        .bind(poll.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        for (i, text) in poll.options.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO poll_options (poll_id, text, position)
                VALUES (?, ?, ?)
                "#,
            )
            .bind(&poll.id)
            .bind(text)
            .bind(i as i64)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    pub async fn get_poll(&self, poll_id: &str) -> Result<Poll> {
        let row = sqlx::query(
            r#"
            SELECT id, title, created_at
            FROM polls
            WHERE id = ?
            "#,
        )
        .bind(poll_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::PollNotFound(poll_id.to_string()))?;

        let id = row.get::<String, _>("id");
        let title = row.get::<String, _>("title");
        let created_at_str = row.get::<String, _>("created_at");

        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map_err(|e| Error::Malformed(format!("bad created_at on poll {}: {}", id, e)))?
            .with_timezone(&Utc);

        let options = sqlx::query(
            r#"
            SELECT text
            FROM poll_options
            WHERE poll_id = ?
            ORDER BY position
            "#,
        )
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| row.get::<String, _>("text"))
        .collect();

        let results = sqlx::query(
            r#"
            SELECT option, count
            FROM poll_results
            WHERE poll_id = ?
            "#,
        )
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| (row.get::<String, _>("option"), row.get::<i64, _>("count")))
        .collect();

        Ok(Poll {
            id,
            title,
            options,
            results,
            created_at,
        })
    }

    pub async fn list_polls(&self) -> Result<Vec<Poll>> {
        let rows = sqlx::query(
            r#"
            SELECT id
            FROM polls
            ORDER BY created_at DESC, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut polls = Vec::with_capacity(rows.len());
        for row in rows {
            polls.push(self.get_poll(&row.get::<String, _>("id")).await?);
        }
        Ok(polls)
    }

    pub async fn delete_poll(&self, poll_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM poll_results WHERE poll_id = ?")
            .bind(poll_id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM poll_options WHERE poll_id = ?")
            .bind(poll_id)
            .execute(&self.pool)
            .await?;

        let deleted = sqlx::query("DELETE FROM polls WHERE id = ?")
            .bind(poll_id)
            .execute(&self.pool)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(Error::PollNotFound(poll_id.to_string()));
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn connect_in_memory() -> Store {
        // a single connection keeps every query on the same in-memory db
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        Store::init_schema(&pool).await.unwrap();
        Store { pool }
    }
}

#[async_trait]
impl ResultsSink for Store {
    async fn increment_results(&self, option: &str, count: u64) -> Result<()> {
        Store::increment_results(self, option, count).await
    }
}
