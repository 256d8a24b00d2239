// src/database.rs

use crate::{error::StoreError, models::StoredMessage};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tokio::sync::Mutex;
use tracing::info;

/// Durable storage for private messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn persist(
        &self,
        sender: &str,
        recipient: &str,
        body: &str,
    ) -> Result<StoredMessage, StoreError>;

    /// Unread messages addressed to `recipient`, oldest first.
    async fn unread_for(&self, recipient: &str) -> Result<Vec<StoredMessage>, StoreError>;

    /// Sets `is_read` on the given ids and returns how many rows changed.
    async fn mark_read(&self, ids: &[i64]) -> Result<u64, StoreError>;

    /// One page of the conversation between `a` and `b` in chronological order.
    /// Page 1 holds the most recent messages.
    async fn conversation(
        &self,
        a: &str,
        b: &str,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<StoredMessage>, StoreError>;

    async fn conversation_count(&self, a: &str, b: &str) -> Result<i64, StoreError>;
}

/// Rows to skip before `page`. Out-of-range pages land past the end instead of overflowing.
fn page_offset(page: i64, page_size: i64) -> i64 {
    page.saturating_sub(1)
        .max(0)
        .saturating_mul(page_size.max(0))
}

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    /// Connects and creates the `private_messages` table if it doesn't exist.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS private_messages (
                id BIGSERIAL PRIMARY KEY,
                sender TEXT NOT NULL,
                recipient TEXT NOT NULL,
                message TEXT NOT NULL,
                is_read BOOLEAN NOT NULL DEFAULT FALSE,
                timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS private_messages_recipient_unread
                ON private_messages (recipient) WHERE NOT is_read",
        )
        .execute(&pool)
        .await?;

        info!("PostgreSQL message store ready.");
        Ok(Self { pool })
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn persist(
        &self,
        sender: &str,
        recipient: &str,
        body: &str,
    ) -> Result<StoredMessage, StoreError> {
        let stored = sqlx::query_as::<_, StoredMessage>(
            "INSERT INTO private_messages (sender, recipient, message)
             VALUES ($1, $2, $3)
             RETURNING id, sender, recipient, message, is_read, timestamp",
        )
        .bind(sender)
        .bind(recipient)
        .bind(body)
        .fetch_one(&self.pool)
        .await?;
        Ok(stored)
    }

    async fn unread_for(&self, recipient: &str) -> Result<Vec<StoredMessage>, StoreError> {
        let rows = sqlx::query_as::<_, StoredMessage>(
            "SELECT id, sender, recipient, message, is_read, timestamp
             FROM private_messages
             WHERE recipient = $1 AND NOT is_read
             ORDER BY timestamp ASC, id ASC",
        )
        .bind(recipient)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn mark_read(&self, ids: &[i64]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("UPDATE private_messages SET is_read = TRUE WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn conversation(
        &self,
        a: &str,
        b: &str,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let offset = page_offset(page, page_size);
        let mut rows = sqlx::query_as::<_, StoredMessage>(
            "SELECT id, sender, recipient, message, is_read, timestamp
             FROM private_messages
             WHERE (sender = $1 AND recipient = $2) OR (sender = $2 AND recipient = $1)
             ORDER BY timestamp DESC, id DESC
             LIMIT $3 OFFSET $4",
        )
        .bind(a)
        .bind(b)
        .bind(page_size)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        // Reverse to get chronological order
        rows.reverse();
        Ok(rows)
    }

    async fn conversation_count(&self, a: &str, b: &str) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM private_messages
             WHERE (sender = $1 AND recipient = $2) OR (sender = $2 AND recipient = $1)",
        )
        .bind(a)
        .bind(b)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

/// Process-local store used when no database is configured. Lost on restart.
#[derive(Default)]
pub struct MemoryMessageStore {
    messages: Mutex<Vec<StoredMessage>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<StoredMessage> {
        self.messages.lock().await.clone()
    }
}

fn between(message: &StoredMessage, a: &str, b: &str) -> bool {
    (message.sender == a && message.recipient == b)
        || (message.sender == b && message.recipient == a)
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn persist(
        &self,
        sender: &str,
        recipient: &str,
        body: &str,
    ) -> Result<StoredMessage, StoreError> {
        let mut messages = self.messages.lock().await;
        let stored = StoredMessage {
            id: messages.len() as i64 + 1,
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            message: body.to_string(),
            is_read: false,
            timestamp: Utc::now(),
        };
        messages.push(stored.clone());
        Ok(stored)
    }

    async fn unread_for(&self, recipient: &str) -> Result<Vec<StoredMessage>, StoreError> {
        let messages = self.messages.lock().await;
        Ok(messages
            .iter()
            .filter(|m| m.recipient == recipient && !m.is_read)
            .cloned()
            .collect())
    }

    async fn mark_read(&self, ids: &[i64]) -> Result<u64, StoreError> {
        let mut messages = self.messages.lock().await;
        let mut updated = 0;
        for message in messages.iter_mut().filter(|m| ids.contains(&m.id)) {
            message.is_read = true;
            updated += 1;
        }
        Ok(updated)
    }

    async fn conversation(
        &self,
        a: &str,
        b: &str,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let messages = self.messages.lock().await;
        let offset = page_offset(page, page_size) as usize;
        let mut rows: Vec<StoredMessage> = messages
            .iter()
            .rev()
            .filter(|m| between(m, a, b))
            .skip(offset)
            .take(page_size.max(0) as usize)
            .cloned()
            .collect();
        rows.reverse();
        Ok(rows)
    }

    async fn conversation_count(&self, a: &str, b: &str) -> Result<i64, StoreError> {
        let messages = self.messages.lock().await;
        Ok(messages.iter().filter(|m| between(m, a, b)).count() as i64)
    }
}
