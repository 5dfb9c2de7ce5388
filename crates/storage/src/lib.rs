pub mod audio;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use aura_core::VoiceQueryRecord;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

pub use audio::{AudioStore, AudioStoreError};

/// Append-only log of answered queries.
pub trait QueryLogRepository: Send + Sync {
    async fn record(&self, record: &VoiceQueryRecord) -> Result<()>;
    /// Newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<VoiceQueryRecord>>;
}

/// Short-lived cache of data-source answers keyed by a normalized lookup key.
pub trait LookupCache: Send + Sync {
    async fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<Value>>;
    async fn put(&self, key: &str, value: Value, expires_at: DateTime<Utc>) -> Result<()>;
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

#[derive(Debug, Clone)]
struct CachedValue {
    value: Value,
    expires_at: DateTime<Utc>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    queries: Arc<RwLock<Vec<VoiceQueryRecord>>>,
    cache: Arc<RwLock<HashMap<String, CachedValue>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QueryLogRepository for MemoryStore {
    async fn record(&self, record: &VoiceQueryRecord) -> Result<()> {
        self.queries.write().push(record.clone());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<VoiceQueryRecord>> {
        Ok(self.queries.read().iter().rev().take(limit).cloned().collect())
    }
}

impl LookupCache for MemoryStore {
    async fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<Value>> {
        Ok(self
            .cache
            .read()
            .get(key)
            .filter(|cached| cached.expires_at > now)
            .map(|cached| cached.value.clone()))
    }

    async fn put(&self, key: &str, value: Value, expires_at: DateTime<Utc>) -> Result<()> {
        self.cache
            .write()
            .insert(key.to_string(), CachedValue { value, expires_at });
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut removed = 0_u64;
        self.cache.write().retain(|_, cached| {
            let keep = cached.expires_at > now;
            if !keep {
                removed += 1;
            }
            keep
        });

        Ok(removed)
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .with_context(|| format!("failed connecting to sqlite at {}", database_url))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS voice_queries (
              query_id TEXT PRIMARY KEY,
              created_at TEXT NOT NULL,
              intent TEXT NOT NULL,
              recognized_text TEXT NOT NULL,
              reply_text TEXT NOT NULL,
              outcome TEXT,
              caller_lat REAL,
              caller_lon REAL,
              record_json TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS lookup_cache (
              cache_key TEXT PRIMARY KEY,
              value_json TEXT NOT NULL,
              expires_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl QueryLogRepository for SqliteStore {
    async fn record(&self, record: &VoiceQueryRecord) -> Result<()> {
        let record_json = serde_json::to_string(record)?;
        let result = &record.result;

        sqlx::query(
            r#"
            INSERT INTO voice_queries
              (query_id, created_at, intent, recognized_text, reply_text, outcome, caller_lat, caller_lon, record_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&result.query_id)
        .bind(record.created_at.to_rfc3339())
        .bind(result.intent.as_str())
        .bind(&result.recognized_text)
        .bind(&result.reply_text)
        .bind(result.outcome.as_ref().map(|outcome| outcome.variant_name()))
        .bind(record.caller_location.map(|location| location.lat))
        .bind(record.caller_location.map(|location| location.lon))
        .bind(record_json)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed recording query {}", result.query_id))?;

        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<VoiceQueryRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT record_json
            FROM voice_queries
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?1
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let json: String = row.get("record_json");
                serde_json::from_str(&json).context("corrupt query record")
            })
            .collect()
    }
}

impl LookupCache for SqliteStore {
    async fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<Value>> {
        let row = sqlx::query(
            r#"
            SELECT value_json
            FROM lookup_cache
            WHERE cache_key = ?1 AND expires_at > ?2
            "#,
        )
        .bind(key)
        .bind(now.to_rfc3339())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let json: String = row.get("value_json");
        Ok(serde_json::from_str(&json).ok())
    }

    async fn put(&self, key: &str, value: Value, expires_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO lookup_cache (cache_key, value_json, expires_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(cache_key) DO UPDATE SET
              value_json=excluded.value_json,
              expires_at=excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(serde_json::to_string(&value)?)
        .bind(expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM lookup_cache WHERE expires_at <= ?1")
            .bind(now.to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[derive(Clone)]
pub enum Store {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

impl Store {
    pub fn memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    pub async fn sqlite(database_url: &str) -> Result<Self> {
        let sqlite = SqliteStore::connect(database_url).await?;
        Ok(Self::Sqlite(sqlite))
    }

    pub fn backend(&self) -> &'static str {
        match self {
            Store::Memory(_) => "memory",
            Store::Sqlite(_) => "sqlite",
        }
    }
}

impl QueryLogRepository for Store {
    async fn record(&self, record: &VoiceQueryRecord) -> Result<()> {
        match self {
            Store::Memory(store) => store.record(record).await,
            Store::Sqlite(store) => store.record(record).await,
        }
    }

    async fn recent(&self, limit: usize) -> Result<Vec<VoiceQueryRecord>> {
        match self {
            Store::Memory(store) => store.recent(limit).await,
            Store::Sqlite(store) => store.recent(limit).await,
        }
    }
}

impl LookupCache for Store {
    async fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<Value>> {
        match self {
            Store::Memory(store) => store.get(key, now).await,
            Store::Sqlite(store) => store.get(key, now).await,
        }
    }

    async fn put(&self, key: &str, value: Value, expires_at: DateTime<Utc>) -> Result<()> {
        match self {
            Store::Memory(store) => store.put(key, value, expires_at).await,
            Store::Sqlite(store) => store.put(key, value, expires_at).await,
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        match self {
            Store::Memory(store) => store.purge_expired(now).await,
            Store::Sqlite(store) => store.purge_expired(now).await,
        }
    }
}
