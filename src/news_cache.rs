//! Time-stamped key/value store for serialized news citations.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::table::write_atomic;

const MAX_TOPIC_CHARS_IN_FILE_NAME: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NewsCacheKey {
    pub topic: String,
    pub lookback_days: u32,
}

impl NewsCacheKey {
    pub fn new(topic: impl Into<String>, lookback_days: u32) -> Self {
        Self {
            topic: topic.into(),
            lookback_days,
        }
    }

    /// `news_{topic}_{hash}_{n}d.cache`; the hash keeps truncated topics distinct.
    pub fn file_name(&self) -> String {
        let sanitized: String = self
            .topic
            .chars()
            .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
            .take(MAX_TOPIC_CHARS_IN_FILE_NAME)
            .collect();

        let mut hasher = Sha256::new();
        hasher.update(self.topic.as_bytes());
        hasher.update(self.lookback_days.to_le_bytes());
        let digest = hex::encode(hasher.finalize());

        format!(
            "news_{sanitized}_{}_{}d.cache",
            &digest[..8],
            self.lookback_days
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsCacheEntry {
    pub value: String,
    pub stored_at: DateTime<Utc>,
}

impl NewsCacheEntry {
    /// An entry stored after `now` (clock skew, future mtime) is never fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>, freshness: chrono::Duration) -> bool {
        let age = now.signed_duration_since(self.stored_at);
        age >= chrono::Duration::zero() && age < freshness
    }
}

#[derive(Debug, Error)]
pub enum NewsCacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache write failed: {0}")]
    Write(String),
    #[cfg(feature = "sqlite-cache")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("cache lock poisoned")]
    Poisoned,
}

pub trait NewsCache: Send + Sync {
    fn get(&self, key: &NewsCacheKey) -> Result<Option<NewsCacheEntry>, NewsCacheError>;
    fn put(
        &self,
        key: &NewsCacheKey,
        value: &str,
        stored_at: DateTime<Utc>,
    ) -> Result<(), NewsCacheError>;
    fn clear(&self) -> Result<(), NewsCacheError>;
}

/// One file per key under `dir`; the file mtime is the freshness clock.
#[derive(Debug, Clone)]
pub struct FileNewsCache {
    dir: PathBuf,
}

impl FileNewsCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &NewsCacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }
}

impl NewsCache for FileNewsCache {
    fn get(&self, key: &NewsCacheKey) -> Result<Option<NewsCacheEntry>, NewsCacheError> {
        let path = self.path_for(key);
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let stored_at: DateTime<Utc> = metadata.modified()?.into();
        let value = fs::read_to_string(&path)?;
        Ok(Some(NewsCacheEntry { value, stored_at }))
    }

    fn put(
        &self,
        key: &NewsCacheKey,
        value: &str,
        _stored_at: DateTime<Utc>,
    ) -> Result<(), NewsCacheError> {
        fs::create_dir_all(&self.dir)?;
        write_atomic(&self.path_for(key), value.as_bytes())
            .map_err(|err| NewsCacheError::Write(err.to_string()))
    }

    fn clear(&self) -> Result<(), NewsCacheError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        for entry in entries {
            let path = entry?.path();
            let is_cache_file = path
                .file_name()
                .map(|name| name.to_string_lossy())
                .is_some_and(|name| name.starts_with("news_") && name.ends_with(".cache"));
            if is_cache_file {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryNewsCache {
    inner: Arc<RwLock<HashMap<NewsCacheKey, NewsCacheEntry>>>,
}

impl InMemoryNewsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NewsCache for InMemoryNewsCache {
    fn get(&self, key: &NewsCacheKey) -> Result<Option<NewsCacheEntry>, NewsCacheError> {
        let guard = self.inner.read().map_err(|_| NewsCacheError::Poisoned)?;
        Ok(guard.get(key).cloned())
    }

    fn put(
        &self,
        key: &NewsCacheKey,
        value: &str,
        stored_at: DateTime<Utc>,
    ) -> Result<(), NewsCacheError> {
        let mut guard = self.inner.write().map_err(|_| NewsCacheError::Poisoned)?;
        guard.insert(
            key.clone(),
            NewsCacheEntry {
                value: value.to_string(),
                stored_at,
            },
        );
        Ok(())
    }

    fn clear(&self) -> Result<(), NewsCacheError> {
        self.inner
            .write()
            .map_err(|_| NewsCacheError::Poisoned)?
            .clear();
        Ok(())
    }
}

#[cfg(feature = "sqlite-cache")]
pub use sqlite::SqliteNewsCache;

#[cfg(feature = "sqlite-cache")]
mod sqlite {
    use std::path::Path;
    use std::sync::Mutex;

    use chrono::{DateTime, TimeZone, Utc};
    use rusqlite::{params, Connection, OptionalExtension};

    use super::{NewsCache, NewsCacheEntry, NewsCacheError, NewsCacheKey};

    /// Shared cache for deployments where the batch job and the server run apart.
    pub struct SqliteNewsCache {
        conn: Mutex<Connection>,
    }

    impl SqliteNewsCache {
        pub fn open(path: &Path) -> Result<Self, NewsCacheError> {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Self::from_connection(Connection::open(path)?)
        }

        pub fn open_in_memory() -> Result<Self, NewsCacheError> {
            Self::from_connection(Connection::open_in_memory()?)
        }

        fn from_connection(conn: Connection) -> Result<Self, NewsCacheError> {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS news_cache (
                    topic TEXT NOT NULL,
                    lookback_days INTEGER NOT NULL,
                    value TEXT NOT NULL,
                    stored_at_ms INTEGER NOT NULL,
                    PRIMARY KEY (topic, lookback_days)
                );",
            )?;
            Ok(Self {
                conn: Mutex::new(conn),
            })
        }
    }

    impl NewsCache for SqliteNewsCache {
        fn get(&self, key: &NewsCacheKey) -> Result<Option<NewsCacheEntry>, NewsCacheError> {
            let conn = self.conn.lock().map_err(|_| NewsCacheError::Poisoned)?;
            let row = conn
                .query_row(
                    "SELECT value, stored_at_ms FROM news_cache WHERE topic = ?1 AND lookback_days = ?2",
                    params![key.topic, key.lookback_days],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
                )
                .optional()?;

            Ok(row.and_then(|(value, stored_at_ms)| {
                let stored_at: DateTime<Utc> = Utc.timestamp_millis_opt(stored_at_ms).single()?;
                Some(NewsCacheEntry { value, stored_at })
            }))
        }

        fn put(
            &self,
            key: &NewsCacheKey,
            value: &str,
            stored_at: DateTime<Utc>,
        ) -> Result<(), NewsCacheError> {
            let conn = self.conn.lock().map_err(|_| NewsCacheError::Poisoned)?;
            conn.execute(
                "INSERT INTO news_cache (topic, lookback_days, value, stored_at_ms)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(topic, lookback_days)
                 DO UPDATE SET value = excluded.value, stored_at_ms = excluded.stored_at_ms",
                params![
                    key.topic,
                    key.lookback_days,
                    value,
                    stored_at.timestamp_millis()
                ],
            )?;
            Ok(())
        }

        fn clear(&self) -> Result<(), NewsCacheError> {
            let conn = self.conn.lock().map_err(|_| NewsCacheError::Poisoned)?;
            conn.execute("DELETE FROM news_cache", [])?;
            Ok(())
        }
    }
}
