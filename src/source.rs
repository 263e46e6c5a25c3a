//! Where the dashboard gets its table: the persisted CSV, rebuilt on demand.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::builder::{persist_table, DashboardBuilder};
use crate::calendar::{market_now, MARKET_TZ};
use crate::table::{read_table, DriverTable, TableError};

pub trait DriverTableSource: Send + Sync + 'static {
    fn load(&self) -> DriverTable;
    /// Drops whatever is cached and produces a fresh table.
    fn force_refresh(&self) -> DriverTable;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCacheConfig {
    /// How long a loaded table is served from memory before the file is re-read.
    pub ttl_secs: i64,
    /// Files older than this are rebuilt on load; `None` never rebuilds for age.
    pub max_file_age_secs: Option<i64>,
}

impl Default for TableCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_file_age_secs: Some(3600),
        }
    }
}

struct CachedTable {
    table: DriverTable,
    loaded_at: DateTime<Utc>,
}

pub struct CachedTableSource {
    builder: Arc<DashboardBuilder>,
    path: PathBuf,
    cfg: TableCacheConfig,
    cached: Mutex<Option<CachedTable>>,
}

impl CachedTableSource {
    pub fn new(builder: Arc<DashboardBuilder>, path: impl Into<PathBuf>, cfg: TableCacheConfig) -> Self {
        Self {
            builder,
            path: path.into(),
            cfg,
            cached: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_at(&self, now: DateTime<Utc>) -> DriverTable {
        let mut cached = self.cached.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(entry) = cached.as_ref() {
            let age = now.signed_duration_since(entry.loaded_at).num_seconds();
            if age < self.cfg.ttl_secs {
                debug!(
                    component = "table_source",
                    event = "table.load.cache_hit",
                    age_secs = age
                );
                return entry.table.clone();
            }
        }

        let table = self.read_or_rebuild(now);
        *cached = Some(CachedTable {
            table: table.clone(),
            loaded_at: now,
        });
        table
    }

    pub fn force_refresh_at(&self, now: DateTime<Utc>) -> DriverTable {
        let mut cached = self.cached.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *cached = None;
        info!(
            component = "table_source",
            event = "table.refresh.forced",
            path = %self.path.display()
        );

        let table = self.rebuild(now, "forced");
        *cached = Some(CachedTable {
            table: table.clone(),
            loaded_at: now,
        });
        table
    }

    fn read_or_rebuild(&self, now: DateTime<Utc>) -> DriverTable {
        match read_table(&self.path) {
            Ok(table) if self.is_stale(now) => {
                debug!(
                    component = "table_source",
                    event = "table.load.stale",
                    rows = table.rows.len()
                );
                self.rebuild(now, "stale")
            }
            Ok(table) => {
                debug!(
                    component = "table_source",
                    event = "table.load.file",
                    rows = table.rows.len()
                );
                table
            }
            Err(TableError::Io(err)) if err.kind() == ErrorKind::NotFound => self.rebuild(now, "missing"),
            Err(err) => {
                warn!(
                    component = "table_source",
                    event = "table.load.error",
                    path = %self.path.display(),
                    error = %err
                );
                self.rebuild(now, "unreadable")
            }
        }
    }

    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        let Some(max_age) = self.cfg.max_file_age_secs else {
            return false;
        };
        let modified = match fs::metadata(&self.path).and_then(|metadata| metadata.modified()) {
            Ok(modified) => DateTime::<Utc>::from(modified),
            Err(_) => return true,
        };
        now.signed_duration_since(modified).num_seconds() >= max_age
    }

    fn rebuild(&self, now: DateTime<Utc>, reason: &'static str) -> DriverTable {
        info!(
            component = "table_source",
            event = "table.load.rebuild",
            reason,
            path = %self.path.display()
        );
        let table = self
            .builder
            .build_stamped(now.with_timezone(&MARKET_TZ), market_now);
        // Served even when the write fails; persist_table has already logged it.
        let _ = persist_table(&self.path, &table);
        table
    }
}

impl DriverTableSource for CachedTableSource {
    fn load(&self) -> DriverTable {
        self.load_at(Utc::now())
    }

    fn force_refresh(&self) -> DriverTable {
        self.force_refresh_at(Utc::now())
    }
}

/// Fixed table for tests and offline previews; refreshes are only counted.
#[derive(Clone, Default)]
pub struct InMemoryTableSource {
    inner: Arc<RwLock<DriverTable>>,
    refreshes: Arc<AtomicUsize>,
}

impl InMemoryTableSource {
    pub fn new(table: DriverTable) -> Self {
        Self {
            inner: Arc::new(RwLock::new(table)),
            refreshes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn replace_table(&self, table: DriverTable) {
        let mut guard = self
            .inner
            .write()
            .expect("in-memory table lock should not be poisoned");
        *guard = table;
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

impl DriverTableSource for InMemoryTableSource {
    fn load(&self) -> DriverTable {
        self.inner
            .read()
            .expect("in-memory table lock should not be poisoned")
            .clone()
    }

    fn force_refresh(&self) -> DriverTable {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        self.load()
    }
}
