//! SQLite-backed record store and capture progress store.
//!
//! One connection is shared behind a mutex. Every write is a single statement scoped to one
//! record key (or one progress key), so no transaction spans more than one item.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use rusqlite::Connection;

pub mod columns;
mod progress;
mod records;
mod schema;

pub use records::RecordUpdate;

pub struct Store {
    connection: Mutex<Connection>,
    path: PathBuf,
}

impl Store {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            crate::util::ensure_directory(parent)?;
        }

        let connection = Connection::open(db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        schema::configure_connection(&connection)?;
        schema::ensure_schema(&connection)?;

        Ok(Self {
            connection: Mutex::new(connection),
            path: db_path.to_path_buf(),
        })
    }

    /// Opens an existing database without creating it; used by read-only surfaces.
    pub fn open_existing(db_path: &Path) -> Result<Self> {
        if !db_path.exists() {
            return Err(anyhow!("database file missing: {}", db_path.display()));
        }
        Self::open(db_path)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let connection = Connection::open_in_memory().context("failed to open in-memory db")?;
        schema::ensure_schema(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.connection
            .lock()
            .map_err(|_| anyhow!("record store connection lock poisoned"))
    }

    #[cfg(test)]
    pub fn pokemon_columns(&self) -> Result<Vec<String>> {
        let connection = self.lock()?;
        schema::table_columns(&connection, "pokemon")
    }
}
