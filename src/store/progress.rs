use std::str::FromStr;

use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, params};

use super::Store;

impl Store {
    pub fn get_state(&self, key: &str) -> Result<Option<String>> {
        let connection = self.lock()?;
        let value = connection
            .query_row(
                "SELECT value FROM capture_state WHERE key = ?1",
                [key],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()
            .with_context(|| format!("failed to read capture state {key}"))?;

        Ok(value.flatten())
    }

    /// Reads a state value and parses it, falling back to `default` when unset or unparsable.
    pub fn get_state_or<T: FromStr>(&self, key: &str, default: T) -> Result<T> {
        Ok(self
            .get_state(key)?
            .and_then(|raw| raw.parse::<T>().ok())
            .unwrap_or(default))
    }

    pub fn set_state(&self, key: &str, value: &str) -> Result<()> {
        let connection = self.lock()?;
        connection
            .execute(
                "
                INSERT INTO capture_state(key, value) VALUES(?1, ?2)
                ON CONFLICT(key) DO UPDATE SET
                  value=excluded.value,
                  updated_at=CURRENT_TIMESTAMP
                ",
                params![key, value],
            )
            .with_context(|| format!("failed to write capture state {key}"))?;
        Ok(())
    }
}
