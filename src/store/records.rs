use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;

use anyhow::{Context, Result, bail};
use rusqlite::types::Value as SqlValue;
use rusqlite::{OptionalExtension, Row, params, params_from_iter};
use serde_json::{Map, Value as JsonValue};

use super::Store;
use super::columns::{coerce_json, extracted_column, writable_column};
use crate::model::{
    CollectionStats, PendingRecord, Record, RecordFilter, RecordKey, RecordPage, RecordSummary,
    StoreCounts, TrainerCount,
};

const LIST_LIMIT_DEFAULT: u32 = 60;
const LIST_LIMIT_MAX: u32 = 200;

/// A partial set of column values addressed by natural key.
///
/// Only the columns present in the update are written; every other stored value survives.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordUpdate {
    key: RecordKey,
    values: BTreeMap<&'static str, SqlValue>,
}

impl RecordUpdate {
    pub fn new(key: RecordKey) -> Self {
        Self {
            key,
            values: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn set(&mut self, column: &str, value: impl Into<SqlValue>) -> Result<&mut Self> {
        let Some(spec) = writable_column(column) else {
            bail!("unknown or read-only pokemon column: {column}");
        };
        self.values.insert(spec.name, value.into());
        Ok(self)
    }

    pub fn set_text(&mut self, column: &str, value: impl Into<String>) -> Result<&mut Self> {
        self.set(column, SqlValue::Text(value.into()))
    }

    /// Merges extracted fields, keeping only known attribute columns with non-null values that
    /// fit the column type. Returns the keys that were dropped.
    pub fn merge_extracted(&mut self, fields: &Map<String, JsonValue>) -> Vec<String> {
        let mut dropped = Vec::new();
        for (name, value) in fields {
            if value.is_null() {
                continue;
            }
            let coerced = extracted_column(name)
                .and_then(|spec| coerce_json(spec.kind, value).map(|value| (spec.name, value)));
            match coerced {
                Some((column, value)) => {
                    self.values.insert(column, value);
                }
                None => dropped.push(name.clone()),
            }
        }
        dropped
    }

    fn upsert_sql(&self) -> String {
        let columns: Vec<&str> = self.values.keys().copied().collect();

        let mut sql = String::from("INSERT INTO pokemon(box_number, box_slot");
        for column in &columns {
            let _ = write!(sql, ", {column}");
        }
        sql.push_str(") VALUES(?1, ?2");
        for index in 0..columns.len() {
            let _ = write!(sql, ", ?{}", index + 3);
        }
        sql.push_str(") ON CONFLICT(box_number, box_slot) DO UPDATE SET ");
        if columns.is_empty() {
            sql.push_str("box_slot=excluded.box_slot");
        } else {
            let assignments: Vec<String> = columns
                .iter()
                .map(|column| format!("{column}=excluded.{column}"))
                .collect();
            sql.push_str(&assignments.join(", "));
        }
        sql.push_str(" RETURNING id");
        sql
    }
}

impl Store {
    /// Inserts or merges one record and returns its surrogate id.
    pub fn upsert_record(&self, update: &RecordUpdate) -> Result<i64> {
        let sql = update.upsert_sql();
        let mut values = Vec::with_capacity(update.values.len() + 2);
        values.push(SqlValue::Integer(i64::from(update.key.box_number)));
        values.push(SqlValue::Integer(i64::from(update.key.box_slot)));
        values.extend(update.values.values().cloned());

        let connection = self.lock()?;
        let mut statement = connection
            .prepare_cached(&sql)
            .context("failed to prepare pokemon upsert")?;
        let id = statement
            .query_row(params_from_iter(values.iter()), |row| row.get::<_, i64>(0))
            .with_context(|| format!("failed to upsert pokemon {}", update.key))?;

        Ok(id)
    }

    pub fn upsert_box(&self, box_number: u32, screenshot_path: &str) -> Result<()> {
        let connection = self.lock()?;
        connection
            .execute(
                "
                INSERT INTO boxes(box_number, screenshot_path) VALUES(?1, ?2)
                ON CONFLICT(box_number) DO UPDATE SET
                  screenshot_path=excluded.screenshot_path,
                  captured_at=CURRENT_TIMESTAMP
                ",
                params![box_number, screenshot_path],
            )
            .with_context(|| format!("failed to upsert box {box_number}"))?;
        Ok(())
    }

    #[cfg(test)]
    pub fn box_screenshot(&self, box_number: u32) -> Result<Option<String>> {
        let connection = self.lock()?;
        let path = connection
            .query_row(
                "SELECT screenshot_path FROM boxes WHERE box_number = ?1",
                [box_number],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(path.flatten())
    }

    pub fn record_by_key(&self, key: RecordKey) -> Result<Option<Record>> {
        let connection = self.lock()?;
        let record = connection
            .query_row(
                "SELECT * FROM pokemon WHERE box_number = ?1 AND box_slot = ?2",
                params![key.box_number, key.box_slot],
                record_from_row,
            )
            .optional()
            .with_context(|| format!("failed to load pokemon {key}"))?;
        Ok(record)
    }

    pub fn record_by_id(&self, id: i64) -> Result<Option<Record>> {
        let connection = self.lock()?;
        let record = connection
            .query_row("SELECT * FROM pokemon WHERE id = ?1", [id], record_from_row)
            .optional()
            .with_context(|| format!("failed to load pokemon id {id}"))?;
        Ok(record)
    }

    pub fn is_parsed(&self, key: RecordKey) -> Result<bool> {
        let connection = self.lock()?;
        let parsed_at = connection
            .query_row(
                "SELECT parsed_at FROM pokemon WHERE box_number = ?1 AND box_slot = ?2",
                params![key.box_number, key.box_slot],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(matches!(parsed_at, Some(Some(_))))
    }

    /// Records with a detail screenshot that have not been parsed yet, in key order.
    pub fn pending_records(&self) -> Result<Vec<PendingRecord>> {
        let connection = self.lock()?;
        let mut statement = connection.prepare(
            "
            SELECT box_number, box_slot, detail_screenshot_path, detail_screenshot2_path
            FROM pokemon
            WHERE detail_screenshot_path IS NOT NULL AND parsed_at IS NULL
            ORDER BY box_number ASC, box_slot ASC
            ",
        )?;

        let mut rows = statement.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(PendingRecord {
                key: RecordKey::new(row.get(0)?, row.get(1)?),
                detail_screenshot_path: row.get(2)?,
                detail_screenshot2_path: row.get(3)?,
            });
        }

        Ok(out)
    }

    pub fn parsed_keys(&self) -> Result<HashSet<RecordKey>> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare("SELECT box_number, box_slot FROM pokemon WHERE parsed_at IS NOT NULL")?;
        let keys = statement
            .query_map([], |row| Ok(RecordKey::new(row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(keys)
    }

    /// Second detail screenshots keyed by record, for enriching queue files written before
    /// the second screen was captured.
    pub fn secondary_screenshots(&self) -> Result<Vec<(RecordKey, String)>> {
        let connection = self.lock()?;
        let mut statement = connection.prepare(
            "
            SELECT box_number, box_slot, detail_screenshot2_path
            FROM pokemon
            WHERE detail_screenshot2_path IS NOT NULL
            ",
        )?;
        let rows = statement
            .query_map([], |row| {
                Ok((RecordKey::new(row.get(0)?, row.get(1)?), row.get(2)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Records with a box screenshot but no cropped sprite yet.
    pub fn records_missing_sprites(&self) -> Result<Vec<(RecordKey, String)>> {
        let connection = self.lock()?;
        let mut statement = connection.prepare(
            "
            SELECT box_number, box_slot, box_screenshot_path
            FROM pokemon
            WHERE box_screenshot_path IS NOT NULL AND sprite_path IS NULL
            ORDER BY box_number ASC, box_slot ASC
            ",
        )?;
        let rows = statement
            .query_map([], |row| {
                Ok((RecordKey::new(row.get(0)?, row.get(1)?), row.get(2)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn counts(&self) -> Result<StoreCounts> {
        let connection = self.lock()?;
        let count = |sql: &str| -> Result<i64> {
            connection
                .query_row(sql, [], |row| row.get(0))
                .with_context(|| format!("failed to run count query: {sql}"))
        };

        Ok(StoreCounts {
            total: count("SELECT COUNT(*) FROM pokemon")?,
            with_screenshot: count(
                "SELECT COUNT(*) FROM pokemon WHERE detail_screenshot_path IS NOT NULL",
            )?,
            parsed: count("SELECT COUNT(*) FROM pokemon WHERE parsed_at IS NOT NULL")?,
        })
    }

    /// Parsed records matching the filter, in key order, with the unpaginated total.
    pub fn list_records(&self, filter: &RecordFilter) -> Result<RecordPage> {
        let mut conditions = vec!["parsed_at IS NOT NULL".to_string()];
        let mut values: Vec<SqlValue> = Vec::new();

        if let Some(text) = filter.text.as_deref().filter(|text| !text.is_empty()) {
            let like = format!("%{text}%");
            conditions.push(
                "(species_name LIKE ? OR nickname LIKE ? OR original_trainer LIKE ?)".to_string(),
            );
            values.extend(std::iter::repeat_n(SqlValue::Text(like), 3));
        }

        if let Some(shiny) = filter.shiny {
            conditions.push("is_shiny = ?".to_string());
            values.push(SqlValue::Integer(i64::from(shiny)));
        }

        if let Some(trainer) = filter.trainer.as_deref().filter(|text| !text.is_empty()) {
            conditions.push("original_trainer LIKE ?".to_string());
            values.push(SqlValue::Text(format!("%{trainer}%")));
        }

        let where_clause = conditions.join(" AND ");
        let limit = match filter.limit {
            0 => LIST_LIMIT_DEFAULT,
            limit => limit.min(LIST_LIMIT_MAX),
        };

        let connection = self.lock()?;
        let total: i64 = connection
            .query_row(
                &format!("SELECT COUNT(*) FROM pokemon WHERE {where_clause}"),
                params_from_iter(values.iter()),
                |row| row.get(0),
            )
            .context("failed to count filtered pokemon")?;

        let mut page_values = values;
        page_values.push(SqlValue::Integer(i64::from(limit)));
        page_values.push(SqlValue::Integer(i64::from(filter.offset)));

        let mut statement = connection.prepare(&format!(
            "
            SELECT id, box_number, box_slot, species_name, dex_number, form_name,
                   nickname, level, nature, is_shiny, gender, original_trainer, trainer_id,
                   ball_type, detail_screenshot_path
            FROM pokemon
            WHERE {where_clause}
            ORDER BY box_number ASC, box_slot ASC
            LIMIT ? OFFSET ?
            "
        ))?;

        let items = statement
            .query_map(params_from_iter(page_values.iter()), |row| {
                Ok(RecordSummary {
                    id: row.get(0)?,
                    box_number: row.get(1)?,
                    box_slot: row.get(2)?,
                    species_name: row.get(3)?,
                    dex_number: row.get(4)?,
                    form_name: row.get(5)?,
                    nickname: row.get(6)?,
                    level: row.get(7)?,
                    nature: row.get(8)?,
                    is_shiny: row.get(9)?,
                    gender: row.get(10)?,
                    original_trainer: row.get(11)?,
                    trainer_id: row.get(12)?,
                    ball_type: row.get(13)?,
                    detail_screenshot_path: row.get(14)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(RecordPage { total, items })
    }

    pub fn collection_stats(&self) -> Result<CollectionStats> {
        let connection = self.lock()?;
        let total: i64 = connection.query_row(
            "SELECT COUNT(*) FROM pokemon WHERE parsed_at IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        let shiny: i64 = connection.query_row(
            "SELECT COUNT(*) FROM pokemon WHERE is_shiny = 1",
            [],
            |row| row.get(0),
        )?;

        let mut statement = connection.prepare(
            "
            SELECT original_trainer, COUNT(*) AS n
            FROM pokemon
            WHERE parsed_at IS NOT NULL AND original_trainer IS NOT NULL
            GROUP BY original_trainer
            ORDER BY n DESC, original_trainer ASC
            LIMIT 10
            ",
        )?;
        let top_trainers = statement
            .query_map([], |row| {
                Ok(TrainerCount {
                    original_trainer: row.get(0)?,
                    n: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(CollectionStats {
            total,
            shiny,
            top_trainers,
        })
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<Record> {
    Ok(Record {
        id: row.get("id")?,
        box_number: row.get("box_number")?,
        box_slot: row.get("box_slot")?,
        species_name: row.get("species_name")?,
        dex_number: row.get("dex_number")?,
        form_name: row.get("form_name")?,
        nickname: row.get("nickname")?,
        level: row.get("level")?,
        nature: row.get("nature")?,
        ability: row.get("ability")?,
        is_shiny: row.get("is_shiny")?,
        gender: row.get("gender")?,
        held_item: row.get("held_item")?,
        mark: row.get("mark")?,
        iv_hp: row.get("iv_hp")?,
        iv_atk: row.get("iv_atk")?,
        iv_def: row.get("iv_def")?,
        iv_spatk: row.get("iv_spatk")?,
        iv_spdef: row.get("iv_spdef")?,
        iv_speed: row.get("iv_speed")?,
        ev_hp: row.get("ev_hp")?,
        ev_atk: row.get("ev_atk")?,
        ev_def: row.get("ev_def")?,
        ev_spatk: row.get("ev_spatk")?,
        ev_spdef: row.get("ev_spdef")?,
        ev_speed: row.get("ev_speed")?,
        move1: row.get("move1")?,
        move2: row.get("move2")?,
        move3: row.get("move3")?,
        move4: row.get("move4")?,
        original_trainer: row.get("original_trainer")?,
        trainer_id: row.get("trainer_id")?,
        game_of_origin: row.get("game_of_origin")?,
        ball_type: row.get("ball_type")?,
        date_caught: row.get("date_caught")?,
        met_at_level: row.get("met_at_level")?,
        met_at_location: row.get("met_at_location")?,
        box_screenshot_path: row.get("box_screenshot_path")?,
        detail_screenshot_path: row.get("detail_screenshot_path")?,
        detail_screenshot2_path: row.get("detail_screenshot2_path")?,
        sprite_path: row.get("sprite_path")?,
        captured_at: row.get("captured_at")?,
        parsed_at: row.get("parsed_at")?,
        raw_json: row.get("raw_json")?,
    })
}
