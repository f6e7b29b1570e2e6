use anyhow::{Context, Result, bail};
use rusqlite::Connection;

const DB_SCHEMA_VERSION: &str = "0.3.0";

pub(super) fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    connection
        .pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign_keys")?;
    connection
        .busy_timeout(std::time::Duration::from_secs(5))
        .context("failed to set busy_timeout")?;
    Ok(())
}

pub(super) fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS boxes (
              box_number INTEGER PRIMARY KEY,
              name TEXT,
              screenshot_path TEXT,
              captured_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS pokemon (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              box_number INTEGER NOT NULL,
              box_slot INTEGER NOT NULL,

              species_name TEXT,
              dex_number INTEGER,
              form_name TEXT,

              nickname TEXT,
              level INTEGER,
              nature TEXT,
              ability TEXT,
              is_shiny BOOLEAN DEFAULT 0,
              gender TEXT,
              held_item TEXT,
              mark TEXT,

              iv_hp INTEGER,
              iv_atk INTEGER,
              iv_def INTEGER,
              iv_spatk INTEGER,
              iv_spdef INTEGER,
              iv_speed INTEGER,

              ev_hp INTEGER,
              ev_atk INTEGER,
              ev_def INTEGER,
              ev_spatk INTEGER,
              ev_spdef INTEGER,
              ev_speed INTEGER,

              move1 TEXT,
              move2 TEXT,
              move3 TEXT,
              move4 TEXT,

              original_trainer TEXT,
              trainer_id TEXT,
              game_of_origin TEXT,
              ball_type TEXT,

              box_screenshot_path TEXT,
              detail_screenshot_path TEXT,
              sprite_path TEXT,

              captured_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
              parsed_at TIMESTAMP,
              raw_json TEXT,

              UNIQUE(box_number, box_slot)
            );

            CREATE TABLE IF NOT EXISTS capture_state (
              key TEXT PRIMARY KEY,
              value TEXT,
              updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS metadata (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL
            );
            ",
        )
        .context("failed to initialize collection schema")?;

    // Columns added after the first capture runs; older databases pick them up here.
    ensure_column_exists(connection, "pokemon", "date_caught TEXT")?;
    ensure_column_exists(connection, "pokemon", "met_at_level INTEGER")?;
    ensure_column_exists(connection, "pokemon", "met_at_location TEXT")?;
    ensure_column_exists(connection, "pokemon", "detail_screenshot2_path TEXT")?;

    connection.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_pokemon_pending ON pokemon(parsed_at, detail_screenshot_path);
        CREATE INDEX IF NOT EXISTS idx_pokemon_trainer ON pokemon(original_trainer);
        ",
    )?;

    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;

    Ok(())
}

fn ensure_column_exists(
    connection: &Connection,
    table_name: &str,
    column_definition: &str,
) -> Result<()> {
    let Some(column_name) = column_definition.split_whitespace().next() else {
        bail!("invalid column definition: {column_definition}");
    };

    if table_columns(connection, table_name)?
        .iter()
        .any(|existing| existing == column_name)
    {
        return Ok(());
    }

    let alter_sql = format!("ALTER TABLE {table_name} ADD COLUMN {column_definition}");
    connection
        .execute(&alter_sql, [])
        .with_context(|| format!("failed to add column {column_name} on {table_name}"))?;

    Ok(())
}

pub(super) fn table_columns(connection: &Connection, table_name: &str) -> Result<Vec<String>> {
    let pragma_sql = format!("PRAGMA table_info({table_name})");
    let mut statement = connection
        .prepare(&pragma_sql)
        .with_context(|| format!("failed to inspect schema for table {table_name}"))?;

    let mut rows = statement.query([])?;
    let mut names = Vec::new();
    while let Some(row) = rows.next()? {
        names.push(row.get::<_, String>(1)?);
    }

    Ok(names)
}
