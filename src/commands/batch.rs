use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, info, warn};

use crate::cli::{BatchArgs, BatchCommand};
use crate::commands::queue::{load_excluded_keys, load_queue, write_chunks};
use crate::commands::status::log_status;
use crate::model::{BatchFileCounts, ChunkReport, ImportReport, QueueItem, RecordKey};
use crate::store::{RecordUpdate, Store};
use crate::util::{ensure_directory, now_utc_string, read_json};

const INPUT_DIR: &str = "input";
const OUTPUT_DIR: &str = "output";
const IMPORTED_DIR: &str = "imported";

/// Queue-item keys that never map to a pokemon column.
const ITEM_KEYS: &[&str] = &["box", "slot", "image_path", "image_path2"];

pub fn run(args: BatchArgs) -> Result<()> {
    let store = Store::open_existing(&args.paths.db_path())?;
    let batch_dir = args.paths.batch_dir();

    match args.command {
        BatchCommand::Split {
            batch_size,
            queue_path,
            exclude,
        } => {
            let queue_path = queue_path.unwrap_or_else(|| args.paths.default_queue_path());
            let queue = load_queue(&queue_path)?;
            let excluded = load_excluded_keys(&exclude)?;

            let report = split_queue(
                &store,
                &queue,
                &excluded,
                batch_size,
                &batch_dir.join(INPUT_DIR),
            )?;
            info!(
                pending = report.pending,
                excluded = report.excluded,
                chunks = report.chunks,
                written = report.written,
                kept_existing = report.kept_existing,
                batch_size,
                dir = %batch_dir.join(INPUT_DIR).display(),
                "split parse queue into batch files"
            );
        }
        BatchCommand::Import => {
            let report = import_outputs(&store, &batch_dir)?;
            if report.files == 0 {
                warn!(dir = %batch_dir.join(OUTPUT_DIR).display(), "no batch output files found");
            } else {
                info!(
                    files = report.files,
                    imported = report.imported,
                    skipped = report.skipped,
                    db = %store.path().display(),
                    "imported batch outputs"
                );
            }
        }
        BatchCommand::Status => log_status(&store, &args.paths)?,
    }

    Ok(())
}

/// Drops keys that are already parsed or excluded, then writes the rest as
/// `batch_NNNN.json` chunks under `input_dir`.
pub fn split_queue(
    store: &Store,
    queue: &[QueueItem],
    excluded: &HashSet<RecordKey>,
    batch_size: usize,
    input_dir: &Path,
) -> Result<ChunkReport> {
    let parsed = store.parsed_keys()?;
    let pending: Vec<QueueItem> = queue
        .iter()
        .filter(|item| !parsed.contains(&item.key()) && !excluded.contains(&item.key()))
        .cloned()
        .collect();

    let written = write_chunks(&pending, batch_size, input_dir)?;
    Ok(ChunkReport {
        pending: pending.len(),
        excluded: queue.len() - pending.len(),
        chunks: written.chunks,
        written: written.written,
        kept_existing: written.kept_existing,
    })
}

/// Upserts every `output/batch_*.json` file in name order and moves each one to `imported/`
/// once all of its items are stored.
pub fn import_outputs(store: &Store, batch_dir: &Path) -> Result<ImportReport> {
    let output_dir = batch_dir.join(OUTPUT_DIR);
    let imported_dir = batch_dir.join(IMPORTED_DIR);
    ensure_directory(&output_dir)?;

    let mut report = ImportReport::default();
    for path in batch_files(&output_dir)? {
        let items: Vec<Map<String, JsonValue>> = read_json(&path)?;
        for item in &items {
            if import_item(store, item)? {
                report.imported += 1;
            } else {
                report.skipped += 1;
            }
        }

        ensure_directory(&imported_dir)?;
        let file_name = path
            .file_name()
            .with_context(|| format!("batch file has no name: {}", path.display()))?;
        let target = imported_dir.join(file_name);
        fs::rename(&path, &target).with_context(|| {
            format!(
                "failed to move {} to {}",
                path.display(),
                target.display()
            )
        })?;
        debug!(file = %target.display(), items = items.len(), "archived batch output");
        report.files += 1;
    }

    Ok(report)
}

/// Returns true when the item carried a species name.
fn import_item(store: &Store, item: &Map<String, JsonValue>) -> Result<bool> {
    let Some(key) = item_key(item) else {
        warn!(item = %JsonValue::Object(item.clone()), "batch item without box/slot, skipped");
        return Ok(false);
    };

    let fields: Map<String, JsonValue> = item
        .iter()
        .filter(|(name, _)| !ITEM_KEYS.contains(&name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    let mut update = RecordUpdate::new(key);
    let dropped = update.merge_extracted(&fields);
    if !dropped.is_empty() {
        debug!(box_number = key.box_number, box_slot = key.box_slot, dropped = ?dropped, "ignored batch fields");
    }
    update
        .set_text("parsed_at", now_utc_string())?
        .set_text("raw_json", serde_json::to_string(item)?)?;
    store.upsert_record(&update)?;

    let has_species = item
        .get("species_name")
        .and_then(JsonValue::as_str)
        .is_some_and(|name| !name.trim().is_empty());
    Ok(has_species)
}

fn item_key(item: &Map<String, JsonValue>) -> Option<RecordKey> {
    let number = |name: &str| {
        item.get(name)
            .and_then(JsonValue::as_u64)
            .and_then(|value| u32::try_from(value).ok())
    };
    Some(RecordKey::new(number("box")?, number("slot")?))
}

/// `batch_*.json` files directly under `dir`, sorted by name. A missing directory is empty.
pub fn batch_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let pattern = Regex::new(r"^batch_\d+\.json$").context("failed to compile batch file regex")?;
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();
        let matches = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| pattern.is_match(name));
        if matches && path.is_file() {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

pub fn batch_file_counts(batch_dir: &Path) -> Result<BatchFileCounts> {
    Ok(BatchFileCounts {
        input: batch_files(&batch_dir.join(INPUT_DIR))?.len(),
        output: batch_files(&batch_dir.join(OUTPUT_DIR))?.len(),
        imported: batch_files(&batch_dir.join(IMPORTED_DIR))?.len(),
    })
}
