use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::cli::QueueArgs;
use crate::model::{QueueItem, RecordKey};
use crate::store::Store;
use crate::util::{ensure_directory, read_json, write_json_pretty};

pub fn run(args: QueueArgs) -> Result<()> {
    let store = Store::open_existing(&args.paths.db_path())?;
    let queue_path = args
        .queue_path
        .clone()
        .unwrap_or_else(|| args.paths.default_queue_path());

    let excluded = load_excluded_keys(&args.exclude)?;
    let items = materialize_queue(&store, &args.paths.collection_root, &excluded)?;
    write_json_pretty(&queue_path, &items)?;

    info!(
        path = %queue_path.display(),
        items = items.len(),
        excluded = excluded.len(),
        "wrote parse queue"
    );
    Ok(())
}

/// Snapshot of every record that has a detail screenshot and no parsed timestamp, minus the
/// excluded keys, in key order.
pub fn materialize_queue(
    store: &Store,
    collection_root: &Path,
    excluded: &HashSet<RecordKey>,
) -> Result<Vec<QueueItem>> {
    let items = store
        .pending_records()?
        .into_iter()
        .filter(|pending| !excluded.contains(&pending.key))
        .map(|pending| pending.to_queue_item(collection_root))
        .collect();
    Ok(items)
}

pub fn load_queue(path: &Path) -> Result<Vec<QueueItem>> {
    if !path.exists() {
        bail!(
            "queue file missing: {} (run `pokehome queue` first)",
            path.display()
        );
    }
    read_json(path)
}

/// Keys listed in any of the given queue or batch files.
pub fn load_excluded_keys(paths: &[PathBuf]) -> Result<HashSet<RecordKey>> {
    let mut keys = HashSet::new();
    for path in paths {
        let items: Vec<QueueItem> = read_json(path)
            .with_context(|| format!("failed to load exclusion list {}", path.display()))?;
        keys.extend(items.iter().map(QueueItem::key));
    }
    Ok(keys)
}

pub fn batch_file_name(index: usize) -> String {
    format!("batch_{index:04}.json")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkWrite {
    pub chunks: usize,
    pub written: usize,
    pub kept_existing: usize,
}

/// Partitions `items` into files of at most `batch_size` entries. Files that already exist
/// are left untouched, so re-splitting the same queue is a no-op.
pub fn write_chunks(items: &[QueueItem], batch_size: usize, dir: &Path) -> Result<ChunkWrite> {
    if batch_size == 0 {
        bail!("batch size must be at least 1");
    }
    ensure_directory(dir)?;

    let mut report = ChunkWrite::default();
    for (index, chunk) in items.chunks(batch_size).enumerate() {
        report.chunks += 1;
        let path = dir.join(batch_file_name(index));
        if path.exists() {
            report.kept_existing += 1;
            warn!(path = %path.display(), "batch file exists, not overwriting");
            continue;
        }
        write_json_pretty(&path, &chunk)?;
        report.written += 1;
    }

    Ok(report)
}
