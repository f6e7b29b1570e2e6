use anyhow::Result;
use tracing::{info, warn};

use crate::cli::{CollectionPaths, StatusArgs};
use crate::commands::batch::batch_file_counts;
use crate::commands::capture::CaptureCursor;
use crate::store::Store;

pub fn run(args: StatusArgs) -> Result<()> {
    let db_path = args.paths.db_path();
    if !db_path.exists() {
        warn!(path = %db_path.display(), "database file missing (run `pokehome init`)");
        return Ok(());
    }

    let store = Store::open_existing(&db_path)?;
    log_status(&store, &args.paths)
}

/// Logs record counts, batch-file progress and the capture cursor.
pub fn log_status(store: &Store, paths: &CollectionPaths) -> Result<()> {
    let counts = store.counts()?;
    info!(
        path = %store.path().display(),
        total = counts.total,
        with_screenshot = counts.with_screenshot,
        parsed = counts.parsed,
        remaining = counts.remaining(),
        "database status"
    );

    let batch_dir = paths.batch_dir();
    let batches = batch_file_counts(&batch_dir)?;
    info!(
        dir = %batch_dir.display(),
        input = batches.input,
        output_ready = batches.output,
        imported = batches.imported,
        "batch files"
    );

    let cursor = CaptureCursor::load(store)?;
    info!(
        box_number = cursor.box_number,
        slot = cursor.slot,
        complete = CaptureCursor::is_complete(store)?,
        "capture cursor"
    );

    Ok(())
}
