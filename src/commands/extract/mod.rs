use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::cli::ExtractArgs;
use crate::commands::queue::load_queue;
use crate::extract::{AnthropicExtractor, RetryPolicy};
use crate::model::{QueueItem, RecordKey, RunSummary};
use crate::store::Store;
use crate::util::block_on;

mod runner;

pub use runner::{RunnerConfig, run_queue};

pub fn run(args: ExtractArgs) -> Result<()> {
    let Some(api_key) = args.api_key.as_deref().filter(|key| !key.is_empty()) else {
        bail!("ANTHROPIC_API_KEY not set");
    };

    let store = Store::open_existing(&args.paths.db_path())?;
    let collection_root = &args.paths.collection_root;

    let mut items = match (args.box_number, args.slot) {
        (Some(box_number), Some(slot)) => {
            vec![single_item(&store, collection_root, RecordKey::new(box_number, slot))?]
        }
        _ => {
            let queue_path = args
                .queue_path
                .clone()
                .unwrap_or_else(|| args.paths.default_queue_path());
            load_queue(&queue_path)?
        }
    };
    if let Some(limit) = args.limit {
        items.truncate(limit);
    }
    enrich_secondary_paths(&store, collection_root, &mut items)?;

    let extractor = AnthropicExtractor::new(api_key, &args.model)?;
    let config = RunnerConfig {
        concurrency: args.concurrency,
        force: args.force || args.box_number.is_some(),
        dry_run: args.dry_run,
        retry: RetryPolicy::default(),
        ..RunnerConfig::default()
    };

    info!(
        items = items.len(),
        model = extractor.model(),
        concurrency = config.concurrency,
        db = %store.path().display(),
        "starting extraction"
    );

    let summary: RunSummary = block_on(run_queue(&store, &extractor, &items, &config))??;
    if summary.errors > 0 {
        info!(
            errors = summary.errors,
            "failed items stay unparsed; re-run `pokehome queue` and `pokehome extract` to retry them"
        );
    }
    Ok(())
}

fn single_item(store: &Store, collection_root: &Path, key: RecordKey) -> Result<QueueItem> {
    let record = store
        .record_by_key(key)?
        .with_context(|| format!("no record for {key}"))?;
    let Some(detail) = record.detail_screenshot_path else {
        bail!("record {key} has no detail screenshot");
    };

    Ok(QueueItem {
        box_number: key.box_number,
        box_slot: key.box_slot,
        image_path: collection_root.join(detail),
        image_path2: record
            .detail_screenshot2_path
            .map(|path| collection_root.join(path)),
    })
}

/// Fills in `image_path2` for queue items written before the second screen was captured.
pub fn enrich_secondary_paths(
    store: &Store,
    collection_root: &Path,
    items: &mut [QueueItem],
) -> Result<()> {
    let secondary: HashMap<RecordKey, String> =
        store.secondary_screenshots()?.into_iter().collect();

    for item in items.iter_mut().filter(|item| item.image_path2.is_none()) {
        if let Some(path) = secondary.get(&item.key()) {
            item.image_path2 = Some(collection_root.join(path));
        }
    }
    Ok(())
}
