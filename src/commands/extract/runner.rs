use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use anyhow::Result;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::extract::{
    CAUGHT_INFO_TEMPLATE, DETAIL_TEMPLATE, ExtractionError, Extractor, Fields, RetryDecision,
    RetryPolicy, merge_non_null,
};
use crate::model::{QueueItem, RunSummary};
use crate::store::{RecordUpdate, Store};
use crate::util::now_utc_string;

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub concurrency: usize,
    pub force: bool,
    pub dry_run: bool,
    pub retry: RetryPolicy,
    pub progress_every: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: 15,
            force: false,
            dry_run: false,
            retry: RetryPolicy::default(),
            progress_every: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Success,
    Skipped,
    Missing,
    Failed,
}

impl ItemOutcome {
    /// Successes and failures count as completions; skipped and missing items do not.
    pub fn is_completion(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

struct RunState {
    ok: AtomicUsize,
    errors: AtomicUsize,
    skipped: AtomicUsize,
    missing: AtomicUsize,
    total: usize,
    started: Instant,
}

impl RunState {
    fn new(total: usize) -> Self {
        Self {
            ok: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            missing: AtomicUsize::new(0),
            total,
            started: Instant::now(),
        }
    }

    fn record(&self, outcome: ItemOutcome) {
        let counter = match outcome {
            ItemOutcome::Success => &self.ok,
            ItemOutcome::Skipped => &self.skipped,
            ItemOutcome::Missing => &self.missing,
            ItemOutcome::Failed => &self.errors,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn summary(&self) -> RunSummary {
        RunSummary {
            ok: self.ok.load(Ordering::SeqCst),
            errors: self.errors.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            missing: self.missing.load(Ordering::SeqCst),
            elapsed_secs: self.started.elapsed().as_secs(),
        }
    }
}

/// Extracts every queue item with at most `config.concurrency` calls in flight.
///
/// Each success is upserted as soon as it completes, so an interrupted run loses nothing that
/// finished; the next run's queue simply no longer contains those keys.
pub async fn run_queue(
    store: &Store,
    extractor: &dyn Extractor,
    items: &[QueueItem],
    config: &RunnerConfig,
) -> Result<RunSummary> {
    let semaphore = Semaphore::new(config.concurrency.max(1));
    let state = RunState::new(items.len());
    let (semaphore, state_ref) = (&semaphore, &state);

    let tasks = items.iter().map(|item| async move {
        let outcome = process_item(store, extractor, semaphore, item, config).await;
        state_ref.record(outcome);
        if outcome.is_completion() {
            report_progress(state_ref, config.progress_every);
        }
    });
    join_all(tasks).await;

    let summary = state.summary();
    info!(
        ok = summary.ok,
        errors = summary.errors,
        skipped = summary.skipped,
        missing = summary.missing,
        elapsed_secs = summary.elapsed_secs,
        "extraction run finished"
    );
    Ok(summary)
}

async fn process_item(
    store: &Store,
    extractor: &dyn Extractor,
    semaphore: &Semaphore,
    item: &QueueItem,
    config: &RunnerConfig,
) -> ItemOutcome {
    let key = item.key();

    if !config.force {
        match store.is_parsed(key) {
            Ok(true) => return ItemOutcome::Skipped,
            Ok(false) => {}
            Err(err) => {
                error!(box_number = key.box_number, box_slot = key.box_slot, error = %err, "failed to check parsed state");
                return ItemOutcome::Failed;
            }
        }
    }

    if !item.image_path.exists() {
        warn!(
            box_number = key.box_number,
            box_slot = key.box_slot,
            path = %item.image_path.display(),
            "detail screenshot missing"
        );
        return ItemOutcome::Missing;
    }

    let Ok(_permit) = semaphore.acquire().await else {
        return ItemOutcome::Failed;
    };

    let mut attempt = 0;
    loop {
        match extract_item(extractor, item).await {
            Ok(fields) => {
                return match write_result(store, item, &fields, config.dry_run) {
                    Ok(()) => {
                        debug!(
                            box_number = key.box_number,
                            box_slot = key.box_slot,
                            species = fields.get("species_name").and_then(|v| v.as_str()).unwrap_or("?"),
                            "extracted"
                        );
                        ItemOutcome::Success
                    }
                    Err(err) => {
                        error!(box_number = key.box_number, box_slot = key.box_slot, error = %err, "failed to store extraction");
                        ItemOutcome::Failed
                    }
                };
            }
            Err(err) => match config.retry.decide(&err, attempt) {
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        box_number = key.box_number,
                        box_slot = key.box_slot,
                        kind = err.kind(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "extraction failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::GiveUp => {
                    warn!(
                        box_number = key.box_number,
                        box_slot = key.box_slot,
                        kind = err.kind(),
                        attempts = attempt + 1,
                        error = %err,
                        "extraction failed"
                    );
                    return ItemOutcome::Failed;
                }
            },
        }
    }
}

/// Main detail screen first, then the caught-info screen when it was captured. Non-null
/// fields from the second screen win.
async fn extract_item(
    extractor: &dyn Extractor,
    item: &QueueItem,
) -> Result<Fields, ExtractionError> {
    let mut fields = extractor
        .extract(std::slice::from_ref(&item.image_path), &DETAIL_TEMPLATE)
        .await?;

    if let Some(secondary) = item.image_path2.as_ref().filter(|path| path.exists()) {
        let caught = extractor
            .extract(std::slice::from_ref(secondary), &CAUGHT_INFO_TEMPLATE)
            .await?;
        merge_non_null(&mut fields, caught);
    }

    Ok(fields)
}

fn write_result(store: &Store, item: &QueueItem, fields: &Fields, dry_run: bool) -> Result<()> {
    let key = item.key();
    let raw_json = serde_json::to_string(fields)?;

    if dry_run {
        info!(box_number = key.box_number, box_slot = key.box_slot, fields = %raw_json, "dry-run extraction");
        return Ok(());
    }

    let mut update = RecordUpdate::new(key);
    let dropped = update.merge_extracted(fields);
    if !dropped.is_empty() {
        debug!(box_number = key.box_number, box_slot = key.box_slot, dropped = ?dropped, "ignored extracted fields");
    }
    if update.is_empty() {
        warn!(box_number = key.box_number, box_slot = key.box_slot, "no usable fields extracted");
    } else {
        debug!(box_number = key.box_number, box_slot = key.box_slot, fields = update.len(), "storing extracted fields");
    }
    update
        .set_text("parsed_at", now_utc_string())?
        .set_text("raw_json", raw_json)?;

    store.upsert_record(&update)?;
    Ok(())
}

fn report_progress(state: &RunState, every: usize) {
    let ok = state.ok.load(Ordering::SeqCst);
    let errors = state.errors.load(Ordering::SeqCst);
    let done = ok + errors;
    if !progress_due(done, every) {
        return;
    }

    let skipped = state.skipped.load(Ordering::SeqCst);
    let missing = state.missing.load(Ordering::SeqCst);
    let target = state.total.saturating_sub(skipped + missing);
    let (rate, eta_secs) = throughput(done, target, state.started.elapsed().as_secs_f64());

    info!(
        done,
        target,
        ok,
        errors,
        rate = %format!("{rate:.1}/s"),
        eta_min = (eta_secs / 60.0) as u64,
        "extraction progress"
    );
}

/// A progress line is logged for the first five completions and then every `every`th.
pub fn progress_due(done: usize, every: usize) -> bool {
    done <= 5 || (every > 0 && done % every == 0)
}

/// Items per second so far and the estimated seconds left for the rest of `target`.
pub fn throughput(done: usize, target: usize, elapsed_secs: f64) -> (f64, f64) {
    let rate = if elapsed_secs > 0.0 {
        done as f64 / elapsed_secs
    } else {
        0.0
    };
    let remaining = target.saturating_sub(done) as f64;
    let eta = if rate > 0.0 { remaining / rate } else { 0.0 };
    (rate, eta)
}
