use anyhow::{Context, Result};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use crate::cli::CaptureArgs;
use crate::commands::init::prepare_collection;
use crate::model::RecordKey;
use crate::store::Store;
use crate::util::{block_on, read_json};

mod compare;
mod device;
mod layout;
mod walker;
mod webdriver;

#[cfg(test)]
mod tests;

use compare::DigestComparator;
use device::Device;
use layout::CaptureTiming;
pub use layout::ScreenLayout;
use walker::{CaptureWalker, WalkLimits, WalkReport};
use webdriver::{WebDriverDevice, default_capabilities};

const CURSOR_BOX_KEY: &str = "capture_box";
const CURSOR_SLOT_KEY: &str = "capture_slot";
const COMPLETE_KEY: &str = "capture_complete";

/// Where the capture walk resumes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureCursor {
    pub box_number: u32,
    pub slot: u32,
}

impl CaptureCursor {
    pub fn new(box_number: u32, slot: u32) -> Self {
        Self { box_number, slot }
    }

    /// The slot following `key`, rolling over into the next box.
    pub fn after(key: RecordKey, slots_per_box: u32) -> Self {
        if key.box_slot + 1 >= slots_per_box {
            Self::new(key.box_number + 1, 0)
        } else {
            Self::new(key.box_number, key.box_slot + 1)
        }
    }

    pub fn load(store: &Store) -> Result<Self> {
        Ok(Self {
            box_number: store.get_state_or(CURSOR_BOX_KEY, 0)?,
            slot: store.get_state_or(CURSOR_SLOT_KEY, 0)?,
        })
    }

    pub fn save(&self, store: &Store) -> Result<()> {
        store.set_state(CURSOR_BOX_KEY, &self.box_number.to_string())?;
        store.set_state(CURSOR_SLOT_KEY, &self.slot.to_string())
    }

    pub fn is_complete(store: &Store) -> Result<bool> {
        store.get_state_or(COMPLETE_KEY, false)
    }

    pub fn mark_complete(store: &Store) -> Result<()> {
        store.set_state(COMPLETE_KEY, "true")
    }

    pub fn clear_complete(store: &Store) -> Result<()> {
        store.set_state(COMPLETE_KEY, "false")
    }
}

/// Picks where the walk starts, or `None` when a finished walk would only revisit the last
/// box. An explicit `--box` or `--restart` walks anyway and clears the completion flag.
pub fn start_cursor(
    store: &Store,
    box_number: Option<u32>,
    slot: Option<u32>,
    restart: bool,
) -> Result<Option<CaptureCursor>> {
    let start = match box_number {
        Some(box_number) => CaptureCursor::new(box_number, slot.unwrap_or(0)),
        None if restart => CaptureCursor::new(0, slot.unwrap_or(0)),
        None => {
            if CaptureCursor::is_complete(store)? {
                return Ok(None);
            }
            let stored = CaptureCursor::load(store)?;
            CaptureCursor::new(stored.box_number, slot.unwrap_or(stored.slot))
        }
    };
    CaptureCursor::clear_complete(store)?;
    Ok(Some(start))
}

pub fn run(args: CaptureArgs) -> Result<()> {
    let store = prepare_collection(&args.paths)?;

    let layout = match &args.layout {
        Some(path) => read_json::<ScreenLayout>(path)
            .with_context(|| format!("failed to load screen layout {}", path.display()))?,
        None => ScreenLayout::default(),
    };
    if !layout.matches_box_model() {
        warn!(
            slots = layout.slots_per_box(),
            "layout grid does not have 30 slots per box"
        );
    }

    let capabilities: JsonValue = match &args.capabilities {
        Some(path) => read_json(path)?,
        None => default_capabilities(),
    };

    let Some(start) = start_cursor(&store, args.box_number, args.slot, args.restart)? else {
        let next = CaptureCursor::load(&store)?;
        info!(
            next_box = next.box_number,
            "capture already complete; pass --restart or --box to walk again"
        );
        return Ok(());
    };
    let limits = WalkLimits {
        max_captures: args.limit,
        max_boxes: args.max_boxes,
        second_screen: !args.skip_second_screen,
    };

    info!(
        box_number = start.box_number,
        slot = start.slot,
        db = %store.path().display(),
        "starting capture walk"
    );

    let report = block_on(async {
        let device = WebDriverDevice::connect(&args.webdriver_url, capabilities).await?;
        let result = walk_device(&device, &store, layout, &args, start, limits).await;
        device.close().await;
        result
    })??;

    info!(
        captured = report.captured,
        empty = report.empty,
        boxes = report.boxes,
        end_of_boxes = report.end_of_boxes,
        next_box = report.next.box_number,
        next_slot = report.next.slot,
        "capture walk finished"
    );
    Ok(())
}

async fn walk_device(
    device: &dyn Device,
    store: &Store,
    layout: ScreenLayout,
    args: &CaptureArgs,
    start: CaptureCursor,
    limits: WalkLimits,
) -> Result<WalkReport> {
    let comparator = DigestComparator;
    let mut walker = CaptureWalker::new(
        device,
        &comparator,
        store,
        layout,
        CaptureTiming::default(),
        &args.paths.collection_root,
    )
    .await?;

    if args.navigate {
        walker.navigate().await?;
    }
    walker.walk(start, limits).await
}
