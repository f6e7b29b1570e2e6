use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use super::CaptureCursor;
use super::compare::ScreenComparator;
use super::device::{Device, WindowSize};
use super::layout::{CaptureTiming, ScreenLayout, ScreenPoint};
use crate::model::RecordKey;
use crate::store::{RecordUpdate, Store};
use crate::util::ensure_directory;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkLimits {
    /// Stop after this many Pokemon were captured.
    pub max_captures: Option<usize>,
    /// Stop after visiting this many boxes.
    pub max_boxes: u32,
    pub second_screen: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkReport {
    pub captured: usize,
    pub empty: usize,
    pub boxes: u32,
    pub end_of_boxes: bool,
    pub next: CaptureCursor,
}

/// Result of walking one box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxPhase {
    /// All slots done; continue at this cursor in the next box.
    Next(CaptureCursor),
    /// The capture limit was reached; resume here.
    Stopped(CaptureCursor),
    /// The box view did not change after moving on, so there are no more boxes.
    EndOfBoxes,
}

/// Drives a device through the box grid, saving screenshots under `collection_root/images`
/// and recording image paths (relative to the collection root) in the store.
pub struct CaptureWalker<'a> {
    device: &'a dyn Device,
    comparator: &'a dyn ScreenComparator,
    store: &'a Store,
    layout: ScreenLayout,
    timing: CaptureTiming,
    collection_root: PathBuf,
    size: WindowSize,
    previous_box: Option<Vec<u8>>,
}

impl<'a> CaptureWalker<'a> {
    pub async fn new(
        device: &'a dyn Device,
        comparator: &'a dyn ScreenComparator,
        store: &'a Store,
        layout: ScreenLayout,
        timing: CaptureTiming,
        collection_root: &Path,
    ) -> Result<Self> {
        let size = device.window_size().await?;
        info!(width = size.width, height = size.height, "connected to device");

        for subdir in ["boxes", "detail", "nav"] {
            ensure_directory(&collection_root.join("images").join(subdir))?;
        }

        Ok(Self {
            device,
            comparator,
            store,
            layout,
            timing,
            collection_root: collection_root.to_path_buf(),
            size,
            previous_box: None,
        })
    }

    async fn tap(&self, point: ScreenPoint, settle: Duration) -> Result<()> {
        self.device.tap(point.to_pixels(self.size)).await?;
        tokio::time::sleep(settle).await;
        Ok(())
    }

    /// Writes a screenshot under the collection root and returns its relative path.
    fn save_image(&self, relative: &str, png: &[u8]) -> Result<String> {
        let path = self.collection_root.join(relative);
        std::fs::write(&path, png)
            .with_context(|| format!("failed to write screenshot {}", path.display()))?;
        debug!(path = relative, "saved screenshot");
        Ok(relative.to_string())
    }

    /// From the launch screen to the box view, saving a screenshot after each step.
    pub async fn navigate(&self) -> Result<()> {
        let launch = self.device.screenshot().await?;
        self.save_image("images/nav/01_launch.png", &launch)?;

        info!("tapping through the launch screen");
        self.tap(self.layout.tap_to_start, self.timing.post_login)
            .await?;
        let room = self.device.screenshot().await?;
        self.save_image("images/nav/02_room.png", &room)?;

        self.tap(self.layout.pokemon_tab, self.timing.tap).await?;
        let boxes = self.device.screenshot().await?;
        self.save_image("images/nav/03_boxes.png", &boxes)?;
        Ok(())
    }

    /// Walks boxes from `start` until the limits are hit or the boxes run out. The cursor is
    /// persisted after every slot.
    ///
    /// When starting past box 0, the view before the last next-box tap becomes the reference
    /// for end-of-boxes detection, so a cursor beyond the last box captures nothing.
    pub async fn walk(&mut self, start: CaptureCursor, limits: WalkLimits) -> Result<WalkReport> {
        if start.box_number > 0 {
            for _ in 1..start.box_number {
                self.tap(self.layout.next_box, self.timing.next_box).await?;
            }
            self.previous_box = Some(self.device.screenshot().await?);
            self.tap(self.layout.next_box, self.timing.next_box).await?;
        }

        let mut report = WalkReport {
            next: start,
            ..WalkReport::default()
        };
        let mut cursor = start;

        while report.boxes < limits.max_boxes {
            let phase = self.capture_box(cursor, limits, &mut report).await?;
            match phase {
                BoxPhase::Next(next) => {
                    report.boxes += 1;
                    report.next = next;
                    cursor = next;
                    if limits.max_captures.is_some_and(|max| report.captured >= max) {
                        return Ok(report);
                    }
                    self.tap(self.layout.next_box, self.timing.next_box).await?;
                }
                BoxPhase::Stopped(next) => {
                    report.next = next;
                    return Ok(report);
                }
                BoxPhase::EndOfBoxes => {
                    info!(box_number = cursor.box_number, "no further boxes");
                    report.end_of_boxes = true;
                    report.next = cursor;
                    CaptureCursor::mark_complete(self.store)?;
                    return Ok(report);
                }
            }
        }

        Ok(report)
    }

    /// Captures one box from `cursor.slot` to the last slot.
    pub async fn capture_box(
        &mut self,
        cursor: CaptureCursor,
        limits: WalkLimits,
        report: &mut WalkReport,
    ) -> Result<BoxPhase> {
        let box_number = cursor.box_number;
        let box_view = self.device.screenshot().await?;
        if let Some(previous) = &self.previous_box
            && self.comparator.is_same_screen(previous, &box_view)
        {
            return Ok(BoxPhase::EndOfBoxes);
        }

        let box_path = self.save_image(&format!("images/boxes/box_{box_number:03}.png"), &box_view)?;
        self.store.upsert_box(box_number, &box_path)?;
        self.previous_box = Some(box_view);
        info!(box_number, start_slot = cursor.slot, "capturing box");

        for slot in cursor.slot..self.layout.slots_per_box() {
            if limits
                .max_captures
                .is_some_and(|max| report.captured >= max)
            {
                info!(captured = report.captured, "capture limit reached");
                return Ok(BoxPhase::Stopped(CaptureCursor::new(box_number, slot)));
            }

            let key = RecordKey::new(box_number, slot);
            if self.capture_slot(key, &box_path, limits.second_screen).await? {
                report.captured += 1;
            } else {
                report.empty += 1;
                debug!(box_number, slot, "empty slot");
            }
            CaptureCursor::after(key, self.layout.slots_per_box()).save(self.store)?;
        }

        Ok(BoxPhase::Next(CaptureCursor::new(box_number + 1, 0)))
    }

    /// Opens the slot's detail view. Returns false when the tap did not change the screen.
    async fn capture_slot(&self, key: RecordKey, box_path: &str, second_screen: bool) -> Result<bool> {
        let before = self.device.screenshot().await?;
        self.tap(self.layout.slot_center(key.box_slot), self.timing.detail)
            .await?;
        let detail = self.device.screenshot().await?;

        if self.comparator.is_same_screen(&before, &detail) {
            return Ok(false);
        }

        let stem = format!("images/detail/box_{:03}_slot_{:02}", key.box_number, key.box_slot);
        let mut update = RecordUpdate::new(key);
        update
            .set_text(
                "detail_screenshot_path",
                self.save_image(&format!("{stem}.png"), &detail)?,
            )?
            .set_text("box_screenshot_path", box_path)?;

        if second_screen {
            self.device
                .swipe(
                    self.layout.detail_scroll_from.to_pixels(self.size),
                    self.layout.detail_scroll_to.to_pixels(self.size),
                )
                .await?;
            tokio::time::sleep(self.timing.scroll).await;
            let scrolled = self.device.screenshot().await?;
            if !self.comparator.is_same_screen(&detail, &scrolled) {
                update.set_text(
                    "detail_screenshot2_path",
                    self.save_image(&format!("{stem}_2.png"), &scrolled)?,
                )?;
            }
        }

        self.tap(self.layout.close_detail, self.timing.back).await?;
        self.store.upsert_record(&update)?;
        info!(box_number = key.box_number, slot = key.box_slot, "captured");
        Ok(true)
    }
}
