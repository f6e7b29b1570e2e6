use std::collections::BTreeSet;
use std::sync::Mutex;

use anyhow::{Result, bail};
use async_trait::async_trait;

use super::device::{PixelPoint, WindowSize};
use super::layout::ScreenPoint;
use super::*;

const SIZE: WindowSize = WindowSize {
    width: 1000,
    height: 2000,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Launch,
    Room,
    Box,
    Detail(u32),
    DetailScrolled(u32),
}

struct FakeState {
    screen: Screen,
    current_box: usize,
    taps: usize,
}

/// A scripted HOME app: a list of boxes, each with a set of occupied slots.
struct FakeDevice {
    layout: ScreenLayout,
    boxes: Vec<BTreeSet<u32>>,
    state: Mutex<FakeState>,
}

impl FakeDevice {
    fn new(boxes: Vec<BTreeSet<u32>>) -> Self {
        Self::starting_at(boxes, Screen::Box)
    }

    fn starting_at(boxes: Vec<BTreeSet<u32>>, screen: Screen) -> Self {
        Self {
            layout: ScreenLayout::default(),
            boxes,
            state: Mutex::new(FakeState {
                screen,
                current_box: 0,
                taps: 0,
            }),
        }
    }

    fn hits(&self, at: PixelPoint, point: ScreenPoint) -> bool {
        point.to_pixels(SIZE) == at
    }

    fn slot_at(&self, at: PixelPoint) -> Option<u32> {
        (0..self.layout.slots_per_box()).find(|slot| self.hits(at, self.layout.slot_center(*slot)))
    }

    fn taps(&self) -> usize {
        self.state.lock().expect("state").taps
    }
}

#[async_trait]
impl Device for FakeDevice {
    async fn window_size(&self) -> Result<WindowSize> {
        Ok(SIZE)
    }

    async fn tap(&self, at: PixelPoint) -> Result<()> {
        let mut state = self.state.lock().expect("state");
        state.taps += 1;
        match state.screen {
            Screen::Launch if self.hits(at, self.layout.tap_to_start) => state.screen = Screen::Room,
            Screen::Room if self.hits(at, self.layout.pokemon_tab) => state.screen = Screen::Box,
            Screen::Box if self.hits(at, self.layout.next_box) => {
                state.current_box = (state.current_box + 1).min(self.boxes.len() - 1);
            }
            Screen::Box => {
                if let Some(slot) = self.slot_at(at)
                    && self.boxes[state.current_box].contains(&slot)
                {
                    state.screen = Screen::Detail(slot);
                }
            }
            Screen::Detail(_) | Screen::DetailScrolled(_)
                if self.hits(at, self.layout.close_detail) =>
            {
                state.screen = Screen::Box;
            }
            _ => bail!("unexpected tap at {at:?} on {:?}", state.screen),
        }
        Ok(())
    }

    async fn swipe(&self, _from: PixelPoint, _to: PixelPoint) -> Result<()> {
        let mut state = self.state.lock().expect("state");
        if let Screen::Detail(slot) = state.screen {
            state.screen = Screen::DetailScrolled(slot);
        }
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let state = self.state.lock().expect("state");
        let text = match state.screen {
            Screen::Launch => "launch".to_string(),
            Screen::Room => "room".to_string(),
            Screen::Box => format!("box {}", state.current_box),
            Screen::Detail(slot) => format!("detail {} {slot}", state.current_box),
            Screen::DetailScrolled(slot) => format!("caught {} {slot}", state.current_box),
        };
        Ok(text.into_bytes())
    }
}

fn occupied(slots: &[u32]) -> BTreeSet<u32> {
    slots.iter().copied().collect()
}

fn limits(max_captures: Option<usize>) -> WalkLimits {
    WalkLimits {
        max_captures,
        max_boxes: 10,
        second_screen: true,
    }
}

async fn walk(
    device: &FakeDevice,
    store: &Store,
    root: &std::path::Path,
    start: CaptureCursor,
    limits: WalkLimits,
) -> WalkReport {
    let comparator = DigestComparator;
    let mut walker = CaptureWalker::new(
        device,
        &comparator,
        store,
        ScreenLayout::default(),
        CaptureTiming::immediate(),
        root,
    )
    .await
    .expect("walker");
    walker.walk(start, limits).await.expect("walk")
}

#[tokio::test]
async fn walk_captures_occupied_slots_until_boxes_run_out() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Store::open_in_memory().expect("store");
    let device = FakeDevice::new(vec![occupied(&[0, 2]), occupied(&[5])]);

    let report = walk(&device, &store, dir.path(), CaptureCursor::default(), limits(None)).await;

    assert_eq!(report.captured, 3);
    assert_eq!(report.empty, 57);
    assert_eq!(report.boxes, 2);
    assert!(report.end_of_boxes);
    assert!(CaptureCursor::is_complete(&store).expect("complete"));

    let pikachu = store
        .record_by_key(RecordKey::new(1, 5))
        .expect("load")
        .expect("record");
    let detail = pikachu.detail_screenshot_path.expect("detail path");
    assert_eq!(detail, "images/detail/box_001_slot_05.png");
    assert_eq!(
        std::fs::read(dir.path().join(&detail)).expect("detail file"),
        b"detail 1 5"
    );
    assert_eq!(
        pikachu.detail_screenshot2_path.as_deref(),
        Some("images/detail/box_001_slot_05_2.png")
    );
    assert_eq!(
        pikachu.box_screenshot_path.as_deref(),
        Some("images/boxes/box_001.png")
    );
    assert!(pikachu.parsed_at.is_none());

    assert!(store.record_by_key(RecordKey::new(0, 1)).expect("load").is_none());
    assert_eq!(
        store.box_screenshot(0).expect("box").as_deref(),
        Some("images/boxes/box_000.png")
    );
    assert_eq!(store.counts().expect("counts").with_screenshot, 3);
}

#[tokio::test]
async fn limit_stops_walk_and_cursor_resumes_it() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Store::open_in_memory().expect("store");
    let boxes = vec![occupied(&[0, 1, 2])];

    let device = FakeDevice::new(boxes.clone());
    let first = walk(&device, &store, dir.path(), CaptureCursor::default(), limits(Some(2))).await;
    assert_eq!(first.captured, 2);
    assert_eq!(first.next, CaptureCursor::new(0, 2));
    assert!(!first.end_of_boxes);
    assert_eq!(CaptureCursor::load(&store).expect("cursor"), CaptureCursor::new(0, 2));
    assert!(!CaptureCursor::is_complete(&store).expect("complete"));

    let device = FakeDevice::new(boxes);
    let resumed = walk(
        &device,
        &store,
        dir.path(),
        CaptureCursor::load(&store).expect("cursor"),
        limits(None),
    )
    .await;
    assert_eq!(resumed.captured, 1);
    assert_eq!(resumed.empty, 27);
    assert!(resumed.end_of_boxes);
    assert_eq!(store.counts().expect("counts").total, 3);
}

#[tokio::test]
async fn rerun_after_a_finished_walk_records_nothing_new() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Store::open_in_memory().expect("store");
    let boxes = vec![occupied(&[0]), occupied(&[5])];

    let device = FakeDevice::new(boxes.clone());
    let first = walk(&device, &store, dir.path(), CaptureCursor::default(), limits(None)).await;
    assert!(first.end_of_boxes);
    assert_eq!(CaptureCursor::load(&store).expect("cursor"), CaptureCursor::new(2, 0));
    assert!(CaptureCursor::is_complete(&store).expect("complete"));

    assert_eq!(start_cursor(&store, None, None, false).expect("start"), None);

    // Walking from the saved cursor anyway lands on the last real box again.
    let device = FakeDevice::new(boxes);
    let again = walk(
        &device,
        &store,
        dir.path(),
        CaptureCursor::load(&store).expect("cursor"),
        limits(None),
    )
    .await;
    assert_eq!(again.captured, 0);
    assert_eq!(again.empty, 0);
    assert!(again.end_of_boxes);
    assert!(store.record_by_key(RecordKey::new(2, 5)).expect("load").is_none());
    assert_eq!(store.counts().expect("counts").total, 2);
}

#[test]
fn start_cursor_honours_restart_and_explicit_box() {
    let store = Store::open_in_memory().expect("store");
    assert_eq!(
        start_cursor(&store, None, None, false).expect("start"),
        Some(CaptureCursor::default())
    );

    CaptureCursor::new(4, 0).save(&store).expect("save");
    CaptureCursor::mark_complete(&store).expect("complete");
    assert_eq!(start_cursor(&store, None, None, false).expect("start"), None);

    assert_eq!(
        start_cursor(&store, Some(3), None, false).expect("start"),
        Some(CaptureCursor::new(3, 0))
    );
    assert!(!CaptureCursor::is_complete(&store).expect("complete"));

    CaptureCursor::mark_complete(&store).expect("complete");
    assert_eq!(
        start_cursor(&store, None, None, true).expect("start"),
        Some(CaptureCursor::default())
    );
    assert!(!CaptureCursor::is_complete(&store).expect("complete"));
}

#[tokio::test]
async fn walk_starting_mid_collection_advances_to_the_box() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Store::open_in_memory().expect("store");
    let device = FakeDevice::new(vec![occupied(&[0]), occupied(&[3]), occupied(&[])]);

    let report = walk(
        &device,
        &store,
        dir.path(),
        CaptureCursor::new(1, 0),
        WalkLimits {
            max_boxes: 1,
            ..limits(None)
        },
    )
    .await;

    assert_eq!(report.captured, 1);
    assert_eq!(report.boxes, 1);
    assert_eq!(report.next, CaptureCursor::new(2, 0));
    assert!(store.record_by_key(RecordKey::new(0, 0)).expect("load").is_none());
    assert!(store.record_by_key(RecordKey::new(1, 3)).expect("load").is_some());
}

#[tokio::test]
async fn second_screen_can_be_skipped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Store::open_in_memory().expect("store");
    let device = FakeDevice::new(vec![occupied(&[4])]);

    walk(
        &device,
        &store,
        dir.path(),
        CaptureCursor::default(),
        WalkLimits {
            second_screen: false,
            ..limits(None)
        },
    )
    .await;

    let record = store
        .record_by_key(RecordKey::new(0, 4))
        .expect("load")
        .expect("record");
    assert!(record.detail_screenshot_path.is_some());
    assert!(record.detail_screenshot2_path.is_none());
}

#[tokio::test]
async fn navigate_taps_through_to_the_box_view() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Store::open_in_memory().expect("store");
    let device = FakeDevice::starting_at(vec![occupied(&[])], Screen::Launch);

    let comparator = DigestComparator;
    let walker = CaptureWalker::new(
        &device,
        &comparator,
        &store,
        ScreenLayout::default(),
        CaptureTiming::immediate(),
        dir.path(),
    )
    .await
    .expect("walker");
    walker.navigate().await.expect("navigate");

    assert_eq!(device.taps(), 2);
    assert_eq!(
        std::fs::read(dir.path().join("images/nav/03_boxes.png")).expect("nav shot"),
        b"box 0"
    );
}

#[test]
fn cursor_rolls_over_to_the_next_box() {
    assert_eq!(
        CaptureCursor::after(RecordKey::new(3, 28), 30),
        CaptureCursor::new(3, 29)
    );
    assert_eq!(
        CaptureCursor::after(RecordKey::new(3, 29), 30),
        CaptureCursor::new(4, 0)
    );
}

#[test]
fn cursor_round_trips_through_the_store() {
    let store = Store::open_in_memory().expect("store");
    assert_eq!(CaptureCursor::load(&store).expect("load"), CaptureCursor::default());

    CaptureCursor::new(7, 12).save(&store).expect("save");
    assert_eq!(CaptureCursor::load(&store).expect("load"), CaptureCursor::new(7, 12));
}
