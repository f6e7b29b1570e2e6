use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::device::{PixelPoint, WindowSize};
use crate::model::SLOTS_PER_BOX;

/// A point expressed as fractions of the screen width and height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn to_pixels(self, size: WindowSize) -> PixelPoint {
        PixelPoint {
            x: (f64::from(size.width) * self.x) as i64,
            y: (f64::from(size.height) * self.y) as i64,
        }
    }
}

/// A rectangle in pixel coordinates of a screenshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Calibrated positions of everything the capture walk taps, as screen fractions.
///
/// Any field can be overridden from a JSON file; missing fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenLayout {
    pub grid_left: f64,
    pub grid_right: f64,
    pub grid_top: f64,
    pub grid_bottom: f64,
    pub grid_columns: u32,
    pub grid_rows: u32,
    pub next_box: ScreenPoint,
    pub close_detail: ScreenPoint,
    pub detail_scroll_from: ScreenPoint,
    pub detail_scroll_to: ScreenPoint,
    pub tap_to_start: ScreenPoint,
    pub pokemon_tab: ScreenPoint,
}

impl Default for ScreenLayout {
    fn default() -> Self {
        Self {
            grid_left: 0.05,
            grid_right: 0.95,
            grid_top: 0.18,
            grid_bottom: 0.82,
            grid_columns: 6,
            grid_rows: 5,
            next_box: ScreenPoint::new(0.92, 0.12),
            close_detail: ScreenPoint::new(0.50, 0.906),
            detail_scroll_from: ScreenPoint::new(0.50, 0.70),
            detail_scroll_to: ScreenPoint::new(0.50, 0.25),
            tap_to_start: ScreenPoint::new(0.50, 0.83),
            pokemon_tab: ScreenPoint::new(0.85, 0.09),
        }
    }
}

impl ScreenLayout {
    pub fn slots_per_box(&self) -> u32 {
        self.grid_columns * self.grid_rows
    }

    fn cell_size(&self) -> (f64, f64) {
        (
            (self.grid_right - self.grid_left) / f64::from(self.grid_columns.max(1)),
            (self.grid_bottom - self.grid_top) / f64::from(self.grid_rows.max(1)),
        )
    }

    /// Top-left corner of the slot's cell; slots run row-major from the top-left.
    fn cell_origin(&self, slot: u32) -> ScreenPoint {
        let columns = self.grid_columns.max(1);
        let (cell_width, cell_height) = self.cell_size();
        ScreenPoint::new(
            self.grid_left + cell_width * f64::from(slot % columns),
            self.grid_top + cell_height * f64::from(slot / columns),
        )
    }

    pub fn slot_center(&self, slot: u32) -> ScreenPoint {
        let origin = self.cell_origin(slot);
        let (cell_width, cell_height) = self.cell_size();
        ScreenPoint::new(origin.x + cell_width / 2.0, origin.y + cell_height / 2.0)
    }

    /// Pixel bounds of a slot cell inside a screenshot of the given size, clamped to the image.
    pub fn slot_cell(&self, slot: u32, image_width: u32, image_height: u32) -> PixelRect {
        let origin = self.cell_origin(slot);
        let (cell_width, cell_height) = self.cell_size();
        let to_px = |fraction: f64, extent: u32| {
            ((fraction * f64::from(extent)).round().max(0.0) as u32).min(extent)
        };

        let x = to_px(origin.x, image_width);
        let y = to_px(origin.y, image_height);
        let right = to_px(origin.x + cell_width, image_width);
        let bottom = to_px(origin.y + cell_height, image_height);
        PixelRect {
            x,
            y,
            width: right.saturating_sub(x),
            height: bottom.saturating_sub(y),
        }
    }

    pub fn matches_box_model(&self) -> bool {
        self.slots_per_box() == SLOTS_PER_BOX
    }
}

/// Fixed waits after each gesture. The app's screens animate, so settling is timed rather
/// than detected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureTiming {
    pub tap: Duration,
    pub detail: Duration,
    pub back: Duration,
    pub scroll: Duration,
    pub next_box: Duration,
    pub post_login: Duration,
}

impl Default for CaptureTiming {
    fn default() -> Self {
        Self {
            tap: Duration::from_millis(2000),
            detail: Duration::from_millis(2500),
            back: Duration::from_millis(1500),
            scroll: Duration::from_millis(1200),
            next_box: Duration::from_millis(2000),
            post_login: Duration::from_secs(14),
        }
    }
}

#[cfg(test)]
impl CaptureTiming {
    pub fn immediate() -> Self {
        Self {
            tap: Duration::ZERO,
            detail: Duration::ZERO,
            back: Duration::ZERO,
            scroll: Duration::ZERO,
            next_box: Duration::ZERO,
            post_login: Duration::ZERO,
        }
    }
}
