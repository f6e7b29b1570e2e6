use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Slots per box: 6 columns by 5 rows, row-major.
pub const SLOTS_PER_BOX: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub box_number: u32,
    pub box_slot: u32,
}

impl RecordKey {
    pub fn new(box_number: u32, box_slot: u32) -> Self {
        Self {
            box_number,
            box_slot,
        }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "box={} slot={}", self.box_number, self.box_slot)
    }
}

/// One entry of a queue or batch file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    #[serde(rename = "box")]
    pub box_number: u32,
    #[serde(rename = "slot")]
    pub box_slot: u32,
    pub image_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path2: Option<PathBuf>,
}

impl QueueItem {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.box_number, self.box_slot)
    }
}

/// A record waiting for extraction, as stored (paths relative to the collection root).
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRecord {
    pub key: RecordKey,
    pub detail_screenshot_path: String,
    pub detail_screenshot2_path: Option<String>,
}

impl PendingRecord {
    pub fn to_queue_item(&self, collection_root: &Path) -> QueueItem {
        QueueItem {
            box_number: self.key.box_number,
            box_slot: self.key.box_slot,
            image_path: collection_root.join(&self.detail_screenshot_path),
            image_path2: self
                .detail_screenshot2_path
                .as_ref()
                .map(|path| collection_root.join(path)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub box_number: u32,
    pub box_slot: u32,

    pub species_name: Option<String>,
    pub dex_number: Option<i64>,
    pub form_name: Option<String>,
    pub nickname: Option<String>,
    pub level: Option<i64>,
    pub nature: Option<String>,
    pub ability: Option<String>,
    pub is_shiny: Option<bool>,
    pub gender: Option<String>,
    pub held_item: Option<String>,
    pub mark: Option<String>,

    pub iv_hp: Option<i64>,
    pub iv_atk: Option<i64>,
    pub iv_def: Option<i64>,
    pub iv_spatk: Option<i64>,
    pub iv_spdef: Option<i64>,
    pub iv_speed: Option<i64>,

    pub ev_hp: Option<i64>,
    pub ev_atk: Option<i64>,
    pub ev_def: Option<i64>,
    pub ev_spatk: Option<i64>,
    pub ev_spdef: Option<i64>,
    pub ev_speed: Option<i64>,

    pub move1: Option<String>,
    pub move2: Option<String>,
    pub move3: Option<String>,
    pub move4: Option<String>,

    pub original_trainer: Option<String>,
    pub trainer_id: Option<String>,
    pub game_of_origin: Option<String>,
    pub ball_type: Option<String>,

    pub date_caught: Option<String>,
    pub met_at_level: Option<i64>,
    pub met_at_location: Option<String>,

    pub box_screenshot_path: Option<String>,
    pub detail_screenshot_path: Option<String>,
    pub detail_screenshot2_path: Option<String>,
    pub sprite_path: Option<String>,

    pub captured_at: Option<String>,
    pub parsed_at: Option<String>,
    pub raw_json: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub text: Option<String>,
    pub shiny: Option<bool>,
    pub trainer: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

/// Compact row returned by list queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordSummary {
    pub id: i64,
    pub box_number: u32,
    pub box_slot: u32,
    pub species_name: Option<String>,
    pub dex_number: Option<i64>,
    pub form_name: Option<String>,
    pub nickname: Option<String>,
    pub level: Option<i64>,
    pub nature: Option<String>,
    pub is_shiny: Option<bool>,
    pub gender: Option<String>,
    pub original_trainer: Option<String>,
    pub trainer_id: Option<String>,
    pub ball_type: Option<String>,
    pub detail_screenshot_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordPage {
    pub total: i64,
    pub items: Vec<RecordSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainerCount {
    pub original_trainer: String,
    pub n: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionStats {
    pub total: i64,
    pub shiny: i64,
    pub top_trainers: Vec<TrainerCount>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub total: i64,
    pub with_screenshot: i64,
    pub parsed: i64,
}

impl StoreCounts {
    pub fn remaining(&self) -> i64 {
        (self.with_screenshot - self.parsed).max(0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub ok: usize,
    pub errors: usize,
    pub skipped: usize,
    pub missing: usize,
    pub elapsed_secs: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChunkReport {
    pub pending: usize,
    pub excluded: usize,
    pub chunks: usize,
    pub written: usize,
    pub kept_existing: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub files: usize,
    pub imported: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchFileCounts {
    pub input: usize,
    pub output: usize,
    pub imported: usize,
}
