use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use image::DynamicImage;
use tracing::{info, warn};

use crate::cli::SpritesArgs;
use crate::commands::capture::ScreenLayout;
use crate::model::RecordKey;
use crate::store::{RecordUpdate, Store};
use crate::util::{ensure_directory, read_json};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpriteReport {
    pub cropped: usize,
    pub missing_boxes: usize,
}

pub fn run(args: SpritesArgs) -> Result<()> {
    let store = Store::open_existing(&args.paths.db_path())?;
    let layout = match &args.layout {
        Some(path) => read_json(path)?,
        None => ScreenLayout::default(),
    };

    let report = crop_sprites(&store, &layout, &args.paths.collection_root)?;
    info!(
        cropped = report.cropped,
        missing_boxes = report.missing_boxes,
        "sprite cropping finished"
    );
    Ok(())
}

/// Crops every record's slot cell out of its box screenshot into
/// `images/sprites/box_NNN_slot_SS.png` and stores the sprite path.
pub fn crop_sprites(
    store: &Store,
    layout: &ScreenLayout,
    collection_root: &Path,
) -> Result<SpriteReport> {
    ensure_directory(&collection_root.join("images").join("sprites"))?;

    let mut report = SpriteReport::default();
    let mut boxes: HashMap<String, Option<DynamicImage>> = HashMap::new();

    for (key, box_path) in store.records_missing_sprites()? {
        let image = boxes
            .entry(box_path.clone())
            .or_insert_with(|| load_box(&collection_root.join(&box_path)));
        let Some(image) = image else {
            report.missing_boxes += 1;
            continue;
        };

        let relative = sprite_path(key);
        let cell = layout.slot_cell(key.box_slot, image.width(), image.height());
        let sprite = image.crop_imm(cell.x, cell.y, cell.width, cell.height);
        let target = collection_root.join(&relative);
        sprite
            .save(&target)
            .with_context(|| format!("failed to write sprite {}", target.display()))?;

        let mut update = RecordUpdate::new(key);
        update.set_text("sprite_path", relative)?;
        store.upsert_record(&update)?;
        report.cropped += 1;
    }

    Ok(report)
}

fn load_box(path: &Path) -> Option<DynamicImage> {
    match image::open(path) {
        Ok(image) => Some(image),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "cannot read box screenshot");
            None
        }
    }
}

pub fn sprite_path(key: RecordKey) -> String {
    format!(
        "images/sprites/box_{:03}_slot_{:02}.png",
        key.box_number, key.box_slot
    )
}
