use anyhow::Result;
use tracing::info;

use crate::cli::{CollectionPaths, InitArgs};
use crate::store::Store;
use crate::util::ensure_directory;

pub const IMAGE_SUBDIRS: &[&str] = &["boxes", "detail", "sprites", "nav"];

pub fn run(args: InitArgs) -> Result<()> {
    let store = prepare_collection(&args.paths)?;
    info!(
        db = %store.path().display(),
        images = %args.paths.images_dir().display(),
        "collection initialized"
    );
    Ok(())
}

/// Creates the image directories and opens (creating if needed) the database.
pub fn prepare_collection(paths: &CollectionPaths) -> Result<Store> {
    let images_dir = paths.images_dir();
    for subdir in IMAGE_SUBDIRS {
        ensure_directory(&images_dir.join(subdir))?;
    }
    Store::open(&paths.db_path())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_collection_creates_directories_and_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = CollectionPaths {
            collection_root: dir.path().join("collection"),
            db_path: None,
        };

        prepare_collection(&paths).expect("prepare");

        for subdir in IMAGE_SUBDIRS {
            assert!(paths.images_dir().join(subdir).is_dir());
        }
        assert!(paths.db_path().is_file());
    }
}
