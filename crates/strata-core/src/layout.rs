use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Maps logical store objects to paths and owns the triangular category
/// numbering.
///
/// Version `v` owns categories `v(v-1)/2 + 1 ..= v(v+1)/2` — one category
/// per retained version it was deduplicated against, so generation `v`
/// holds `v` categories at positions `1..=v`.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Create the store directory skeleton.
    pub fn init_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(self.recipes_dir())?;
        std::fs::create_dir_all(self.storage_dir())?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn recipes_dir(&self) -> PathBuf {
        self.root.join("recipes")
    }

    fn storage_dir(&self) -> PathBuf {
        self.root.join("storage")
    }

    pub fn recipe_path(&self, version: u64) -> PathBuf {
        self.recipes_dir().join(format!("Recipe{version}"))
    }

    pub fn category_path(&self, class_id: u64) -> PathBuf {
        self.storage_dir().join(format!("Category{class_id}"))
    }

    pub fn category_append_path(&self, class_id: u64) -> PathBuf {
        self.storage_dir().join(format!("Category{class_id}_append"))
    }

    pub fn volume_path(&self, version: u64) -> PathBuf {
        self.storage_dir().join(format!("Volume{version}"))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("manifest")
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join("kvstore")
    }
}

/// Category ids owned by `version` (inclusive range of `version` ids).
pub fn category_range(version: u64) -> RangeInclusive<u64> {
    let start = version * (version - 1) / 2 + 1;
    let end = version * (version + 1) / 2;
    start..=end
}

/// First category id of `version`'s generation.
pub fn base_category(version: u64) -> u64 {
    version * (version - 1) / 2 + 1
}

/// The category id at 1-based `position` within `version`'s generation.
pub fn category_at(version: u64, position: u64) -> u64 {
    debug_assert!(position >= 1 && position <= version);
    base_category(version) + position - 1
}
