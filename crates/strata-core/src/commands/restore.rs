use std::path::Path;

use tracing::info;

use crate::config::StoreConfig;
use crate::error::{Result, StrataError};
use crate::layout::StoreLayout;
use crate::manifest::Manifest;
use crate::stats::RestoreStats;

/// Restore one retained version into `output_path`.
pub fn run(config: &StoreConfig, target_version: u64, output_path: &Path) -> Result<RestoreStats> {
    let layout = StoreLayout::new(&config.path);
    let manifest = Manifest::load(&layout.manifest_path())?;
    if manifest.total_version == 0 {
        return Err(StrataError::VersionNotFound {
            requested: target_version,
            available: 0,
        });
    }
    info!(
        target_version,
        max_version = manifest.total_version,
        "restoring"
    );
    let stats = crate::restore::run_restore(
        &layout,
        config,
        target_version,
        manifest.total_version,
        output_path,
    )?;
    stats.report();
    Ok(stats)
}
