use std::path::Path;

use tracing::info;

use crate::arrange::run_arrange;
use crate::config::StoreConfig;
use crate::eliminate::run_eliminate;
use crate::error::Result;
use crate::index::DedupIndex;
use crate::layout::StoreLayout;
use crate::manifest::Manifest;
use crate::pipeline::run_ingest;
use crate::stats::IngestStats;

/// Ingest one file as the next version.
///
/// The cycle is: ingest → arrange the previous generation (or record the
/// fall-behind) → roll the index → retention-expire the oldest version →
/// save index → write manifest. The manifest write is the commit point; a
/// crash before it leaves the previously committed store state intact.
pub fn run(config: &StoreConfig, input: &Path, apply_arrangement: bool) -> Result<IngestStats> {
    let layout = StoreLayout::new(&config.path);
    layout.init_dirs()?;

    let mut manifest = Manifest::load(&layout.manifest_path())?;
    let index = if manifest.total_version == 0 {
        DedupIndex::new()
    } else {
        DedupIndex::load(&layout.index_path())?
    };

    let version = manifest.total_version + 1;
    info!(version, input = %input.display(), "backing up");

    let stats = run_ingest(&layout, config, &index, input, version)?;
    stats.report();

    if apply_arrangement {
        run_arrange(
            &layout,
            config,
            &index,
            version - 1,
            manifest.arrangement_fall_behind == 0,
        )?
        .report();
    } else {
        manifest.arrangement_fall_behind += 1;
        info!(
            fall_behind = manifest.arrangement_fall_behind,
            "arrangement disabled for this cycle"
        );
    }

    index.roll();

    let mut total_version = version;
    if total_version > config.retention {
        info!(
            total_version,
            retention = config.retention,
            "retention exceeded, eliminating the oldest version"
        );
        run_eliminate(&layout, config, total_version)?.report();
        total_version -= 1;
    }

    index.save(&layout.index_path())?;
    manifest.total_version = total_version;
    manifest.save(&layout.manifest_path())?;

    Ok(stats)
}
