use tracing::info;

use crate::config::StoreConfig;
use crate::eliminate::run_eliminate;
use crate::error::{Result, StrataError};
use crate::layout::StoreLayout;
use crate::manifest::Manifest;
use crate::stats::EliminateStats;

/// Eliminate the earliest retained version and commit the new count.
pub fn run(config: &StoreConfig) -> Result<EliminateStats> {
    let layout = StoreLayout::new(&config.path);
    let mut manifest = Manifest::load(&layout.manifest_path())?;
    if manifest.total_version == 0 {
        return Err(StrataError::Other(
            "store holds no versions, nothing to delete".into(),
        ));
    }
    info!(
        total_version = manifest.total_version,
        "deleting the earliest version"
    );
    let stats = run_eliminate(&layout, config, manifest.total_version)?;
    stats.report();

    manifest.total_version -= 1;
    manifest.save(&layout.manifest_path())?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_config;

    #[test]
    fn delete_on_empty_store_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir.path().join("store"), 4, 10);
        StoreLayout::new(&config.path).init_dirs().unwrap();
        assert!(run(&config).is_err());
    }

    #[test]
    fn delete_decrements_the_version_count() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir.path().join("store"), 4, 10);
        for (name, data) in [("v1", "AAAABBBB"), ("v2", "AAAACCCC")] {
            let input = dir.path().join(name);
            std::fs::write(&input, data).unwrap();
            crate::commands::write::run(&config, &input, true).unwrap();
        }

        run(&config).unwrap();

        let layout = StoreLayout::new(&config.path);
        let manifest = Manifest::load(&layout.manifest_path()).unwrap();
        assert_eq!(manifest.total_version, 1);
        // The surviving version restores under its new number.
        let out = dir.path().join("out");
        crate::commands::restore::run(&config, 1, &out).unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"AAAACCCC");
    }
}
