use std::path::Path;

use tracing::debug;

use crate::error::{Result, StrataError};
use crate::storage::local::{atomic_write, read_file};

/// On-disk size of the manifest record.
const MANIFEST_LEN: usize = 16;

/// The store's sole durable checkpoint: how many versions exist, and how
/// many arrangement cycles were deliberately skipped.
///
/// Written atomically at the end of each successful ingestion or deletion;
/// a crash before the rewrite leaves the prior committed state intact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Manifest {
    pub total_version: u64,
    pub arrangement_fall_behind: u64,
}

impl Manifest {
    /// Load the manifest. Missing file bootstraps an empty store; a file of
    /// the wrong size is fatal corruption, not an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        let data = match read_file(path) {
            Ok(data) => data,
            Err(e) if e.is_not_found() => {
                debug!("no manifest, bootstrapping an empty store");
                return Ok(Self::default());
            }
            Err(e) => return Err(e),
        };
        if data.len() != MANIFEST_LEN {
            return Err(StrataError::InvalidFormat(format!(
                "manifest is {} bytes, expected {MANIFEST_LEN}",
                data.len()
            )));
        }
        Ok(Self {
            total_version: u64::from_le_bytes(data[..8].try_into().expect("8-byte slice")),
            arrangement_fall_behind: u64::from_le_bytes(
                data[8..16].try_into().expect("8-byte slice"),
            ),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut out = [0u8; MANIFEST_LEN];
        out[..8].copy_from_slice(&self.total_version.to_le_bytes());
        out[8..].copy_from_slice(&self.arrangement_fall_behind.to_le_bytes());
        atomic_write(path, &out)?;
        debug!(
            total_version = self.total_version,
            fall_behind = self.arrangement_fall_behind,
            "saved manifest"
        );
        Ok(())
    }
}
