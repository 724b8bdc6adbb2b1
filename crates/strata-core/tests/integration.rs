//! End-to-end lifecycle tests: ingest → arrange → restore → eliminate,
//! driven through the public command layer the way the CLI drives it.

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use strata_core::commands;
use strata_core::config::{BufferConfig, ChunkerConfig, ChunkerMethod, StoreConfig};
use strata_core::manifest::Manifest;
use strata_core::layout::StoreLayout;

struct TestStore {
    dir: tempfile::TempDir,
    config: StoreConfig,
}

impl TestStore {
    fn new(method: ChunkerMethod, except_size: u32, retention: u64) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = StoreConfig {
            path: dir.path().join("store"),
            retention,
            chunker: ChunkerConfig {
                method,
                except_size,
            },
            buffers: BufferConfig {
                category_write: 256,
                recipe_write: 256,
                record_read: 256,
                volume_write: 256,
                sync_flush_interval: 2,
                queue_depth: 16,
            },
        };
        Self { dir, config }
    }

    fn write_version(&self, name: &str, data: &[u8]) {
        let input = self.dir.path().join(name);
        std::fs::write(&input, data).expect("write input");
        commands::write::run(&self.config, &input, true).expect("write version");
    }

    fn restore(&self, version: u64) -> Vec<u8> {
        let out = self.dir.path().join(format!("restored-{version}"));
        commands::restore::run(&self.config, version, &out).expect("restore version");
        std::fs::read(&out).expect("read restored file")
    }

    fn manifest(&self) -> Manifest {
        commands::status::run(&self.config).expect("status")
    }

    fn layout(&self) -> StoreLayout {
        StoreLayout::new(&self.config.path)
    }

    fn input_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

/// 50 KB of pseudo-random bytes with an 8 KB block repeated at two offsets.
fn random_with_repeated_block(seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; 50 * 1024];
    rng.fill(&mut data[..]);
    let block: Vec<u8> = data[0..8 * 1024].to_vec();
    data[20 * 1024..28 * 1024].copy_from_slice(&block);
    data
}

#[test]
fn single_version_roundtrip_random_data() {
    let store = TestStore::new(ChunkerMethod::Gear, 4096, 10);
    let data = random_with_repeated_block(1);
    store.write_version("v1", &data);
    assert_eq!(store.restore(1), data, "restored bytes differ from input");
}

#[test]
fn fixed_chunking_dedup_scenario() {
    // V1 and V2 share their first half; restoring either must give back
    // exactly its own bytes.
    let store = TestStore::new(ChunkerMethod::Fixed, 4, 10);
    store.write_version("v1", b"AAAABBBB");
    store.write_version("v2", b"AAAACCCC");

    assert_eq!(store.restore(2), b"AAAACCCC");
    assert_eq!(store.restore(1), b"AAAABBBB");
    assert_eq!(store.manifest().total_version, 2);
}

#[test]
fn every_version_of_a_long_history_is_restorable() {
    let store = TestStore::new(ChunkerMethod::Gear, 4096, 10);
    let mut rng = StdRng::seed_from_u64(99);

    // Each version mutates a slice of the previous one, a backup-like
    // workload with high adjacent overlap.
    let mut current = vec![0u8; 64 * 1024];
    rng.fill(&mut current[..]);
    let mut versions = Vec::new();
    for i in 0..5 {
        let start = (i * 9 * 1024) % (current.len() - 4096);
        rng.fill(&mut current[start..start + 4096]);
        versions.push(current.clone());
        store.write_version(&format!("v{i}"), &current);
    }

    for (i, expected) in versions.iter().enumerate() {
        assert_eq!(
            &store.restore(i as u64 + 1),
            expected,
            "version {} corrupted",
            i + 1
        );
    }
}

#[test]
fn rabin_chunking_roundtrip() {
    let store = TestStore::new(ChunkerMethod::Rabin, 8192, 10);
    let data = random_with_repeated_block(7);
    store.write_version("v1", &data);
    store.write_version("v2", &data);
    assert_eq!(store.restore(1), data);
    assert_eq!(store.restore(2), data);
}

#[test]
fn elimination_shifts_version_numbering() {
    let store = TestStore::new(ChunkerMethod::Fixed, 4, 10);
    store.write_version("v1", b"AAAABBBB");
    store.write_version("v2", b"AAAACCCC");
    store.write_version("v3", b"CCCCDDDD");

    let old_v2 = store.restore(2);
    let old_v3 = store.restore(3);

    commands::delete::run(&store.config).expect("delete earliest");

    assert_eq!(store.manifest().total_version, 2);
    // Restoring k-1 under the new numbering equals k under the old.
    assert_eq!(store.restore(1), old_v2);
    assert_eq!(store.restore(2), old_v3);
}

#[test]
fn retention_expires_oldest_automatically() {
    let store = TestStore::new(ChunkerMethod::Fixed, 4, 3);
    let contents: [&[u8]; 5] = [b"AAAABBBB", b"AAAACCCC", b"AAAADDDD", b"EEEEDDDD", b"EEEEFFFF"];
    for (i, data) in contents.iter().enumerate() {
        store.write_version(&format!("v{i}"), data);
    }

    let manifest = store.manifest();
    assert_eq!(manifest.total_version, 3, "retention must cap the store");

    // The retained window is the last three logical versions.
    assert_eq!(store.restore(1), contents[2]);
    assert_eq!(store.restore(2), contents[3]);
    assert_eq!(store.restore(3), contents[4]);
}

#[test]
fn deep_history_with_retention_and_random_data() {
    let store = TestStore::new(ChunkerMethod::Gear, 4096, 4);
    let mut rng = StdRng::seed_from_u64(4242);

    let mut current = vec![0u8; 40 * 1024];
    rng.fill(&mut current[..]);
    let mut versions: Vec<Vec<u8>> = Vec::new();
    for i in 0..7 {
        let start = (i * 5 * 1024) % (current.len() - 2048);
        rng.fill(&mut current[start..start + 2048]);
        versions.push(current.clone());
        store.write_version(&format!("v{i}"), &current);
    }

    assert_eq!(store.manifest().total_version, 4);
    // Retained window: logical versions 4..=7 as store versions 1..=4.
    for (slot, logical) in (3..7).enumerate() {
        assert_eq!(
            store.restore(slot as u64 + 1),
            versions[logical],
            "retained slot {} (logical version {})",
            slot + 1,
            logical + 1
        );
    }
}

#[test]
fn recipe_corruption_is_detected() {
    let store = TestStore::new(ChunkerMethod::Fixed, 4, 10);
    store.write_version("v1", b"AAAABBBB");

    // Truncate the recipe to a non-multiple of the header size.
    let recipe = store.layout().recipe_path(1);
    let mut bytes = std::fs::read(&recipe).unwrap();
    bytes.truncate(bytes.len() - 3);
    std::fs::write(&recipe, &bytes).unwrap();

    let out = store.input_path("out");
    let err = commands::restore::run(&store.config, 1, &out).unwrap_err();
    assert!(
        err.to_string().contains("not a whole number"),
        "unexpected error: {err}"
    );
}

#[test]
fn status_on_missing_store_is_bootstrapped() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        path: dir.path().join("store"),
        retention: 5,
        chunker: ChunkerConfig {
            method: ChunkerMethod::Fixed,
            except_size: 4096,
        },
        buffers: BufferConfig::default(),
    };
    let manifest = commands::status::run(&config).expect("status on empty store");
    assert_eq!(manifest.total_version, 0);
    assert_eq!(manifest.arrangement_fall_behind, 0);
}

fn volume_payload_length(path: &Path) -> u64 {
    let bytes = std::fs::read(path).expect("read volume");
    let count = u64::from_le_bytes(bytes[..8].try_into().unwrap()) as usize;
    bytes.len() as u64 - 8 - 8 * count as u64
}

#[test]
fn volume_sizes_match_offset_tables() {
    let store = TestStore::new(ChunkerMethod::Fixed, 4, 10);
    store.write_version("v1", b"AAAABBBB");
    store.write_version("v2", b"AAAACCCC");
    store.write_version("v3", b"AAAADDDD");

    // Volumes 1 and 2 exist; each one's payload length equals the sum of
    // its offset-table entries (the arrangement accounting identity,
    // checked against the bytes actually on disk).
    for volume_id in 1..=2u64 {
        let path = store.layout().volume_path(volume_id);
        let bytes = std::fs::read(&path).expect("read volume");
        let count = u64::from_le_bytes(bytes[..8].try_into().unwrap()) as usize;
        let mut table_sum = 0u64;
        for i in 0..count {
            let start = 8 + i * 8;
            table_sum += u64::from_le_bytes(bytes[start..start + 8].try_into().unwrap());
        }
        assert_eq!(
            volume_payload_length(&path),
            table_sum,
            "volume {volume_id} payload does not match its offset table"
        );
    }
}
