use super::BenchmarkStore;
use crate::benchmark::ProteinBenchmark;
use serde::{Deserialize, Serialize};
use std::{
    ffi::OsString,
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info};

/// current snapshot layout version
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Snapshot file not found")]
    NotFound,
    #[error("Failed to access snapshot file")]
    Io(#[from] std::io::Error),
    #[error("Failed to (de)serialize snapshot")]
    Format(#[from] serde_yaml::Error),
    #[error("Snapshot version {0} is newer than supported version {}", SNAPSHOT_VERSION)]
    UnsupportedVersion(u32),
}

#[derive(Serialize, Deserialize, Debug)]
struct Snapshot {
    version: u32,
    #[serde(default)]
    benchmarks: Vec<ProteinBenchmark>,
}

// borrowed counterpart of `Snapshot` so saving doesn't clone the store
#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    benchmarks: Vec<&'a ProteinBenchmark>,
}

/// Read a snapshot written by `write`, new benchmarks get `capacity`
pub fn read(path: &Path, capacity: usize) -> Result<BenchmarkStore, SnapshotError> {
    if !path.is_file() {
        return Err(SnapshotError::NotFound);
    }

    let snapshot: Snapshot = serde_yaml::from_reader(BufReader::new(File::open(path)?))?;
    if snapshot.version > SNAPSHOT_VERSION {
        return Err(SnapshotError::UnsupportedVersion(snapshot.version));
    }

    let store = BenchmarkStore::from_benchmarks(capacity, snapshot.benchmarks);
    info!(path = ?path, count = store.len(), "Loaded benchmark snapshot");

    Ok(store)
}

/// Write the whole store to `path`, replacing any older snapshot.
///
/// The snapshot is written next to `path` first and then renamed over it, a
/// failed write leaves the previous snapshot intact.
pub fn write(store: &BenchmarkStore, path: &Path) -> Result<(), SnapshotError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let temporary = temporary_path(path);
    let result = write_to(store, &temporary).and_then(|()| Ok(fs::rename(&temporary, path)?));

    if result.is_err() {
        // best effort, the temporary file may not even exist
        let _ = fs::remove_file(&temporary);
    } else {
        debug!(path = ?path, count = store.len(), "Wrote benchmark snapshot");
    }

    result
}

fn write_to(store: &BenchmarkStore, path: &Path) -> Result<(), SnapshotError> {
    let mut writer = BufWriter::new(File::create(path)?);

    serde_yaml::to_writer(
        &mut writer,
        &SnapshotRef {
            version: SNAPSHOT_VERSION,
            benchmarks: store.iter().collect(),
        },
    )?;
    writer.flush()?;
    writer.get_ref().sync_all()?;

    Ok(())
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut file_name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("snapshot"));
    file_name.push(".tmp");

    path.with_file_name(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::{UnitFrame, WorkUnit};
    use std::time::Duration;

    fn populated_store() -> BenchmarkStore {
        let mut store = BenchmarkStore::new(20);
        let mut unit = WorkUnit::new("nodeA", "/data", 1001);
        for percent in 0..=4 {
            unit.insert_frame(
                UnitFrame::new(percent, Duration::from_secs(u64::from(percent) * 60))
                    .unwrap()
                    .with_duration(Duration::from_secs(60 + u64::from(percent))),
            )
            .unwrap();
        }
        store.ingest(&unit, 0, 4).unwrap();

        let mut other = unit.clone();
        other.owner_name = "nodeB".to_owned();
        store.ingest(&other, 2, 3).unwrap();

        store
    }

    #[test]
    fn write_then_read() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("nested").join("cache.yaml");
        let store = populated_store();

        write(&store, &path).unwrap();
        let loaded = read(&path, 20).unwrap();

        assert_eq!(loaded, store);
        assert_eq!(
            loaded.iter().map(|b| b.key().clone()).collect::<Vec<_>>(),
            store.iter().map(|b| b.key().clone()).collect::<Vec<_>>()
        );
        assert!(!temporary_path(&path).exists());
    }

    #[test]
    fn missing_snapshot() {
        let directory = tempfile::tempdir().unwrap();

        assert!(matches!(
            read(&directory.path().join("absent.yaml"), 20),
            Err(SnapshotError::NotFound)
        ));
    }

    #[test]
    fn corrupt_snapshot() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("cache.yaml");
        fs::write(&path, "version: [this is not\n  a snapshot").unwrap();

        assert!(matches!(read(&path, 20), Err(SnapshotError::Format(_))));
    }

    #[test]
    fn future_snapshot_version() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("cache.yaml");
        fs::write(&path, "version: 99\nbenchmarks: []\n").unwrap();

        assert!(matches!(
            read(&path, 20),
            Err(SnapshotError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn huge_frame_times_are_read() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("cache.yaml");
        fs::write(
            &path,
            "version: 1
benchmarks:
- key: {owner_name: nodeA, owner_path: /data, project_id: 1001}
  frame_times:
  - {secs: 18446744073709551615, nanos: 0}
  - {secs: 18446744073709551615, nanos: 0}
",
        )
        .unwrap();

        let store = read(&path, 20).unwrap();
        let benchmark = store.iter().next().unwrap();

        assert_eq!(benchmark.average_frame_time(), Duration::from_secs(u64::MAX));
        assert_eq!(benchmark.minimum_frame_time(), Duration::ZERO);
    }

    #[test]
    fn duplicate_keys_are_merged_on_read() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("cache.yaml");
        let store = populated_store();
        write(&store, &path).unwrap();

        // append the first benchmark a second time
        let mut snapshot: Snapshot =
            serde_yaml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        snapshot.benchmarks.push(snapshot.benchmarks[0].clone());
        fs::write(&path, serde_yaml::to_string(&snapshot).unwrap()).unwrap();

        assert_eq!(read(&path, 20).unwrap().len(), store.len());
    }
}
