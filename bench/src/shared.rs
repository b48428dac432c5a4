use crate::{
    benchmark::{BenchmarkKey, ProteinBenchmark},
    config::{BenchmarkConfig, CacheConfig},
    sink::CompletedUnitSink,
    store::{
        snapshot::{self, SnapshotError},
        BenchmarkStore, IngestOutcome, StoreError,
    },
    unit::UnitProgress,
};
use once_cell::sync::OnceCell;
use parking_lot::{lock_api::ArcMutexGuard, FairMutex, RawFairMutex};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{error, info, warn};

static INSTANCE: OnceCell<SharedBenchmarks> = OnceCell::new();

/// Process wide benchmark store.
///
/// Initialized on first access from `BenchmarkConfig::discover`, unless a
/// handle was installed before with `install`.
pub fn instance() -> SharedBenchmarks {
    INSTANCE
        .get_or_init(|| {
            let config = BenchmarkConfig::discover().unwrap_or_else(|error| {
                error!(error = ?error, "Failed to load config, using defaults: {error}");
                BenchmarkConfig::default()
            });

            SharedBenchmarks::open(&config.cache)
        })
        .clone()
}

/// Set the process wide store, returns the handle back if one is already set
pub fn install(benchmarks: SharedBenchmarks) -> Result<(), SharedBenchmarks> {
    INSTANCE.set(benchmarks)
}

#[derive(Debug, Clone)]
/// Transparent, thread safe wrapper over `InnerBenchmarks`
pub struct SharedBenchmarks(Arc<FairMutex<InnerBenchmarks>>);

#[derive(Debug)]
pub struct InnerBenchmarks {
    store: BenchmarkStore,
    path: PathBuf,
    sink: Option<Arc<dyn CompletedUnitSink>>,
}

impl SharedBenchmarks {
    pub fn new(inner: InnerBenchmarks) -> Self {
        Self(Arc::new(FairMutex::new(inner)))
    }

    fn lock(&self) -> ArcMutexGuard<RawFairMutex, InnerBenchmarks> {
        self.0.lock_arc()
    }

    /// Load the snapshot configured in `config`, starting empty if that fails
    pub fn open(config: &CacheConfig) -> Self {
        Self::new(InnerBenchmarks::load(config))
    }

    pub fn with_sink(self, sink: Arc<dyn CompletedUnitSink>) -> Self {
        self.lock().sink = Some(sink);
        self
    }

    pub fn path(&self) -> PathBuf {
        self.lock().path.clone()
    }

    /// Add frames `starting_frame..=ending_frame` of `unit` to its benchmark,
    /// notifies the sink if the range contained the final frame
    #[tracing::instrument(
        level = "debug",
        skip(self, unit),
        fields(owner = unit.owner_name(), project = unit.project_id())
    )]
    pub fn ingest(
        &self,
        unit: &dyn UnitProgress,
        starting_frame: i32,
        ending_frame: i32,
    ) -> Result<IngestOutcome, StoreError> {
        let (outcome, sink) = {
            let mut inner = self.lock();
            let outcome = inner.store.ingest(unit, starting_frame, ending_frame)?;

            (outcome, inner.sink.clone())
        };

        // the sink runs unlocked so it may call back into the store
        if outcome.completed {
            match sink {
                Some(sink) => sink.record_completed_unit(unit),
                None => warn!("Unit completed but no completed unit sink is set"),
            }
        }

        Ok(outcome)
    }

    pub fn average_duration(&self, key: &BenchmarkKey) -> Duration {
        self.lock().store.average_duration(key)
    }

    pub fn lookup(&self, key: &BenchmarkKey) -> Option<ProteinBenchmark> {
        self.lock().store.lookup(key).cloned()
    }

    /// rename all benchmarks of `old_name` and persist the result
    pub fn rename_owner(&self, old_name: &str, new_name: &str) -> Result<usize, StoreError> {
        let mut inner = self.lock();
        let renamed = inner.store.rename_owner(old_name, new_name)?;

        info!(renamed = renamed, "Renamed benchmark owner {old_name} to {new_name}");
        inner.save();

        Ok(renamed)
    }

    /// move all benchmarks of `owner_name` to `new_path` and persist the result
    pub fn update_owner_path(&self, owner_name: &str, new_path: &str) -> Result<usize, StoreError> {
        let mut inner = self.lock();
        let moved = inner.store.update_owner_path(owner_name, new_path)?;

        info!(moved = moved, "Moved benchmarks of {owner_name} to {new_path}");
        inner.save();

        Ok(moved)
    }

    pub fn distinct_project_ids(&self) -> Vec<i32> {
        self.lock().store.distinct_project_ids()
    }

    pub fn records_for_project(&self, project_id: i32) -> Vec<ProteinBenchmark> {
        self.lock()
            .store
            .records_for_project(project_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn records_for_owner(&self, owner_name: &str, owner_path: &str) -> Vec<ProteinBenchmark> {
        self.lock()
            .store
            .records_for_owner(owner_name, owner_path)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn owners(&self) -> Vec<(String, String)> {
        self.lock().store.owners()
    }

    /// copies of all benchmarks in insertion order
    pub fn benchmarks(&self) -> Vec<ProteinBenchmark> {
        self.lock().store.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().store.is_empty()
    }

    /// Write the store to its snapshot file, returns false if that failed
    pub fn save(&self) -> bool {
        self.lock().save()
    }

    /// Replace the store with the snapshot on disk, keeps the current state if
    /// the snapshot can't be read
    pub fn reload(&self) -> bool {
        let mut inner = self.lock();

        match snapshot::read(&inner.path, inner.store.capacity()) {
            Ok(store) => {
                inner.store = store;
                true
            }
            Err(error) => {
                warn!(path = ?inner.path, error = ?error, "Keeping benchmarks in memory: {error}");
                false
            }
        }
    }

    /// drop every benchmark and persist the empty store
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.store.clear();

        info!("Cleared all benchmarks");
        inner.save();
    }

    pub fn refresh_minimum_frame_times(&self) {
        let mut inner = self.lock();
        inner.store.refresh_minimum_frame_times();
        inner.save();
    }

    /// final save before the handle goes away
    pub fn close(self) -> bool {
        let saved = self.save();

        if Arc::strong_count(&self.0) > 1 {
            warn!("Closing benchmarks while other handles are still alive");
        }

        saved
    }
}

impl InnerBenchmarks {
    pub fn new(store: BenchmarkStore, path: PathBuf) -> Self {
        Self {
            store,
            path,
            sink: None,
        }
    }

    pub fn load(config: &CacheConfig) -> Self {
        let store = match snapshot::read(&config.path, config.capacity) {
            Ok(store) => store,
            Err(SnapshotError::NotFound) => {
                info!(path = ?config.path, "No benchmark snapshot found, starting empty");
                BenchmarkStore::new(config.capacity)
            }
            Err(error) => {
                error!(path = ?config.path, error = ?error, "Failed to load benchmark snapshot, starting empty: {error}");
                BenchmarkStore::new(config.capacity)
            }
        };

        Self::new(store, config.path.clone())
    }

    fn save(&self) -> bool {
        match snapshot::write(&self.store, &self.path) {
            Ok(()) => true,
            Err(error) => {
                error!(path = ?self.path, error = ?error, "Failed to save benchmarks: {error}");
                false
            }
        }
    }
}
