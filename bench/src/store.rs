pub mod snapshot;


use crate::{
    benchmark::{BenchmarkKey, ProteinBenchmark, DEFAULT_CAPACITY},
    unit::{UnitProgress, MAX_PERCENT},
};
use itertools::Itertools;
use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Benchmark owner name must not be empty")]
    InvalidKey,
    #[error("Frame range {0}..={1} is outside of 0..=100")]
    FrameOutOfRange(i32, i32),
    #[error("Benchmark {0} already exists")]
    KeyCollision(BenchmarkKey),
}

/// What a single `ingest` call did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    /// frame times appended to the benchmark
    pub appended: usize,
    /// percents in range without a usable frame
    pub skipped: usize,
    /// the 100% frame was part of the range
    pub completed: bool,
}

/// All benchmarks, in insertion order, with a key index on top.
///
/// The store itself is not synchronized, see `SharedBenchmarks` for the
/// guarded handle used by the rest of the application.
#[derive(Debug, Clone)]
pub struct BenchmarkStore {
    benchmarks: Vec<ProteinBenchmark>,
    index: HashMap<BenchmarkKey, usize>,
    capacity: usize,
}

impl Default for BenchmarkStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl PartialEq for BenchmarkStore {
    fn eq(&self, other: &Self) -> bool {
        self.benchmarks == other.benchmarks
    }
}

impl BenchmarkStore {
    /// empty store, new benchmarks keep at most `capacity` frame times
    pub fn new(capacity: usize) -> Self {
        Self {
            benchmarks: Vec::new(),
            index: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Build a store from already existing benchmarks, e.g. a loaded snapshot.
    ///
    /// Duplicate keys are dropped (first one wins) so the key index stays unique.
    pub fn from_benchmarks(
        capacity: usize,
        benchmarks: impl IntoIterator<Item = ProteinBenchmark>,
    ) -> Self {
        let mut store = Self::new(capacity);

        for mut benchmark in benchmarks {
            if store.index.contains_key(benchmark.key()) {
                warn!(key = %benchmark.key(), "Dropping duplicate benchmark");
                continue;
            }

            benchmark.restore();
            store.index.insert(benchmark.key().clone(), store.benchmarks.len());
            store.benchmarks.push(benchmark);
        }

        store
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.benchmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.benchmarks.is_empty()
    }

    /// all benchmarks in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &ProteinBenchmark> {
        self.benchmarks.iter()
    }

    pub fn lookup(&self, key: &BenchmarkKey) -> Option<&ProteinBenchmark> {
        self.index.get(key).map(|&position| &self.benchmarks[position])
    }

    /// average frame time for `key`, zero if no such benchmark exists
    pub fn average_duration(&self, key: &BenchmarkKey) -> Duration {
        self.lookup(key)
            .map(ProteinBenchmark::average_frame_time)
            .unwrap_or_default()
    }

    /// Add the frames `starting_frame..=ending_frame` of `unit` to its benchmark.
    ///
    /// A reversed range means the client made no progress since the last poll
    /// and is ignored. Missing frames are logged and skipped.
    pub fn ingest(
        &mut self,
        unit: &dyn UnitProgress,
        starting_frame: i32,
        ending_frame: i32,
    ) -> Result<IngestOutcome, StoreError> {
        let mut outcome = IngestOutcome::default();

        if starting_frame > ending_frame {
            debug!(
                owner = unit.owner_name(),
                project = unit.project_id(),
                "No new frames ({starting_frame} > {ending_frame})"
            );

            return Ok(outcome);
        }

        if unit.owner_name().is_empty() {
            return Err(StoreError::InvalidKey);
        }

        if starting_frame < 0 || ending_frame > i32::from(MAX_PERCENT) {
            return Err(StoreError::FrameOutOfRange(starting_frame, ending_frame));
        }

        let key = BenchmarkKey::new(unit.owner_name(), unit.owner_path(), unit.project_id());

        // both bounds are within 0..=100 at this point
        for percent in (starting_frame as u8)..=(ending_frame as u8) {
            let frame = match unit.frame(percent) {
                Some(frame) => frame,
                None => {
                    warn!(key = %key, percent = percent, "Frame missing, skipping");
                    outcome.skipped += 1;
                    continue;
                }
            };

            // completion is observed even if the final frame can't be timed
            if frame.percent() == MAX_PERCENT {
                outcome.completed = true;
            }

            let duration = match frame.frame_duration() {
                Some(duration) => duration,
                None => {
                    warn!(key = %key, percent = percent, "Frame has no duration, skipping");
                    outcome.skipped += 1;
                    continue;
                }
            };

            self.entry(&key).push_frame_time(duration);
            outcome.appended += 1;
        }

        Ok(outcome)
    }

    /// Rename every benchmark of `old_name` to `new_name`.
    ///
    /// Either all benchmarks are renamed or, if any of them would collide with
    /// an existing benchmark, none are. Returns the number of renamed benchmarks.
    pub fn rename_owner(&mut self, old_name: &str, new_name: &str) -> Result<usize, StoreError> {
        if new_name.is_empty() {
            return Err(StoreError::InvalidKey);
        }
        if old_name == new_name {
            return Ok(0);
        }

        self.rekey(
            |benchmark| benchmark.owner_name() == old_name,
            |key| key.owner_name = new_name.to_owned(),
            |benchmark| benchmark.set_owner_name(new_name),
        )
    }

    /// Move every benchmark of `owner_name` to `new_path`, same rules as `rename_owner`
    pub fn update_owner_path(
        &mut self,
        owner_name: &str,
        new_path: &str,
    ) -> Result<usize, StoreError> {
        self.rekey(
            |benchmark| benchmark.owner_name() == owner_name && benchmark.owner_path() != new_path,
            |key| key.owner_path = new_path.to_owned(),
            |benchmark| benchmark.set_owner_path(new_path),
        )
    }

    /// ascending, deduplicated project ids
    pub fn distinct_project_ids(&self) -> Vec<i32> {
        self.benchmarks
            .iter()
            .map(ProteinBenchmark::project_id)
            .sorted()
            .dedup()
            .collect_vec()
    }

    /// benchmarks for `project_id` in insertion order
    pub fn records_for_project(&self, project_id: i32) -> Vec<&ProteinBenchmark> {
        self.benchmarks
            .iter()
            .filter(|benchmark| benchmark.project_id() == project_id)
            .collect_vec()
    }

    /// benchmarks of one client in insertion order
    pub fn records_for_owner(&self, owner_name: &str, owner_path: &str) -> Vec<&ProteinBenchmark> {
        self.benchmarks
            .iter()
            .filter(|benchmark| {
                benchmark.owner_name() == owner_name && benchmark.owner_path() == owner_path
            })
            .collect_vec()
    }

    /// distinct (name, path) pairs in order of first appearance
    pub fn owners(&self) -> Vec<(String, String)> {
        self.benchmarks
            .iter()
            .map(|benchmark| {
                (
                    benchmark.owner_name().to_owned(),
                    benchmark.owner_path().to_owned(),
                )
            })
            .unique()
            .collect_vec()
    }

    pub fn refresh_minimum_frame_times(&mut self) {
        self.benchmarks
            .iter_mut()
            .for_each(ProteinBenchmark::refresh_minimum_frame_time);
    }

    /// drop every benchmark
    pub fn clear(&mut self) {
        self.benchmarks.clear();
        self.index.clear();
    }

    fn entry(&mut self, key: &BenchmarkKey) -> &mut ProteinBenchmark {
        let position = match self.index.get(key) {
            Some(&position) => position,
            None => {
                info!(key = %key, "Creating benchmark");
                self.benchmarks
                    .push(ProteinBenchmark::new(key.clone(), self.capacity));
                self.index.insert(key.clone(), self.benchmarks.len() - 1);
                self.benchmarks.len() - 1
            }
        };

        &mut self.benchmarks[position]
    }

    // Change the key of every matching benchmark, all or nothing
    fn rekey(
        &mut self,
        matches: impl Fn(&ProteinBenchmark) -> bool,
        change_key: impl Fn(&mut BenchmarkKey),
        apply: impl Fn(&mut ProteinBenchmark),
    ) -> Result<usize, StoreError> {
        let selected = self
            .benchmarks
            .iter()
            .positions(|benchmark| matches(benchmark))
            .collect_vec();

        if selected.is_empty() {
            return Ok(0);
        }

        // new keys must be unique among themselves and may only collide with
        // benchmarks that are moved as well
        let mut new_keys = HashSet::with_capacity(selected.len());
        for &position in selected.iter() {
            let mut key = self.benchmarks[position].key().clone();
            change_key(&mut key);

            let taken = match self.index.get(&key) {
                Some(existing) => selected.binary_search(existing).is_err(),
                None => false,
            };
            if taken || new_keys.contains(&key) {
                return Err(StoreError::KeyCollision(key));
            }
            new_keys.insert(key);
        }

        for &position in selected.iter() {
            apply(&mut self.benchmarks[position]);
        }
        self.reindex();

        debug!(count = selected.len(), "Rekeyed benchmarks");

        Ok(selected.len())
    }

    fn reindex(&mut self) {
        self.index = self
            .benchmarks
            .iter()
            .enumerate()
            .map(|(position, benchmark)| (benchmark.key().clone(), position))
            .collect();
    }
}
