//! Rolling per-frame benchmarks for monitored folding clients.
//!
//! Every client (name + install path) working on a project gets a
//! [`ProteinBenchmark`] holding its most recent frame times. The
//! [`SharedBenchmarks`] handle guards the store with a single lock and keeps
//! it persisted as a YAML snapshot between runs.

pub mod benchmark;
pub mod config;
pub mod shared;
pub mod sink;
pub mod store;
pub mod unit;

pub use benchmark::{BenchmarkKey, ProteinBenchmark};
pub use shared::{instance, install, SharedBenchmarks};
pub use sink::{CompletedUnitSink, LogSink};
pub use store::{BenchmarkStore, IngestOutcome, StoreError};
pub use unit::{UnitFrame, UnitProgress, WorkUnit};
