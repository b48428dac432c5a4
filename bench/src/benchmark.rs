use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, fmt, time::Duration};

/// number of frame times kept per benchmark unless configured otherwise
pub const DEFAULT_CAPACITY: usize = 300;

/// Identity of a benchmark: which client (name + install path) ran which project
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BenchmarkKey {
    pub owner_name: String,
    pub owner_path: String,
    pub project_id: i32,
}

impl BenchmarkKey {
    pub fn new(owner_name: impl Into<String>, owner_path: impl Into<String>, project_id: i32) -> Self {
        Self {
            owner_name: owner_name.into(),
            owner_path: owner_path.into(),
            project_id,
        }
    }
}

impl fmt::Display for BenchmarkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) project {}",
            self.owner_name, self.owner_path, self.project_id
        )
    }
}

/// Rolling frame time history of one client on one project.
///
/// `frame_times` holds at most `capacity` durations, oldest first. The average
/// is recomputed on every insert and is zero while the history is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProteinBenchmark {
    key: BenchmarkKey,
    #[serde(default = "default_capacity")]
    capacity: usize,
    #[serde(default)]
    frame_times: VecDeque<Duration>,
    #[serde(default)]
    minimum_frame_time: Option<Duration>,
    // derived, rebuilt from `frame_times` after loading
    #[serde(skip)]
    average_frame_time: Duration,
}

impl ProteinBenchmark {
    pub fn new(key: BenchmarkKey, capacity: usize) -> Self {
        Self {
            key,
            capacity: capacity.max(1),
            frame_times: VecDeque::new(),
            minimum_frame_time: None,
            average_frame_time: Duration::ZERO,
        }
    }

    pub fn key(&self) -> &BenchmarkKey {
        &self.key
    }

    pub fn owner_name(&self) -> &str {
        &self.key.owner_name
    }

    pub fn owner_path(&self) -> &str {
        &self.key.owner_path
    }

    pub fn project_id(&self) -> i32 {
        self.key.project_id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// frame times, oldest first
    pub fn frame_times(&self) -> &VecDeque<Duration> {
        &self.frame_times
    }

    pub fn average_frame_time(&self) -> Duration {
        self.average_frame_time
    }

    /// Smallest frame time ever recorded, this may be older than the window.
    /// Zero while nothing was recorded.
    pub fn minimum_frame_time(&self) -> Duration {
        self.minimum_frame_time.unwrap_or_default()
    }

    /// append a frame time, evicting the oldest ones beyond capacity
    pub fn push_frame_time(&mut self, duration: Duration) {
        self.frame_times.push_back(duration);
        while self.frame_times.len() > self.capacity {
            self.frame_times.pop_front();
        }

        self.minimum_frame_time = Some(match self.minimum_frame_time {
            Some(minimum) => minimum.min(duration),
            None => duration,
        });

        self.recompute_average();
    }

    /// reset the minimum to the smallest frame time still in the window
    pub fn refresh_minimum_frame_time(&mut self) {
        self.minimum_frame_time = self.frame_times.iter().min().copied();
    }

    pub(crate) fn set_owner_name(&mut self, owner_name: &str) {
        self.key.owner_name = owner_name.to_owned();
    }

    pub(crate) fn set_owner_path(&mut self, owner_path: &str) {
        self.key.owner_path = owner_path.to_owned();
    }

    /// Bring a freshly deserialized benchmark back to a consistent state
    pub(crate) fn restore(&mut self) {
        self.capacity = self.capacity.max(1);
        while self.frame_times.len() > self.capacity {
            self.frame_times.pop_front();
        }
        self.recompute_average();
    }

    // summed as u128 nanoseconds, a `Duration` sum overflows on corrupt input
    fn recompute_average(&mut self) {
        if self.frame_times.is_empty() {
            self.average_frame_time = Duration::ZERO;
            return;
        }

        let total: u128 = self
            .frame_times
            .iter()
            .map(Duration::as_nanos)
            .sum();
        let average = total / self.frame_times.len() as u128;

        // the mean never exceeds the largest frame time, so the seconds fit
        self.average_frame_time = Duration::new(
            (average / NANOS_PER_SEC) as u64,
            (average % NANOS_PER_SEC) as u32,
        );
    }
}

const NANOS_PER_SEC: u128 = 1_000_000_000;

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(secs: u64) -> Duration {
        Duration::from_secs(secs)
    }

    fn benchmark(capacity: usize) -> ProteinBenchmark {
        ProteinBenchmark::new(BenchmarkKey::new("nodeA", "/data", 1001), capacity)
    }

    #[test]
    fn empty_average_is_zero() {
        let benchmark = benchmark(10);

        assert_eq!(benchmark.average_frame_time(), Duration::ZERO);
        assert_eq!(benchmark.minimum_frame_time(), Duration::ZERO);
    }

    #[test]
    fn average_is_mean_of_window() {
        let mut benchmark = benchmark(10);
        for duration in [secs(4), secs(6), secs(8)] {
            benchmark.push_frame_time(duration);
        }

        assert_eq!(benchmark.average_frame_time(), secs(6));
        assert_eq!(benchmark.minimum_frame_time(), secs(4));
    }

    #[test]
    fn oldest_frame_evicted() {
        let mut benchmark = benchmark(3);
        for duration in [secs(100), secs(1), secs(2), secs(3)] {
            benchmark.push_frame_time(duration);
        }

        assert_eq!(
            benchmark.frame_times().iter().copied().collect::<Vec<_>>(),
            vec![secs(1), secs(2), secs(3)]
        );
        assert_eq!(benchmark.average_frame_time(), secs(2));
    }

    #[test]
    fn minimum_outlives_window_until_refreshed() {
        let mut benchmark = benchmark(2);
        for duration in [secs(1), secs(5), secs(7)] {
            benchmark.push_frame_time(duration);
        }
        assert_eq!(benchmark.minimum_frame_time(), secs(1));

        benchmark.refresh_minimum_frame_time();
        assert_eq!(benchmark.minimum_frame_time(), secs(5));
    }

    #[test]
    fn zero_frame_time_is_minimum() {
        let mut benchmark = benchmark(10);
        benchmark.push_frame_time(Duration::ZERO);
        benchmark.push_frame_time(secs(5));

        assert_eq!(benchmark.minimum_frame_time(), Duration::ZERO);
        assert_eq!(benchmark.average_frame_time(), Duration::from_millis(2500));
    }

    #[test]
    fn huge_frame_times_do_not_overflow() {
        let mut benchmark = benchmark(10);
        benchmark.push_frame_time(Duration::MAX);
        benchmark.push_frame_time(Duration::MAX);

        assert_eq!(benchmark.average_frame_time(), Duration::MAX);

        benchmark.push_frame_time(Duration::ZERO);
        benchmark.push_frame_time(Duration::ZERO);
        assert_eq!(
            benchmark.average_frame_time().as_nanos(),
            Duration::MAX.as_nanos() / 2
        );
    }

    #[test]
    fn restore_rebuilds_average() {
        let mut benchmark = benchmark(5);
        benchmark.push_frame_time(secs(3));
        benchmark.push_frame_time(secs(5));

        let yaml = serde_yaml::to_string(&benchmark).unwrap();
        let mut restored: ProteinBenchmark = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(restored.average_frame_time(), Duration::ZERO);

        restored.restore();
        assert_eq!(restored, benchmark);
    }
}
