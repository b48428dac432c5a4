use foldmon_bench::{config::CONFIG_ENV, instance, UnitFrame, WorkUnit};
use std::{env, fs, time::Duration};

// only test in this binary, the process wide store is initialized once
#[test]
fn instance_discovers_config_from_environment() {
    let directory = tempfile::tempdir().unwrap();
    let snapshot = directory.path().join("cache.yaml");
    let config = directory.path().join("config.yaml");
    fs::write(
        &config,
        format!("cache:\n  path: {}\n  capacity: 2\n", snapshot.display()),
    )
    .unwrap();
    fs::write(&snapshot, "benchmarks: {{{ not yaml").unwrap();
    env::set_var(CONFIG_ENV, &config);

    let benchmarks = instance();
    assert_eq!(benchmarks.path(), snapshot);
    // unreadable snapshot falls back to an empty store
    assert!(benchmarks.is_empty());

    let mut unit = WorkUnit::new("nodeA", "/data", 1001);
    for percent in 1..=3 {
        unit.insert_frame(
            UnitFrame::new(percent, Duration::from_secs(u64::from(percent)))
                .unwrap()
                .with_duration(Duration::from_secs(u64::from(percent))),
        )
        .unwrap();
    }
    benchmarks.ingest(&unit, 1, 3).unwrap();

    // later calls see the same store with the configured capacity
    let again = instance();
    assert_eq!(again.len(), 1);
    assert_eq!(again.benchmarks()[0].frame_times().len(), 2);
    assert!(again.save());
    assert!(!fs::read_to_string(&snapshot).unwrap().contains("not yaml"));
}
