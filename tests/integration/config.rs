//! Loading a config file and applying it to the loop.

use std::time::Duration;

use deferred::util::config::{load_config, save_config, RuntimeConfig};
use deferred::util::logger::{self, LogLevel};
use deferred::{block_on, Deferred, DeferredError, EventLoop};

#[test]
fn test_config_file_drives_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[scheduler]
idle_timeout_ms = 2
job_budget = 1

[log]
level = "warn"
"#,
    )
    .unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config.log.level, LogLevel::Warn);
    logger::init_from_config(&config.log);

    let event_loop = EventLoop::install(config.scheduler_config());
    assert_eq!(event_loop.config().idle_timeout, Duration::from_millis(2));

    let chained = Deferred::resolve(1).map(|v| v + 1).map(|v| v + 1);
    let reason = block_on(&chained).unwrap_err();
    assert_eq!(reason.as_deferred_error(), Some(&DeferredError::BudgetExhausted));
}

#[test]
fn test_saved_config_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("deferred").join("config.toml");
    let mut config = RuntimeConfig::default();
    config.scheduler.enable_stats = true;
    save_config(&config, &path).unwrap();
    assert_eq!(load_config(&path).unwrap(), config);
}
