// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Step aggregation over a simulated timeline, with the registry configured
//! from a JSON document.

use approx::assert_relative_eq;
use meterkit_core::config::JsonSource;
use meterkit_core::{MockClock, Statistic, Tags};
use meterkit_telemetry::{
    CountingMode, MeterRegistry, MeterRegistryExt, RegistryConfig, SimpleMeterRegistry,
};
use std::sync::Arc;
use std::time::Duration;

fn step_registry(json: &str) -> anyhow::Result<(Arc<MockClock>, SimpleMeterRegistry)> {
    let source = JsonSource::parse(json)?;
    let config = RegistryConfig::try_from_source(&source)?;
    let clock = Arc::new(MockClock::new());
    Ok((clock.clone(), SimpleMeterRegistry::new(config, clock)))
}

#[test]
fn test_registry_configured_from_json() -> anyhow::Result<()> {
    let (_, registry) = step_registry(
        r#"{"simple": {"mode": "step", "step": "10s", "negativeIncrements": "allow"}}"#,
    )?;
    assert_eq!(
        registry.config().mode,
        CountingMode::Step(Duration::from_secs(10))
    );

    let err = step_registry(r#"{"simple.step": "-"}"#).unwrap_err();
    assert!(err.to_string().contains("simple.step"));
    Ok(())
}

#[test]
fn test_each_window_reports_only_its_own_events() -> anyhow::Result<()> {
    let (clock, registry) = step_registry(r#"{"simple": {"mode": "step", "step": "10s"}}"#)?;
    let timer = registry.timer("render", Tags::empty());
    let payload = registry.summary("payload.bytes", Tags::of(&[("route", "/upload")]));

    // Window [0s, 10s).
    timer.record(Duration::from_millis(100));
    timer.record(Duration::from_millis(300));
    payload.record(512.0);
    clock.add_seconds(4);
    payload.record(2048.0);

    // Window [10s, 20s).
    clock.add_seconds(6);
    timer.record(Duration::from_millis(50));

    let measurements = timer.measure();
    assert_eq!(measurements[0].statistic, Statistic::Count);
    assert_eq!(measurements[0].value, 2.0);
    assert_relative_eq!(measurements[1].value, 0.4, epsilon = 1e-9);
    assert_relative_eq!(measurements[2].value, 0.3, epsilon = 1e-9);

    assert_eq!(payload.count(), 2);
    assert_relative_eq!(payload.total_amount(), 2560.0);
    assert_relative_eq!(payload.max(), 2048.0);
    assert_relative_eq!(payload.mean(), 1280.0);

    clock.add_seconds(10);
    assert_eq!(timer.count(), 1);
    assert_eq!(timer.max(), Duration::from_millis(50));
    assert_eq!(payload.count(), 0);
    Ok(())
}

#[test]
fn test_idle_gap_longer_than_a_step_clears_both_windows() -> anyhow::Result<()> {
    let (clock, registry) = step_registry(
        r#"{"simple": {"mode": "step", "step": "10s", "negativeIncrements": "allow"}}"#,
    )?;
    let balance = registry.counter("balance.delta", Tags::empty());

    balance.increment_by(10.0);
    balance.increment_by(-4.0);
    clock.add_seconds(10);
    assert_eq!(balance.count(), 6.0);

    balance.increment_by(1.0);
    clock.add_seconds(35);
    assert_eq!(balance.count(), 0.0, "nothing happened in the last full window");

    balance.increment();
    clock.add_seconds(5);
    assert_eq!(balance.count(), 1.0);
    Ok(())
}

#[test]
fn test_long_task_timer_follows_the_clock() -> anyhow::Result<()> {
    let (clock, registry) = step_registry("{}")?;
    let migrations = registry.long_task_timer("db.migration", Tags::empty());

    let first = migrations.start();
    clock.add_seconds(5);
    let second = migrations.start();
    clock.add_seconds(5);

    assert_eq!(migrations.active_tasks(), 2);
    assert_eq!(migrations.duration(), Duration::from_secs(15));
    assert_eq!(migrations.stop(first), Some(Duration::from_secs(10)));
    assert_eq!(migrations.stop(first), None, "already stopped");
    assert_eq!(migrations.active_tasks(), 1);
    assert_eq!(migrations.stop(second), Some(Duration::from_secs(5)));

    let snapshot = registry.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].measurements[0].statistic, Statistic::ActiveTasks);
    assert_eq!(snapshot[0].measurements[0].value, 0.0);
    Ok(())
}
