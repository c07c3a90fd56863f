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

//! A composite registry feeding children that aggregate differently, and
//! the global facade publishing through one of them.

use meterkit_core::{Clock, MockClock, Statistic, Tags};
use meterkit_telemetry::{
    global, CompositeMeterRegistry, InMemorySink, MeterRegistry, MeterRegistryExt, PushExporter,
    SimpleMeterRegistry, StepConfig,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const STEP: Duration = Duration::from_secs(10);

struct Fixture {
    clock: Arc<MockClock>,
    cumulative: Arc<dyn MeterRegistry>,
    step: Arc<dyn MeterRegistry>,
    composite: CompositeMeterRegistry,
}

fn fixture() -> Fixture {
    let clock = Arc::new(MockClock::new());
    let cumulative: Arc<dyn MeterRegistry> =
        Arc::new(SimpleMeterRegistry::cumulative(clock.clone()));
    let step: Arc<dyn MeterRegistry> = Arc::new(SimpleMeterRegistry::step(clock.clone(), STEP));
    let composite = CompositeMeterRegistry::new(clock.clone());
    assert!(composite.add_registry(cumulative.clone()));
    assert!(composite.add_registry(step.clone()));
    Fixture {
        clock,
        cumulative,
        step,
        composite,
    }
}

#[test]
fn test_children_aggregate_the_same_events_their_own_way() {
    let f = fixture();
    let tags = Tags::of(&[("region", "eu")]);

    let orders = f.composite.counter("orders", tags.clone());
    orders.increment_by(3.0);
    let checkout = f.composite.timer("checkout", Tags::empty());
    checkout.record(Duration::from_millis(250));

    // Reads come from the first child, which is cumulative.
    assert_eq!(orders.count(), 3.0);
    assert_eq!(f.cumulative.counter("orders", tags.clone()).count(), 3.0);
    assert_eq!(
        f.cumulative.timer("checkout", Tags::empty()).total_time(),
        Duration::from_millis(250)
    );

    let step_orders = f.step.counter("orders", tags);
    assert_eq!(step_orders.count(), 0.0, "window still open");
    f.clock.add(STEP);
    assert_eq!(step_orders.count(), 3.0);
    assert_eq!(f.step.timer("checkout", Tags::empty()).count(), 1);

    f.clock.add(STEP);
    assert_eq!(step_orders.count(), 0.0);
    assert_eq!(orders.count(), 3.0);
}

#[test]
fn test_gauge_disappears_everywhere_with_its_target() {
    let f = fixture();
    let queue = f.composite.gauge(
        "queue.depth",
        Tags::empty(),
        Arc::new(Mutex::new(vec![1, 2, 3])),
        |q: &Mutex<Vec<i32>>| q.lock().unwrap().len() as f64,
    );

    let handles = f.step.find("queue.depth");
    assert_eq!(handles.len(), 1);
    assert_eq!(handles[0].as_gauge().map(|g| g.value()), Some(3.0));

    queue.lock().unwrap().push(4);
    let snapshot = f.composite.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].measurements[0].statistic, Statistic::Value);
    assert_eq!(snapshot[0].measurements[0].value, 4.0);

    drop(queue);
    assert!(f.composite.snapshot().is_empty());
    assert!(f.cumulative.snapshot().is_empty());
    assert!(f.step.snapshot().is_empty());
}

#[test]
fn test_child_added_late_only_sees_later_events() {
    let clock = Arc::new(MockClock::new());
    let composite = CompositeMeterRegistry::new(clock.clone());
    let counter = composite.counter("logins", Tags::empty());
    counter.increment();
    assert_eq!(counter.count(), 0.0, "no child, no value");

    let child: Arc<dyn MeterRegistry> = Arc::new(SimpleMeterRegistry::cumulative(clock));
    composite.add_registry(child.clone());
    assert_eq!(child.meter_count(), 1, "existing meters are replayed");

    counter.increment();
    assert_eq!(child.counter("logins", Tags::empty()).count(), 1.0);

    assert!(composite.remove_registry(&child));
    counter.increment();
    assert_eq!(child.counter("logins", Tags::empty()).count(), 1.0);
}

#[test]
fn test_global_facade_publishes_through_a_child() {
    let clock = Arc::new(MockClock::new());
    let composite = global::install(Arc::new(CompositeMeterRegistry::new(clock.clone())));
    let child: Arc<dyn MeterRegistry> =
        Arc::new(SimpleMeterRegistry::step(clock.clone(), STEP));
    assert!(global::add_registry(child.clone()));

    // Library code only knows the facade.
    let processed = global::counter("jobs.processed", Tags::of(&[("queue", "mail")]));
    processed.increment_by(7.0);

    let properties: HashMap<String, String> = [("jobs.step", "10s"), ("jobs.namespace", "batch")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let sink = Arc::new(InMemorySink::new());
    let mut exporter = PushExporter::new(
        child.clone(),
        Arc::new(StepConfig::new("jobs", properties)),
        sink.clone(),
    );

    assert!(exporter.tick().is_some());
    assert_eq!(sink.points()[0].value, 0.0, "first window not closed yet");

    clock.add(STEP);
    assert!(exporter.tick().is_some());
    let points = sink.points();
    assert_eq!(points.len(), 2);
    assert_eq!(points[1].namespace, "batch");
    assert_eq!(points[1].value, 7.0);
    assert_eq!(points[1].timestamp, clock.wall_time());

    assert_eq!(composite.meter_count(), 1);
    assert!(global::remove_registry(&child));
    assert!(global::reset().is_some());
}
