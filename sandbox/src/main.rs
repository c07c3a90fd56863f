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

//! Records a simulated checkout workload through the global facade and
//! publishes it as JSON lines on stdout, one step at a time.
//!
//! Any exporter property can be overridden from the environment, e.g.
//! `SANDBOX_CLOUDWATCH_STEP=2s` or `SANDBOX_CLOUDWATCH_BATCHSIZE=5`.

use anyhow::Result;
use meterkit_core::config::{EnvSource, JsonSource};
use meterkit_core::{Clock, ConfigSource, SystemClock, Tags};
use meterkit_telemetry::registry::TimerBuilder;
use meterkit_telemetry::{
    global, CloudWatchConfig, CompositeMeterRegistry, JsonLinesSink, MeterRegistry,
    PushExporter, SimpleMeterRegistry,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DEFAULTS: &str = r#"{
    "cloudwatch": {
        "namespace": "sandbox",
        "step": "1s",
        "batchSize": 20,
        "readTimeout": "2s"
    }
}"#;

/// Environment variables first, then the built-in defaults.
struct SandboxConfig {
    env: EnvSource,
    defaults: JsonSource,
}

impl ConfigSource for SandboxConfig {
    fn get(&self, key: &str) -> Option<String> {
        self.env.get(key).or_else(|| self.defaults.get(key))
    }
}

impl CloudWatchConfig for SandboxConfig {}

fn simulate_checkout(round: u64, queue: &AtomicUsize, retries: &AtomicUsize) {
    let region = if round % 3 == 0 { "us" } else { "eu" };
    global::counter("checkout.orders", Tags::of(&[("region", region)])).increment();
    global::summary("checkout.basket.items", Tags::empty()).record((round % 7 + 1) as f64);

    let latency = TimerBuilder::new("checkout.latency")
        .description("Time to confirm an order")
        .base_unit("seconds")
        .create(global::registry().as_ref());
    latency.record(Duration::from_millis(40 + (round * 13) % 90));

    if round % 4 == 0 {
        queue.fetch_add(1, Ordering::Relaxed);
    } else {
        let _ = queue.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }
    if round % 5 == 0 {
        retries.fetch_add(1, Ordering::Relaxed);
    }
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let config = Arc::new(SandboxConfig {
        env: EnvSource::with_prefix("sandbox"),
        defaults: JsonSource::parse(DEFAULTS)?,
    });
    let step = CloudWatchConfig::step(&*config);

    global::install(Arc::new(CompositeMeterRegistry::new(clock.clone())));
    let published: Arc<dyn MeterRegistry> =
        Arc::new(SimpleMeterRegistry::step(clock.clone(), step));
    let totals: Arc<dyn MeterRegistry> = Arc::new(SimpleMeterRegistry::cumulative(clock.clone()));
    global::add_registry(published.clone());
    global::add_registry(totals.clone());

    let queue = global::gauge(
        "checkout.queue.depth",
        Tags::empty(),
        Arc::new(AtomicUsize::new(0)),
        |q: &AtomicUsize| q.load(Ordering::Relaxed) as f64,
    );
    let retries = global::function_counter(
        "checkout.payment.retries",
        Tags::empty(),
        Arc::new(AtomicUsize::new(0)),
        |r: &AtomicUsize| r.load(Ordering::Relaxed) as f64,
    );

    let sink = Arc::new(JsonLinesSink::new(std::io::stdout()));
    let mut exporter = PushExporter::try_new(published, config, sink)?;

    let tick = Duration::from_millis(100);
    for round in 0..(4 * step.as_millis() as u64 / tick.as_millis() as u64) {
        simulate_checkout(round, &queue, &retries);
        if let Some(report) = exporter.tick() {
            if !report.is_success() {
                log::warn!("{} batches failed", report.failed());
            }
        }
        std::thread::sleep(tick);
    }

    for meter in totals.snapshot() {
        log::info!("{} {:?}", meter.id, meter.measurements);
    }
    global::reset();
    Ok(())
}
