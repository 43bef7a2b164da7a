// This file is part of validator-monitor.
// Copyright (C) 2025 Midnight Foundation
// SPDX-License-Identifier: Apache-2.0
// Licensed under the Apache License, Version 2.0 (the "License");
// You may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::{
    application::TickReport,
    domain::{Event, FetchErrorKind},
};
use metrics::{Counter, Gauge, Histogram, counter, gauge, histogram};
use std::time::Duration;

#[derive(Clone)]
pub struct Metrics {
    ticks: Counter,
    tick_duration: Histogram,
    watched_pairs: Gauge,
    watched_addresses: Gauge,
    seeded_baselines: Counter,
    rejected_snapshots: Counter,
    delivery_failures: Counter,
    panicked_tasks: Counter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            ticks: counter!("validator_monitor_ticks"),
            tick_duration: histogram!("validator_monitor_tick_duration_seconds"),
            watched_pairs: gauge!("validator_monitor_watched_pairs"),
            watched_addresses: gauge!("validator_monitor_watched_addresses"),
            seeded_baselines: counter!("validator_monitor_seeded_baselines"),
            rejected_snapshots: counter!("validator_monitor_rejected_snapshots"),
            delivery_failures: counter!("validator_monitor_delivery_failures"),
            panicked_tasks: counter!("validator_monitor_panicked_tasks"),
        }
    }
}

impl Metrics {
    pub fn fetch_failed(&self, kind: FetchErrorKind) {
        counter!("validator_monitor_fetch_failures", "kind" => kind.as_str()).increment(1);
    }

    pub fn events_emitted(&self, events: &[Event]) {
        for event in events {
            counter!("validator_monitor_events", "kind" => event.kind.as_str()).increment(1);
        }
    }

    pub fn update(&self, report: &TickReport, duration: Duration) {
        self.ticks.increment(1);
        self.tick_duration.record(duration.as_secs_f64());
        self.watched_pairs.set(report.pairs as f64);
        self.watched_addresses.set(report.addresses as f64);
        self.seeded_baselines.increment(report.seeded as u64);
        self.rejected_snapshots.increment(report.rejected as u64);
        self.delivery_failures.increment(report.delivery_failures as u64);
        self.panicked_tasks.increment(report.panicked as u64);
    }
}
