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

use fastrace::collector::{Config as CollectorConfig, ConsoleReporter};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};

/// Telemetry config.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "tracing", default)]
    pub tracing_config: TracingConfig,

    #[serde(rename = "metrics")]
    pub metrics_config: MetricsConfig,
}

/// Tracing config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TracingConfig {
    #[serde(default)]
    pub enabled: bool,
}

/// Metrics config.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub address: IpAddr,
    pub port: u16,
}

/// Initialize logging; must only be called once.
pub fn init_logging() {
    logforth::starter_log::stdout().apply();
}

/// Initialize tracing, reporting finished spans to the console if enabled.
pub fn init_tracing(config: TracingConfig) {
    if config.enabled {
        fastrace::set_reporter(ConsoleReporter, CollectorConfig::default());
    }
}

/// Flush pending spans, e.g. before the process exits.
pub fn shutdown_tracing() {
    fastrace::flush();
}

/// Initialize metrics, exposing them via a Prometheus HTTP listener if enabled. Must be called
/// from within a Tokio runtime.
pub fn init_metrics(config: MetricsConfig) -> Result<(), BuildError> {
    let MetricsConfig {
        enabled,
        address,
        port,
    } = config;

    if enabled {
        PrometheusBuilder::new()
            .with_http_listener(SocketAddr::new(address, port))
            .install()?;
    }

    Ok(())
}
