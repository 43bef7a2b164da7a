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

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::{error, info};
use monitor_common::{config::ConfigExt, telemetry};
use std::panic;
use tokio::signal::unix::{SignalKind, signal};
use validator_monitor::{
    application::{self, Monitor},
    config::Config,
    domain::{Address, Fetcher},
    infra::{
        self, dashtec::DashtecClient, snapshot_store::InMemSnapshotStore,
        telegram::TelegramNotifier, watchlist::JsonWatchlist,
    },
};

/// Notifies users about attestations and block proposals of the validators they watch.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Poll the watched validators and send notifications until SIGTERM; the default.
    Run,

    /// Fetch the current snapshot of the given validator and print it as JSON.
    Check { address: Address },
}

#[tokio::main]
async fn main() {
    telemetry::init_logging();
    panic::set_hook(Box::new(|panic| error!(panic:%; "process panicked")));

    let cli = Cli::parse();

    let result = match cli.command.unwrap_or(Command::Run) {
        Command::Run => run().await,
        Command::Check { address } => check(address).await,
    };
    telemetry::shutdown_tracing();

    if let Err(error) = result {
        let backtrace = error.backtrace();
        let error = format!("{error:#}");
        error!(error, backtrace:%; "process exited with ERROR");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let sigterm = signal(SignalKind::terminate()).context("register SIGTERM handler")?;

    let config = Config::load().context("load configuration")?;
    info!(config:?; "starting");
    let Config {
        application_config,
        infra_config,
        telemetry_config:
            telemetry::Config {
                tracing_config,
                metrics_config,
            },
    } = config;

    telemetry::init_tracing(tracing_config);
    telemetry::init_metrics(metrics_config).context("initialize metrics")?;

    let infra::Config {
        watchlist_config,
        fetcher_config,
        notifier_config,
    } = infra_config;

    let watchlist = JsonWatchlist::open(watchlist_config)
        .await
        .context("open watchlist")?;
    let snapshot_store = InMemSnapshotStore::default();
    let fetcher = DashtecClient::new(fetcher_config).context("create Dashtec client")?;
    let notifier = TelegramNotifier::new(notifier_config).context("create Telegram notifier")?;

    let monitor = Monitor::new(
        application_config,
        watchlist,
        snapshot_store,
        fetcher,
        notifier,
    );

    application::run(monitor, sigterm)
        .await
        .context("run validator monitor application")
}

async fn check(address: Address) -> anyhow::Result<()> {
    let config = Config::load().context("load configuration")?;
    let fetcher =
        DashtecClient::new(config.infra_config.fetcher_config).context("create Dashtec client")?;

    let snapshot = fetcher
        .fetch(&address)
        .await
        .with_context(|| format!("fetch validator {address}"))?;
    let json = serde_json::to_string_pretty(&snapshot).context("serialize snapshot")?;
    println!("{json}");

    Ok(())
}
