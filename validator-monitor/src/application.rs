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

mod diff_engine;
mod metrics;

pub use diff_engine::DiffEngine;

use crate::{
    application::metrics::Metrics,
    domain::{
        Address, DiffOutcome, FetchError, FetchErrorKind, Fetcher, Notifier, SnapshotStore,
        UserId, ValidatorSnapshot, WatchlistStore, Watches, users_by_address,
    },
};
use anyhow::Context;
use fastrace::trace;
use futures::{StreamExt, TryStreamExt, future::ok, stream, stream::FuturesUnordered};
use log::{debug, error, info, warn};
use serde::Deserialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    num::NonZeroUsize,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{
    select,
    signal::unix::Signal,
    sync::Semaphore,
    task,
    time::{MissedTickBehavior, interval, timeout},
};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(with = "humantime_serde", default = "poll_interval_default")]
    pub poll_interval: Duration,

    #[serde(with = "humantime_serde", default = "fetch_timeout_default")]
    pub fetch_timeout: Duration,

    #[serde(default = "fetch_concurrency_limit_default")]
    pub fetch_concurrency_limit: NonZeroUsize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval: poll_interval_default(),
            fetch_timeout: fetch_timeout_default(),
            fetch_concurrency_limit: fetch_concurrency_limit_default(),
        }
    }
}

/// Summary of one tick.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Number of watched (user, address) pairs.
    pub pairs: usize,

    /// Number of distinct watched addresses, i.e. fetches.
    pub addresses: usize,

    pub fetch_failures: BTreeMap<Address, FetchErrorKind>,
    pub seeded: usize,
    pub events: usize,
    pub rejected: usize,
    pub delivery_failures: usize,
    pub panicked: usize,
    pub pruned: usize,
}

impl TickReport {
    fn merge(&mut self, other: TickReport) {
        self.fetch_failures.extend(other.fetch_failures);
        self.seeded += other.seeded;
        self.events += other.events;
        self.rejected += other.rejected;
        self.delivery_failures += other.delivery_failures;
        self.panicked += other.panicked;
        self.pruned += other.pruned;
    }
}

/// Polls the watched validators, diffs the fetched snapshots against the baselines of the
/// watching users and notifies them about the detected events.
#[derive(Clone)]
pub struct Monitor<W, S, F, N> {
    config: Config,
    watchlist: W,
    diff_engine: DiffEngine<S>,
    fetcher: F,
    notifier: N,
    fetch_permits: Arc<Semaphore>,
    metrics: Metrics,
}

impl<W, S, F, N> Monitor<W, S, F, N>
where
    W: WatchlistStore,
    S: SnapshotStore,
    F: Fetcher,
    N: Notifier,
{
    pub fn new(config: Config, watchlist: W, snapshot_store: S, fetcher: F, notifier: N) -> Self {
        let fetch_permits = Arc::new(Semaphore::new(config.fetch_concurrency_limit.get()));

        Self {
            config,
            watchlist,
            diff_engine: DiffEngine::new(snapshot_store),
            fetcher,
            notifier,
            fetch_permits,
            metrics: Metrics::default(),
        }
    }

    /// Watch the given address for the given user, returning whether the watch is new. A new
    /// watch starts without baseline, i.e. its first successful fetch only seeds the baseline.
    pub async fn watch(&self, user_id: UserId, address: Address) -> anyhow::Result<bool> {
        let added = self
            .watchlist
            .add_watch(user_id, address.clone())
            .await
            .context("add watch")?;

        if added {
            // A tick which was in flight while a former watch was removed may have left a baseline.
            self.diff_engine
                .reset(user_id, &address)
                .await
                .context("reset baseline")?;
            info!(user_id:%, address:%; "watch added");
        }

        Ok(added)
    }

    /// Stop watching the given address for the given user, returning whether it was watched. The
    /// baseline is deleted in any case.
    pub async fn unwatch(&self, user_id: UserId, address: &Address) -> anyhow::Result<bool> {
        let removed = self
            .watchlist
            .remove_watch(user_id, address)
            .await
            .context("remove watch")?;

        self.diff_engine
            .reset(user_id, address)
            .await
            .context("delete baseline")?;

        if removed {
            info!(user_id:%, address:%; "watch removed");
        }

        Ok(removed)
    }

    /// The addresses watched by the given user.
    pub async fn watched(&self, user_id: UserId) -> anyhow::Result<BTreeSet<Address>> {
        let mut watches = self
            .watchlist
            .list_watches()
            .await
            .context("list watches")?;

        Ok(watches.remove(&user_id).unwrap_or_default())
    }

    /// Fetch the current snapshots for all addresses watched by the given user without
    /// diffing them, i.e. leaving the baselines untouched.
    pub async fn check(
        &self,
        user_id: UserId,
    ) -> anyhow::Result<Vec<(Address, Result<ValidatorSnapshot, FetchError>)>> {
        let addresses = self.watched(user_id).await?;

        let snapshots = stream::iter(addresses)
            .map(|address| async move {
                let snapshot = self.fetch(&address).await;
                (address, snapshot)
            })
            .buffered(self.config.fetch_concurrency_limit.get())
            .collect::<Vec<_>>()
            .await;

        Ok(snapshots)
    }

    /// Execute one poll-diff-notify cycle across a snapshot of the current watchlist. Each
    /// distinct address is fetched at most once and its snapshot is diffed for every watching
    /// user. Failures for one address or watch entry do not affect the others; only storage
    /// failures are returned as error.
    #[trace]
    pub async fn tick(&self) -> anyhow::Result<TickReport> {
        let started_at = Instant::now();

        let watches = self
            .watchlist
            .list_watches()
            .await
            .context("list watches")?;
        let users_by_address = users_by_address(&watches);
        let pairs = users_by_address.values().map(Vec::len).sum();
        let addresses = users_by_address.len();

        let mut report = users_by_address
            .into_iter()
            .map(|(address, user_ids)| self.process_address(address, user_ids))
            .collect::<FuturesUnordered<_>>()
            .try_fold(TickReport::default(), |mut report, address_report| {
                report.merge(address_report);
                ok(report)
            })
            .await?;
        report.pairs = pairs;
        report.addresses = addresses;
        report.pruned = self.prune(&watches).await?;

        let duration = started_at.elapsed();
        self.metrics.update(&report, duration);

        info!(
            pairs,
            addresses,
            fetch_failures = report.fetch_failures.len(),
            seeded = report.seeded,
            events = report.events,
            rejected = report.rejected,
            delivery_failures = report.delivery_failures,
            panicked = report.panicked,
            duration:?;
            "tick completed"
        );

        Ok(report)
    }

    #[trace(properties = { "address": "{address}" })]
    async fn process_address(
        &self,
        address: Address,
        user_ids: Vec<UserId>,
    ) -> anyhow::Result<TickReport> {
        let mut report = TickReport::default();

        // The fetch runs in its own task such that a panicking fetcher is contained.
        let snapshot = {
            let _permit = self
                .fetch_permits
                .acquire()
                .await
                .context("acquire fetch permit")?;

            let monitor = self.clone();
            let address = address.clone();
            task::spawn(async move { monitor.fetch(&address).await }).await
        };

        let snapshot = match snapshot {
            Ok(Ok(snapshot)) => snapshot,

            Err(error) => {
                error!(address:%, error:%; "fetching validator panicked, skipping it this tick");
                report.panicked += 1;

                return Ok(report);
            }

            Ok(Err(error)) => {
                let kind = error.kind();
                warn!(
                    address:%,
                    kind:%,
                    error = format!("{:#}", anyhow::Error::from(error));
                    "cannot fetch validator, skipping it this tick"
                );
                self.metrics.fetch_failed(kind);
                report.fetch_failures.insert(address, kind);

                return Ok(report);
            }
        };

        // Each watch entry is processed in its own task such that a panic is contained.
        let tasks = user_ids
            .into_iter()
            .map(|user_id| {
                let monitor = self.clone();
                let address = address.clone();
                let snapshot = snapshot.clone();

                let task = task::spawn(async move {
                    monitor.process_entry(user_id, &address, snapshot).await
                });

                (user_id, task)
            })
            .collect::<Vec<_>>();

        for (user_id, task) in tasks {
            match task.await {
                Ok(entry_report) => report.merge(entry_report?),

                Err(error) => {
                    error!(user_id:%, address:%, error:%; "processing watch entry panicked");
                    report.panicked += 1;
                }
            }
        }

        Ok(report)
    }

    async fn process_entry(
        &self,
        user_id: UserId,
        address: &Address,
        snapshot: ValidatorSnapshot,
    ) -> anyhow::Result<TickReport> {
        let mut report = TickReport::default();

        let outcome = self
            .diff_engine
            .diff(user_id, address, snapshot)
            .await
            .with_context(|| format!("diff snapshot for user {user_id} and address {address}"))?;

        match outcome {
            DiffOutcome::Seeded => {
                debug!(user_id:%, address:%; "baseline seeded");
                report.seeded = 1;
            }

            DiffOutcome::Rejected(error) => {
                warn!(user_id:%, address:%, error:%; "snapshot rejected, baseline kept");
                report.rejected = 1;
            }

            DiffOutcome::Accepted(events) => {
                self.metrics.events_emitted(&events);
                report.events = events.len();

                // Events for one watch entry are delivered in order; failures are not retried.
                for event in &events {
                    if let Err(error) = self.notifier.notify(user_id, event).await {
                        warn!(
                            user_id:%,
                            address:%,
                            kind:% = event.kind,
                            slot = event.slot,
                            error = format!("{:#}", anyhow::Error::from(error));
                            "cannot deliver notification"
                        );
                        report.delivery_failures += 1;
                    }
                }

                if !events.is_empty() {
                    debug!(user_id:%, address:%, events = events.len(); "events emitted");
                }
            }
        }

        Ok(report)
    }

    async fn fetch(&self, address: &Address) -> Result<ValidatorSnapshot, FetchError> {
        let fetch_timeout = self.config.fetch_timeout;

        match timeout(fetch_timeout, self.fetcher.fetch(address)).await {
            Ok(snapshot) => snapshot,
            Err(_) => Err(FetchError::Timeout(fetch_timeout)),
        }
    }

    /// Delete baselines for addresses not in the given watches of their users, e.g. seeded by a
    /// tick which was in flight when the watch was removed.
    async fn prune(&self, watches: &Watches) -> anyhow::Result<usize> {
        let mut pruned = 0;

        let user_ids = self
            .diff_engine
            .store()
            .list_users()
            .await
            .context("list baseline users")?;

        for user_id in user_ids {
            let baselines = self
                .diff_engine
                .store()
                .list_addresses(user_id)
                .await
                .context("list baseline addresses")?;

            let watched = watches.get(&user_id);
            let orphans = baselines
                .iter()
                .filter(|&address| !watched.is_some_and(|watched| watched.contains(address)));

            for address in orphans {
                let deleted = self
                    .diff_engine
                    .reset(user_id, address)
                    .await
                    .context("delete orphaned baseline")?;

                if deleted {
                    debug!(user_id:%, address:%; "orphaned baseline deleted");
                    pruned += 1;
                }
            }
        }

        Ok(pruned)
    }
}

/// Run ticks at the configured interval until SIGTERM. The first tick runs immediately; ticks
/// never overlap, a late tick delays the next one.
pub async fn run<W, S, F, N>(
    monitor: Monitor<W, S, F, N>,
    mut sigterm: Signal,
) -> anyhow::Result<()>
where
    W: WatchlistStore,
    S: SnapshotStore,
    F: Fetcher,
    N: Notifier,
{
    run_until(monitor, async move {
        sigterm.recv().await;
        warn!("SIGTERM received");
    })
    .await
}

async fn run_until<W, S, F, N>(
    monitor: Monitor<W, S, F, N>,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()>
where
    W: WatchlistStore,
    S: SnapshotStore,
    F: Fetcher,
    N: Notifier,
{
    select! {
        result = poll(&monitor) => result,
        _ = shutdown => Ok(()),
    }
}

async fn poll<W, S, F, N>(monitor: &Monitor<W, S, F, N>) -> anyhow::Result<()>
where
    W: WatchlistStore,
    S: SnapshotStore,
    F: Fetcher,
    N: Notifier,
{
    let mut ticker = interval(monitor.config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        monitor.tick().await.context("execute tick")?;
    }
}

fn poll_interval_default() -> Duration {
    Duration::from_secs(60)
}

fn fetch_timeout_default() -> Duration {
    Duration::from_secs(20)
}

fn fetch_concurrency_limit_default() -> NonZeroUsize {
    NonZeroUsize::new(8).unwrap_or(NonZeroUsize::MIN)
}
