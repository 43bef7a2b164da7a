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

use crate::domain::{
    Address, FetchError, Fetcher, SlotOutcome, SlotRecord, StatusLabel, ValidatorSnapshot,
};
use chrono::{DateTime, Utc};
use fastrace::trace;
use log::{debug, warn};
use parking_lot::RwLock;
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, de::IgnoredAny};
use serde_with::{DisplayFromStr, PickFirst, serde_as};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{
    sync::Mutex,
    time::{Instant, timeout},
};

/// Config for the Dashtec validator dashboard API.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub base_url: String,

    #[serde(with = "humantime_serde", default = "rank_cache_ttl_default")]
    pub rank_cache_ttl: Duration,

    /// Upper bound for refreshing the validator list while fetching a snapshot.
    #[serde(with = "humantime_serde", default = "rank_refresh_timeout_default")]
    pub rank_refresh_timeout: Duration,

    /// Delay before retrying a failed refresh of the validator list.
    #[serde(with = "humantime_serde", default = "rank_retry_delay_default")]
    pub rank_retry_delay: Duration,

    #[serde(with = "humantime_serde", default = "request_timeout_default")]
    pub request_timeout: Duration,
}

/// A [Fetcher] implementation based on the Dashtec validator dashboard API: the details of a
/// validator come from `/api/validators/{address}`, its rank from the validator list at
/// `/api/validators` which is cached for the configured TTL. The rank is optional, hence
/// refreshing the list never delays a snapshot beyond the configured refresh timeout.
#[derive(Clone)]
pub struct DashtecClient {
    http: HttpClient,
    base_url: Arc<str>,
    request_timeout: Duration,
    rank_cache_ttl: Duration,
    rank_refresh_timeout: Duration,
    rank_retry_delay: Duration,
    rank_cache: Arc<RwLock<Option<RankCache>>>,
    rank_refresh_lock: Arc<Mutex<()>>,
}

impl DashtecClient {
    /// Create a new [DashtecClient] with the given [Config].
    pub fn new(config: Config) -> Result<Self, reqwest::Error> {
        let Config {
            base_url,
            rank_cache_ttl,
            rank_refresh_timeout,
            rank_retry_delay,
            request_timeout,
        } = config;

        let http = HttpClient::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').into(),
            request_timeout,
            rank_cache_ttl,
            rank_refresh_timeout,
            rank_retry_delay,
            rank_cache: Default::default(),
            rank_refresh_lock: Default::default(),
        })
    }

    #[trace(properties = { "address": "{address}" })]
    async fn fetch_snapshot(&self, address: &Address) -> Result<ValidatorSnapshot, FetchError> {
        let url = format!("{}/api/validators/{address}", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|error| self.request_error(error))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(address.to_owned()));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(FetchError::Upstream(
                format!("GET /api/validators/{address} failed: {status} {text}").into(),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|error| self.request_error(error))?;
        let details = serde_json::from_slice::<ValidatorDetails>(&bytes)
            .map_err(|error| FetchError::Parse(error.into()))?;

        let rank = self.rank(address).await;

        Ok(details.into_snapshot(address.to_owned(), rank, Utc::now()))
    }

    /// The rank of the given address from the cached validator list. If the cache has expired,
    /// the list is fetched again unless another fetch is already doing so. If refreshing fails or
    /// times out, the expired list, if any, is used and the refresh is retried after a delay.
    async fn rank(&self, address: &Address) -> Option<u64> {
        let expired = self
            .rank_cache
            .read()
            .as_ref()
            .is_none_or(|rank_cache| rank_cache.expires_at <= Instant::now());

        if expired && let Ok(_guard) = self.rank_refresh_lock.try_lock() {
            let error = match timeout(self.rank_refresh_timeout, self.fetch_ranks()).await {
                Ok(Ok(ranks)) => {
                    debug!(validators = ranks.len(); "validator ranks refreshed");
                    *self.rank_cache.write() = Some(RankCache {
                        expires_at: Instant::now() + self.rank_cache_ttl,
                        ranks,
                    });
                    None
                }

                Ok(Err(error)) => Some(error),

                Err(_) => Some(FetchError::Timeout(self.rank_refresh_timeout)),
            };

            if let Some(error) = error {
                warn!(
                    error = format!("{:#}", anyhow::Error::from(error));
                    "cannot refresh validator ranks, using previous ones if any"
                );

                let expires_at = Instant::now() + self.rank_retry_delay;
                self.rank_cache
                    .write()
                    .get_or_insert_with(|| RankCache {
                        expires_at,
                        ranks: HashMap::new(),
                    })
                    .expires_at = expires_at;
            }
        }

        self.rank_cache
            .read()
            .as_ref()
            .and_then(|rank_cache| rank_cache.ranks.get(address).copied())
    }

    async fn fetch_ranks(&self) -> Result<HashMap<Address, u64>, FetchError> {
        let url = format!("{}/api/validators?", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|error| self.request_error(error))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Upstream(
                format!("GET /api/validators failed: {status}").into(),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|error| self.request_error(error))?;
        let list = serde_json::from_slice::<ValidatorList>(&bytes)
            .map_err(|error| FetchError::Parse(error.into()))?;

        // Entries with invalid addresses or without rank are of no use.
        let ranks = list
            .validators
            .into_iter()
            .filter_map(|summary| {
                let address = Address::try_from(summary.address).ok()?;
                summary.rank.map(|rank| (address, rank))
            })
            .collect();

        Ok(ranks)
    }

    fn request_error(&self, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout(self.request_timeout)
        } else if error.is_decode() {
            FetchError::Parse(error.into())
        } else {
            FetchError::Upstream(error.into())
        }
    }
}

impl Fetcher for DashtecClient {
    async fn fetch(&self, address: &Address) -> Result<ValidatorSnapshot, FetchError> {
        self.fetch_snapshot(address).await
    }
}

struct RankCache {
    expires_at: Instant,
    ranks: HashMap<Address, u64>,
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidatorDetails {
    #[serde(default)]
    status: String,

    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(default)]
    balance: Option<u128>,

    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(default)]
    unclaimed_rewards: Option<u128>,

    total_attestations_succeeded: u64,

    total_attestations_missed: u64,

    total_blocks_proposed: u64,

    #[serde(default)]
    total_blocks_mined: u64,

    total_blocks_missed: u64,

    #[serde(default)]
    total_participating_epochs: u64,

    #[serde(default)]
    voting_history: Vec<IgnoredAny>,

    #[serde(default)]
    recent_attestations: Vec<HistoryEntry>,

    #[serde(default)]
    proposal_history: Vec<HistoryEntry>,
}

impl ValidatorDetails {
    fn into_snapshot(
        self,
        address: Address,
        rank: Option<u64>,
        fetched_at: DateTime<Utc>,
    ) -> ValidatorSnapshot {
        let recent_attestations = self
            .recent_attestations
            .into_iter()
            .filter_map(|entry| {
                let outcome = match entry.status.to_uppercase().as_str() {
                    "SUCCESS" => SlotOutcome::Succeeded,
                    "MISSED" => SlotOutcome::Missed,
                    _ => return None,
                };
                Some(SlotRecord {
                    slot: entry.slot,
                    outcome,
                })
            })
            .collect::<Vec<_>>();

        let recent_proposals = self
            .proposal_history
            .into_iter()
            .filter_map(|entry| {
                let outcome = match entry.status.to_uppercase().as_str() {
                    "PROPOSED" | "MINED" => SlotOutcome::Succeeded,
                    "MISSED" => SlotOutcome::Missed,
                    _ => return None,
                };
                Some(SlotRecord {
                    slot: entry.slot,
                    outcome,
                })
            })
            .collect::<Vec<_>>();

        let last_seen_slot = recent_attestations
            .iter()
            .chain(&recent_proposals)
            .map(|record| record.slot)
            .max();

        ValidatorSnapshot {
            address,
            rank,
            status: StatusLabel::from_upstream(&self.status),
            balance: self.balance.unwrap_or_default(),
            total_rewards: self.unclaimed_rewards.unwrap_or_default(),
            attestations_succeeded: self.total_attestations_succeeded,
            attestations_missed: self.total_attestations_missed,
            blocks_proposed: self
                .total_blocks_proposed
                .saturating_add(self.total_blocks_mined),
            blocks_missed: self.total_blocks_missed,
            epoch_participation: self.total_participating_epochs,
            voting_history_count: self.voting_history.len() as u64,
            last_seen_slot,
            recent_attestations,
            recent_proposals,
            fetched_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HistoryEntry {
    slot: u64,

    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct ValidatorList {
    #[serde(default)]
    validators: Vec<ValidatorSummary>,
}

#[derive(Debug, Deserialize)]
struct ValidatorSummary {
    address: String,

    #[serde(default)]
    rank: Option<u64>,
}

fn rank_cache_ttl_default() -> Duration {
    Duration::from_secs(15 * 60)
}

fn rank_refresh_timeout_default() -> Duration {
    Duration::from_secs(5)
}

fn rank_retry_delay_default() -> Duration {
    Duration::from_secs(60)
}

fn request_timeout_default() -> Duration {
    Duration::from_secs(30)
}

#[cfg(test)]
mod tests {
    use crate::{
        domain::{
            FetchError, Fetcher, SlotOutcome, SlotRecord, StatusLabel,
            snapshot::tests::{ADDRESS_X, ADDRESS_Y, address, timestamp},
        },
        infra::dashtec::{Config, DashtecClient, ValidatorDetails},
    };
    use assert_matches::assert_matches;
    use axum::{
        Json, Router,
        extract::{Path, State},
        http::StatusCode,
        routing::get,
    };
    use indoc::indoc;
    use serde_json::{Value, json};
    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, AtomicUsize, Ordering},
        },
        time::Duration,
    };
    use tokio::{
        net::TcpListener,
        time::{sleep, timeout},
    };

    const DETAILS: &str = indoc! {r#"
        {
            "address": "0x1111111111111111111111111111111111111111",
            "status": "VALIDATING",
            "balance": "200000000000000000000",
            "unclaimedRewards": 1500000000000000000,
            "totalAttestationsSucceeded": 120,
            "totalAttestationsMissed": 3,
            "totalBlocksProposed": 4,
            "totalBlocksMined": 2,
            "totalBlocksMissed": 1,
            "totalParticipatingEpochs": 17,
            "votingHistory": [{ "proposal": 1 }, { "proposal": 2 }],
            "recentAttestations": [
                { "slot": 1001, "status": "Success" },
                { "slot": 1003, "status": "Missed" },
                { "slot": 1002, "status": "Pending" }
            ],
            "proposalHistory": [
                { "slot": 990, "status": "MINED" },
                { "slot": 1004, "status": "proposed" },
                { "slot": 995, "status": "MISSED" },
                { "slot": 1010, "status": "SCHEDULED" }
            ]
        }
    "#};

    #[test]
    fn test_into_snapshot() -> anyhow::Result<()> {
        let details = serde_json::from_str::<ValidatorDetails>(DETAILS)?;
        let snapshot = details.into_snapshot(address(ADDRESS_X), Some(7), timestamp(0));

        assert_eq!(snapshot.address, address(ADDRESS_X));
        assert_eq!(snapshot.rank, Some(7));
        assert_eq!(snapshot.status, StatusLabel::Validating);
        assert_eq!(snapshot.balance, 200_000_000_000_000_000_000);
        assert_eq!(snapshot.total_rewards, 1_500_000_000_000_000_000);
        assert_eq!(snapshot.attestations_succeeded, 120);
        assert_eq!(snapshot.attestations_missed, 3);
        assert_eq!(snapshot.blocks_proposed, 6);
        assert_eq!(snapshot.blocks_missed, 1);
        assert_eq!(snapshot.epoch_participation, 17);
        assert_eq!(snapshot.voting_history_count, 2);
        assert_eq!(snapshot.last_seen_slot, Some(1004));
        assert_eq!(
            snapshot.recent_attestations,
            vec![
                SlotRecord {
                    slot: 1001,
                    outcome: SlotOutcome::Succeeded
                },
                SlotRecord {
                    slot: 1003,
                    outcome: SlotOutcome::Missed
                },
            ]
        );
        assert_eq!(
            snapshot.recent_proposals,
            vec![
                SlotRecord {
                    slot: 990,
                    outcome: SlotOutcome::Succeeded
                },
                SlotRecord {
                    slot: 1004,
                    outcome: SlotOutcome::Succeeded
                },
                SlotRecord {
                    slot: 995,
                    outcome: SlotOutcome::Missed
                },
            ]
        );
        assert_eq!(snapshot.fetched_at, timestamp(0));

        Ok(())
    }

    #[test]
    fn test_into_snapshot_minimal() -> anyhow::Result<()> {
        let details = serde_json::from_str::<ValidatorDetails>(MINIMAL_DETAILS)?;
        let snapshot = details.into_snapshot(address(ADDRESS_Y), None, timestamp(0));

        assert_eq!(snapshot.status, StatusLabel::Unknown);
        assert_eq!(snapshot.balance, 0);
        assert_eq!(snapshot.attestations_succeeded, 1);
        assert_eq!(snapshot.blocks_proposed, 3);
        assert_eq!(snapshot.last_seen_slot, None);
        assert!(snapshot.recent_attestations.is_empty());

        Ok(())
    }

    #[test]
    fn test_missing_counters() {
        // Seeding such a body as baseline would turn all lifetime counters into new events.
        for json in [
            r#"{ "status": "VALIDATING" }"#,
            r#"{ "error": "rate limited" }"#,
            r#"{ "totalAttestationsSucceeded": 1, "totalAttestationsMissed": 0 }"#,
        ] {
            assert!(serde_json::from_str::<ValidatorDetails>(json).is_err(), "{json}");
        }
    }

    const MINIMAL_DETAILS: &str = indoc! {r#"
        {
            "status": "EXITED",
            "totalAttestationsSucceeded": 1,
            "totalAttestationsMissed": 0,
            "totalBlocksProposed": 3,
            "totalBlocksMissed": 0
        }
    "#};

    const ADDRESS_COUNTERLESS: &str = "0x4444444444444444444444444444444444444444";

    #[derive(Default)]
    struct Dashboard {
        list_calls: AtomicUsize,
        list_failing: AtomicBool,
        list_hanging: AtomicBool,
    }

    async fn serve(dashboard: Arc<Dashboard>) -> anyhow::Result<String> {
        let app = Router::new()
            .route("/api/validators", get(list))
            .route("/api/validators/{address}", get(details))
            .with_state(dashboard);

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let local_addr = listener.local_addr()?;
        tokio::spawn(async move { axum::serve(listener, app).await });

        Ok(format!("http://{local_addr}"))
    }

    async fn list(State(dashboard): State<Arc<Dashboard>>) -> Result<Json<Value>, StatusCode> {
        dashboard.list_calls.fetch_add(1, Ordering::SeqCst);

        if dashboard.list_hanging.load(Ordering::SeqCst) {
            sleep(Duration::from_secs(60)).await;
        }

        if dashboard.list_failing.load(Ordering::SeqCst) {
            return Err(StatusCode::BAD_GATEWAY);
        }

        Ok(Json(json!({
            "validators": [
                { "address": ADDRESS_X, "rank": 7, "score": 98.5 },
                { "address": "not-an-address", "rank": 8 }
            ]
        })))
    }

    async fn details(Path(address): Path<String>) -> Result<String, StatusCode> {
        match address.as_str() {
            ADDRESS_X => Ok(DETAILS.to_owned()),
            ADDRESS_Y => Err(StatusCode::NOT_FOUND),
            ADDRESS_COUNTERLESS => Ok(r#"{ "status": "VALIDATING" }"#.to_owned()),
            _ => Ok("{ not json".to_owned()),
        }
    }

    fn config(base_url: String) -> Config {
        Config {
            base_url,
            rank_cache_ttl: Duration::from_secs(900),
            rank_refresh_timeout: Duration::from_secs(5),
            rank_retry_delay: Duration::from_secs(60),
            request_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_fetch() -> anyhow::Result<()> {
        let dashboard = Arc::new(Dashboard::default());
        let base_url = serve(dashboard.clone()).await?;
        let client = DashtecClient::new(config(base_url))?;

        let snapshot = client.fetch(&address(ADDRESS_X)).await?;
        assert_eq!(snapshot.rank, Some(7));
        assert_eq!(snapshot.attestations_succeeded, 120);

        // The rank list is cached.
        client.fetch(&address(ADDRESS_X)).await?;
        assert_eq!(dashboard.list_calls.load(Ordering::SeqCst), 1);

        let result = client.fetch(&address(ADDRESS_Y)).await;
        assert_matches!(result, Err(FetchError::NotFound(a)) if a == address(ADDRESS_Y));

        let result = client
            .fetch(&address("0x3333333333333333333333333333333333333333"))
            .await;
        assert_matches!(result, Err(FetchError::Parse(_)));

        let result = client.fetch(&address(ADDRESS_COUNTERLESS)).await;
        assert_matches!(result, Err(FetchError::Parse(_)));

        Ok(())
    }

    #[tokio::test]
    async fn test_rank_refresh_hanging() -> anyhow::Result<()> {
        let dashboard = Arc::new(Dashboard {
            list_hanging: AtomicBool::new(true),
            ..Default::default()
        });
        let base_url = serve(dashboard.clone()).await?;
        let client = DashtecClient::new(Config {
            rank_refresh_timeout: Duration::from_millis(200),
            ..config(base_url)
        })?;

        let snapshot = timeout(Duration::from_secs(2), client.fetch(&address(ADDRESS_X))).await??;
        assert_eq!(snapshot.rank, None);
        assert_eq!(snapshot.attestations_succeeded, 120);

        // The failed refresh is not retried by the next fetch.
        let snapshot = timeout(Duration::from_secs(2), client.fetch(&address(ADDRESS_X))).await??;
        assert_eq!(snapshot.rank, None);
        assert_eq!(dashboard.list_calls.load(Ordering::SeqCst), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_rank_cache_refresh() -> anyhow::Result<()> {
        let dashboard = Arc::new(Dashboard::default());
        let base_url = serve(dashboard.clone()).await?;
        let client = DashtecClient::new(Config {
            rank_cache_ttl: Duration::ZERO,
            rank_retry_delay: Duration::from_secs(3_600),
            ..config(base_url)
        })?;

        let snapshot = client.fetch(&address(ADDRESS_X)).await?;
        assert_eq!(snapshot.rank, Some(7));

        // A failed refresh keeps the previous ranks.
        dashboard.list_failing.store(true, Ordering::SeqCst);
        let snapshot = client.fetch(&address(ADDRESS_X)).await?;
        assert_eq!(snapshot.rank, Some(7));
        assert_eq!(dashboard.list_calls.load(Ordering::SeqCst), 2);

        // After a failed refresh the list is not requested again before the retry delay.
        dashboard.list_failing.store(false, Ordering::SeqCst);
        let snapshot = client.fetch(&address(ADDRESS_X)).await?;
        assert_eq!(snapshot.rank, Some(7));
        assert_eq!(dashboard.list_calls.load(Ordering::SeqCst), 2);

        Ok(())
    }

    #[tokio::test]
    async fn test_rank_unavailable() -> anyhow::Result<()> {
        let dashboard = Arc::new(Dashboard {
            list_failing: AtomicBool::new(true),
            ..Default::default()
        });
        let base_url = serve(dashboard).await?;
        let client = DashtecClient::new(config(base_url))?;

        let snapshot = client.fetch(&address(ADDRESS_X)).await?;
        assert_eq!(snapshot.rank, None);

        Ok(())
    }

    #[tokio::test]
    async fn test_upstream_unreachable() -> anyhow::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let local_addr = listener.local_addr()?;
        drop(listener);

        let client = DashtecClient::new(config(format!("http://{local_addr}")))?;
        let result = client.fetch(&address(ADDRESS_X)).await;
        assert_matches!(result, Err(FetchError::Upstream(_)));

        Ok(())
    }
}
