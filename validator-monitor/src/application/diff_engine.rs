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
    self, Address, DiffOutcome, SnapshotStore, UserId, ValidatorSnapshot, WatchEntry,
};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Diffs new snapshots against the baselines in the given [SnapshotStore]. The
/// load-diff-store sequence for a watch entry is serialized by a lock per entry, while different
/// entries are processed concurrently.
#[derive(Clone)]
pub struct DiffEngine<S> {
    store: S,
    lock_by_entry: Arc<DashMap<WatchEntry, Arc<Mutex<()>>>>,
}

impl<S> DiffEngine<S>
where
    S: SnapshotStore,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            lock_by_entry: Default::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Diff the given snapshot against the baseline of the given user and address. Without a
    /// baseline, the snapshot is stored as baseline. If the snapshot is valid, it replaces the
    /// baseline and the derived events are returned; otherwise the baseline is kept.
    pub async fn diff(
        &self,
        user_id: UserId,
        address: &Address,
        mut snapshot: ValidatorSnapshot,
    ) -> Result<DiffOutcome, S::Error> {
        let lock = self.lock(user_id, address);
        let _guard = lock.lock().await;

        let Some(baseline) = self.store.get(user_id, address).await? else {
            self.store.put(user_id, address, snapshot).await?;
            return Ok(DiffOutcome::Seeded);
        };

        match domain::diff(&baseline, &snapshot) {
            Ok(events) => {
                // Keep the slot floor if the source did not report any history this time.
                if snapshot.last_seen_slot.is_none() {
                    snapshot.last_seen_slot = baseline.last_seen_slot;
                }
                self.store.put(user_id, address, snapshot).await?;
                Ok(DiffOutcome::Accepted(events))
            }

            Err(error) => Ok(DiffOutcome::Rejected(error)),
        }
    }

    /// Delete the baseline of the given user and address such that the next diff seeds it again.
    /// Returns whether there was a baseline.
    pub async fn reset(&self, user_id: UserId, address: &Address) -> Result<bool, S::Error> {
        let lock = self.lock(user_id, address);
        let deleted = {
            let _guard = lock.lock().await;
            self.store.delete(user_id, address).await?
        };
        drop(lock);

        // Only drop the lock if nobody else holds or waits for it.
        self.lock_by_entry
            .remove_if(&WatchEntry::new(user_id, address.to_owned()), |_, lock| {
                Arc::strong_count(lock) == 1
            });

        Ok(deleted)
    }

    fn lock(&self, user_id: UserId, address: &Address) -> Arc<Mutex<()>> {
        self.lock_by_entry
            .entry(WatchEntry::new(user_id, address.to_owned()))
            .or_default()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        application::diff_engine::DiffEngine,
        domain::{
            DiffOutcome, EventKind, SnapshotStore, UserId, ValidationError, ValidatorSnapshot,
            snapshot::tests::{ADDRESS_X, address, snapshot, timestamp},
        },
        infra::snapshot_store::InMemSnapshotStore,
    };
    use assert_matches::assert_matches;
    use std::convert::Infallible;

    const USER_A: UserId = UserId(1);
    const USER_B: UserId = UserId(2);

    #[tokio::test]
    async fn test_seeding() -> Result<(), Infallible> {
        let engine = DiffEngine::new(InMemSnapshotStore::default());
        let address = address(ADDRESS_X);

        let outcome = engine.diff(USER_A, &address, snapshot(ADDRESS_X)).await?;
        assert_eq!(outcome, DiffOutcome::Seeded);
        assert!(outcome.accepted());
        assert!(outcome.events().is_empty());

        let baseline = engine.store().get(USER_A, &address).await?;
        assert_eq!(baseline, Some(snapshot(ADDRESS_X)));

        Ok(())
    }

    #[tokio::test]
    async fn test_monotonic_delta() -> Result<(), Infallible> {
        let engine = DiffEngine::new(InMemSnapshotStore::default());
        let address = address(ADDRESS_X);
        engine.diff(USER_A, &address, snapshot(ADDRESS_X)).await?;

        let new = ValidatorSnapshot {
            attestations_succeeded: 12,
            fetched_at: timestamp(60),
            ..snapshot(ADDRESS_X)
        };
        let outcome = engine.diff(USER_A, &address, new).await?;
        assert!(outcome.accepted());
        assert_eq!(outcome.events().len(), 2);
        assert!(
            outcome
                .events()
                .iter()
                .all(|event| event.kind == EventKind::AttestationSucceeded)
        );

        let baseline = engine.store().get(USER_A, &address).await?;
        assert_matches!(baseline, Some(baseline) if baseline.attestations_succeeded == 12);

        Ok(())
    }

    #[tokio::test]
    async fn test_regression_rejection() -> Result<(), Infallible> {
        let engine = DiffEngine::new(InMemSnapshotStore::default());
        let address = address(ADDRESS_X);
        engine.diff(USER_A, &address, snapshot(ADDRESS_X)).await?;

        let new = ValidatorSnapshot {
            blocks_proposed: 4,
            attestations_succeeded: 20,
            ..snapshot(ADDRESS_X)
        };
        let outcome = engine.diff(USER_A, &address, new).await?;
        assert!(!outcome.accepted());
        assert!(outcome.events().is_empty());
        assert_matches!(
            outcome,
            DiffOutcome::Rejected(ValidationError::CounterRegressed {
                kind: EventKind::BlockProposed,
                ..
            })
        );

        let baseline = engine.store().get(USER_A, &address).await?;
        assert_matches!(
            baseline,
            Some(baseline) if baseline.blocks_proposed == 5 && baseline.attestations_succeeded == 10
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_idempotent_no_op() -> Result<(), Infallible> {
        let engine = DiffEngine::new(InMemSnapshotStore::default());
        let address = address(ADDRESS_X);
        engine.diff(USER_A, &address, snapshot(ADDRESS_X)).await?;

        for _ in 0..2 {
            let outcome = engine.diff(USER_A, &address, snapshot(ADDRESS_X)).await?;
            assert_eq!(outcome, DiffOutcome::Accepted(vec![]));
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_isolation_across_users() -> Result<(), Infallible> {
        let engine = DiffEngine::new(InMemSnapshotStore::default());
        let address = address(ADDRESS_X);
        engine.diff(USER_A, &address, snapshot(ADDRESS_X)).await?;
        engine.diff(USER_B, &address, snapshot(ADDRESS_X)).await?;

        assert!(engine.reset(USER_A, &address).await?);
        assert!(!engine.reset(USER_A, &address).await?);

        let new = ValidatorSnapshot {
            attestations_missed: 3,
            ..snapshot(ADDRESS_X)
        };
        let outcome = engine.diff(USER_A, &address, new.clone()).await?;
        assert_eq!(outcome, DiffOutcome::Seeded);
        let outcome = engine.diff(USER_B, &address, new).await?;
        assert_eq!(outcome.events().len(), 2);

        Ok(())
    }

    #[tokio::test]
    async fn test_slot_floor_kept() -> Result<(), Infallible> {
        let engine = DiffEngine::new(InMemSnapshotStore::default());
        let address = address(ADDRESS_X);
        let seed = ValidatorSnapshot {
            last_seen_slot: Some(100),
            ..snapshot(ADDRESS_X)
        };
        engine.diff(USER_A, &address, seed).await?;

        let outcome = engine.diff(USER_A, &address, snapshot(ADDRESS_X)).await?;
        assert!(outcome.accepted());
        let baseline = engine.store().get(USER_A, &address).await?;
        assert_matches!(baseline, Some(baseline) if baseline.last_seen_slot == Some(100));

        let new = ValidatorSnapshot {
            last_seen_slot: Some(50),
            ..snapshot(ADDRESS_X)
        };
        let outcome = engine.diff(USER_A, &address, new).await?;
        assert_eq!(
            outcome,
            DiffOutcome::Rejected(ValidationError::SlotRegressed {
                baseline: 100,
                new: 50
            })
        );

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_diffs() -> Result<(), Infallible> {
        for _ in 0..32 {
            let engine = DiffEngine::new(InMemSnapshotStore::default());
            let address = address(ADDRESS_X);
            engine.diff(USER_A, &address, snapshot(ADDRESS_X)).await?;

            let a = ValidatorSnapshot {
                attestations_succeeded: 12,
                ..snapshot(ADDRESS_X)
            };
            let b = ValidatorSnapshot {
                attestations_succeeded: 15,
                ..snapshot(ADDRESS_X)
            };

            let task_a = tokio::spawn({
                let engine = engine.clone();
                let address = address.clone();
                async move { engine.diff(USER_A, &address, a).await }
            });
            let task_b = tokio::spawn({
                let engine = engine.clone();
                let address = address.clone();
                async move { engine.diff(USER_A, &address, b).await }
            });
            let outcome_a = task_a.await.expect("task a does not panic")?;
            let outcome_b = task_b.await.expect("task b does not panic")?;

            // Either a then b (2 + 3 events) or b then a (5 events, a rejected).
            let events = outcome_a.events().len() + outcome_b.events().len();
            assert_eq!(events, 5);
            assert!(outcome_b.accepted());

            let baseline = engine.store().get(USER_A, &address).await?;
            assert_matches!(baseline, Some(baseline) if baseline.attestations_succeeded == 15);
        }

        Ok(())
    }
}
