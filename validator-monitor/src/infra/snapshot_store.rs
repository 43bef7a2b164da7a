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

use crate::domain::{Address, SnapshotStore, UserId, ValidatorSnapshot, WatchEntry};
use dashmap::DashMap;
use std::{collections::BTreeSet, convert::Infallible, sync::Arc};

/// In-memory based snapshot store implementation. Baselines do not survive a restart, i.e. all
/// watch entries are seeded again by the first tick.
#[derive(Debug, Default, Clone)]
pub struct InMemSnapshotStore {
    snapshots: Arc<DashMap<WatchEntry, ValidatorSnapshot>>,
}

impl SnapshotStore for InMemSnapshotStore {
    type Error = Infallible;

    async fn get(
        &self,
        user_id: UserId,
        address: &Address,
    ) -> Result<Option<ValidatorSnapshot>, Self::Error> {
        let snapshot = self
            .snapshots
            .get(&WatchEntry::new(user_id, address.to_owned()))
            .map(|snapshot| snapshot.clone());

        Ok(snapshot)
    }

    async fn put(
        &self,
        user_id: UserId,
        address: &Address,
        snapshot: ValidatorSnapshot,
    ) -> Result<(), Self::Error> {
        self.snapshots
            .insert(WatchEntry::new(user_id, address.to_owned()), snapshot);
        Ok(())
    }

    async fn delete(&self, user_id: UserId, address: &Address) -> Result<bool, Self::Error> {
        let deleted = self
            .snapshots
            .remove(&WatchEntry::new(user_id, address.to_owned()))
            .is_some();

        Ok(deleted)
    }

    async fn list_users(&self) -> Result<BTreeSet<UserId>, Self::Error> {
        let user_ids = self
            .snapshots
            .iter()
            .map(|entry| entry.key().user_id)
            .collect();

        Ok(user_ids)
    }

    async fn list_addresses(&self, user_id: UserId) -> Result<BTreeSet<Address>, Self::Error> {
        let addresses = self
            .snapshots
            .iter()
            .filter(|entry| entry.key().user_id == user_id)
            .map(|entry| entry.key().address.to_owned())
            .collect();

        Ok(addresses)
    }
}
