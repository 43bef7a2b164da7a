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

use crate::domain::{Address, UserId, ValidatorSnapshot};
use std::{collections::BTreeSet, error::Error as StdError};

/// Storage for the baseline snapshot of each watch entry, keyed by user ID and address.
/// Operations for different keys must not block each other; a single `put` must be atomic with
/// respect to concurrent operations on the same key. Read-modify-write sequences are serialized
/// by the caller.
#[trait_variant::make(Send)]
pub trait SnapshotStore
where
    Self: Clone + Send + Sync + 'static,
{
    type Error: StdError + Send + Sync + 'static;

    /// Get the baseline for the given key, if any.
    async fn get(
        &self,
        user_id: UserId,
        address: &Address,
    ) -> Result<Option<ValidatorSnapshot>, Self::Error>;

    /// Replace the baseline for the given key.
    async fn put(
        &self,
        user_id: UserId,
        address: &Address,
        snapshot: ValidatorSnapshot,
    ) -> Result<(), Self::Error>;

    /// Delete the baseline for the given key, returning whether there was one.
    async fn delete(&self, user_id: UserId, address: &Address) -> Result<bool, Self::Error>;

    /// The users having at least one baseline.
    async fn list_users(&self) -> Result<BTreeSet<UserId>, Self::Error>;

    /// The addresses the given user has baselines for.
    async fn list_addresses(&self, user_id: UserId) -> Result<BTreeSet<Address>, Self::Error>;
}
