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

use crate::domain::{Address, UserId};
use std::{
    collections::{BTreeMap, BTreeSet},
    error::Error as StdError,
};

/// All watches: the watched addresses by user.
pub type Watches = BTreeMap<UserId, BTreeSet<Address>>;

/// Storage for the watchlist, mutated by command handling concurrently to polling.
#[trait_variant::make(Send)]
pub trait WatchlistStore
where
    Self: Clone + Send + Sync + 'static,
{
    type Error: StdError + Send + Sync + 'static;

    /// A consistent copy of all current watches.
    async fn list_watches(&self) -> Result<Watches, Self::Error>;

    /// Add a watch, returning whether it is new.
    async fn add_watch(&self, user_id: UserId, address: Address) -> Result<bool, Self::Error>;

    /// Remove a watch, returning whether it existed.
    async fn remove_watch(&self, user_id: UserId, address: &Address) -> Result<bool, Self::Error>;
}

/// Invert the given watches: the watching users by address.
pub fn users_by_address(watches: &Watches) -> BTreeMap<Address, Vec<UserId>> {
    let mut users_by_address = BTreeMap::<Address, Vec<UserId>>::new();

    for (&user_id, addresses) in watches {
        for address in addresses {
            users_by_address
                .entry(address.to_owned())
                .or_default()
                .push(user_id);
        }
    }

    users_by_address
}

#[cfg(test)]
mod tests {
    use crate::domain::{
        UserId, Watches,
        snapshot::tests::{ADDRESS_X, ADDRESS_Y, address},
        users_by_address,
    };

    #[test]
    fn test_users_by_address() {
        let watches = Watches::from([
            (UserId(1), [address(ADDRESS_X)].into()),
            (UserId(2), [address(ADDRESS_X), address(ADDRESS_Y)].into()),
            (UserId(3), [].into()),
        ]);

        let users_by_address = users_by_address(&watches);
        assert_eq!(users_by_address.len(), 2);
        assert_eq!(users_by_address[&address(ADDRESS_X)], vec![UserId(1), UserId(2)]);
        assert_eq!(users_by_address[&address(ADDRESS_Y)], vec![UserId(2)]);
    }
}
