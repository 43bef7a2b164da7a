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

mod diff;
mod event;
mod fetcher;
mod notifier;
pub(crate) mod snapshot;
mod snapshot_store;
mod watchlist;

pub use diff::*;
pub use event::*;
pub use fetcher::*;
pub use notifier::*;
pub use snapshot::*;
pub use snapshot_store::*;
pub use watchlist::*;

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

const ADDRESS_PREFIX: &str = "0x";
const ADDRESS_LEN: usize = 42;

/// Identifier of a user, e.g. a chat ID; notifications for a user are delivered to it.
#[derive(
    Debug,
    Display,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    From,
    Into,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Validator address, normalized to lower case: `0x` followed by 40 hex digits.
#[derive(
    Debug, Display, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Into, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for humans, e.g. `0x1234...abcd`.
    pub fn short(&self) -> String {
        let len = self.0.len();
        format!("{}...{}", &self.0[..6], &self.0[len - 4..])
    }
}

impl TryFrom<String> for Address {
    type Error = InvalidAddressError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let s = s.trim().to_lowercase();

        let Some(digits) = s.strip_prefix(ADDRESS_PREFIX) else {
            return Err(InvalidAddressError::Prefix);
        };
        if s.len() != ADDRESS_LEN {
            return Err(InvalidAddressError::Length(s.len()));
        }
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(InvalidAddressError::NonHex);
        }

        Ok(Self(s))
    }
}

impl TryFrom<&str> for Address {
    type Error = InvalidAddressError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.to_owned().try_into()
    }
}

impl FromStr for Address {
    type Err = InvalidAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.try_into()
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidAddressError {
    #[error("address must start with 0x")]
    Prefix,

    #[error("address must have {ADDRESS_LEN} characters, but has {0}")]
    Length(usize),

    #[error("address must only contain hex digits after 0x")]
    NonHex,
}

/// A user watching a validator address. Unique per user; each entry has its own baseline.
#[derive(Debug, Display, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display("{user_id}/{address}")]
pub struct WatchEntry {
    pub user_id: UserId,
    pub address: Address,
}

impl WatchEntry {
    pub fn new(user_id: UserId, address: Address) -> Self {
        Self { user_id, address }
    }
}
