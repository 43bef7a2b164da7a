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

use crate::domain::Address;
use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// One fetch result for one validator address at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorSnapshot {
    pub address: Address,

    /// Unknown if the validator is offline or the ranking is unavailable.
    pub rank: Option<u64>,

    pub status: StatusLabel,

    /// Balance in the smallest unit (18 decimals).
    pub balance: u128,

    /// Total rewards in the smallest unit (18 decimals).
    pub total_rewards: u128,

    pub attestations_succeeded: u64,
    pub attestations_missed: u64,

    /// Proposed or mined blocks.
    pub blocks_proposed: u64,
    pub blocks_missed: u64,

    pub epoch_participation: u64,
    pub voting_history_count: u64,

    /// Highest slot in the recent attestation and proposal history, if any.
    pub last_seen_slot: Option<u64>,

    /// Recent attestations as far as reported by the source; possibly empty.
    pub recent_attestations: Vec<SlotRecord>,

    /// Recent block proposals as far as reported by the source; possibly empty.
    pub recent_proposals: Vec<SlotRecord>,

    pub fetched_at: DateTime<Utc>,
}

/// Validator status as reported by the source.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusLabel {
    Validating,
    Offline,
    Unknown,
}

impl StatusLabel {
    /// Map an upstream status string, case-insensitively; unrecognized values are `Unknown`.
    pub fn from_upstream(status: &str) -> Self {
        match status.to_uppercase().as_str() {
            "VALIDATING" => Self::Validating,
            "OFFLINE" => Self::Offline,
            _ => Self::Unknown,
        }
    }
}

/// Outcome of a validator duty at a given slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRecord {
    pub slot: u64,
    pub outcome: SlotOutcome,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotOutcome {
    Succeeded,
    Missed,
}
