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

use crate::domain::{Address, SlotOutcome, SlotRecord, ValidatorSnapshot};
use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// One detected transition of a validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub kind: EventKind,
    pub address: Address,

    /// The triggering slot; for units of a burst the source reports no slot for, this is the
    /// last slot seen before the burst.
    pub slot: u64,

    /// Position of this event among the events of the same kind from one diff.
    pub sequence: u32,

    pub observed_at: DateTime<Utc>,
}

/// Kind of an [Event]. The declaration order is the order in which events of one diff are
/// delivered: attestations before blocks.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum EventKind {
    AttestationSucceeded,
    AttestationMissed,
    BlockProposed,
    BlockMissed,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::AttestationSucceeded,
        EventKind::AttestationMissed,
        EventKind::BlockProposed,
        EventKind::BlockMissed,
    ];

    /// The value of the counter this kind of event is derived from.
    pub fn counter(self, snapshot: &ValidatorSnapshot) -> u64 {
        match self {
            EventKind::AttestationSucceeded => snapshot.attestations_succeeded,
            EventKind::AttestationMissed => snapshot.attestations_missed,
            EventKind::BlockProposed => snapshot.blocks_proposed,
            EventKind::BlockMissed => snapshot.blocks_missed,
        }
    }

    /// The history records of the given snapshot matching this kind of event.
    pub fn records(self, snapshot: &ValidatorSnapshot) -> impl Iterator<Item = &SlotRecord> {
        let (history, outcome) = match self {
            EventKind::AttestationSucceeded => {
                (&snapshot.recent_attestations, SlotOutcome::Succeeded)
            }
            EventKind::AttestationMissed => (&snapshot.recent_attestations, SlotOutcome::Missed),
            EventKind::BlockProposed => (&snapshot.recent_proposals, SlotOutcome::Succeeded),
            EventKind::BlockMissed => (&snapshot.recent_proposals, SlotOutcome::Missed),
        };

        history
            .iter()
            .filter(move |record| record.outcome == outcome)
    }

    /// Label, e.g. for metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::AttestationSucceeded => "attestation_succeeded",
            EventKind::AttestationMissed => "attestation_missed",
            EventKind::BlockProposed => "block_proposed",
            EventKind::BlockMissed => "block_missed",
        }
    }
}
