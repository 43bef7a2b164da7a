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

use crate::domain::{Event, EventKind, ValidatorSnapshot};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use std::iter;
use thiserror::Error;

/// Outcome of diffing a new snapshot against the baseline of a watch entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffOutcome {
    /// There was no baseline; the new snapshot became the baseline without any events.
    Seeded,

    /// The new snapshot replaced the baseline; the events are in delivery order.
    Accepted(Vec<Event>),

    /// The new snapshot is invalid compared to the baseline which has been kept.
    Rejected(ValidationError),
}

impl DiffOutcome {
    pub fn accepted(&self) -> bool {
        !matches!(self, DiffOutcome::Rejected(_))
    }

    pub fn events(&self) -> &[Event] {
        match self {
            DiffOutcome::Accepted(events) => events,
            _ => &[],
        }
    }
}

/// A new snapshot must not go back in time compared to its baseline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("counter for {kind} regressed from {baseline} to {new}")]
    CounterRegressed {
        kind: EventKind,
        baseline: u64,
        new: u64,
    },

    #[error("last seen slot regressed from {baseline} to {new}")]
    SlotRegressed { baseline: u64, new: u64 },

    #[error("snapshot fetched at {new} is older than baseline fetched at {baseline}")]
    Stale {
        baseline: DateTime<Utc>,
        new: DateTime<Utc>,
    },
}

/// Derive the events between the given baseline and new snapshot: one event per unit of
/// positive counter delta, attestations before blocks, ascending by slot within a kind.
pub fn diff(
    baseline: &ValidatorSnapshot,
    new: &ValidatorSnapshot,
) -> Result<Vec<Event>, ValidationError> {
    validate(baseline, new)?;

    let events = EventKind::ALL
        .into_iter()
        .flat_map(|kind| kind_events(kind, baseline, new))
        .collect();

    Ok(events)
}

fn validate(baseline: &ValidatorSnapshot, new: &ValidatorSnapshot) -> Result<(), ValidationError> {
    if new.fetched_at < baseline.fetched_at {
        return Err(ValidationError::Stale {
            baseline: baseline.fetched_at,
            new: new.fetched_at,
        });
    }

    for kind in EventKind::ALL {
        let (baseline, new) = (kind.counter(baseline), kind.counter(new));
        if new < baseline {
            return Err(ValidationError::CounterRegressed {
                kind,
                baseline,
                new,
            });
        }
    }

    // A missing slot in the new snapshot means the source did not report any history.
    if let (Some(baseline), Some(new)) = (baseline.last_seen_slot, new.last_seen_slot)
        && new < baseline
    {
        return Err(ValidationError::SlotRegressed { baseline, new });
    }

    Ok(())
}

fn kind_events(
    kind: EventKind,
    baseline: &ValidatorSnapshot,
    new: &ValidatorSnapshot,
) -> impl Iterator<Item = Event> {
    let delta = (kind.counter(new) - kind.counter(baseline)) as usize;
    let floor = baseline.last_seen_slot;

    // Slots the source reports for this kind since the baseline, the most recent ones win.
    let mut slots = kind
        .records(new)
        .map(|record| record.slot)
        .filter(|&slot| floor.is_none_or(|floor| slot > floor))
        .sorted_unstable()
        .dedup()
        .collect::<Vec<_>>();
    let observed = slots.split_off(slots.len() - slots.len().min(delta));

    // Units without a reported slot happened after the baseline, hence before the observed ones.
    let synthetic = iter::repeat_n(floor.unwrap_or_default(), delta - observed.len());

    let address = new.address.clone();
    let observed_at = new.fetched_at;

    synthetic
        .chain(observed)
        .enumerate()
        .map(move |(sequence, slot)| Event {
            kind,
            address: address.clone(),
            slot,
            sequence: sequence as u32,
            observed_at,
        })
}
