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

use crate::domain::{Event, UserId};
use monitor_common::error::BoxError;
use thiserror::Error;

/// Sink for events; retrying failed deliveries, if at all, is up to implementations.
#[trait_variant::make(Send)]
pub trait Notifier
where
    Self: Clone + Send + Sync + 'static,
{
    /// Deliver the given event to the given user.
    async fn notify(&self, user_id: UserId, event: &Event) -> Result<(), DeliveryError>;
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("cannot deliver notification")]
    Transport(#[source] BoxError),

    #[error("notification rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
}
