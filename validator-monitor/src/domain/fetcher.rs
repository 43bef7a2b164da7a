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

use crate::domain::{Address, ValidatorSnapshot};
use derive_more::Display;
use monitor_common::error::BoxError;
use std::time::Duration;
use thiserror::Error;

/// Source of current validator data.
#[trait_variant::make(Send)]
pub trait Fetcher
where
    Self: Clone + Send + Sync + 'static,
{
    /// Fetch the current snapshot for the given address.
    async fn fetch(&self, address: &Address) -> Result<ValidatorSnapshot, FetchError>;
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("validator {0} not found")]
    NotFound(Address),

    #[error("fetching validator timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream error")]
    Upstream(#[source] BoxError),

    #[error("cannot parse upstream response")]
    Parse(#[source] BoxError),
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::NotFound(_) => FetchErrorKind::NotFound,
            FetchError::Timeout(_) => FetchErrorKind::Timeout,
            FetchError::Upstream(_) => FetchErrorKind::UpstreamError,
            FetchError::Parse(_) => FetchErrorKind::ParseError,
        }
    }
}

/// Kind of a [FetchError], e.g. for logging and metrics.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FetchErrorKind {
    NotFound,
    Timeout,
    UpstreamError,
    ParseError,
}

impl FetchErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FetchErrorKind::NotFound => "not_found",
            FetchErrorKind::Timeout => "timeout",
            FetchErrorKind::UpstreamError => "upstream_error",
            FetchErrorKind::ParseError => "parse_error",
        }
    }
}
