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

use crate::domain::{Address, UserId, WatchlistStore, Watches};
use log::debug;
use parking_lot::RwLock;
use serde::Deserialize;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{fs, sync::Mutex};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub path: PathBuf,
}

/// Watchlist store implementation keeping the watches in memory and, unless created with
/// [JsonWatchlist::in_memory], persisting them to a JSON file mapping user IDs to addresses on
/// every change.
#[derive(Debug, Clone)]
pub struct JsonWatchlist {
    path: Option<Arc<PathBuf>>,
    watches: Arc<RwLock<Watches>>,
    write_lock: Arc<Mutex<()>>,
}

impl JsonWatchlist {
    /// Open the watchlist persisted at the configured path. A missing file is an empty
    /// watchlist; it is created with the first change.
    pub async fn open(config: Config) -> Result<Self, WatchlistError> {
        let Config { path } = config;

        let watches = match fs::read(&path).await {
            Ok(bytes) => {
                let mut watches = serde_json::from_slice::<Watches>(&bytes)?;
                watches.retain(|_, addresses| !addresses.is_empty());
                watches
            }

            Err(error) if error.kind() == ErrorKind::NotFound => Watches::default(),

            Err(source) => return Err(WatchlistError::Io { path, source }),
        };

        debug!(path:? = path, users = watches.len(); "watchlist opened");

        Ok(Self {
            path: Some(Arc::new(path)),
            watches: Arc::new(RwLock::new(watches)),
            write_lock: Default::default(),
        })
    }

    /// Create an empty watchlist which is not persisted.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            watches: Default::default(),
            write_lock: Default::default(),
        }
    }

    async fn persist(&self, watches: &Watches) -> Result<(), WatchlistError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json = serde_json::to_vec_pretty(watches)?;

        // Write to a sibling file first such that a crash never leaves a truncated watchlist.
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json)
            .await
            .map_err(|source| io_error(&tmp_path, source))?;
        fs::rename(&tmp_path, path.as_path())
            .await
            .map_err(|source| io_error(path, source))?;

        Ok(())
    }
}

impl WatchlistStore for JsonWatchlist {
    type Error = WatchlistError;

    async fn list_watches(&self) -> Result<Watches, Self::Error> {
        Ok(self.watches.read().clone())
    }

    async fn add_watch(&self, user_id: UserId, address: Address) -> Result<bool, Self::Error> {
        let _guard = self.write_lock.lock().await;

        let mut watches = self.watches.read().clone();
        if !watches.entry(user_id).or_default().insert(address) {
            return Ok(false);
        }

        self.persist(&watches).await?;
        *self.watches.write() = watches;

        Ok(true)
    }

    async fn remove_watch(&self, user_id: UserId, address: &Address) -> Result<bool, Self::Error> {
        let _guard = self.write_lock.lock().await;

        let mut watches = self.watches.read().clone();
        let Some(addresses) = watches.get_mut(&user_id) else {
            return Ok(false);
        };
        if !addresses.remove(address) {
            return Ok(false);
        }
        if addresses.is_empty() {
            watches.remove(&user_id);
        }

        self.persist(&watches).await?;
        *self.watches.write() = watches;

        Ok(true)
    }
}

#[derive(Debug, Error)]
pub enum WatchlistError {
    #[error("cannot access watchlist file {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot serialize or deserialize watchlist")]
    Json(#[from] serde_json::Error),
}

fn io_error(path: &Path, source: io::Error) -> WatchlistError {
    WatchlistError::Io {
        path: path.to_owned(),
        source,
    }
}
