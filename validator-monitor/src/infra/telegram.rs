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

use crate::domain::{DeliveryError, Event, EventKind, Notifier, UserId};
use reqwest::Client as HttpClient;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};

/// Config for the Telegram Bot API.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "api_url_default")]
    pub api_url: String,

    pub bot_token: SecretString,

    #[serde(with = "humantime_serde", default = "request_timeout_default")]
    pub request_timeout: Duration,
}

/// A [Notifier] implementation sending Markdown messages via the Telegram Bot API; the user ID
/// is used as chat ID.
#[derive(Clone)]
pub struct TelegramNotifier {
    http: HttpClient,
    api_url: Arc<str>,
    bot_token: SecretString,
}

impl TelegramNotifier {
    pub fn new(config: Config) -> Result<Self, reqwest::Error> {
        let Config {
            api_url,
            bot_token,
            request_timeout,
        } = config;

        let http = HttpClient::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').into(),
            bot_token,
        })
    }
}

impl Notifier for TelegramNotifier {
    async fn notify(&self, user_id: UserId, event: &Event) -> Result<(), DeliveryError> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.api_url,
            self.bot_token.expose_secret()
        );
        let message = SendMessage {
            chat_id: user_id.0,
            text: render(event),
            parse_mode: "Markdown",
        };

        // The URL contains the bot token and must not end up in errors.
        let response = self
            .http
            .post(url)
            .json(&message)
            .send()
            .await
            .map_err(|error| DeliveryError::Transport(error.without_url().into()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .map(|response| response.description)
                .unwrap_or(text);

            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}

/// Render the given event as Markdown message.
pub fn render(event: &Event) -> String {
    let title = match event.kind {
        EventKind::AttestationSucceeded => "✍️ *Attestation succeeded*",
        EventKind::AttestationMissed => "⚠️ *Attestation missed*",
        EventKind::BlockProposed => "📦 *Block proposed*",
        EventKind::BlockMissed => "❌ *Block proposal missed*",
    };

    format!(
        "{title}\nValidator: `{}` | Slot: `#{}`",
        event.address.short(),
        event.slot
    )
}

#[derive(Debug, Serialize)]
struct SendMessage {
    chat_id: i64,
    text: String,
    parse_mode: &'static str,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    description: String,
}

fn api_url_default() -> String {
    "https://api.telegram.org".to_owned()
}

fn request_timeout_default() -> Duration {
    Duration::from_secs(10)
}
