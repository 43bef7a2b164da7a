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

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::de::DeserializeOwned;
use std::{env, path::Path};

/// Environment variable holding the path of the YAML configuration file.
pub const CONFIG_FILE: &str = "CONFIG_FILE";

const DEFAULT_CONFIG_FILE: &str = "config.yaml";
const ENV_PREFIX: &str = "APP__";
const ENV_SEPARATOR: &str = "__";

/// Extension methods for loading configuration from a YAML file merged with environment
/// variables, e.g. `APP__APPLICATION__POLL_INTERVAL=30s` overrides `application.poll_interval`.
pub trait ConfigExt
where
    Self: DeserializeOwned,
{
    /// Load the configuration from the file named by `CONFIG_FILE`, defaulting to `config.yaml`.
    fn load() -> Result<Self, Box<figment::Error>> {
        let config_file =
            env::var(CONFIG_FILE).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_owned());
        Self::load_from(config_file)
    }

    /// Load the configuration from the given file, overridden by environment variables.
    fn load_from(config_file: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Yaml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split(ENV_SEPARATOR))
            .extract()
            .map_err(Box::new)
    }
}

impl<T> ConfigExt for T where T: DeserializeOwned {}

#[cfg(test)]
mod tests {
    use crate::config::ConfigExt;
    use assert_matches::assert_matches;
    use serde::Deserialize;
    use std::fs;

    #[derive(Debug, Deserialize)]
    struct TestConfig {
        application: ApplicationConfig,
    }

    #[derive(Debug, Deserialize)]
    struct ApplicationConfig {
        name: String,
        limit: u32,
    }

    #[test]
    fn test_load_from() {
        let dir = tempfile::tempdir().expect("temp dir can be created");
        let path = dir.path().join("config.yaml");
        fs::write(&path, "application:\n  name: monitor\n  limit: 7\n")
            .expect("config file can be written");

        let config = TestConfig::load_from(&path);
        assert_matches!(
            config,
            Ok(TestConfig { application: ApplicationConfig { name, limit: 7 } }) if name == "monitor"
        );
    }

    #[test]
    fn test_load_from_missing_field() {
        let dir = tempfile::tempdir().expect("temp dir can be created");
        let path = dir.path().join("config.yaml");
        fs::write(&path, "application:\n  name: monitor\n").expect("config file can be written");

        assert!(TestConfig::load_from(&path).is_err());
    }
}
