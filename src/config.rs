// Copyright 2023 RisingWave Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fs;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Command-line entry point for the master binary. Mirrors the options a deployed node would
/// override at launch; most knobs also have a matching field in [`MasterConfig`] so they can be
/// pinned in a checked-in config file instead.
#[derive(Parser, Clone, Debug)]
pub struct MasterOpts {
    /// Address the worker-facing listener binds to.
    #[clap(long, env = "MASTER_WORKER_LISTEN_ADDR", default_value = "0.0.0.0:7070")]
    pub worker_listen_addr: String,

    /// Address the admin (controller) listener binds to.
    #[clap(long, env = "MASTER_ADMIN_LISTEN_ADDR", default_value = "0.0.0.0:7071")]
    pub admin_listen_addr: String,

    /// Path to a TOML config file overriding [`MasterConfig`] defaults. If empty, defaults are
    /// used as-is.
    #[clap(long, env = "MASTER_CONFIG_PATH", default_value = "")]
    pub config_path: String,
}

/// Tunables that are more naturally described as data than as flags; loaded once at startup and
/// then treated as immutable for the coordinator's lifetime.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    /// Base delay, in seconds, for the connection manager's exponential backoff (`5 * 2^n`).
    pub reconnect_base_secs: u64,
    /// Cap on the exponent `n` in `5 * 2^n`; bounds the delay at `5 * 2^reconnect_max_exp`.
    pub reconnect_max_exp: u32,
    /// Minimum interval between two `task_status` refresh passes.
    pub status_refresh_interval_secs: u64,
    /// Shared secret registered for every worker credential at admission time.
    pub worker_shared_secret: String,
    /// If true, any discovered `(host, port)` is registered and dialed immediately; if false it
    /// is only remembered in `known_nodes` for admin-driven promotion.
    pub multicast_all: bool,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            reconnect_base_secs: 5,
            reconnect_max_exp: 6,
            status_refresh_interval_secs: 3,
            worker_shared_secret: "1234".to_string(),
            multicast_all: true,
        }
    }
}

/// Load configuration from `path`, falling back to defaults for anything the file does not set.
/// An empty path yields defaults outright, matching the teacher's `load_config` convention of
/// treating an unset `--config-path` as "use built-in defaults".
pub fn load_config(path: &str) -> MasterConfig {
    if path.is_empty() {
        return MasterConfig::default();
    }
    match fs::read_to_string(path) {
        Ok(contents) => toml::from_str(&contents).unwrap_or_else(|err| {
            tracing::warn!(error = %err, path, "failed to parse config file, using defaults");
            MasterConfig::default()
        }),
        Err(err) => {
            tracing::warn!(error = %err, path, "failed to read config file, using defaults");
            MasterConfig::default()
        }
    }
}
