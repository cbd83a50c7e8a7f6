// Copyright 2025 svckit contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::{Path, PathBuf};

use bon::Builder;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use snafu::ResultExt;
use svckit_common_telemetry::LoggingOptions;
use svckit_queue::QueueConfig;

use crate::error::{ConfigSnafu, Result};

/// Prefix of environment variables that override file settings, e.g.
/// `SVCKIT__STATS__HISTORY_LEN=24`.
pub const ENV_PREFIX: &str = "SVCKIT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct StatsOptions {
    /// Gathered snapshots kept per stat.
    #[default = 12]
    pub history_len: usize,
}

/// Top-level configuration of a svckit service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault, Builder)]
#[serde(default)]
pub struct AppConfig {
    #[default = "svckit"]
    #[builder(default = "svckit".to_string())]
    pub app_id:   String,
    #[default = "default"]
    #[builder(default = "default".to_string())]
    pub instance: String,
    /// Root for queue directories declared with a relative path.
    #[default(_code = "PathBuf::from(\"./data\")")]
    #[builder(default = PathBuf::from("./data"))]
    pub data_dir: PathBuf,
    #[builder(default)]
    pub logging:  LoggingOptions,
    #[builder(default)]
    pub stats:    StatsOptions,
    #[builder(default)]
    pub queues:   Vec<QueueConfig>,
}

impl AppConfig {
    /// Loads defaults, then `path` (if given, it must exist), then
    /// `SVCKIT__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .and_then(config::Config::try_deserialize)
            .context(ConfigSnafu)
    }

    /// Directory under which this instance keeps relative queue
    /// directories: `<data_dir>/<app_id>/<instance>`.
    #[must_use]
    pub fn instance_dir(&self) -> PathBuf { self.data_dir.join(&self.app_id).join(&self.instance) }

    /// Working directory for `queue`, resolving relative paths under
    /// [`instance_dir`](Self::instance_dir).
    #[must_use]
    pub fn queue_dir(&self, queue: &QueueConfig) -> PathBuf {
        if queue.working_dir.is_absolute() {
            queue.working_dir.clone()
        } else {
            self.instance_dir().join(&queue.working_dir)
        }
    }

    /// The declared queue called `name`, with its directory resolved. An
    /// undeclared name gets default settings in a directory of its own.
    #[must_use]
    pub fn queue_config(&self, name: &str) -> QueueConfig {
        let mut queue = self
            .queues
            .iter()
            .find(|q| q.name == name)
            .cloned()
            .unwrap_or_else(|| QueueConfig {
                name: name.to_string(),
                working_dir: PathBuf::from(name),
                ..Default::default()
            });
        queue.working_dir = self.queue_dir(&queue);
        queue
    }
}
