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

//! Per-process context for svckit services.
//!
//! [`AppContext`] is built once at startup and passed by reference. It holds
//! the loaded [`AppConfig`], the [`StatsRegistry`] and the [`ErrorStateList`],
//! and opens queues with their directories resolved under the instance
//! directory.

pub mod config;
pub mod error;
pub mod error_state;
pub mod stats;

use std::sync::Arc;

pub use config::{AppConfig, StatsOptions};
pub use error::{AppError, Result};
pub use error_state::ErrorStateList;
use snafu::ResultExt;
pub use stats::StatsRegistry;
use svckit_queue::{Codec, ThreadSafeQueue};
use tracing::info;

use crate::error::QueueSnafu;

#[derive(Debug)]
pub struct AppContext {
    config: AppConfig,
    stats:  StatsRegistry,
    errors: ErrorStateList,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Result<Self> {
        let stats = StatsRegistry::new(config.stats.history_len)?;
        info!(app_id = %config.app_id, instance = %config.instance, "Application context created");
        Ok(Self {
            config,
            stats,
            errors: ErrorStateList::new(),
        })
    }

    pub const fn config(&self) -> &AppConfig { &self.config }

    pub const fn stats(&self) -> &StatsRegistry { &self.stats }

    pub const fn errors(&self) -> &ErrorStateList { &self.errors }

    /// Opens queue `name` using its declared settings and registers its
    /// depth with the stats registry.
    pub fn open_queue<C>(&self, name: &str, codec: C) -> Result<Arc<ThreadSafeQueue<C>>>
    where
        C: Codec + Send + 'static,
        C::Item: Send,
    {
        let queue_config = self.config.queue_config(name);
        let queue = ThreadSafeQueue::open(queue_config, codec).context(QueueSnafu { name })?;
        let queue = Arc::new(queue);
        self.stats.register_queue(name, queue.clone());
        Ok(queue)
    }
}
