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

use std::path::PathBuf;

use crate::{
    DelayedQueue, PersistedQueue, PriorityQueue, QueueConfig, Result, ThreadSafeQueue, codec::Codec,
};

pub struct QueueBuilder {
    config: QueueConfig,
}

impl QueueBuilder {
    pub fn new<S: Into<String>, P: Into<PathBuf>>(name: S, working_dir: P) -> Self {
        Self {
            config: QueueConfig {
                name: name.into(),
                working_dir: working_dir.into(),
                ..Default::default()
            },
        }
    }

    #[must_use]
    pub fn max_items_per_page(mut self, max_items_per_page: usize) -> Self {
        self.config.max_items_per_page = max_items_per_page;
        self
    }

    pub fn config(&self) -> &QueueConfig { &self.config }

    pub fn build<C: Codec>(self, codec: C) -> Result<PersistedQueue<C>> { PersistedQueue::open(self.config, codec) }

    pub fn build_threadsafe<C: Codec>(self, codec: C) -> Result<ThreadSafeQueue<C>> {
        ThreadSafeQueue::open(self.config, codec)
    }

    pub fn build_delayed<C: Codec>(self, codec: C) -> Result<DelayedQueue<C>> { DelayedQueue::open(self.config, codec) }

    pub fn build_priority<C: Codec + Clone>(self, levels: usize, codec: C) -> Result<PriorityQueue<C>> {
        PriorityQueue::open(self.config, levels, codec)
    }
}

impl From<QueueConfig> for QueueBuilder {
    fn from(config: QueueConfig) -> Self { Self { config } }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::codec::Base64StringCodec;

    #[test]
    fn test_builder_default_config() {
        let builder = QueueBuilder::new("jobs", "/tmp/test_queue");
        assert_eq!(builder.config.name, "jobs");
        assert_eq!(builder.config.working_dir, PathBuf::from("/tmp/test_queue"));
        assert_eq!(builder.config.max_items_per_page, 1000);
    }

    #[test]
    fn test_builder_custom_config() {
        let builder = QueueBuilder::new("jobs", "/tmp/test_queue").max_items_per_page(16);
        assert_eq!(builder.config().max_items_per_page, 16);
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        let result = QueueBuilder::new("jobs", dir.path())
            .max_items_per_page(0)
            .build(Base64StringCodec);
        assert!(matches!(result, Err(crate::QueueError::InvalidConfig { .. })));
    }

    #[test]
    fn test_build_each_flavour() {
        let dir = TempDir::new().unwrap();
        let queue = QueueBuilder::new("plain", dir.path()).build(Base64StringCodec).unwrap();
        assert!(queue.empty());

        let shared = QueueBuilder::new("shared", dir.path())
            .build_threadsafe(Base64StringCodec)
            .unwrap();
        assert_eq!(shared.size(), 0);

        let delayed = QueueBuilder::new("delayed", dir.path())
            .build_delayed(Base64StringCodec)
            .unwrap();
        assert_eq!(delayed.staged_len(), 0);

        let priority = QueueBuilder::new("prio", dir.path())
            .build_priority(4, Base64StringCodec)
            .unwrap();
        assert_eq!(priority.levels(), 4);
    }
}
