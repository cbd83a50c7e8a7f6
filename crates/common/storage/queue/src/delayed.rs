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

//! A queue whose items become visible only after a per-item delay.
//!
//! Delayed items are staged in memory, keyed by release time. A sweep moves
//! due items into the persisted core, but only once the core has drained,
//! so already visible items are never overtaken. Staged items are not
//! durable until they reach the core; shutdown and drop release all of them
//! early rather than lose them.

use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use snafu::ensure;
use tracing::{debug, error, warn};

use crate::{
    QueueConfig, Result, codec::Codec, error::QueueShutDownSnafu, persisted::PersistedQueue,
    sized::SizedQueue,
};

pub struct DelayedQueue<C: Codec> {
    inner: Mutex<DelayedInner<C>>,
}

struct DelayedInner<C: Codec> {
    queue:      PersistedQueue<C>,
    staged:     BTreeMap<Instant, Vec<C::Item>>,
    staged_len: usize,
}

impl<C: Codec> DelayedInner<C> {
    fn ensure_open(&self) -> Result<()> {
        ensure!(!self.queue.is_shut_down(), QueueShutDownSnafu);
        Ok(())
    }

    /// Moves due items into the core. With `force` every staged item is
    /// released regardless of its time.
    ///
    /// Items are never dropped: a failed push keeps the item in the core's
    /// memory, and the first such error is returned after the sweep.
    fn sweep(&mut self, force: bool) -> Result<()> {
        if self.staged.is_empty() || !(force || self.queue.empty()) {
            return Ok(());
        }

        let now = Instant::now();
        let mut released = 0usize;
        let mut first_error = None;
        while let Some(entry) = self.staged.first_entry() {
            if !force && *entry.key() > now {
                break;
            }
            for item in entry.remove() {
                released += 1;
                if let Err(e) = self.queue.push_back(item) {
                    first_error.get_or_insert(e);
                }
            }
        }
        self.staged_len -= released;

        if released > 0 {
            debug!(queue = %self.queue.name(), released, remaining = self.staged_len, force, "Released delayed items");
        }
        first_error.map_or(Ok(()), Err)
    }

    fn sweep_logged(&mut self) {
        if let Err(e) = self.sweep(false) {
            warn!(queue = %self.queue.name(), error = %e, "Delayed release hit an error");
        }
    }
}

impl<C: Codec> DelayedQueue<C> {
    pub fn open(config: QueueConfig, codec: C) -> Result<Self> {
        let queue = PersistedQueue::open(config, codec)?;
        Ok(Self {
            inner: Mutex::new(DelayedInner {
                queue,
                staged: BTreeMap::new(),
                staged_len: 0,
            }),
        })
    }

    /// Queues `item` to become visible after `delay`. A zero delay pushes
    /// straight into the core.
    ///
    /// Errors only describe `item` itself. Trouble releasing other due items
    /// is logged and retried by later calls.
    pub fn push(&self, item: C::Item, delay: Duration) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.ensure_open()?;
        if delay.is_zero() {
            inner.queue.push_back(item)?;
        } else {
            let release_at = Instant::now() + delay;
            inner.staged.entry(release_at).or_default().push(item);
            inner.staged_len += 1;
        }
        inner.sweep_logged();
        Ok(())
    }

    pub fn pop(&self) -> Result<Option<C::Item>> {
        let mut inner = self.inner.lock();
        inner.ensure_open()?;
        inner.sweep(false)?;
        inner.queue.pop_front()
    }

    /// True when nothing is visible or staged.
    pub fn empty(&self) -> bool {
        let mut inner = self.inner.lock();
        if !inner.queue.is_shut_down() {
            inner.sweep_logged();
        }
        inner.queue.empty() && inner.staged.is_empty()
    }

    /// Visible plus staged items.
    pub fn size(&self) -> usize {
        let mut inner = self.inner.lock();
        if !inner.queue.is_shut_down() {
            inner.sweep_logged();
        }
        inner.queue.size() + inner.staged_len
    }

    /// Items still waiting for their release time.
    pub fn staged_len(&self) -> usize { self.inner.lock().staged_len }

    /// Releases every staged item early, then shuts the core down.
    pub fn shutdown(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.queue.is_shut_down() {
            return Ok(());
        }
        let swept = inner.sweep(true);
        inner.queue.shutdown()?;
        swept
    }

    pub fn name(&self) -> String { self.inner.lock().queue.name().to_string() }
}

impl<C: Codec> SizedQueue for DelayedQueue<C> {
    fn size(&self) -> usize { Self::size(self) }
}

impl<C: Codec> Drop for DelayedInner<C> {
    fn drop(&mut self) {
        if self.queue.is_shut_down() {
            return;
        }
        if let Err(e) = self.sweep(true) {
            error!(queue = %self.queue.name(), error = %e, "Failed to release delayed items on drop");
        }
    }
}

impl<C: Codec> std::fmt::Debug for DelayedQueue<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("DelayedQueue")
            .field("queue", &inner.queue)
            .field("staged", &inner.staged_len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use tempfile::TempDir;

    use super::*;
    use crate::{
        codec::Base64StringCodec,
        error::CodecError,
    };

    /// Stores items verbatim, so an item with a line break cannot be paged.
    #[derive(Debug, Clone, Copy)]
    struct VerbatimCodec;

    impl Codec for VerbatimCodec {
        type Item = String;

        fn encode(&self, item: &String) -> std::result::Result<String, CodecError> { Ok(item.clone()) }

        fn decode(&self, encoded: &str) -> std::result::Result<String, CodecError> { Ok(encoded.to_string()) }
    }

    fn open(dir: &TempDir) -> DelayedQueue<Base64StringCodec> {
        DelayedQueue::open(
            QueueConfig {
                name: "delayed".to_string(),
                working_dir: dir.path().to_path_buf(),
                max_items_per_page: 4,
            },
            Base64StringCodec,
        )
        .unwrap()
    }

    #[test]
    fn test_zero_delay_is_immediate() {
        let dir = TempDir::new().unwrap();
        let queue = open(&dir);
        queue.push("now".to_string(), Duration::ZERO).unwrap();
        assert_eq!(queue.staged_len(), 0);
        assert_eq!(queue.pop().unwrap().as_deref(), Some("now"));
    }

    #[test]
    fn test_item_hidden_until_due() {
        let dir = TempDir::new().unwrap();
        let queue = open(&dir);
        queue.push("later".to_string(), Duration::from_millis(50)).unwrap();

        assert_eq!(queue.pop().unwrap(), None);
        assert_eq!(queue.size(), 1);
        assert!(!queue.empty());

        thread::sleep(Duration::from_millis(80));
        assert_eq!(queue.pop().unwrap().as_deref(), Some("later"));
        assert!(queue.empty());
    }

    #[test]
    fn test_due_items_wait_for_core_to_drain() {
        let dir = TempDir::new().unwrap();
        let queue = open(&dir);
        queue.push("delayed".to_string(), Duration::from_millis(10)).unwrap();
        queue.push("visible".to_string(), Duration::ZERO).unwrap();

        thread::sleep(Duration::from_millis(30));
        assert_eq!(queue.pop().unwrap().as_deref(), Some("visible"));
        assert_eq!(queue.pop().unwrap().as_deref(), Some("delayed"));
    }

    #[test]
    fn test_release_order_follows_release_time() {
        let dir = TempDir::new().unwrap();
        let queue = open(&dir);
        queue.push("second".to_string(), Duration::from_millis(40)).unwrap();
        queue.push("first".to_string(), Duration::from_millis(20)).unwrap();

        thread::sleep(Duration::from_millis(70));
        assert_eq!(queue.pop().unwrap().as_deref(), Some("first"));
        assert_eq!(queue.pop().unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn test_push_ignores_failed_release_of_other_items() {
        let dir = TempDir::new().unwrap();
        let queue = DelayedQueue::open(
            QueueConfig {
                name: "delayed".to_string(),
                working_dir: dir.path().to_path_buf(),
                max_items_per_page: 1,
            },
            VerbatimCodec,
        )
        .unwrap();
        queue.push("bad\nitem".to_string(), Duration::from_millis(5)).unwrap();
        thread::sleep(Duration::from_millis(20));

        // Releasing the due item fails to spill, but "good" was accepted.
        queue.push("good".to_string(), Duration::from_secs(3600)).unwrap();
        assert_eq!(queue.staged_len(), 1);
        assert_eq!(queue.size(), 2);
        std::mem::forget(queue);
    }

    #[test]
    fn test_shutdown_releases_staged_items() {
        let dir = TempDir::new().unwrap();
        let queue = open(&dir);
        queue.push("a".to_string(), Duration::from_secs(3600)).unwrap();
        queue.push("b".to_string(), Duration::from_secs(7200)).unwrap();
        queue.shutdown().unwrap();
        assert!(queue.pop().unwrap_err().is_shut_down());
        assert_eq!(queue.size(), 2);
        drop(queue);

        let queue = open(&dir);
        assert_eq!(queue.pop().unwrap().as_deref(), Some("a"));
        assert_eq!(queue.pop().unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn test_drop_releases_staged_items() {
        let dir = TempDir::new().unwrap();
        {
            let queue = open(&dir);
            queue.push("kept".to_string(), Duration::from_secs(3600)).unwrap();
        }
        let queue = open(&dir);
        assert_eq!(queue.size(), 1);
        assert_eq!(queue.pop().unwrap().as_deref(), Some("kept"));
    }
}
