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

//! Mutex-guarded facade over [`PersistedQueue`].

use parking_lot::Mutex;

use crate::{QueueConfig, Result, codec::Codec, persisted::PersistedQueue, sized::SizedQueue};

/// A [`PersistedQueue`] that can be shared between threads.
///
/// Every operation takes one lock for its whole duration, including any
/// page I/O it triggers.
pub struct ThreadSafeQueue<C: Codec> {
    inner: Mutex<PersistedQueue<C>>,
}

impl<C: Codec> ThreadSafeQueue<C> {
    pub fn open(config: QueueConfig, codec: C) -> Result<Self> {
        PersistedQueue::open(config, codec).map(Self::from)
    }

    pub fn push(&self, item: C::Item) -> Result<()> { self.inner.lock().push_back(item) }

    pub fn push_front(&self, item: C::Item) -> Result<()> { self.inner.lock().push_front(item) }

    pub fn pop(&self) -> Result<Option<C::Item>> { self.inner.lock().pop_front() }

    pub fn empty(&self) -> bool { self.inner.lock().empty() }

    pub fn size(&self) -> usize { self.inner.lock().size() }

    pub fn clear(&self) -> Result<()> { self.inner.lock().clear() }

    pub fn shutdown(&self) -> Result<()> { self.inner.lock().shutdown() }

    pub fn name(&self) -> String { self.inner.lock().name().to_string() }

    pub fn persisted_pages(&self) -> usize { self.inner.lock().persisted_pages() }

    /// Page files on disk, loaded or not.
    pub fn page_files(&self) -> usize { self.inner.lock().page_files() }

    pub fn into_inner(self) -> PersistedQueue<C> { self.inner.into_inner() }
}

impl<C> ThreadSafeQueue<C>
where
    C: Codec,
    C::Item: Clone,
{
    /// A copy of the oldest item, loading a page if needed.
    pub fn front(&self) -> Result<Option<C::Item>> { Ok(self.inner.lock().front()?.cloned()) }
}

impl<C: Codec> From<PersistedQueue<C>> for ThreadSafeQueue<C> {
    fn from(queue: PersistedQueue<C>) -> Self {
        Self {
            inner: Mutex::new(queue),
        }
    }
}

impl<C: Codec> SizedQueue for ThreadSafeQueue<C> {
    fn size(&self) -> usize { Self::size(self) }
}

impl<C: Codec> std::fmt::Debug for ThreadSafeQueue<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadSafeQueue").field("inner", &*self.inner.lock()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use tempfile::TempDir;

    use super::*;
    use crate::codec::Base64StringCodec;

    fn open(dir: &TempDir) -> ThreadSafeQueue<Base64StringCodec> {
        ThreadSafeQueue::open(
            QueueConfig {
                name: "shared".to_string(),
                working_dir: dir.path().to_path_buf(),
                max_items_per_page: 8,
            },
            Base64StringCodec,
        )
        .unwrap()
    }

    #[test]
    fn test_page_files_counts_loaded_pages() {
        let dir = TempDir::new().unwrap();
        {
            let queue = open(&dir);
            for i in 0..24 {
                queue.push(i.to_string()).unwrap();
            }
            assert_eq!(queue.page_files(), 3);
        }

        let queue = open(&dir);
        assert_eq!(queue.persisted_pages(), 1);
        assert_eq!(queue.page_files(), 3);
        queue.shutdown().unwrap();
        drop(queue);

        // Reading the count must not rewrite the pages.
        for id in ["aaaaaa", "aaaaab", "aaaaac"] {
            assert!(dir.path().join(format!("shared.{id}.qpg")).exists());
        }
    }

    #[test]
    fn test_front_does_not_remove() {
        let dir = TempDir::new().unwrap();
        let queue = open(&dir);
        queue.push("a".to_string()).unwrap();
        queue.push("b".to_string()).unwrap();

        assert_eq!(queue.front().unwrap().as_deref(), Some("a"));
        assert_eq!(queue.size(), 2);
        assert_eq!(queue.pop().unwrap().as_deref(), Some("a"));
    }

    #[test]
    fn test_push_front_jumps_the_line() {
        let dir = TempDir::new().unwrap();
        let queue = open(&dir);
        queue.push("b".to_string()).unwrap();
        queue.push_front("a".to_string()).unwrap();

        assert_eq!(queue.pop().unwrap().as_deref(), Some("a"));
        assert_eq!(queue.pop().unwrap().as_deref(), Some("b"));
        assert_eq!(queue.pop().unwrap(), None);
    }

    #[test]
    fn test_concurrent_producers_lose_nothing() {
        let dir = TempDir::new().unwrap();
        let queue = Arc::new(open(&dir));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..50 {
                        queue.push(format!("{t}-{i}")).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(queue.size(), 200);

        let mut per_thread = vec![Vec::new(); 4];
        while let Some(item) = queue.pop().unwrap() {
            let (t, i) = item.split_once('-').unwrap();
            per_thread[t.parse::<usize>().unwrap()].push(i.parse::<usize>().unwrap());
        }
        for seen in per_thread {
            assert_eq!(seen, (0..50).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_shutdown_then_reopen() {
        let dir = TempDir::new().unwrap();
        let queue = open(&dir);
        for i in 0..20 {
            queue.push(i.to_string()).unwrap();
        }
        queue.shutdown().unwrap();
        assert!(queue.push("late".to_string()).unwrap_err().is_shut_down());
        assert_eq!(queue.size(), 20);
        drop(queue);

        let queue = open(&dir);
        assert_eq!(queue.size(), 20);
        assert_eq!(queue.pop().unwrap().as_deref(), Some("0"));
    }
}
