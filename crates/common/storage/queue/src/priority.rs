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

//! Fixed number of persisted queues indexed by priority; level 0 is served
//! first.

use parking_lot::Mutex;
use snafu::ensure;
use tracing::{debug, error};

use crate::{
    QueueConfig, Result, codec::Codec, error::InvalidConfigSnafu, persisted::PersistedQueue,
    sized::SizedQueue,
};

/// Name of the persisted queue backing `level` of priority queue `name`.
#[must_use]
pub fn level_queue_name(name: &str, level: usize) -> String { format!("{name}.priority_{level}") }

pub struct PriorityQueue<C: Codec> {
    inner: Mutex<PriorityInner<C>>,
}

struct PriorityInner<C: Codec> {
    levels:   Vec<PersistedQueue<C>>,
    /// Most recent successful pop and the level it came from.
    last_pop: Option<(usize, C::Item)>,
}

impl<C: Codec> PriorityInner<C> {
    fn clamp(&self, level: usize) -> usize { level.min(self.levels.len() - 1) }
}

impl<C> PriorityQueue<C>
where
    C: Codec + Clone,
{
    /// Opens `levels` queues named `<name>.priority_<i>`, all sharing
    /// `config.working_dir`.
    pub fn open(config: QueueConfig, levels: usize, codec: C) -> Result<Self> {
        ensure!(
            levels > 0,
            InvalidConfigSnafu {
                reason: "a priority queue needs at least one level",
            }
        );
        config.validate()?;

        let queues = (0..levels)
            .map(|level| {
                PersistedQueue::open(
                    QueueConfig {
                        name: level_queue_name(&config.name, level),
                        ..config.clone()
                    },
                    codec.clone(),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(queue = %config.name, levels, "Priority queue opened");
        Ok(Self {
            inner: Mutex::new(PriorityInner {
                levels:   queues,
                last_pop: None,
            }),
        })
    }
}

impl<C: Codec> PriorityQueue<C> {
    pub fn levels(&self) -> usize { self.inner.lock().levels.len() }

    /// Pushes onto `level`; levels past the last one are clamped to it.
    pub fn push(&self, item: C::Item, level: usize) -> Result<()> {
        let mut inner = self.inner.lock();
        let level = inner.clamp(level);
        inner.levels[level].push_back(item)
    }

    pub fn empty(&self) -> bool { self.inner.lock().levels.iter().all(PersistedQueue::empty) }

    /// Total items over all levels.
    pub fn size(&self) -> usize { self.inner.lock().levels.iter().map(PersistedQueue::size).sum() }

    /// Size of one level; `None` for an unknown level.
    pub fn level_size(&self, level: usize) -> Option<usize> {
        self.inner.lock().levels.get(level).map(PersistedQueue::size)
    }

    pub fn last_pop_level(&self) -> Option<usize> { self.inner.lock().last_pop.as_ref().map(|(level, _)| *level) }

    /// Empties one level.
    pub fn clear(&self, level: usize) -> Result<()> {
        let mut inner = self.inner.lock();
        let levels = inner.levels.len();
        let queue = inner.levels.get_mut(level).ok_or_else(|| {
            InvalidConfigSnafu {
                reason: format!("priority level {level} out of range 0..{levels}"),
            }
            .build()
        })?;
        queue.clear()
    }

    pub fn clear_all(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        for queue in &mut inner.levels {
            queue.clear()?;
        }
        Ok(())
    }

    /// Shuts every level down, even if an earlier one fails; the first
    /// error is returned.
    pub fn shutdown(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let mut first_error = None;
        for queue in &mut inner.levels {
            if let Err(e) = queue.shutdown() {
                error!(queue = %queue.name(), error = %e, "Priority level failed to shut down");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl<C> PriorityQueue<C>
where
    C: Codec,
    C::Item: Clone,
{
    /// Pops from the lowest non-empty level and remembers the item so it can
    /// be put back with [`push_back_last_pop`](Self::push_back_last_pop).
    pub fn pop(&self) -> Result<Option<C::Item>> {
        let mut inner = self.inner.lock();
        for level in 0..inner.levels.len() {
            if inner.levels[level].empty() {
                continue;
            }
            if let Some(item) = inner.levels[level].pop_front()? {
                inner.last_pop = Some((level, item.clone()));
                return Ok(Some(item));
            }
        }
        inner.last_pop = None;
        Ok(None)
    }

    /// Re-queues the last popped item at the back of its level. Returns
    /// `false` when there is nothing to put back.
    pub fn push_back_last_pop(&self) -> Result<bool> {
        let mut inner = self.inner.lock();
        let Some((level, item)) = inner.last_pop.take() else {
            return Ok(false);
        };
        inner.levels[level].push_back(item)?;
        Ok(true)
    }

    pub fn last_popped(&self) -> Option<C::Item> { self.inner.lock().last_pop.as_ref().map(|(_, item)| item.clone()) }
}

impl<C: Codec> SizedQueue for PriorityQueue<C> {
    fn size(&self) -> usize { Self::size(self) }
}

impl<C: Codec> std::fmt::Debug for PriorityQueue<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("PriorityQueue")
            .field("levels", &inner.levels)
            .field("last_pop_level", &inner.last_pop.as_ref().map(|(level, _)| *level))
            .finish()
    }
}
