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

//! The paging queue engine.
//!
//! Items live in three places, in queue order:
//!
//! ```text
//!   front page (memory) -> persisted pages (disk, oldest first) -> back page (memory)
//! ```
//!
//! Pushes go to the back page; a full back page is written out as a tail
//! page. Pops come from the front page; an empty front page is refilled from
//! the oldest persisted page, or swapped with the back page when nothing is
//! on disk.
//!
//! A loaded page keeps its file until the in-memory copy changes, so a crash
//! right after a load loses nothing. The file is deleted on the first pop or
//! push that touches the page; an untouched page is handed back to the page
//! list at shutdown without being rewritten.

use std::{
    collections::VecDeque,
    fs,
    io::ErrorKind,
    mem,
    path::{Path, PathBuf},
};

use snafu::{OptionExt, ResultExt, ensure};
use tracing::{debug, error, info, warn};

use crate::{
    QueueConfig, Result,
    codec::Codec,
    error::{
        CouldNotLoadQueueFileSnafu, CouldNotWriteQueueFileSnafu, FileError, QueueShutDownSnafu,
        SequenceExhaustedSnafu,
    },
    page::{PageRole, read_page, write_page},
    path::{page_file_path, scan_page_files},
    recovery::{PersistedPage, RecoveryResult, recover},
    sequence::{PageId, SequenceGenerator},
    sized::SizedQueue,
    state::StateDescriptor,
    state_writer::StateWriter,
};

/// Single-threaded disk-backed FIFO queue.
///
/// Holding at most two pages in memory, the queue can grow far beyond RAM.
/// Dropping the queue without calling [`shutdown`](Self::shutdown) still
/// persists the in-memory pages; failures there are logged.
pub struct PersistedQueue<C: Codec> {
    name:               String,
    dir:                PathBuf,
    max_items_per_page: usize,
    codec:              C,
    front:              VecDeque<C::Item>,
    pages:              VecDeque<PersistedPage>,
    back:               VecDeque<C::Item>,
    /// File still holding exactly the items in `front`.
    front_backing:      Option<PersistedPage>,
    /// File still holding exactly the items in `back`.
    back_backing:       Option<PersistedPage>,
    generator:          SequenceGenerator,
    state_writer:       StateWriter,
    shut_down:          bool,
}

impl<C: Codec> PersistedQueue<C> {
    /// Opens the queue in `config.working_dir`, recovering whatever a
    /// previous instance left there.
    pub fn open(config: QueueConfig, codec: C) -> Result<Self> {
        config.validate()?;
        let RecoveryResult {
            pages,
            generator,
            state_writer,
        } = recover(&config)?;

        let mut queue = Self {
            name: config.name,
            dir: config.working_dir,
            max_items_per_page: config.max_items_per_page,
            codec,
            front: VecDeque::new(),
            pages,
            back: VecDeque::new(),
            front_backing: None,
            back_backing: None,
            generator,
            state_writer,
            shut_down: false,
        };

        queue.load_boundary_pages();
        queue.write_state()?;

        info!(
            queue = %queue.name,
            size = queue.size(),
            pages = queue.pages.len(),
            "Queue opened"
        );
        Ok(queue)
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn working_dir(&self) -> &Path { &self.dir }

    pub const fn max_items_per_page(&self) -> usize { self.max_items_per_page }

    /// Number of pages on disk that have not been loaded.
    pub fn persisted_pages(&self) -> usize { self.pages.len() }

    /// Number of page files on disk, including the ones currently loaded.
    pub fn page_files(&self) -> usize {
        self.pages.len() + usize::from(self.front_backing.is_some()) + usize::from(self.back_backing.is_some())
    }

    pub const fn is_shut_down(&self) -> bool { self.shut_down }

    /// Appends `item` at the back, spilling the back page when it fills up.
    ///
    /// On a write error the item is still queued in memory and the spill is
    /// retried on the next push.
    pub fn push_back(&mut self, item: C::Item) -> Result<()> {
        self.ensure_open()?;
        self.release_backing(End::Newest)?;
        self.back.push_back(item);
        if self.back.len() >= self.max_items_per_page {
            self.spill_back()?;
        }
        Ok(())
    }

    /// Puts `item` at the head of the queue, ahead of everything else.
    pub fn push_front(&mut self, item: C::Item) -> Result<()> {
        self.ensure_open()?;
        self.release_backing(End::Oldest)?;
        self.front.push_front(item);
        Ok(())
    }

    /// Removes and returns the oldest item. `Ok(None)` when empty.
    pub fn pop_front(&mut self) -> Result<Option<C::Item>> {
        self.ensure_open()?;
        self.refill_front()?;
        if self.front.is_empty() {
            return Ok(None);
        }
        self.release_backing(End::Oldest)?;
        Ok(self.front.pop_front())
    }

    /// Borrows the oldest item without removing it. May load a page.
    pub fn front(&mut self) -> Result<Option<&C::Item>> {
        self.ensure_open()?;
        self.refill_front()?;
        Ok(self.front.front())
    }

    #[must_use]
    pub fn empty(&self) -> bool { self.front.is_empty() && self.pages.is_empty() && self.back.is_empty() }

    #[must_use]
    pub fn size(&self) -> usize {
        self.front.len() + self.back.len() + self.pages.iter().map(|p| p.count).sum::<usize>()
    }

    /// Drops every item, in memory and on disk, and deletes the state files.
    ///
    /// The page id counter keeps running so ids are not reused.
    pub fn clear(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.front.clear();
        self.back.clear();
        for page in [self.front_backing.take(), self.back_backing.take()].into_iter().flatten() {
            remove_page_file(&page_file_path(&self.dir, &self.name, page.id))?;
        }

        while let Some(page) = self.pages.front().copied() {
            remove_page_file(&page_file_path(&self.dir, &self.name, page.id))?;
            self.pages.pop_front();
        }

        // Strays not referenced by the list, e.g. from a failed load.
        let strays = scan_page_files(&self.dir, &self.name)
            .map_err(|source| FileError::Io { source })
            .context(CouldNotWriteQueueFileSnafu { file: &self.dir })?;
        for (_, path) in strays {
            remove_page_file(&path)?;
        }

        self.state_writer
            .remove_all()
            .context(CouldNotWriteQueueFileSnafu {
                file: self.state_writer.current_path(),
            })?;

        info!(queue = %self.name, "Queue cleared");
        Ok(())
    }

    /// Persists both in-memory pages and the state descriptor, then refuses
    /// further mutation. Calling it again is a no-op.
    ///
    /// If persisting fails the queue stays open so the call can be retried.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }
        self.persist_memory_pages()?;
        self.write_state()?;
        self.shut_down = true;
        info!(queue = %self.name, size = self.size(), pages = self.pages.len(), "Queue shut down");
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        ensure!(!self.shut_down, QueueShutDownSnafu);
        Ok(())
    }

    fn next_page_id(&self) -> Result<PageId> {
        self.generator.peek().context(SequenceExhaustedSnafu {
            last: PageId::LAST.to_string(),
        })
    }

    /// Writes `items` as a new page. The id is only consumed once the file
    /// exists, so ids on disk stay contiguous.
    fn write_new_page(&mut self, role: PageRole, items: &VecDeque<C::Item>) -> Result<PersistedPage> {
        let id = self.next_page_id()?;
        write_page(&self.dir, &self.name, id, role, items, &self.codec).context(
            CouldNotWriteQueueFileSnafu {
                file: page_file_path(&self.dir, &self.name, id),
            },
        )?;
        self.generator.observe(id);
        Ok(PersistedPage {
            id,
            count: items.len(),
            role,
        })
    }

    fn spill_back(&mut self) -> Result<()> {
        let back = mem::take(&mut self.back);
        let written = self.write_new_page(PageRole::Tail, &back);
        let page = match written {
            Ok(page) => page,
            Err(e) => {
                self.back = back;
                return Err(e);
            }
        };
        debug!(queue = %self.name, page = %page.id, items = page.count, "Spilled back page");
        self.pages.push_back(page);
        self.write_state_logged();
        Ok(())
    }

    /// Loads pages into an empty front page. The loaded file stays on disk
    /// as the front page's backing until an item is popped.
    fn refill_front(&mut self) -> Result<()> {
        while self.front.is_empty() {
            // An empty front holds nothing worth keeping.
            self.release_backing(End::Oldest)?;
            if self.pages.is_empty() {
                mem::swap(&mut self.front, &mut self.back);
                self.front_backing = self.back_backing.take();
                break;
            }
            let (page, items) = self.take_page(End::Oldest)?;
            self.front = items;
            self.front_backing = page;
        }
        Ok(())
    }

    /// Deletes the file behind the front or back page before that page
    /// changes in memory.
    fn release_backing(&mut self, end: End) -> Result<()> {
        let slot = match end {
            End::Oldest => &mut self.front_backing,
            End::Newest => &mut self.back_backing,
        };
        let Some(page) = *slot else {
            return Ok(());
        };
        remove_page_file(&page_file_path(&self.dir, &self.name, page.id))?;
        *slot = None;
        debug!(queue = %self.name, page = %page.id, "Released loaded page file");
        self.write_state_logged();
        Ok(())
    }

    /// Reads and unlists one persisted page, leaving its file on disk. On
    /// failure the page stays in the list.
    fn take_page(&mut self, end: End) -> Result<(Option<PersistedPage>, VecDeque<C::Item>)> {
        let page = match end {
            End::Oldest => self.pages.front(),
            End::Newest => self.pages.back(),
        };
        let Some(page) = page.copied() else {
            return Ok((None, VecDeque::new()));
        };

        let path = page_file_path(&self.dir, &self.name, page.id);
        let (_, items) = read_page(&path, &self.codec).context(CouldNotLoadQueueFileSnafu { file: &path })?;

        match end {
            End::Oldest => self.pages.pop_front(),
            End::Newest => self.pages.pop_back(),
        };
        if items.len() != page.count {
            warn!(
                queue = %self.name,
                page = %page.id,
                recorded = page.count,
                actual = items.len(),
                "Page item count differs from recorded count"
            );
        }
        debug!(queue = %self.name, page = %page.id, items = items.len(), "Loaded page");
        let loaded = PersistedPage {
            count: items.len(),
            ..page
        };
        Ok((Some(loaded), items.into()))
    }

    /// Eagerly pulls the oldest page into the front and the newest into the
    /// back. Failures are logged and surface again on the pop that needs
    /// the page.
    fn load_boundary_pages(&mut self) {
        match self.take_page(End::Oldest) {
            Ok((page, items)) => {
                self.front = items;
                self.front_backing = page;
            }
            Err(e) => {
                warn!(queue = %self.name, error = %e, "Could not preload oldest page");
                return;
            }
        }
        match self.take_page(End::Newest) {
            Ok((page, items)) => {
                self.back = items;
                self.back_backing = page;
            }
            Err(e) => warn!(queue = %self.name, error = %e, "Could not preload newest page"),
        }
    }

    /// Writes the front page as a head page and the back page as a tail page.
    /// A page whose file is still on disk goes back into the list as is.
    fn persist_memory_pages(&mut self) -> Result<()> {
        if let Some(page) = self.front_backing.take() {
            self.front.clear();
            self.pages.push_front(page);
        } else if !self.front.is_empty() {
            let front = mem::take(&mut self.front);
            match self.write_new_page(PageRole::Head, &front) {
                Ok(page) => self.pages.push_front(page),
                Err(e) => {
                    self.front = front;
                    return Err(e);
                }
            }
        }
        if let Some(page) = self.back_backing.take() {
            self.back.clear();
            self.pages.push_back(page);
        } else if !self.back.is_empty() {
            let back = mem::take(&mut self.back);
            match self.write_new_page(PageRole::Tail, &back) {
                Ok(page) => self.pages.push_back(page),
                Err(e) => {
                    self.back = back;
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn state(&self) -> StateDescriptor {
        StateDescriptor {
            next_sequence: self.generator.raw_next(),
            pages: self
                .front_backing
                .iter()
                .chain(&self.pages)
                .chain(&self.back_backing)
                .map(Into::into)
                .collect(),
            ..Default::default()
        }
    }

    fn write_state(&mut self) -> Result<()> {
        let state = self.state();
        self.state_writer
            .write(&state)
            .context(CouldNotWriteQueueFileSnafu {
                file: self.state_writer.current_path(),
            })
    }

    /// Recovery copes with a stale descriptor, so routine updates only log.
    fn write_state_logged(&mut self) {
        if let Err(e) = self.write_state() {
            warn!(queue = %self.name, error = %e, "Could not update state descriptor");
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum End {
    Oldest,
    Newest,
}

fn remove_page_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(FileError::Io { source }).context(CouldNotWriteQueueFileSnafu { file: path }),
    }
}

impl<C: Codec> SizedQueue for PersistedQueue<C> {
    fn size(&self) -> usize { Self::size(self) }
}

impl<C: Codec> Drop for PersistedQueue<C> {
    fn drop(&mut self) {
        if self.shut_down {
            return;
        }
        if let Err(e) = self.persist_memory_pages().and_then(|()| self.write_state()) {
            error!(queue = %self.name, error = %e, "Failed to persist queue on drop");
        }
    }
}

impl<C: Codec> std::fmt::Debug for PersistedQueue<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistedQueue")
            .field("name", &self.name)
            .field("dir", &self.dir)
            .field("max_items_per_page", &self.max_items_per_page)
            .field("front", &self.front.len())
            .field("pages", &self.pages.len())
            .field("back", &self.back.len())
            .field("page_files", &self.page_files())
            .field("shut_down", &self.shut_down)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::{QueueError, error::CodecError, state_writer::StateWriter};

    /// Stores items verbatim, so an item with a line break cannot be paged.
    #[derive(Debug, Clone, Copy)]
    struct VerbatimCodec;

    impl Codec for VerbatimCodec {
        type Item = String;

        fn encode(&self, item: &String) -> std::result::Result<String, CodecError> { Ok(item.clone()) }

        fn decode(&self, encoded: &str) -> std::result::Result<String, CodecError> { Ok(encoded.to_string()) }
    }

    fn config(dir: &TempDir, page_size: usize) -> QueueConfig {
        QueueConfig {
            name: "core".to_string(),
            working_dir: dir.path().to_path_buf(),
            max_items_per_page: page_size,
        }
    }

    #[test]
    fn test_failed_spill_keeps_items_in_memory() {
        let dir = TempDir::new().unwrap();
        let mut queue = PersistedQueue::open(config(&dir, 2), VerbatimCodec).unwrap();

        queue.push_back("a".to_string()).unwrap();
        let err = queue.push_back("b\nc".to_string()).unwrap_err();
        assert!(matches!(err, QueueError::CouldNotWriteQueueFile { .. }));
        assert_eq!(queue.size(), 2);
        assert_eq!(queue.persisted_pages(), 0);

        assert_eq!(queue.pop_front().unwrap().as_deref(), Some("a"));
        assert_eq!(queue.pop_front().unwrap().as_deref(), Some("b\nc"));
        std::mem::forget(queue);
    }

    #[test]
    fn test_front_loads_page() {
        let dir = TempDir::new().unwrap();
        let mut queue = PersistedQueue::open(config(&dir, 2), VerbatimCodec).unwrap();
        for item in ["a", "b", "c"] {
            queue.push_back(item.to_string()).unwrap();
        }
        assert_eq!(queue.persisted_pages(), 1);

        assert_eq!(queue.front().unwrap().map(String::as_str), Some("a"));
        assert_eq!(queue.persisted_pages(), 0);
        assert_eq!(queue.page_files(), 1);
        assert_eq!(queue.size(), 3);

        assert_eq!(queue.pop_front().unwrap().as_deref(), Some("a"));
        assert_eq!(queue.page_files(), 0);
        assert!(!dir.path().join("core.aaaaaa.qpg").exists());
    }

    #[test]
    fn test_open_keeps_loaded_page_files() {
        let dir = TempDir::new().unwrap();
        {
            let mut queue = PersistedQueue::open(config(&dir, 2), VerbatimCodec).unwrap();
            for item in ["a", "b", "c", "d", "e", "f"] {
                queue.push_back(item.to_string()).unwrap();
            }
            std::mem::forget(queue);
        }

        let mut queue = PersistedQueue::open(config(&dir, 2), VerbatimCodec).unwrap();
        assert_eq!(queue.persisted_pages(), 1);
        assert_eq!(queue.page_files(), 3);
        for id in ["aaaaaa", "aaaaab", "aaaaac"] {
            assert!(dir.path().join(format!("core.{id}.qpg")).exists());
        }

        queue.push_front("z".to_string()).unwrap();
        assert!(!dir.path().join("core.aaaaaa.qpg").exists());
        queue.push_back("g".to_string()).unwrap();
        assert!(!dir.path().join("core.aaaaac.qpg").exists());
        assert_eq!(queue.size(), 8);
        std::mem::forget(queue);
    }

    #[test]
    fn test_push_front_after_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let mut queue = PersistedQueue::open(config(&dir, 2), VerbatimCodec).unwrap();
            for item in ["b", "c", "d", "e", "f"] {
                queue.push_back(item.to_string()).unwrap();
            }
        }
        let mut queue = PersistedQueue::open(config(&dir, 2), VerbatimCodec).unwrap();
        queue.push_front("a".to_string()).unwrap();

        let mut drained = Vec::new();
        while let Some(item) = queue.pop_front().unwrap() {
            drained.push(item);
        }
        assert_eq!(drained, ["a", "b", "c", "d", "e", "f"]);
    }

    #[test]
    fn test_sequence_exhaustion_is_reported() {
        let dir = TempDir::new().unwrap();
        StateWriter::new(dir.path(), "core")
            .write(&StateDescriptor {
                next_sequence: PageId::LAST.value(),
                ..Default::default()
            })
            .unwrap();

        let mut queue = PersistedQueue::open(config(&dir, 1), VerbatimCodec).unwrap();
        queue.push_back("last page".to_string()).unwrap();
        assert!(dir.path().join("core.zzzzzz.qpg").exists());

        let err = queue.push_back("no room".to_string()).unwrap_err();
        assert!(matches!(err, QueueError::SequenceExhausted { .. }));
        assert_eq!(queue.size(), 2);
        std::mem::forget(queue);
    }
}
