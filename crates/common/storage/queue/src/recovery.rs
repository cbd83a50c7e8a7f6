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

//! Startup recovery for a paging queue.
//!
//! With a valid state descriptor the recorded page list is trusted for order
//! and counts; only files the descriptor does not list are opened to read
//! their headers. Without one every page file of the queue is scanned:
//! head pages first (newest head first), then tail pages by ascending id.
//!
//! Either way the generator resumes after the highest id seen, so ids are
//! never reused while any page file exists.

use std::{
    collections::{HashSet, VecDeque},
    path::{Path, PathBuf},
};

use snafu::ResultExt;
use tracing::{debug, info, warn};

use crate::{
    QueueConfig, Result,
    error::{CouldNotLoadQueueFileSnafu, WorkingDirSnafu},
    page::{PageRole, read_page_header},
    path::{page_file_path, remove_stale_tmp_files, scan_page_files},
    sequence::{PageId, SequenceGenerator},
    state::{PageEntry, StateDescriptor},
    state_writer::StateWriter,
};

/// A page that lives on disk and has not been loaded yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PersistedPage {
    pub id:    PageId,
    pub count: usize,
    pub role:  PageRole,
}

impl From<&PersistedPage> for PageEntry {
    fn from(page: &PersistedPage) -> Self {
        Self {
            id:    page.id,
            count: page.count as u64,
            role:  page.role,
        }
    }
}

/// Everything a queue needs to resume.
pub(crate) struct RecoveryResult {
    /// Persisted pages in queue order, oldest first.
    pub pages:        VecDeque<PersistedPage>,
    pub generator:    SequenceGenerator,
    pub state_writer: StateWriter,
}

pub(crate) fn recover(config: &QueueConfig) -> Result<RecoveryResult> {
    let dir = config.working_dir.as_path();
    let queue = config.name.as_str();
    info!(queue, path = %dir.display(), "Starting queue recovery");

    std::fs::create_dir_all(dir).context(WorkingDirSnafu { path: dir })?;

    let removed = remove_stale_tmp_files(dir, queue).context(WorkingDirSnafu { path: dir })?;
    if removed > 0 {
        warn!(queue, removed, "Removed partially written page files");
    }

    let state_writer = StateWriter::new(dir, queue);
    let (pages, generator) = match state_writer.read_latest() {
        Ok(Some(state)) => recover_from_state(dir, queue, state)?,
        Ok(None) => recover_from_scan(dir, queue)?,
        Err(e) => {
            warn!(queue, error = %e, "State descriptor unusable, scanning page files");
            recover_from_scan(dir, queue)?
        }
    };

    info!(
        queue,
        pages = pages.len(),
        items = pages.iter().map(|p| p.count).sum::<usize>(),
        next_page = %generator.peek().map_or_else(|| "-".to_string(), |id| id.to_string()),
        "Queue recovery complete"
    );

    Ok(RecoveryResult {
        pages,
        generator,
        state_writer,
    })
}

fn recover_from_state(
    dir: &Path,
    queue: &str,
    state: StateDescriptor,
) -> Result<(VecDeque<PersistedPage>, SequenceGenerator)> {
    debug!(
        queue,
        pages = state.pages.len(),
        first = ?state.first_id().map(|id| id.to_string()),
        last = ?state.last_id().map(|id| id.to_string()),
        "Recovering from state descriptor"
    );

    let mut generator = SequenceGenerator::from_raw(state.next_sequence);
    let mut pages = VecDeque::with_capacity(state.pages.len());
    let mut known = HashSet::with_capacity(state.pages.len());

    for entry in state.pages {
        known.insert(entry.id);
        generator.observe(entry.id);
        let path = page_file_path(dir, queue, entry.id);
        if !path.exists() {
            warn!(queue, file = %path.display(), "Recorded page is missing, skipping");
            continue;
        }
        pages.push_back(PersistedPage {
            id:    entry.id,
            count: usize::try_from(entry.count).unwrap_or(usize::MAX),
            role:  entry.role,
        });
    }

    // Pages written after the descriptor was last saved.
    let found = scan_page_files(dir, queue).context(WorkingDirSnafu { path: dir })?;
    let unrecorded: Vec<_> = found
        .into_iter()
        .filter(|(id, _)| !known.contains(id))
        .collect();
    if !unrecorded.is_empty() {
        warn!(queue, count = unrecorded.len(), "Adopting pages missing from state descriptor");
        let (heads, tails) = classify(unrecorded, &mut generator)?;
        for page in heads.into_iter().rev() {
            pages.push_front(page);
        }
        pages.extend(tails);
    }

    Ok((pages, generator))
}

fn recover_from_scan(dir: &Path, queue: &str) -> Result<(VecDeque<PersistedPage>, SequenceGenerator)> {
    let found = scan_page_files(dir, queue).context(WorkingDirSnafu { path: dir })?;
    if found.is_empty() {
        info!(queue, "No persisted pages, starting fresh");
        return Ok((VecDeque::new(), SequenceGenerator::new()));
    }

    warn!(queue, count = found.len(), "Rebuilding page list from page files");
    let mut generator = SequenceGenerator::new();
    let (heads, tails) = classify(found, &mut generator)?;
    Ok((heads.into_iter().chain(tails).collect(), generator))
}

/// Splits pages by role. Heads come back newest first, tails oldest first.
fn classify(
    found: Vec<(PageId, PathBuf)>,
    generator: &mut SequenceGenerator,
) -> Result<(Vec<PersistedPage>, Vec<PersistedPage>)> {
    let mut heads = Vec::new();
    let mut tails = Vec::new();

    for (id, path) in found {
        let header = read_page_header(&path).context(CouldNotLoadQueueFileSnafu { file: &path })?;
        generator.observe(id);
        let page = PersistedPage {
            id,
            count: header.count,
            role: header.role,
        };
        match header.role {
            PageRole::Head => heads.push(page),
            PageRole::Tail => tails.push(page),
        }
    }

    heads.sort_by(|a, b| b.id.cmp(&a.id));
    tails.sort_by_key(|p| p.id);
    Ok((heads, tails))
}
