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

//! File naming inside a queue's working directory.
//!
//! ```text
//! <queue>.<id>.qpg         page file, <id> from `PageId`
//! <queue>.<id>.qpg.tmp     page being written, renamed into place when synced
//! <queue>.state.{1,2}      state descriptor slots
//! <queue>.state.current    which slot is current
//! ```

use std::{
    io,
    path::{Path, PathBuf},
};

use crate::sequence::PageId;

pub const PAGE_EXTENSION: &str = "qpg";
pub const TMP_EXTENSION: &str = "tmp";

/// Generates a page file name: `<queue>.<id>.qpg`.
pub fn page_file_name(queue: &str, id: PageId) -> String { format!("{queue}.{id}.{PAGE_EXTENSION}") }

/// Returns the full path of a page file.
pub fn page_file_path<P: AsRef<Path>>(dir: P, queue: &str, id: PageId) -> PathBuf {
    dir.as_ref().join(page_file_name(queue, id))
}

/// Returns the temporary path a page is written to before being renamed.
pub fn page_tmp_path<P: AsRef<Path>>(dir: P, queue: &str, id: PageId) -> PathBuf {
    dir.as_ref()
        .join(format!("{}.{TMP_EXTENSION}", page_file_name(queue, id)))
}

/// Extracts the page id from `file_name` if it is a page of `queue`.
pub fn parse_page_file_name(queue: &str, file_name: &str) -> Option<PageId> {
    let id = file_name
        .strip_prefix(queue)?
        .strip_prefix('.')?
        .strip_suffix(PAGE_EXTENSION)?
        .strip_suffix('.')?;
    PageId::parse(id)
}

/// Returns the path of one state descriptor file: `<queue>.state.<suffix>`.
pub fn state_file_path<P: AsRef<Path>>(dir: P, queue: &str, suffix: &str) -> PathBuf {
    dir.as_ref().join(format!("{queue}.state.{suffix}"))
}

/// Lists every page file of `queue` in `dir`, sorted by id.
pub fn scan_page_files<P: AsRef<Path>>(dir: P, queue: &str) -> io::Result<Vec<(PageId, PathBuf)>> {
    let mut pages = Vec::new();
    for entry in std::fs::read_dir(dir.as_ref())? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if let Some(id) = name.to_str().and_then(|n| parse_page_file_name(queue, n)) {
            pages.push((id, entry.path()));
        }
    }
    pages.sort_by_key(|(id, _)| *id);
    Ok(pages)
}

/// Removes half-written page files left by an interrupted write.
pub fn remove_stale_tmp_files<P: AsRef<Path>>(dir: P, queue: &str) -> io::Result<usize> {
    let suffix = format!(".{PAGE_EXTENSION}.{TMP_EXTENSION}");
    let mut removed = 0;
    for entry in std::fs::read_dir(dir.as_ref())? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let is_ours = name
            .strip_suffix(&suffix)
            .and_then(|stem| stem.strip_prefix(queue))
            .and_then(|rest| rest.strip_prefix('.'))
            .is_some_and(|id| PageId::parse(id).is_some());
        if is_ours {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}
