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

//! Atomic state descriptor writer using a dual-file strategy.
//!
//! Maintains two descriptor slots and alternates between them so at least
//! one valid descriptor exists at any crash point. A one-byte pointer file
//! names the current slot and is only rewritten once the slot is synced.

use std::{
    fs::{self, File, OpenOptions},
    io::{ErrorKind, Read, Write},
    path::{Path, PathBuf},
};

use snafu::ResultExt;
use tracing::debug;

use crate::{
    error::{CorruptSnafu, FileError, IoSnafu},
    path::state_file_path,
    state::StateDescriptor,
};

const SLOT_1: &str = "1";
const SLOT_2: &str = "2";
const SLOT_CURRENT: &str = "current";

pub(crate) struct StateWriter {
    dir:          PathBuf,
    queue:        String,
    current_slot: u8,
}

impl StateWriter {
    /// Opens the writer, picking up the current slot if one was recorded.
    ///
    /// An unreadable pointer file is not an error here; it resets the slot
    /// and is reported by [`read_latest`](Self::read_latest).
    pub fn new<P: AsRef<Path>>(dir: P, queue: &str) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let current_slot = read_slot(&state_file_path(&dir, queue, SLOT_CURRENT))
            .ok()
            .flatten()
            .filter(|slot| *slot == 1 || *slot == 2)
            .unwrap_or(0);

        Self {
            dir,
            queue: queue.to_string(),
            current_slot,
        }
    }

    /// Path of the slot pointer file; used in error reports.
    pub fn current_path(&self) -> PathBuf { state_file_path(&self.dir, &self.queue, SLOT_CURRENT) }

    pub fn write(&mut self, state: &StateDescriptor) -> Result<(), FileError> {
        let next_slot = if self.current_slot == 1 { 2 } else { 1 };
        let slot_path = self.slot_path(next_slot);

        write_synced(&slot_path, &state.serialize()).context(IoSnafu)?;
        write_synced(&self.current_path(), &[next_slot]).context(IoSnafu)?;

        self.current_slot = next_slot;

        debug!(slot = next_slot, path = %slot_path.display(), pages = state.pages.len(), "State written");
        Ok(())
    }

    /// Reads the current descriptor. `Ok(None)` when none was ever written.
    pub fn read_latest(&self) -> Result<Option<StateDescriptor>, FileError> {
        let Some(slot) = read_slot(&self.current_path()).context(IoSnafu)? else {
            return Ok(None);
        };

        if slot != 1 && slot != 2 {
            return CorruptSnafu {
                reason: format!("invalid slot number in state pointer: {slot}"),
            }
            .fail();
        }

        let slot_path = self.slot_path(slot);
        let mut data = Vec::new();
        match File::open(&slot_path) {
            Ok(mut file) => {
                file.read_to_end(&mut data).context(IoSnafu)?;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return CorruptSnafu {
                    reason: format!("state slot {} does not exist", slot_path.display()),
                }
                .fail();
            }
            Err(source) => return Err(FileError::Io { source }),
        }

        StateDescriptor::deserialize(&data).map(Some)
    }

    /// Deletes every state file of this queue.
    pub fn remove_all(&mut self) -> Result<(), FileError> {
        for suffix in [SLOT_CURRENT, SLOT_1, SLOT_2] {
            match fs::remove_file(state_file_path(&self.dir, &self.queue, suffix)) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(source) => return Err(FileError::Io { source }),
            }
        }
        self.current_slot = 0;
        Ok(())
    }

    fn slot_path(&self, slot: u8) -> PathBuf {
        let suffix = if slot == 1 { SLOT_1 } else { SLOT_2 };
        state_file_path(&self.dir, &self.queue, suffix)
    }
}

fn read_slot(path: &Path) -> std::io::Result<Option<u8>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let mut buf = [0u8; 1];
    file.read_exact(&mut buf)?;
    Ok(Some(buf[0]))
}

fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(data)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use test_case::test_case;

    use super::*;
    use crate::{
        page::PageRole,
        sequence::PageId,
        state::{PageEntry, STATE_VERSION},
    };

    fn create_state(next_sequence: u32) -> StateDescriptor {
        StateDescriptor {
            version: STATE_VERSION,
            next_sequence,
            pages: vec![PageEntry {
                id:    PageId::new(next_sequence - 1).unwrap(),
                count: 10,
                role:  PageRole::Tail,
            }],
        }
    }

    #[test]
    fn test_fresh_start_returns_none() {
        let temp_dir = TempDir::new().unwrap();
        let writer = StateWriter::new(temp_dir.path(), "q");
        assert!(writer.read_latest().unwrap().is_none());
    }

    #[test]
    fn test_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = StateWriter::new(temp_dir.path(), "q");

        writer.write(&create_state(100)).unwrap();

        let recovered = writer.read_latest().unwrap().unwrap();
        assert_eq!(recovered, create_state(100));
    }

    #[test_case(1, 1 ; "first write goes to slot 1")]
    #[test_case(2, 2 ; "second write goes to slot 2")]
    #[test_case(3, 1 ; "third write returns to slot 1")]
    fn test_slot_alternation(write_count: u32, expected_slot: u8) {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = StateWriter::new(temp_dir.path(), "q");

        for i in 0..write_count {
            writer.write(&create_state((i + 1) * 100)).unwrap();
        }

        assert_eq!(writer.current_slot, expected_slot);
    }

    #[test]
    fn test_persistence_across_instances() {
        let temp_dir = TempDir::new().unwrap();

        {
            let mut writer = StateWriter::new(temp_dir.path(), "q");
            writer.write(&create_state(5)).unwrap();
            writer.write(&create_state(6)).unwrap();
        }

        let writer = StateWriter::new(temp_dir.path(), "q");
        assert_eq!(writer.current_slot, 2);
        assert_eq!(writer.read_latest().unwrap().unwrap().next_sequence, 6);
    }

    #[test]
    fn test_queues_do_not_share_state() {
        let temp_dir = TempDir::new().unwrap();
        let mut a = StateWriter::new(temp_dir.path(), "a");
        a.write(&create_state(5)).unwrap();

        let b = StateWriter::new(temp_dir.path(), "b");
        assert!(b.read_latest().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_slot_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = StateWriter::new(temp_dir.path(), "q");
        writer.write(&create_state(5)).unwrap();

        fs::write(state_file_path(temp_dir.path(), "q", SLOT_1), b"garbage").unwrap();
        assert!(matches!(
            writer.read_latest(),
            Err(FileError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_remove_all() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = StateWriter::new(temp_dir.path(), "q");
        writer.write(&create_state(5)).unwrap();
        writer.write(&create_state(6)).unwrap();

        writer.remove_all().unwrap();
        assert!(writer.read_latest().unwrap().is_none());
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }
}
