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

#![allow(clippy::cast_possible_truncation)]

//! State descriptor for fast queue recovery.
//!
//! The descriptor records the persisted pages in queue order together with
//! their item counts and the next page id, so a restart neither scans the
//! directory nor opens every page to count items.
//!
//! ## Binary Format
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │ Header (24 bytes)                                       │
//! ├──────────────────┬─────────────────────────────────────┤
//! │ magic: [u8; 4]   │ "QSTA"                              │
//! │ version: u32     │ Format version, currently 1         │
//! │ next_seq: u32    │ Raw value of the next page id       │
//! │ page_count: u32  │ Number of PageEntry records         │
//! │ checksum: u32    │ CRC32 of page_count + body          │
//! │ reserved: [u8;4] │                                     │
//! ├──────────────────┴─────────────────────────────────────┤
//! │ PageEntry[] (13 bytes each: id u32, count u64, role u8) │
//! └────────────────────────────────────────────────────────┘
//! ```

use std::io::{Cursor, Read};

use snafu::{ResultExt, ensure};

use crate::{
    crc::state_checksum,
    error::{CorruptSnafu, FileError, IoSnafu},
    page::PageRole,
    sequence::PageId,
};

/// Magic bytes identifying a state file: "QSTA"
pub const STATE_MAGIC: [u8; 4] = *b"QSTA";

/// Current state format version.
pub const STATE_VERSION: u32 = 1;

/// Size of the state header in bytes.
pub const STATE_HEADER_SIZE: usize = 24;

const ENTRY_SIZE: usize = 13;

/// One persisted page as recorded in the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageEntry {
    pub id:    PageId,
    pub count: u64,
    pub role:  PageRole,
}

/// Persisted queue state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDescriptor {
    pub version:       u32,
    /// Raw value of the next page id to issue.
    pub next_sequence: u32,
    /// Persisted pages, oldest first.
    pub pages:         Vec<PageEntry>,
}

impl Default for StateDescriptor {
    fn default() -> Self {
        Self {
            version:       STATE_VERSION,
            next_sequence: 0,
            pages:         Vec::new(),
        }
    }
}

impl StateDescriptor {
    /// Id of the oldest persisted page.
    #[must_use]
    pub fn first_id(&self) -> Option<PageId> { self.pages.first().map(|p| p.id) }

    /// Id of the newest persisted page.
    #[must_use]
    pub fn last_id(&self) -> Option<PageId> { self.pages.last().map(|p| p.id) }

    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(self.pages.len() * ENTRY_SIZE);
        for entry in &self.pages {
            body.extend_from_slice(&entry.id.value().to_le_bytes());
            body.extend_from_slice(&entry.count.to_le_bytes());
            body.push(entry.role.to_byte());
        }

        let page_count = self.pages.len() as u32;
        let checksum = state_checksum(page_count, &body);

        let mut header = [0u8; STATE_HEADER_SIZE];
        header[0..4].copy_from_slice(&STATE_MAGIC);
        header[4..8].copy_from_slice(&self.version.to_le_bytes());
        header[8..12].copy_from_slice(&self.next_sequence.to_le_bytes());
        header[12..16].copy_from_slice(&page_count.to_le_bytes());
        header[16..20].copy_from_slice(&checksum.to_le_bytes());

        let mut result = Vec::with_capacity(STATE_HEADER_SIZE + body.len());
        result.extend_from_slice(&header);
        result.extend(body);
        result
    }

    /// Deserialize a descriptor, validating magic, version and checksum.
    pub fn deserialize(data: &[u8]) -> Result<Self, FileError> {
        ensure!(
            data.len() >= STATE_HEADER_SIZE,
            CorruptSnafu {
                reason: format!(
                    "data too short: {} bytes, expected at least {STATE_HEADER_SIZE}",
                    data.len()
                ),
            }
        );

        let magic = &data[0..4];
        ensure!(
            magic == STATE_MAGIC,
            CorruptSnafu {
                reason: format!("invalid magic: {magic:?}"),
            }
        );

        let mut header = Cursor::new(&data[4..20]);
        let version = read_u32(&mut header)?;
        ensure!(
            version == STATE_VERSION,
            CorruptSnafu {
                reason: format!("unsupported version {version}"),
            }
        );
        let next_sequence = read_u32(&mut header)?;
        let page_count = read_u32(&mut header)?;
        let stored_checksum = read_u32(&mut header)?;

        let body = &data[STATE_HEADER_SIZE..];
        let computed_checksum = state_checksum(page_count, body);
        ensure!(
            stored_checksum == computed_checksum,
            CorruptSnafu {
                reason: format!(
                    "checksum mismatch: stored={stored_checksum:#x}, \
                     computed={computed_checksum:#x}"
                ),
            }
        );
        ensure!(
            body.len() == page_count as usize * ENTRY_SIZE,
            CorruptSnafu {
                reason: format!("{} body bytes for {page_count} pages", body.len()),
            }
        );

        let mut cursor = Cursor::new(body);
        let mut pages = Vec::with_capacity(page_count as usize);
        for _ in 0..page_count {
            pages.push(PageEntry::read_from(&mut cursor)?);
        }

        Ok(Self {
            version,
            next_sequence,
            pages,
        })
    }
}

impl PageEntry {
    fn read_from<R: Read>(reader: &mut R) -> Result<Self, FileError> {
        let raw_id = read_u32(reader)?;
        let id = PageId::new(raw_id).ok_or_else(|| {
            CorruptSnafu {
                reason: format!("page id {raw_id} out of range"),
            }
            .build()
        })?;

        let mut buf8 = [0u8; 8];
        reader.read_exact(&mut buf8).context(IoSnafu)?;
        let count = u64::from_le_bytes(buf8);

        let mut buf1 = [0u8; 1];
        reader.read_exact(&mut buf1).context(IoSnafu)?;
        let role = PageRole::from_byte(buf1[0]).ok_or_else(|| {
            CorruptSnafu {
                reason: format!("unknown page role {}", buf1[0]),
            }
            .build()
        })?;

        Ok(Self { id, count, role })
    }
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32, FileError> {
    let mut buf4 = [0u8; 4];
    reader.read_exact(&mut buf4).context(IoSnafu)?;
    Ok(u32::from_le_bytes(buf4))
}
