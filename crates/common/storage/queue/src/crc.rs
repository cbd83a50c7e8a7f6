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

//! CRC32 checksums guarding page and state files against torn or corrupted
//! writes.
//!
//! Uses CRC-32 (IEEE polynomial) via crc32fast.

use crc32fast::Hasher;

/// Checksum of a page body (every byte after the header line).
#[inline]
pub(crate) fn page_checksum(body: &[u8]) -> u32 { crc32fast::hash(body) }

/// Checksum of a state descriptor body, seeded with its record count so a
/// truncated list is detected even when the remaining bytes happen to match.
#[inline]
pub(crate) fn state_checksum(page_count: u32, body: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&page_count.to_le_bytes());
    hasher.update(body);
    hasher.finalize()
}
