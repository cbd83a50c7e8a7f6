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

//! Page files.
//!
//! A page is an ordered run of items written once, read once and then
//! deleted. On disk it is UTF-8 text:
//!
//! ```text
//! QPG1 <role> <count> <crc32>\n     header; role is H (head) or T (tail)
//! <encoded item 0>\n
//! <encoded item 1>\n
//! ...
//! ```
//!
//! The CRC covers every byte after the header line. Pages are written to a
//! `.tmp` sibling, synced and renamed, so a crash mid-write never leaves a
//! partial file under the page's real name.

use std::{
    fmt,
    fs::{self, File, OpenOptions},
    io::{BufRead, BufReader, Read, Write},
    path::{Path, PathBuf},
};

use snafu::{ResultExt, ensure};
use tracing::debug;

use crate::{
    codec::Codec,
    crc::page_checksum,
    error::{CodecSnafu, CorruptSnafu, FileError, IoSnafu, MultiLineSnafu},
    path::{page_file_path, page_tmp_path},
    sequence::PageId,
};

const PAGE_MAGIC: &str = "QPG1";

/// Where a page sits relative to the rest of the queue when recovered
/// without a state descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRole {
    /// In-memory front page persisted at shutdown; older than every tail
    /// page.
    Head,
    /// Page spilled from the back of the queue.
    Tail,
}

impl PageRole {
    const fn as_char(self) -> char {
        match self {
            Self::Head => 'H',
            Self::Tail => 'T',
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "H" => Some(Self::Head),
            "T" => Some(Self::Tail),
            _ => None,
        }
    }

    pub(crate) const fn to_byte(self) -> u8 {
        match self {
            Self::Head => 1,
            Self::Tail => 0,
        }
    }

    pub(crate) const fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Head),
            0 => Some(Self::Tail),
            _ => None,
        }
    }
}

/// Parsed first line of a page file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub role:     PageRole,
    pub count:    usize,
    pub checksum: u32,
}

impl fmt::Display for PageHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{PAGE_MAGIC} {} {} {:08x}",
            self.role.as_char(),
            self.count,
            self.checksum
        )
    }
}

impl PageHeader {
    fn parse(line: &str) -> Result<Self, FileError> {
        let corrupt = || {
            CorruptSnafu {
                reason: format!("bad page header {line:?}"),
            }
            .build()
        };
        let mut fields = line.split(' ');
        if fields.next() != Some(PAGE_MAGIC) {
            return Err(corrupt());
        }
        let role = fields.next().and_then(PageRole::parse).ok_or_else(corrupt)?;
        let count = fields
            .next()
            .and_then(|c| c.parse().ok())
            .ok_or_else(corrupt)?;
        let checksum = fields
            .next()
            .and_then(|c| u32::from_str_radix(c, 16).ok())
            .ok_or_else(corrupt)?;
        if fields.next().is_some() {
            return Err(corrupt());
        }
        Ok(Self {
            role,
            count,
            checksum,
        })
    }
}

/// Encodes `items` and writes them as page `id` of `queue`.
///
/// Returns the final path. Nothing is left under the page's name if any step
/// fails.
pub fn write_page<'a, C, I>(
    dir: &Path,
    queue: &str,
    id: PageId,
    role: PageRole,
    items: I,
    codec: &C,
) -> Result<PathBuf, FileError>
where
    C: Codec,
    C::Item: 'a,
    I: IntoIterator<Item = &'a C::Item>,
{
    let mut body = String::new();
    let mut count = 0usize;
    for (index, item) in items.into_iter().enumerate() {
        let encoded = codec.encode(item).context(CodecSnafu)?;
        ensure!(
            !encoded.contains(['\n', '\r']),
            MultiLineSnafu { index }
        );
        body.push_str(&encoded);
        body.push('\n');
        count += 1;
    }

    let header = PageHeader {
        role,
        count,
        checksum: page_checksum(body.as_bytes()),
    };

    let tmp_path = page_tmp_path(dir, queue, id);
    let final_path = page_file_path(dir, queue, id);

    let written = write_synced(&tmp_path, &header, &body)
        .and_then(|()| fs::rename(&tmp_path, &final_path))
        .and_then(|()| sync_dir(dir));
    if let Err(source) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(FileError::Io { source });
    }

    debug!(file = %final_path.display(), items = count, role = ?role, "Page written");
    Ok(final_path)
}

fn write_synced(path: &Path, header: &PageHeader, body: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    writeln!(file, "{header}")?;
    file.write_all(body.as_bytes())?;
    file.sync_all()
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> { File::open(dir)?.sync_all() }

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> { Ok(()) }

/// Reads only the header of a page file.
pub fn read_page_header(path: &Path) -> Result<PageHeader, FileError> {
    let file = File::open(path).context(IoSnafu)?;
    let mut line = String::new();
    BufReader::new(file).read_line(&mut line).context(IoSnafu)?;
    PageHeader::parse(line.trim_end_matches('\n'))
}

/// Reads, verifies and decodes a whole page.
pub fn read_page<C: Codec>(path: &Path, codec: &C) -> Result<(PageHeader, Vec<C::Item>), FileError> {
    let mut contents = String::new();
    File::open(path)
        .and_then(|mut f| f.read_to_string(&mut contents))
        .context(IoSnafu)?;

    let (header_line, body) = contents.split_once('\n').ok_or_else(|| {
        CorruptSnafu {
            reason: "missing page header".to_string(),
        }
        .build()
    })?;
    let header = PageHeader::parse(header_line)?;

    let actual = page_checksum(body.as_bytes());
    ensure!(
        actual == header.checksum,
        CorruptSnafu {
            reason: format!(
                "checksum mismatch: stored={:#010x}, computed={actual:#010x}",
                header.checksum
            ),
        }
    );

    let mut items = Vec::with_capacity(header.count);
    for line in body.lines() {
        items.push(codec.decode(line).context(CodecSnafu)?);
    }
    ensure!(
        items.len() == header.count,
        CorruptSnafu {
            reason: format!(
                "header announces {} items, found {}",
                header.count,
                items.len()
            ),
        }
    );

    Ok((header, items))
}
