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

//! Error types for the paging queue.

use std::{io, path::PathBuf, string::FromUtf8Error};

use snafu::Snafu;

/// Failure converting an item to or from its persisted string form.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CodecError {
    #[snafu(display("Failed to decode item: {reason}"))]
    Decode { reason: String },

    #[snafu(display("Invalid base64 input: {source}"))]
    Base64 { source: base64::DecodeError },

    #[snafu(display("Decoded bytes are not valid UTF-8: {source}"))]
    Utf8 { source: FromUtf8Error },

    #[snafu(display("JSON error: {source}"))]
    Json { source: serde_json::Error },
}

/// Low-level failure reading or writing one page or state file.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum FileError {
    #[snafu(display("{source}"))]
    Io { source: io::Error },

    #[snafu(display("{source}"))]
    Codec { source: CodecError },

    #[snafu(display("item {index} encodes to a string containing a line break"))]
    MultiLine { index: usize },

    #[snafu(display("corrupt file: {reason}"))]
    Corrupt { reason: String },
}

/// Queue operation errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum QueueError {
    /// A page or state file could not be written. The queue keeps the
    /// affected items in memory.
    #[snafu(display("Could not write queue file {}: {source}", file.display()))]
    CouldNotWriteQueueFile { file: PathBuf, source: FileError },

    /// A page file could not be read, validated or decoded. The page stays
    /// on disk and in the persisted list.
    #[snafu(display("Could not load queue file {}: {source}", file.display()))]
    CouldNotLoadQueueFile { file: PathBuf, source: FileError },

    #[snafu(display("Queue has been shut down"))]
    QueueShutDown,

    /// Every page identifier has been handed out.
    #[snafu(display("Page sequence exhausted after '{last}'"))]
    SequenceExhausted { last: String },

    #[snafu(display("Invalid queue configuration: {reason}"))]
    InvalidConfig { reason: String },

    #[snafu(display("Working directory {} is not usable: {source}", path.display()))]
    WorkingDir { path: PathBuf, source: io::Error },
}

impl QueueError {
    /// True for the terminal-state error returned after `shutdown()`.
    #[must_use]
    pub const fn is_shut_down(&self) -> bool { matches!(self, Self::QueueShutDown) }
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;
