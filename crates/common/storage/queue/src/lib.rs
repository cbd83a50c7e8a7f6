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

//! Disk-backed paging FIFO queue.
//!
//! A [`PersistedQueue`] keeps a front and a back page in memory and spills
//! everything in between to page files in its working directory, so queue
//! depth is bounded by disk rather than RAM. Contents survive restarts and
//! are recovered from a checksummed state descriptor, or from the page files
//! alone when the descriptor is lost.
//!
//! [`ThreadSafeQueue`], [`DelayedQueue`] and [`PriorityQueue`] build on the
//! same engine.

pub mod builder;
pub mod codec;
pub mod config;
mod crc;
pub mod delayed;
pub mod error;
pub mod page;
pub mod path;
pub mod persisted;
pub mod priority;
mod recovery;
pub mod sequence;
pub mod sized;
pub mod state;
mod state_writer;
pub mod threadsafe;

pub use builder::QueueBuilder;
pub use codec::{Base64StringCodec, Codec, DocumentCodec, JsonCodec, decode_from_base64, encode_to_base64};
pub use config::QueueConfig;
pub use delayed::DelayedQueue;
pub use error::{CodecError, QueueError, Result};
pub use persisted::PersistedQueue;
pub use priority::{PriorityQueue, level_queue_name};
pub use sequence::{PageId, SequenceGenerator};
pub use sized::SizedQueue;
pub use threadsafe::ThreadSafeQueue;
