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

//! Item codecs.
//!
//! A [`Codec`] turns one queued item into a single-line string for a page
//! file and back. The base64 helpers keep arbitrary bytes line-safe; the
//! decoder swaps trailing `=` padding for a neutral symbol before decoding
//! and trims the matching number of bytes afterwards, so padding is never
//! seen as a terminator in the middle of a page.

use std::{fmt, marker::PhantomData};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Serialize, de::DeserializeOwned};
use snafu::{ResultExt, ensure};

use crate::error::{Base64Snafu, CodecError, DecodeSnafu, JsonSnafu, Utf8Snafu};

const PADDING: u8 = b'=';
const PLACEHOLDER: u8 = b'A';

/// Converts queued items to and from their persisted string form.
///
/// Encoded strings must not contain line breaks; a page stores one item per
/// line.
pub trait Codec {
    type Item;

    fn encode(&self, item: &Self::Item) -> Result<String, CodecError>;

    fn decode(&self, encoded: &str) -> Result<Self::Item, CodecError>;
}

/// Base64-encodes `bytes`, padded to a multiple of 4 characters.
#[must_use]
pub fn encode_to_base64(bytes: &[u8]) -> String { STANDARD.encode(bytes) }

/// Decodes a padded base64 string. ASCII whitespace is ignored.
pub fn decode_from_base64(encoded: &str) -> Result<Vec<u8>, CodecError> {
    let mut input: Vec<u8> = encoded
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if input.is_empty() {
        return Ok(Vec::new());
    }

    let padding = input.iter().rev().take_while(|&&b| b == PADDING).count();
    ensure!(
        padding <= 2,
        DecodeSnafu {
            reason: format!("{padding} trailing padding characters"),
        }
    );

    let len = input.len();
    input[len - padding..].fill(PLACEHOLDER);

    let mut decoded = STANDARD.decode(&input).context(Base64Snafu)?;
    decoded.truncate(decoded.len().saturating_sub(padding));
    Ok(decoded)
}

/// Codec for `String` items: the UTF-8 bytes, base64-encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64StringCodec;

impl Codec for Base64StringCodec {
    type Item = String;

    fn encode(&self, item: &String) -> Result<String, CodecError> {
        Ok(encode_to_base64(item.as_bytes()))
    }

    fn decode(&self, encoded: &str) -> Result<String, CodecError> {
        String::from_utf8(decode_from_base64(encoded)?).context(Utf8Snafu)
    }
}

/// Codec for any serde type: compact JSON, base64-encoded.
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

/// Codec for free-form JSON documents.
pub type DocumentCodec = JsonCodec<serde_json::Value>;

impl<T> JsonCodec<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self { Self::new() }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self { Self::new() }
}

impl<T> fmt::Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonCodec").finish()
    }
}

impl<T> Codec for JsonCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    type Item = T;

    fn encode(&self, item: &T) -> Result<String, CodecError> {
        let json = serde_json::to_vec(item).context(JsonSnafu)?;
        Ok(encode_to_base64(&json))
    }

    fn decode(&self, encoded: &str) -> Result<T, CodecError> {
        let json = decode_from_base64(encoded)?;
        serde_json::from_slice(&json).context(JsonSnafu)
    }
}
