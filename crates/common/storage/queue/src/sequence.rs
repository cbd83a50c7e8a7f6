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

//! Page file identifiers.
//!
//! Identifiers are fixed-width, six lowercase letters counted in base 26
//! (`aaaaaa`, `aaaaab`, ..., `zzzzzz`). The fixed width makes lexicographic
//! order equal to issue order, so a directory listing sorted by name is
//! already sorted by age. Once `zzzzzz` has been issued the generator
//! refuses to hand out more instead of wrapping back onto live files.

use std::fmt;

use snafu::OptionExt;

use crate::{Result, error::SequenceExhaustedSnafu};

/// Number of letters in a page identifier.
pub const SEQUENCE_WIDTH: usize = 6;

const RADIX: u32 = 26;
/// 26^6: one past the largest representable identifier.
const SEQUENCE_SPACE: u32 = RADIX.pow(SEQUENCE_WIDTH as u32);

/// A page file identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageId(u32);

impl PageId {
    pub const FIRST: Self = Self(0);
    pub const LAST: Self = Self(SEQUENCE_SPACE - 1);

    #[must_use]
    pub const fn new(value: u32) -> Option<Self> {
        if value < SEQUENCE_SPACE {
            Some(Self(value))
        } else {
            None
        }
    }

    #[must_use]
    pub const fn value(self) -> u32 { self.0 }

    /// The identifier issued after this one, if any.
    #[must_use]
    pub const fn next(self) -> Option<Self> { Self::new(self.0 + 1) }

    /// Parses exactly [`SEQUENCE_WIDTH`] lowercase ASCII letters.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != SEQUENCE_WIDTH {
            return None;
        }
        let mut value = 0u32;
        for b in s.bytes() {
            if !b.is_ascii_lowercase() {
                return None;
            }
            value = value * RADIX + u32::from(b - b'a');
        }
        Some(Self(value))
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut letters = [b'a'; SEQUENCE_WIDTH];
        let mut rest = self.0;
        for slot in letters.iter_mut().rev() {
            // rest % 26 < 26, so the cast cannot truncate
            #[allow(clippy::cast_possible_truncation)]
            let digit = (rest % RADIX) as u8;
            *slot = b'a' + digit;
            rest /= RADIX;
        }
        f.write_str(std::str::from_utf8(&letters).map_err(|_| fmt::Error)?)
    }
}

/// Issues strictly increasing page identifiers for one queue.
#[derive(Debug, Clone)]
pub struct SequenceGenerator {
    /// Raw value of the next identifier; `SEQUENCE_SPACE` once exhausted.
    next: u32,
}

impl Default for SequenceGenerator {
    fn default() -> Self { Self::new() }
}

impl SequenceGenerator {
    #[must_use]
    pub const fn new() -> Self { Self { next: 0 } }

    /// A generator whose first identifier is `next`.
    #[must_use]
    pub const fn starting_at(next: PageId) -> Self { Self { next: next.0 } }

    /// Restores a generator from a persisted raw `next` value.
    #[must_use]
    pub const fn from_raw(next: u32) -> Self {
        Self {
            next: if next > SEQUENCE_SPACE {
                SEQUENCE_SPACE
            } else {
                next
            },
        }
    }

    /// Raw value of the next identifier, for the state descriptor.
    #[must_use]
    pub const fn raw_next(&self) -> u32 { self.next }

    /// The identifier the next call to [`next_id`](Self::next_id) returns.
    #[must_use]
    pub const fn peek(&self) -> Option<PageId> { PageId::new(self.next) }

    /// Makes sure `id` is never issued again.
    pub fn observe(&mut self, id: PageId) {
        if id.0 >= self.next {
            self.next = id.0 + 1;
        }
    }

    /// Hands out the next identifier.
    pub fn next_id(&mut self) -> Result<PageId> {
        let id = self.peek().context(SequenceExhaustedSnafu {
            last: PageId::LAST.to_string(),
        })?;
        self.next += 1;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::QueueError;

    #[test_case(0, "aaaaaa" ; "first")]
    #[test_case(1, "aaaaab" ; "second")]
    #[test_case(25, "aaaaaz" ; "last single digit")]
    #[test_case(26, "aaaaba" ; "first carry")]
    #[test_case(SEQUENCE_SPACE - 1, "zzzzzz" ; "last")]
    fn test_display_and_parse(value: u32, text: &str) {
        let id = PageId::new(value).unwrap();
        assert_eq!(id.to_string(), text);
        assert_eq!(PageId::parse(text), Some(id));
    }

    #[test_case("" ; "empty")]
    #[test_case("aaaaa" ; "too short")]
    #[test_case("aaaaaaa" ; "too long")]
    #[test_case("aaaaA1" ; "not lowercase")]
    fn test_parse_rejects(text: &str) {
        assert_eq!(PageId::parse(text), None);
    }

    #[test]
    fn test_lexicographic_order_matches_issue_order() {
        let mut generator = SequenceGenerator::starting_at(PageId::new(20).unwrap());
        let ids: Vec<PageId> = (0..40).map(|_| generator.next_id().unwrap()).collect();
        let mut names: Vec<String> = ids.iter().map(ToString::to_string).collect();
        names.sort();
        let reparsed: Vec<PageId> = names.iter().map(|n| PageId::parse(n).unwrap()).collect();
        assert_eq!(reparsed, ids);
    }

    #[test]
    fn test_exhaustion_is_an_error() {
        let mut generator = SequenceGenerator::starting_at(PageId::LAST);
        assert_eq!(generator.next_id().unwrap(), PageId::LAST);
        assert!(matches!(
            generator.next_id(),
            Err(QueueError::SequenceExhausted { .. })
        ));
        assert!(generator.next_id().is_err());
    }

    #[test]
    fn test_observe_skips_past_seen_ids() {
        let mut generator = SequenceGenerator::new();
        generator.observe(PageId::new(9).unwrap());
        generator.observe(PageId::new(3).unwrap());
        assert_eq!(generator.next_id().unwrap().value(), 10);
    }

    #[test]
    fn test_from_raw_clamps() {
        let generator = SequenceGenerator::from_raw(u32::MAX);
        assert_eq!(generator.peek(), None);
        assert_eq!(generator.raw_next(), SEQUENCE_SPACE);
    }
}
