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

use std::collections::BTreeMap;

use parking_lot::Mutex;
use tracing::{info, warn};

/// Counted error flags keyed by a case-insensitive id.
///
/// An id is "set" while its count is above zero. Clearing more than was set
/// stops at zero.
#[derive(Debug, Default)]
pub struct ErrorStateList {
    states: Mutex<BTreeMap<String, u32>>,
}

impl ErrorStateList {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    pub fn set(&self, id: &str) {
        let mut states = self.states.lock();
        let count = states.entry(id.to_lowercase()).or_default();
        *count = count.saturating_add(1);
        if *count == 1 {
            warn!(error_state = id, "Error state raised");
        }
    }

    pub fn clear(&self, id: &str, amount: u32) {
        let mut states = self.states.lock();
        let count = states.entry(id.to_lowercase()).or_default();
        let was_set = *count > 0;
        *count = count.saturating_sub(amount);
        if was_set && *count == 0 {
            info!(error_state = id, "Error state cleared");
        }
    }

    pub fn clear_all(&self, id: &str) { self.clear(id, u32::MAX); }

    #[must_use]
    pub fn is_set(&self, id: &str) -> bool { self.count(id) > 0 }

    #[must_use]
    pub fn count(&self, id: &str) -> u32 { self.states.lock().get(&id.to_lowercase()).copied().unwrap_or(0) }

    /// Every id that is currently set, with its count.
    #[must_use]
    pub fn states(&self) -> BTreeMap<String, u32> {
        self.states
            .lock()
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(id, count)| (id.clone(), *count))
            .collect()
    }
}
