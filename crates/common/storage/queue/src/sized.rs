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

use std::sync::Arc;

/// Anything that can report how many items it holds.
///
/// Stats collectors hold queues as `Arc<dyn SizedQueue + Send + Sync>` and
/// poll them without knowing the item type.
pub trait SizedQueue {
    fn size(&self) -> usize;
}

impl<Q: SizedQueue + ?Sized> SizedQueue for Arc<Q> {
    fn size(&self) -> usize { (**self).size() }
}

impl<Q: SizedQueue + ?Sized> SizedQueue for &Q {
    fn size(&self) -> usize { (**self).size() }
}
