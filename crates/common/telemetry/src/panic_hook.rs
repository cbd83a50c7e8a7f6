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

//! Panic reporting for svckit processes.
//!
//! Queue facades are shared across producer and consumer threads, so a
//! panic event names the thread it happened on. With the
//! `deadlock_detection` feature a background thread also reports
//! `parking_lot` lock cycles, which is where a stuck queue facade shows up.

use std::{
    panic::{self, PanicHookInfo},
    sync::{LazyLock, Once},
    thread,
};
#[cfg(feature = "deadlock_detection")]
use std::time::Duration;

use backtrace::Backtrace;
use prometheus::{IntCounter, register_int_counter};

#[cfg(feature = "deadlock_detection")]
const DEADLOCK_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Panics seen by this process, registered in the default prometheus
/// registry.
pub static PANIC_COUNTER: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!("svckit_panic_counter", "Number of panics in this process")
        .expect("panic counter registers once")
});

/// Installs the svckit panic hook. Later calls are no-ops, so the hook
/// never wraps itself.
///
/// The hook logs the panic with its thread, location and backtrace, counts
/// it in [`PANIC_COUNTER`] and then runs the hook it replaced.
pub fn set_panic_hook() {
    static INSTALL: Once = Once::new();

    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            report_panic(info);
            PANIC_COUNTER.inc();
            previous(info);
        }));

        #[cfg(feature = "deadlock_detection")]
        spawn_deadlock_checker();
    });
}

fn report_panic(info: &PanicHookInfo<'_>) {
    let current = thread::current();
    let thread_name = current.name().unwrap_or("<unnamed>");
    let backtrace = format!("{:?}", Backtrace::new());
    match info.location() {
        Some(location) => tracing::error!(
            message = %info,
            thread = thread_name,
            panic.file = location.file(),
            panic.line = location.line(),
            backtrace = %backtrace,
            "Thread panicked"
        ),
        None => tracing::error!(
            message = %info,
            thread = thread_name,
            backtrace = %backtrace,
            "Thread panicked"
        ),
    }
}

#[cfg(feature = "deadlock_detection")]
fn spawn_deadlock_checker() {
    let spawned = thread::Builder::new()
        .name("svckit-deadlock-check".to_string())
        .spawn(|| {
            loop {
                thread::sleep(DEADLOCK_CHECK_INTERVAL);
                for (cycle, threads) in parking_lot::deadlock::check_deadlock().iter().enumerate() {
                    for t in threads {
                        tracing::warn!(
                            cycle,
                            thread_id = ?t.thread_id(),
                            backtrace = ?t.backtrace(),
                            "Deadlocked thread"
                        );
                    }
                }
            }
        });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "Could not start deadlock checker");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_is_counted_once() {
        set_panic_hook();
        set_panic_hook();
        let before = PANIC_COUNTER.get();
        let result = thread::Builder::new()
            .name("consumer".to_string())
            .spawn(|| panic!("boom"))
            .unwrap()
            .join();
        assert!(result.is_err());
        assert_eq!(PANIC_COUNTER.get(), before + 1);
    }
}
