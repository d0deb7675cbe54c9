/*
 * Copyright (C) 2022-2025 by Christian Fischer
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

//! The log sink described in spec.md section 7: four severity levels,
//! routed through the `log` crate so a host can plug in whatever backend
//! it likes, plus a small [DedupLogger] wrapper which collapses runs of
//! identical adjacent lines the way a cycle-accurate core tends to spam
//! the same warning every frame.

#![cfg(feature = "std")]

use std::sync::Mutex;

use log::{Level, Log, Metadata, Record};


/// A [Log] implementation which forwards to an inner logger, but merges
/// consecutive identical messages into a single "repeated N times" line.
pub struct DedupLogger<L: Log> {
    inner: L,
    state: Mutex<DedupState>,
}


struct DedupState {
    last_message: Option<String>,
    repeat_count: u32,
}


impl<L: Log> DedupLogger<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            state: Mutex::new(DedupState {
                last_message: None,
                repeat_count: 0,
            }),
        }
    }
}


impl<L: Log> Log for DedupLogger<L> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let message = format!("{}", record.args());
        let mut state = self.state.lock().unwrap();

        if state.last_message.as_deref() == Some(message.as_str()) {
            state.repeat_count += 1;
            return;
        }

        // flush the summary for the previous run of repeats, if any
        if state.repeat_count > 0 {
            if let Some(prev) = &state.last_message {
                self.inner.log(&Record::builder()
                    .level(record.level())
                    .target(record.target())
                    .args(format_args!("{prev} (repeated {} times)", state.repeat_count))
                    .build());
            }
        }

        self.inner.log(record);
        state.last_message = Some(message);
        state.repeat_count = 0;
    }

    fn flush(&self) {
        self.inner.flush();
    }
}


/// The four severity levels spec.md section 7 names. Maps onto [log::Level]
/// one-to-one except that `fatal` is modeled as `Error` with a marker,
/// since `log` itself has no dedicated fatal level.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Severity {
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
}

impl From<Severity> for Level {
    fn from(value: Severity) -> Self {
        match value {
            Severity::Fatal => Level::Error,
            Severity::Error => Level::Error,
            Severity::Warn  => Level::Warn,
            Severity::Info  => Level::Info,
            Severity::Debug => Level::Debug,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLogger(AtomicUsize);

    impl Log for CountingLogger {
        fn enabled(&self, _metadata: &Metadata) -> bool {
            true
        }

        fn log(&self, _record: &Record) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }

        fn flush(&self) {}
    }

    #[test]
    fn repeated_lines_are_deduplicated() {
        let logger = DedupLogger::new(CountingLogger(AtomicUsize::new(0)));

        for _ in 0..5 {
            logger.log(&Record::builder()
                .level(Level::Warn)
                .args(format_args!("same message"))
                .build());
        }

        // Only the first occurrence is forwarded immediately; the repeats
        // are swallowed until a *different* message arrives to flush them.
        assert_eq!(logger.inner.0.load(Ordering::SeqCst), 1);

        logger.log(&Record::builder()
            .level(Level::Warn)
            .args(format_args!("different message"))
            .build());

        // the summary line for the 4 repeats, plus the new message
        assert_eq!(logger.inner.0.load(Ordering::SeqCst), 3);
    }
}
