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

//! The cycle-driven cooperative scheduler described in spec.md section 4.1,
//! grounded in `original_source`'s `gba::scheduler` namespace.
//!
//! `original_source` stores a `DriverRunFunc`/`EventCallback` function
//! pointer per entry and calls through it directly. Per spec.md's DESIGN
//! NOTES ("function-pointer callbacks in events/drivers ... represent as
//! closed capabilities: for events, a tagged sum type plus a shared
//! dispatch table"), this scheduler instead stores plain [DriverKind]/
//! [EventKind] tags; [crate::device::Device] owns every component and
//! dispatches on these tags with a `match`, which is the "shared dispatch
//! table" the note calls for without needing function pointers, trait
//! objects, or interior mutability to let a driver reach its siblings.

use alloc::vec::Vec;

pub type Clock = u64;


/// An entity that consumes cycles: the CPU or one of the four DMA channels.
/// Ordered low to high priority; a higher-priority driver preempts a lower
/// one at the next instruction/transfer-unit boundary (spec.md section 4.1).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DriverKind {
    Cpu,
    Dma3,
    Dma2,
    Dma1,
    Dma0,
}

/// A scheduled event kind. Every instance of PPU scanline timing, timer
/// overflow and the IRQ-latch delay is represented as one of these.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventKind {
    HBlankStart,
    HBlankSetFlag,
    NewScanline,
    TimerOverflow(u8),
    IrqLatch,
}

#[derive(Debug, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct Event {
    kind: EventKind,
    time: Clock,
}


/// The root component: owns the global cycle counter, the ordered event
/// list and the priority-ordered list of engaged drivers.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Scheduler {
    now: Clock,

    /// Ordered by ascending `time`; same-time events keep insertion order
    /// (spec.md section 5: "events at the same absolute time fire in
    /// insertion order").
    events: Vec<Event>,

    /// Ordered by descending priority; `drivers[0]` is the one that runs.
    drivers: Vec<DriverKind>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            now: 0,
            events: Vec::new(),
            drivers: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.now = 0;
        self.events.clear();
        self.drivers.clear();
    }

    pub fn now(&self) -> Clock {
        self.now
    }

    /// Advance the global clock. Called by [crate::device::Device] after
    /// running the head driver for some number of cycles.
    pub fn advance(&mut self, cycles: Clock) {
        self.now += cycles;
    }

    /// Insert an event at `now + delay`, keeping the list sorted by time
    /// with stable insertion order for ties.
    pub fn add_event(&mut self, kind: EventKind, delay: Clock) {
        let time = self.now + delay;
        let pos = self.events.iter().position(|e| time < e.time).unwrap_or(self.events.len());
        self.events.insert(pos, Event { kind, time });
    }

    /// Reschedule the first event matching `kind` to fire `new_delay`
    /// cycles from now.
    pub fn change_event_time(&mut self, kind: EventKind, new_delay: Clock) {
        if let Some(pos) = self.events.iter().position(|e| e.kind == kind) {
            self.events.remove(pos);
        }
        self.add_event(kind, new_delay);
    }

    /// Remove the first event matching `kind`, if any.
    pub fn remove_event(&mut self, kind: EventKind) {
        if let Some(pos) = self.events.iter().position(|e| e.kind == kind) {
            self.events.remove(pos);
        }
    }

    /// Time until the next event fires, relative to `now`.
    pub fn time_until_next_event(&self) -> Clock {
        self.events.first().map_or(0, |e| e.time.saturating_sub(self.now))
    }

    pub fn next_event_time(&self) -> Clock {
        self.events.first().map_or(self.now, |e| e.time)
    }

    /// Remove and return the head event, snapping `now` forward to its
    /// time in case the driver overran its budget (spec.md section 4.1:
    /// "snap now to the event's time ... a truncation, not an error").
    pub fn pop_event(&mut self) -> EventKind {
        let event = self.events.remove(0);
        if event.time > self.now {
            self.now = event.time;
        }
        event.kind
    }

    pub fn has_pending_event(&self) -> bool {
        !self.events.is_empty()
    }

    /// Insert a driver into the priority-ordered list.
    pub fn engage_driver(&mut self, kind: DriverKind) {
        if self.drivers.contains(&kind) {
            return;
        }
        let pos = self.drivers.iter().position(|&d| d < kind).unwrap_or(self.drivers.len());
        self.drivers.insert(pos, kind);
    }

    pub fn disengage_driver(&mut self, kind: DriverKind) {
        self.drivers.retain(|&d| d != kind);
    }

    pub fn is_engaged(&self, kind: DriverKind) -> bool {
        self.drivers.contains(&kind)
    }

    /// The highest-priority engaged driver, i.e. the one that should run
    /// next. The CPU is always implicitly available even when not
    /// explicitly engaged, since it's the only driver never disengaged in
    /// practice (it's suspended by running zero cycles instead).
    pub fn head_driver(&self) -> DriverKind {
        *self.drivers.first().unwrap_or(&DriverKind::Cpu)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_ordered_by_time_with_stable_ties() {
        let mut s = Scheduler::new();
        s.add_event(EventKind::NewScanline, 100);
        s.add_event(EventKind::HBlankStart, 50);
        s.add_event(EventKind::IrqLatch, 50);

        assert_eq!(s.pop_event(), EventKind::HBlankStart);
        assert_eq!(s.now(), 50);
        assert_eq!(s.pop_event(), EventKind::IrqLatch);
        assert_eq!(s.pop_event(), EventKind::NewScanline);
        assert_eq!(s.now(), 100);
    }

    #[test]
    fn driver_priority_order() {
        let mut s = Scheduler::new();
        s.engage_driver(DriverKind::Cpu);
        assert_eq!(s.head_driver(), DriverKind::Cpu);

        s.engage_driver(DriverKind::Dma3);
        assert_eq!(s.head_driver(), DriverKind::Dma3);

        s.engage_driver(DriverKind::Dma0);
        assert_eq!(s.head_driver(), DriverKind::Dma0);

        s.disengage_driver(DriverKind::Dma0);
        assert_eq!(s.head_driver(), DriverKind::Dma3);
    }

    #[test]
    fn change_event_time_reschedules() {
        let mut s = Scheduler::new();
        s.add_event(EventKind::IrqLatch, 100);
        s.change_event_time(EventKind::IrqLatch, 10);
        assert_eq!(s.next_event_time(), 10);
    }

    #[test]
    fn overrun_is_truncated_not_an_error() {
        let mut s = Scheduler::new();
        s.add_event(EventKind::HBlankStart, 10);
        s.advance(15); // driver overran its budget by 5 cycles
        assert_eq!(s.pop_event(), EventKind::HBlankStart);
        assert_eq!(s.now(), 15); // time doesn't rewind backwards
    }
}
