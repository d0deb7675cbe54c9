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

//! The four cascaded timers, grounded in `original_source`'s
//! `gba::timers::Timer`. Each non-cascading timer schedules its own
//! overflow as a [crate::scheduler::EventKind::TimerOverflow] event rather
//! than being polled every cycle; a timer in count-up (cascade) mode
//! instead steps by one whenever the timer feeding it overflows, which can
//! itself cascade into a chain of overflows in the same instant.

use crate::irq::{InterruptController, Source};
use crate::scheduler::{Clock, EventKind, Scheduler};
use crate::serializer::{Serializer, Streamable};
use crate::utils::get_bit8;

const PRESCALER_SHIFT: [u32; 4] = [0, 6, 8, 10]; // periods 1, 64, 256, 1024

pub struct Timer {
    id: u8,
    reload: u16,
    counter: u16,
    prescaler_shift: u32,
    count_up: bool,
    irq_enable: bool,
    enable: bool,
    last_update: Clock,
    irq_source: Source,
}

impl Timer {
    fn new(id: u8) -> Self {
        let irq_source = match id {
            0 => Source::Timer0,
            1 => Source::Timer1,
            2 => Source::Timer2,
            _ => Source::Timer3,
        };
        Self {
            id,
            reload: 0,
            counter: 0,
            prescaler_shift: 0,
            count_up: false,
            irq_enable: false,
            enable: false,
            last_update: 0,
            irq_source,
        }
    }

    fn event_kind(&self) -> EventKind {
        EventKind::TimerOverflow(self.id)
    }

    fn cycles_to_overflow_from(&self, counter: u16) -> u64 {
        ((0x1_0000 - counter as u32) as u64) << self.prescaler_shift
    }

    /// The counter value as of `now`, accounting for elapsed prescaler
    /// ticks since it was last synced. Cascade-mode timers don't drift
    /// with the clock, so their stored value is already current.
    fn counter_at(&self, now: Clock) -> u16 {
        if self.count_up || !self.enable {
            self.counter
        } else {
            let elapsed = now.saturating_sub(self.last_update);
            let ticks = elapsed >> self.prescaler_shift;
            (self.counter as u64 + ticks).min(0xFFFF) as u16
        }
    }

    fn sync(&mut self, now: Clock) {
        self.counter = self.counter_at(now);
        self.last_update = now;
    }

    fn control_byte(&self) -> u8 {
        let mut bits = 0u8;
        bits |= self.prescaler_shift_to_bits();
        if self.count_up { bits |= 1 << 2; }
        if self.irq_enable { bits |= 1 << 6; }
        if self.enable { bits |= 1 << 7; }
        bits
    }

    fn prescaler_shift_to_bits(&self) -> u8 {
        PRESCALER_SHIFT.iter().position(|&s| s == self.prescaler_shift).unwrap_or(0) as u8
    }
}

pub struct TimerController {
    timers: [Timer; 4],
}

impl TimerController {
    pub fn new() -> Self {
        Self {
            timers: [Timer::new(0), Timer::new(1), Timer::new(2), Timer::new(3)],
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn read_counter(&self, id: usize, now: Clock) -> u16 {
        self.timers[id].counter_at(now)
    }

    pub fn read_control(&self, id: usize) -> u8 {
        self.timers[id].control_byte()
    }

    pub fn write_reload(&mut self, id: usize, data: u16) {
        self.timers[id].reload = data;
    }

    pub fn write_reload_byte(&mut self, id: usize, byte: usize, data: u8) {
        let mut bytes = self.timers[id].reload.to_le_bytes();
        bytes[byte] = data;
        self.timers[id].reload = u16::from_le_bytes(bytes);
    }

    pub fn write_control(&mut self, id: usize, data: u8, scheduler: &mut Scheduler) {
        let now = scheduler.now();
        let was_enabled = self.timers[id].enable;
        if was_enabled {
            self.timers[id].sync(now);
        }

        let t = &mut self.timers[id];
        t.prescaler_shift = PRESCALER_SHIFT[(data & 0b11) as usize];
        t.count_up = id != 0 && get_bit8(data, 2);
        t.irq_enable = get_bit8(data, 6);
        t.enable = get_bit8(data, 7);

        if !was_enabled && t.enable {
            t.counter = t.reload;
            t.last_update = now;
            if !t.count_up {
                let kind = t.event_kind();
                let delay = t.cycles_to_overflow_from(t.counter);
                scheduler.add_event(kind, delay);
            }
        } else if was_enabled && !t.enable {
            scheduler.remove_event(t.event_kind());
        } else if was_enabled && t.enable && !t.count_up {
            let kind = t.event_kind();
            let counter = t.counter;
            let delay = self.timers[id].cycles_to_overflow_from(counter);
            scheduler.change_event_time(kind, delay);
        }
    }

    /// Handle the scheduler firing `TimerOverflow(id)`: reload, raise IRQ
    /// if enabled, reschedule, and cascade into the next timer if it's in
    /// count-up mode.
    pub fn on_overflow(&mut self, id: u8, scheduler: &mut Scheduler, irq: &mut InterruptController) {
        let now = scheduler.now();
        let idx = id as usize;

        self.timers[idx].counter = self.timers[idx].reload;
        self.timers[idx].last_update = now;
        if self.timers[idx].irq_enable {
            irq.raise(self.timers[idx].irq_source);
        }
        if self.timers[idx].enable && !self.timers[idx].count_up {
            let kind = self.timers[idx].event_kind();
            let delay = self.timers[idx].cycles_to_overflow_from(self.timers[idx].reload);
            scheduler.add_event(kind, delay);
        }

        if idx + 1 < 4 {
            self.step_cascade(idx + 1, scheduler, irq);
        }
    }

    fn step_cascade(&mut self, idx: usize, scheduler: &mut Scheduler, irq: &mut InterruptController) {
        if !(self.timers[idx].enable && self.timers[idx].count_up) {
            return;
        }

        self.timers[idx].counter = self.timers[idx].counter.wrapping_add(1);
        if self.timers[idx].counter == 0 {
            self.timers[idx].counter = self.timers[idx].reload;
            if self.timers[idx].irq_enable {
                irq.raise(self.timers[idx].irq_source);
            }
            if idx + 1 < 4 {
                self.step_cascade(idx + 1, scheduler, irq);
            }
        }
    }
}

impl Default for TimerController {
    fn default() -> Self {
        Self::new()
    }
}

impl Streamable for Timer {
    fn stream_state(&mut self, s: &mut Serializer) {
        s.stream_trivial(&mut self.reload);
        s.stream_trivial(&mut self.counter);
        s.stream_trivial(&mut self.last_update);
        s.stream_trivial(&mut self.prescaler_shift);

        let mut flags = 0u8;
        if self.count_up { flags |= 1; }
        if self.irq_enable { flags |= 2; }
        if self.enable { flags |= 4; }
        s.stream_trivial(&mut flags);
        self.count_up = flags & 1 != 0;
        self.irq_enable = flags & 2 != 0;
        self.enable = flags & 4 != 0;
    }
}

impl Streamable for TimerController {
    fn stream_state(&mut self, s: &mut Serializer) {
        for t in &mut self.timers {
            t.stream_state(s);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer0_reaches_full_period_overflow() {
        let mut timers = TimerController::new();
        let mut scheduler = Scheduler::new();
        let mut irq = InterruptController::new();

        timers.write_reload(0, 0xFFF0); // 16 ticks to overflow
        timers.write_control(0, 0b1000_0000, &mut scheduler); // enable, prescaler /1

        assert_eq!(scheduler.next_event_time(), 16);
        scheduler.advance(16);
        let kind = scheduler.pop_event();
        assert_eq!(kind, EventKind::TimerOverflow(0));
        timers.on_overflow(0, &mut scheduler, &mut irq);

        assert_eq!(timers.read_counter(0, scheduler.now()), 0xFFF0);
    }

    #[test]
    fn timer1_cascades_from_timer0_overflow() {
        let mut timers = TimerController::new();
        let mut scheduler = Scheduler::new();
        let mut irq = InterruptController::new();

        timers.write_reload(0, 0xFFFF); // overflow after 1 tick
        timers.write_control(0, 0b1000_0000, &mut scheduler);

        timers.write_reload(1, 0);
        timers.write_control(1, 0b1000_0100, &mut scheduler); // enable, count-up

        assert_eq!(timers.read_counter(1, 0), 0);

        scheduler.advance(1);
        scheduler.pop_event();
        timers.on_overflow(0, &mut scheduler, &mut irq);

        assert_eq!(timers.read_counter(1, scheduler.now()), 1, "timer1 steps once per timer0 overflow");
    }
}
