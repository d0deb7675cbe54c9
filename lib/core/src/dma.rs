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

//! The four DMA channels, grounded in `original_source`'s `gba::dma`
//! namespace. Each channel is a [scheduler::DriverKind] that, once engaged,
//! copies words or halfwords from source to destination until its count
//! hits zero or it runs out of budget for this scheduler slice.

use crate::irq;
use crate::scheduler::{DriverKind, Scheduler};
use crate::serializer::{Serializer, Streamable};
use crate::utils::{change_bit16, get_bit16};

/// When a channel's transfer should begin (spec.md section 4.4).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StartTiming {
    Immediate,
    VBlank,
    HBlank,
    Special,
}

impl StartTiming {
    fn from_bits(bits: u16) -> Self {
        match bits & 0b11 {
            0 => StartTiming::Immediate,
            1 => StartTiming::VBlank,
            2 => StartTiming::HBlank,
            _ => StartTiming::Special,
        }
    }

    fn to_bits(self) -> u16 {
        match self {
            StartTiming::Immediate => 0,
            StartTiming::VBlank => 1,
            StartTiming::HBlank => 2,
            StartTiming::Special => 3,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AddrControl {
    Increment,
    Decrement,
    Fixed,
    IncrementReload,
}

impl AddrControl {
    fn from_bits(bits: u16) -> Self {
        match bits & 0b11 {
            0 => AddrControl::Increment,
            1 => AddrControl::Decrement,
            2 => AddrControl::Fixed,
            _ => AddrControl::IncrementReload,
        }
    }

    fn to_bits(self) -> u16 {
        match self {
            AddrControl::Increment => 0,
            AddrControl::Decrement => 1,
            AddrControl::Fixed => 2,
            AddrControl::IncrementReload => 3,
        }
    }
}

#[derive(Debug, Copy, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct Control {
    bits: u16,
}

impl Control {
    fn dst_addr_ctrl(self) -> AddrControl { AddrControl::from_bits(self.bits >> 5) }
    fn src_addr_ctrl(self) -> AddrControl { AddrControl::from_bits(self.bits >> 7) }
    fn repeat(self) -> bool { get_bit16(self.bits, 9) }
    fn word_transfer(self) -> bool { get_bit16(self.bits, 10) }
    fn start_timing(self) -> StartTiming { StartTiming::from_bits(self.bits >> 12) }
    fn irq_enable(self) -> bool { get_bit16(self.bits, 14) }
    fn enable(self) -> bool { get_bit16(self.bits, 15) }
    fn set_enable(&mut self, value: bool) { self.bits = change_bit16(self.bits, 15, value); }
}

pub struct DmaChannel {
    pub index: usize,
    src_addr: u32,
    dst_addr: u32,
    count: u16,
    control: Control,

    current_src_addr: u32,
    current_dst_addr: u32,
    current_count: u32,
    src_addr_incr: i32,
    dst_addr_incr: i32,
    next_copy_is_repeat: bool,

    driver_kind: DriverKind,
    irq_source: irq::Source,
}

impl DmaChannel {
    fn new(index: usize) -> Self {
        let (driver_kind, irq_source) = match index {
            0 => (DriverKind::Dma0, irq::Source::Dma0),
            1 => (DriverKind::Dma1, irq::Source::Dma1),
            2 => (DriverKind::Dma2, irq::Source::Dma2),
            _ => (DriverKind::Dma3, irq::Source::Dma3),
        };
        Self {
            index,
            src_addr: 0,
            dst_addr: 0,
            count: 0,
            control: Control::default(),
            current_src_addr: 0,
            current_dst_addr: 0,
            current_count: 0,
            src_addr_incr: 0,
            dst_addr_incr: 0,
            next_copy_is_repeat: false,
            driver_kind,
            irq_source,
        }
    }

    /// The value `count == 0` reloads to: 0x4000 for channels 0-2, 0x10000
    /// for channel 3 (spec.md section 4.4).
    fn reload_count(&mut self) {
        self.current_count = if self.count == 0 {
            if self.index == 3 { 0x1_0000 } else { 0x4000 }
        } else {
            self.count as u32
        };
    }

    fn addr_increment(&self, ctrl: AddrControl) -> i32 {
        let unit = if self.control.word_transfer() { 4 } else { 2 };
        match ctrl {
            AddrControl::Increment | AddrControl::IncrementReload => unit,
            AddrControl::Decrement => -unit,
            AddrControl::Fixed => 0,
        }
    }

    fn on_enable(&mut self, scheduler: &mut Scheduler) {
        self.next_copy_is_repeat = false;
        self.reload_count();
        self.current_dst_addr = self.dst_addr;
        self.current_src_addr = self.src_addr;
        if self.control.start_timing() == StartTiming::Immediate {
            scheduler.engage_driver(self.driver_kind);
        }
    }

    fn on_disable(&mut self, scheduler: &mut Scheduler) {
        scheduler.disengage_driver(self.driver_kind);
    }

    pub fn notify_vblank(&mut self, scheduler: &mut Scheduler) {
        if self.control.enable() && self.control.start_timing() == StartTiming::VBlank {
            scheduler.engage_driver(self.driver_kind);
        }
    }

    pub fn notify_hblank(&mut self, scheduler: &mut Scheduler) {
        if self.control.enable() && self.control.start_timing() == StartTiming::HBlank {
            scheduler.engage_driver(self.driver_kind);
        }
    }

    /// Run this channel as a scheduler driver for up to `budget` cycles,
    /// returning cycles actually consumed. Grounded in `PerformDma` from
    /// `original_source`.
    pub fn run(
        &mut self,
        budget: u64,
        read: impl Fn(u32, bool) -> u32,
        mut write: impl FnMut(u32, bool, u32),
    ) -> (u64, bool, bool) {
        if self.next_copy_is_repeat {
            self.reload_count();
            if self.control.dst_addr_ctrl() == AddrControl::IncrementReload {
                self.current_dst_addr = self.dst_addr;
            }
            self.next_copy_is_repeat = false;
        }

        self.src_addr_incr = self.addr_increment(self.control.src_addr_ctrl());
        self.dst_addr_incr = self.addr_increment(self.control.dst_addr_ctrl());

        let word = self.control.word_transfer();
        let mut cycles = 0u64;
        while self.current_count > 0 && cycles < budget {
            let value = read(self.current_src_addr, word);
            write(self.current_dst_addr, word, value);
            self.current_count -= 1;
            self.current_dst_addr = self.current_dst_addr.wrapping_add(self.dst_addr_incr as u32);
            self.current_src_addr = self.current_src_addr.wrapping_add(self.src_addr_incr as u32);
            cycles += 1;
        }

        let mut completed = false;
        let mut raise_irq = false;
        if self.current_count == 0 {
            completed = true;
            if self.control.irq_enable() {
                raise_irq = true;
            }
            if self.control.repeat() && self.control.start_timing() != StartTiming::Immediate {
                self.next_copy_is_repeat = true;
            } else {
                self.control.set_enable(false);
            }
        }
        (cycles, completed, raise_irq)
    }

    pub fn irq_source(&self) -> irq::Source {
        self.irq_source
    }

    pub fn driver_kind(&self) -> DriverKind {
        self.driver_kind
    }

    /// Whether this channel is still armed. A completed non-repeat
    /// transfer clears this as part of [Self::run]; the scheduler driver
    /// itself is disengaged by [crate::device::Device] once it observes
    /// this going false, so a channel never keeps consuming scheduler
    /// slices after it has nothing left to do.
    pub fn is_enabled(&self) -> bool {
        self.control.enable()
    }

    pub fn read_src_addr(&self, byte: usize) -> u8 { self.src_addr.to_le_bytes()[byte] }
    pub fn read_dst_addr(&self, byte: usize) -> u8 { self.dst_addr.to_le_bytes()[byte] }
    pub fn read_count(&self, byte: usize) -> u8 { self.count.to_le_bytes()[byte] }
    pub fn read_control(&self, byte: usize) -> u8 { self.control.bits.to_le_bytes()[byte] }

    pub fn write_src_addr_byte(&mut self, byte: usize, data: u8) {
        let mask = if byte == 3 { 0x0F } else { 0xFF };
        let mut bytes = self.src_addr.to_le_bytes();
        bytes[byte] = data & mask;
        self.src_addr = u32::from_le_bytes(bytes);
    }

    pub fn write_dst_addr_byte(&mut self, byte: usize, data: u8) {
        let mask = if byte == 3 { 0x0F } else { 0xFF };
        let mut bytes = self.dst_addr.to_le_bytes();
        bytes[byte] = data & mask;
        self.dst_addr = u32::from_le_bytes(bytes);
    }

    pub fn write_count_byte(&mut self, byte: usize, data: u8) {
        let mask = if byte == 1 { 0x3F } else { 0xFF };
        let mut bytes = self.count.to_le_bytes();
        bytes[byte] = data & mask;
        self.count = u16::from_le_bytes(bytes);
    }

    pub fn write_control_byte(&mut self, byte: usize, data: u8, scheduler: &mut Scheduler) {
        let was_enabled = self.control.enable();
        let mut bytes = self.control.bits.to_le_bytes();
        bytes[byte] = data;
        self.control.bits = u16::from_le_bytes(bytes);
        self.after_control_write(was_enabled, scheduler);
    }

    pub fn write_control(&mut self, data: u16, scheduler: &mut Scheduler) {
        let was_enabled = self.control.enable();
        self.control.bits = data;
        self.after_control_write(was_enabled, scheduler);
    }

    fn after_control_write(&mut self, was_enabled: bool, scheduler: &mut Scheduler) {
        let is_enabled = self.control.enable();
        if !was_enabled && is_enabled {
            self.on_enable(scheduler);
        } else if was_enabled && !is_enabled {
            self.on_disable(scheduler);
        }
    }
}

impl Streamable for DmaChannel {
    fn stream_state(&mut self, s: &mut Serializer) {
        s.stream_trivial(&mut self.src_addr);
        s.stream_trivial(&mut self.dst_addr);
        s.stream_trivial(&mut self.count);
        s.stream_trivial(&mut self.control.bits);
        s.stream_trivial(&mut self.current_src_addr);
        s.stream_trivial(&mut self.current_dst_addr);
        s.stream_trivial(&mut self.current_count);
        s.stream_trivial(&mut self.src_addr_incr);
        s.stream_trivial(&mut self.dst_addr_incr);
        s.stream_trivial(&mut self.next_copy_is_repeat);
    }
}

/// The complete set of four channels, indexable by priority.
pub struct DmaController {
    pub channels: [DmaChannel; 4],
}

impl DmaController {
    pub fn new() -> Self {
        Self {
            channels: [DmaChannel::new(0), DmaChannel::new(1), DmaChannel::new(2), DmaChannel::new(3)],
        }
    }

    pub fn notify_vblank(&mut self, scheduler: &mut Scheduler) {
        for ch in &mut self.channels {
            ch.notify_vblank(scheduler);
        }
    }

    pub fn notify_hblank(&mut self, scheduler: &mut Scheduler) {
        for ch in &mut self.channels {
            ch.notify_hblank(scheduler);
        }
    }

    pub fn channel_for(&mut self, driver: DriverKind) -> &mut DmaChannel {
        match driver {
            DriverKind::Dma0 => &mut self.channels[0],
            DriverKind::Dma1 => &mut self.channels[1],
            DriverKind::Dma2 => &mut self.channels[2],
            DriverKind::Dma3 => &mut self.channels[3],
            DriverKind::Cpu => unreachable!("Cpu is not a DMA channel"),
        }
    }
}

impl Default for DmaController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn count_zero_reloads_to_max_and_channel_3_differs() {
        let mut ch0 = DmaChannel::new(0);
        ch0.count = 0;
        ch0.reload_count();
        assert_eq!(ch0.current_count, 0x4000);

        let mut ch3 = DmaChannel::new(3);
        ch3.count = 0;
        ch3.reload_count();
        assert_eq!(ch3.current_count, 0x1_0000);
    }

    #[test]
    fn immediate_transfer_copies_words_and_completes() {
        let mem = RefCell::new([0u32; 8]);
        let mut ch = DmaChannel::new(1);
        ch.src_addr = 0;
        ch.dst_addr = 16;
        ch.count = 4;
        ch.control.bits = 0;
        ch.control.bits |= 1 << 10; // word transfer
        ch.reload_count();
        ch.current_src_addr = 0;
        ch.current_dst_addr = 16;

        for i in 0..4u32 {
            mem.borrow_mut()[i as usize] = i + 1;
        }

        let (cycles, completed, raise_irq) = ch.run(
            1000,
            |addr, _word| mem.borrow()[(addr / 4) as usize],
            |addr, _word, value| mem.borrow_mut()[(addr / 4) as usize] = value,
        );

        assert_eq!(cycles, 4);
        assert!(completed);
        assert!(!raise_irq);
        assert_eq!(mem.borrow()[4], 1);
        assert_eq!(mem.borrow()[5], 2);
        assert_eq!(mem.borrow()[6], 3);
        assert_eq!(mem.borrow()[7], 4);
    }

    #[test]
    fn budget_truncates_transfer_leaving_it_resumable() {
        let mem = RefCell::new([0u32; 8]);
        let mut ch = DmaChannel::new(0);
        ch.control.bits |= 1 << 10;
        ch.count = 4;
        ch.reload_count();

        let (cycles, completed, _) = ch.run(
            2,
            |addr, _| mem.borrow()[(addr / 4) as usize],
            |addr, _, value| mem.borrow_mut()[(addr / 4) as usize] = value,
        );
        assert_eq!(cycles, 2);
        assert!(!completed);
        assert_eq!(ch.current_count, 2);
    }
}
