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

//! A minimal SIO (serial I/O) register block. No link cable is ever
//! attached, so this models only what normal-mode reads/writes need to
//! see: `SIODATA32`/`SIOCNT`/`SIODATA8` and `RCNT`/`JOYCNT` hold whatever
//! was last written, and a start-transfer request (`SIOCNT` bit 7) in
//! normal mode completes immediately and raises the serial IRQ, without
//! modeling any transfer latency or an actual peer.

use crate::irq::InterruptController;
use crate::serializer::{Serializer, Streamable};

pub struct SerialPort {
    siodata32: u32,
    siocnt: u16,
    rcnt: u16,
    joycnt: u16,
}

impl SerialPort {
    pub fn new() -> Self {
        Self { siodata32: 0, siocnt: 0, rcnt: 0, joycnt: 0 }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn read_siodata32(&self) -> u32 {
        self.siodata32
    }

    pub fn write_siodata32(&mut self, value: u32) {
        self.siodata32 = value;
    }

    pub fn read_siocnt(&self) -> u16 {
        self.siocnt
    }

    /// Writing bit 7 (start) in normal mode completes the transfer
    /// instantly: the bit clears again and, if enabled, the serial IRQ
    /// fires on the same write.
    pub fn write_siocnt(&mut self, value: u16, irq: &mut InterruptController) {
        self.siocnt = value & !0x0080;

        let start_requested = (value & 0x0080) != 0;
        let irq_enabled = (value & 0x4000) != 0;
        if start_requested && irq_enabled {
            irq.raise(crate::irq::Source::Serial);
        }
    }

    pub fn read_rcnt(&self) -> u16 {
        self.rcnt
    }

    pub fn write_rcnt(&mut self, value: u16) {
        self.rcnt = value;
    }

    pub fn read_joycnt(&self) -> u16 {
        self.joycnt
    }

    pub fn write_joycnt(&mut self, value: u16) {
        self.joycnt = value;
    }
}

impl Default for SerialPort {
    fn default() -> Self {
        Self::new()
    }
}

impl Streamable for SerialPort {
    fn stream_state(&mut self, s: &mut Serializer) {
        s.stream_trivial(&mut self.siodata32);
        s.stream_trivial(&mut self.siocnt);
        s.stream_trivial(&mut self.rcnt);
        s.stream_trivial(&mut self.joycnt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_transfer_clears_itself_and_raises_irq_when_enabled() {
        let mut serial = SerialPort::new();
        let mut irq = InterruptController::new();

        serial.write_siocnt(0x0080 | 0x4000, &mut irq);

        assert_eq!(serial.read_siocnt() & 0x0080, 0);
        assert!(irq.read_if() & 0x0080 != 0); // Source::Serial is IF bit 7
    }

    #[test]
    fn start_transfer_without_irq_enable_does_not_raise() {
        let mut serial = SerialPort::new();
        let mut irq = InterruptController::new();

        serial.write_siocnt(0x0080, &mut irq);

        assert_eq!(irq.read_if(), 0);
    }
}
