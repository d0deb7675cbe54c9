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

//! The ARM7TDMI register file: r0-r15, CPSR/SPSR and the banked copies kept
//! per mode. Grounded in `original_source`'s `gba::arm7tdmi` globals, which
//! keep one array of "currently active" registers plus a banked copy per
//! mode and swap between them in `SetMode`. This is translated into owned
//! fields on one struct instead of namespace-scope globals.

use crate::serializer::{Serializer, Streamable};

pub const EXCEPTION_VECTOR_RESET: u32 = 0x00;
pub const EXCEPTION_VECTOR_UNDEFINED_INSTR: u32 = 0x04;
pub const EXCEPTION_VECTOR_SOFTWARE_INT: u32 = 0x08;
pub const EXCEPTION_VECTOR_PREFETCH_ABORT: u32 = 0x0C;
pub const EXCEPTION_VECTOR_DATA_ABORT: u32 = 0x10;
pub const EXCEPTION_VECTOR_IRQ: u32 = 0x18;
pub const EXCEPTION_VECTOR_FIQ: u32 = 0x1C;

/// The 7 processor modes, in CPSR mode-bits order (spec.md section 4.2).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Mode {
    User,
    Fiq,
    Irq,
    Supervisor,
    Abort,
    Undefined,
    System,
}

impl Mode {
    /// The 5-bit value stored in CPSR bits 0-4.
    pub fn mode_bits(self) -> u32 {
        match self {
            Mode::User       => 16,
            Mode::Fiq        => 17,
            Mode::Irq        => 18,
            Mode::Supervisor => 19,
            Mode::Abort      => 23,
            Mode::Undefined  => 27,
            Mode::System     => 31,
        }
    }

    pub fn from_mode_bits(bits: u32) -> Option<Mode> {
        match bits {
            16 => Some(Mode::User),
            17 => Some(Mode::Fiq),
            18 => Some(Mode::Irq),
            19 => Some(Mode::Supervisor),
            23 => Some(Mode::Abort),
            27 => Some(Mode::Undefined),
            31 => Some(Mode::System),
            _ => None,
        }
    }

    /// Whether this mode has a private SPSR to save/restore CPSR into.
    pub fn has_spsr(self) -> bool {
        !matches!(self, Mode::User | Mode::System)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ExecutionState {
    Arm,
    Thumb,
}

/// The condition-code and control bits of CPSR/SPSR, unpacked for direct
/// field access instead of `original_source`'s bitfield struct.
#[derive(Debug, Copy, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatusRegister {
    pub negative: bool,
    pub zero: bool,
    pub carry: bool,
    pub overflow: bool,
    pub irq_disable: bool,
    pub fiq_disable: bool,
    pub thumb: bool,
    pub mode_bits: u32,
}

impl StatusRegister {
    pub fn from_bits(bits: u32) -> Self {
        Self {
            negative: bits & (1 << 31) != 0,
            zero: bits & (1 << 30) != 0,
            carry: bits & (1 << 29) != 0,
            overflow: bits & (1 << 28) != 0,
            irq_disable: bits & (1 << 7) != 0,
            fiq_disable: bits & (1 << 6) != 0,
            thumb: bits & (1 << 5) != 0,
            mode_bits: bits & 0x1F,
        }
    }

    pub fn to_bits(self) -> u32 {
        let mut bits = self.mode_bits & 0x1F;
        if self.thumb { bits |= 1 << 5; }
        if self.fiq_disable { bits |= 1 << 6; }
        if self.irq_disable { bits |= 1 << 7; }
        if self.overflow { bits |= 1 << 28; }
        if self.carry { bits |= 1 << 29; }
        if self.zero { bits |= 1 << 30; }
        if self.negative { bits |= 1 << 31; }
        bits
    }

    /// CPSR control bits only (mode/T/I/F) -- used by MSR with `c` field
    /// selected, which user mode is permitted to write.
    pub fn control_bits(self) -> u32 {
        self.to_bits() & 0x0000_00FF
    }

    /// CPSR flag bits only (N/Z/C/V) -- the only bits MSR can touch when
    /// running in User mode.
    pub fn flag_bits(self) -> u32 {
        self.to_bits() & 0xF000_0000
    }
}

/// r0-r15 plus CPSR/SPSR with full mode-banking, grounded directly in
/// `original_source`'s banked-register globals.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Registers {
    /// Currently active r0-r15.
    pub r: [u32; 16],

    pub cpsr: StatusRegister,

    r8_r12_non_fiq: [u32; 5],
    r8_r12_fiq: [u32; 5],

    r13_usr: u32,
    r14_usr: u32,
    r13_fiq: u32,
    r14_fiq: u32,
    r13_svc: u32,
    r14_svc: u32,
    r13_abt: u32,
    r14_abt: u32,
    r13_irq: u32,
    r14_irq: u32,
    r13_und: u32,
    r14_und: u32,

    spsr_fiq: u32,
    spsr_svc: u32,
    spsr_abt: u32,
    spsr_irq: u32,
    spsr_und: u32,

    mode: Mode,
}

pub const PC: usize = 15;
pub const LR: usize = 14;
pub const SP: usize = 13;

impl Registers {
    pub fn new() -> Self {
        let mut regs = Self {
            r: [0; 16],
            cpsr: StatusRegister::from_bits(Mode::Supervisor.mode_bits()),
            r8_r12_non_fiq: [0; 5],
            r8_r12_fiq: [0; 5],
            r13_usr: 0,
            r14_usr: 0,
            r13_fiq: 0,
            r14_fiq: 0,
            r13_svc: 0,
            r14_svc: 0,
            r13_abt: 0,
            r14_abt: 0,
            r13_irq: 0,
            r14_irq: 0,
            r13_und: 0,
            r14_und: 0,
            spsr_fiq: 0,
            spsr_svc: 0,
            spsr_abt: 0,
            spsr_irq: 0,
            spsr_und: 0,
            mode: Mode::Supervisor,
        };
        regs.cpsr.mode_bits = Mode::Supervisor.mode_bits();
        regs
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn execution_state(&self) -> ExecutionState {
        if self.cpsr.thumb { ExecutionState::Thumb } else { ExecutionState::Arm }
    }

    pub fn set_execution_state(&mut self, state: ExecutionState) {
        self.cpsr.thumb = matches!(state, ExecutionState::Thumb);
    }

    /// Switch the banked register set to `new_mode`, preserving the
    /// invariant from spec.md section 4.2: "the unbanked registers (r0-r7,
    /// and r8-r12 outside FIQ) are shared across every mode; only the
    /// banked registers are swapped, and a mode switch never loses the
    /// value of a register that isn't banked for either the old or new
    /// mode."
    pub fn set_mode(&mut self, new_mode: Mode) {
        if new_mode == self.mode {
            return;
        }

        self.store_banked(self.mode);
        self.mode = new_mode;
        self.load_banked(new_mode);
        self.cpsr.mode_bits = new_mode.mode_bits();
    }

    fn store_banked(&mut self, mode: Mode) {
        match mode {
            Mode::Fiq => {
                self.r8_r12_fiq.copy_from_slice(&self.r[8..13]);
                self.r13_fiq = self.r[13];
                self.r14_fiq = self.r[14];
            }
            _ => {
                self.r8_r12_non_fiq.copy_from_slice(&self.r[8..13]);
                match mode {
                    Mode::User | Mode::System => {
                        self.r13_usr = self.r[13];
                        self.r14_usr = self.r[14];
                    }
                    Mode::Irq => {
                        self.r13_irq = self.r[13];
                        self.r14_irq = self.r[14];
                    }
                    Mode::Supervisor => {
                        self.r13_svc = self.r[13];
                        self.r14_svc = self.r[14];
                    }
                    Mode::Abort => {
                        self.r13_abt = self.r[13];
                        self.r14_abt = self.r[14];
                    }
                    Mode::Undefined => {
                        self.r13_und = self.r[13];
                        self.r14_und = self.r[14];
                    }
                    Mode::Fiq => unreachable!(),
                }
            }
        }
    }

    fn load_banked(&mut self, mode: Mode) {
        match mode {
            Mode::Fiq => {
                self.r[8..13].copy_from_slice(&self.r8_r12_fiq);
                self.r[13] = self.r13_fiq;
                self.r[14] = self.r14_fiq;
            }
            _ => {
                self.r[8..13].copy_from_slice(&self.r8_r12_non_fiq);
                match mode {
                    Mode::User | Mode::System => {
                        self.r[13] = self.r13_usr;
                        self.r[14] = self.r14_usr;
                    }
                    Mode::Irq => {
                        self.r[13] = self.r13_irq;
                        self.r[14] = self.r14_irq;
                    }
                    Mode::Supervisor => {
                        self.r[13] = self.r13_svc;
                        self.r[14] = self.r14_svc;
                    }
                    Mode::Abort => {
                        self.r[13] = self.r13_abt;
                        self.r[14] = self.r14_abt;
                    }
                    Mode::Undefined => {
                        self.r[13] = self.r13_und;
                        self.r[14] = self.r14_und;
                    }
                    Mode::Fiq => unreachable!(),
                }
            }
        }
    }

    /// Read the SPSR of the current mode. Reading SPSR in User/System mode
    /// is undefined on real hardware; here it returns CPSR as a harmless
    /// fallback rather than panicking.
    pub fn spsr(&self) -> u32 {
        match self.mode {
            Mode::Fiq => self.spsr_fiq,
            Mode::Supervisor => self.spsr_svc,
            Mode::Abort => self.spsr_abt,
            Mode::Irq => self.spsr_irq,
            Mode::Undefined => self.spsr_und,
            Mode::User | Mode::System => self.cpsr.to_bits(),
        }
    }

    pub fn set_spsr(&mut self, bits: u32) {
        match self.mode {
            Mode::Fiq => self.spsr_fiq = bits,
            Mode::Supervisor => self.spsr_svc = bits,
            Mode::Abort => self.spsr_abt = bits,
            Mode::Irq => self.spsr_irq = bits,
            Mode::Undefined => self.spsr_und = bits,
            Mode::User | Mode::System => {}
        }
    }

    /// Restore CPSR from SPSR, e.g. on exception return. Also moves the
    /// register bank over to whatever mode SPSR names.
    pub fn restore_cpsr_from_spsr(&mut self) {
        let bits = self.spsr();
        self.cpsr = StatusRegister::from_bits(bits);
        if let Some(mode) = Mode::from_mode_bits(self.cpsr.mode_bits) {
            self.set_mode(mode);
        }
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

impl Streamable for Registers {
    fn stream_state(&mut self, s: &mut Serializer) {
        s.stream_trivial(&mut self.r);
        let mut cpsr_bits = self.cpsr.to_bits();
        s.stream_trivial(&mut cpsr_bits);
        self.cpsr = StatusRegister::from_bits(cpsr_bits);

        s.stream_trivial(&mut self.r8_r12_non_fiq);
        s.stream_trivial(&mut self.r8_r12_fiq);
        s.stream_trivial(&mut self.r13_usr);
        s.stream_trivial(&mut self.r14_usr);
        s.stream_trivial(&mut self.r13_fiq);
        s.stream_trivial(&mut self.r14_fiq);
        s.stream_trivial(&mut self.r13_svc);
        s.stream_trivial(&mut self.r14_svc);
        s.stream_trivial(&mut self.r13_abt);
        s.stream_trivial(&mut self.r14_abt);
        s.stream_trivial(&mut self.r13_irq);
        s.stream_trivial(&mut self.r14_irq);
        s.stream_trivial(&mut self.r13_und);
        s.stream_trivial(&mut self.r14_und);
        s.stream_trivial(&mut self.spsr_fiq);
        s.stream_trivial(&mut self.spsr_svc);
        s.stream_trivial(&mut self.spsr_abt);
        s.stream_trivial(&mut self.spsr_irq);
        s.stream_trivial(&mut self.spsr_und);

        let mut mode_bits = self.mode.mode_bits();
        s.stream_trivial(&mut mode_bits);
        self.mode = Mode::from_mode_bits(mode_bits).unwrap_or(Mode::Supervisor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_mode_preserves_unbanked_registers() {
        let mut regs = Registers::new();
        regs.r[0] = 0x1111;
        regs.r[7] = 0x7777;
        regs.r[13] = 0xAAAA;

        regs.set_mode(Mode::Irq);
        regs.r[13] = 0xBBBB; // irq-banked sp

        assert_eq!(regs.r[0], 0x1111);
        assert_eq!(regs.r[7], 0x7777);

        regs.set_mode(Mode::Supervisor);
        assert_eq!(regs.r[13], 0xAAAA, "svc sp must be untouched by the irq switch");
        assert_eq!(regs.r[0], 0x1111);

        regs.set_mode(Mode::Irq);
        assert_eq!(regs.r[13], 0xBBBB, "irq sp must have been preserved across the round trip");
    }

    #[test]
    fn fiq_banks_r8_through_r12_separately() {
        let mut regs = Registers::new();
        regs.set_mode(Mode::User);
        regs.r[8] = 0x1;
        regs.set_mode(Mode::Fiq);
        regs.r[8] = 0x2;
        regs.set_mode(Mode::User);
        assert_eq!(regs.r[8], 0x1);
        regs.set_mode(Mode::Fiq);
        assert_eq!(regs.r[8], 0x2);
    }

    #[test]
    fn spsr_round_trips_through_restore() {
        let mut regs = Registers::new();
        regs.set_mode(Mode::Irq);
        regs.cpsr.negative = true;
        regs.cpsr.mode_bits = Mode::Irq.mode_bits();
        regs.set_spsr(Mode::Supervisor.mode_bits() | (1 << 30));

        regs.restore_cpsr_from_spsr();
        assert_eq!(regs.mode(), Mode::Supervisor);
        assert!(regs.cpsr.zero);
    }
}
