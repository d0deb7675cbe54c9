//! Two invariants that don't show up from stepping single instructions:
//! entering and returning from an exception must round-trip every
//! register and the banked SPSR, and asserting an interrupt must only
//! reach the CPU's `irq_line` exactly [IRQ_LATCH_DELAY] cycles later.

use testrunner::libpocket::pocket_core::cpu::registers::Mode;
use testrunner::libpocket::pocket_core::cpu::{Bus, Cpu, Exception};
use testrunner::libpocket::pocket_core::irq::{InterruptController, Source};
use testrunner::libpocket::pocket_core::scheduler::{EventKind, Scheduler};

struct NullBus;

impl Bus for NullBus {
    fn read8(&mut self, _addr: u32) -> (u8, u32) { (0, 1) }
    fn read16(&mut self, _addr: u32) -> (u16, u32) { (0, 1) }
    fn read32(&mut self, _addr: u32) -> (u32, u32) { (0, 1) }
    fn write8(&mut self, _addr: u32, _value: u8) -> u32 { 1 }
    fn write16(&mut self, _addr: u32, _value: u16) -> u32 { 1 }
    fn write32(&mut self, _addr: u32, _value: u32) -> u32 { 1 }
}

#[test]
fn entering_and_returning_from_an_irq_restores_every_register_and_cpsr() {
    let mut bus = NullBus;
    let mut cpu = Cpu::new();
    cpu.regs.set_mode(Mode::User);
    cpu.regs.r[0] = 0x1111_1111; // unbanked, shared across modes
    cpu.regs.r[13] = 0xAAAA_AAAA; // user-banked sp
    let original_cpsr = cpu.regs.cpsr.to_bits();

    cpu.enter_exception(Exception::Irq, &mut bus);

    assert_eq!(cpu.regs.mode(), Mode::Irq);
    assert_eq!(cpu.regs.r[0], 0x1111_1111, "unbanked registers survive a mode switch");
    assert_eq!(cpu.regs.spsr(), original_cpsr, "irq mode's own SPSR holds the interrupted CPSR");

    cpu.regs.r[13] = 0xBBBB_BBBB; // irq-banked sp, independent of user's
    cpu.regs.restore_cpsr_from_spsr(); // the tail of a `SUBS pc, lr, #4`-style return

    assert_eq!(cpu.regs.mode(), Mode::User);
    assert_eq!(cpu.regs.cpsr.to_bits(), original_cpsr);
    assert_eq!(cpu.regs.r[0], 0x1111_1111);
    assert_eq!(cpu.regs.r[13], 0xAAAA_AAAA, "user's banked sp was untouched by the irq-mode write");
}

#[test]
fn an_irq_reaches_the_cpu_line_exactly_three_cycles_after_becoming_pending() {
    const IRQ_LATCH_DELAY: u64 = 3;

    let mut cpu = Cpu::new();
    let mut irq = InterruptController::new();
    let mut scheduler = Scheduler::new();

    irq.write_ie(1 << 0); // enable VBlank (bit 0)
    irq.set_ime(true);
    irq.raise(Source::VBlank);
    assert!(irq.irq_pending());
    assert!(!cpu.irq_line, "the line hasn't latched yet");

    scheduler.add_event(EventKind::IrqLatch, IRQ_LATCH_DELAY);
    assert_eq!(scheduler.next_event_time(), IRQ_LATCH_DELAY);

    scheduler.advance(IRQ_LATCH_DELAY);
    assert_eq!(scheduler.pop_event(), EventKind::IrqLatch);
    if irq.irq_pending() {
        cpu.raise_irq_line();
    }

    assert!(cpu.irq_line, "observed at the next instruction boundary, 3 cycles after becoming pending");
}
