//! Timer0 at prescaler/1 with a 0x100-cycle period, Timer1 cascading in
//! count-up mode: exactly 65536 Timer0 overflows must produce exactly one
//! Timer1 overflow (its 16-bit counter wrapping exactly once), which must
//! raise the Timer1 IRQ source.

use testrunner::libpocket::pocket_core::irq::{InterruptController, Source};
use testrunner::libpocket::pocket_core::scheduler::{EventKind, Scheduler};
use testrunner::libpocket::pocket_core::timer::TimerController;

#[test]
fn sixty_five_thousand_timer0_overflows_yield_one_timer1_overflow() {
    let mut timers = TimerController::new();
    let mut scheduler = Scheduler::new();
    let mut irq = InterruptController::new();

    timers.write_reload(0, 0xFF00); // 0x100 ticks to overflow, prescaler /1
    timers.write_control(0, 0b1000_0000, &mut scheduler); // enable

    timers.write_reload(1, 0);
    timers.write_control(1, 0b1100_0100, &mut scheduler); // enable, count-up, irq enable

    let mut timer1_overflows = 0u32;
    for _ in 0..65536u32 {
        let before = timers.read_counter(1, scheduler.now());

        let delay = scheduler.time_until_next_event();
        scheduler.advance(delay);
        assert_eq!(scheduler.pop_event(), EventKind::TimerOverflow(0));
        timers.on_overflow(0, &mut scheduler, &mut irq);

        let after = timers.read_counter(1, scheduler.now());
        if after < before {
            timer1_overflows += 1;
        }
    }

    assert_eq!(timer1_overflows, 1, "a 16-bit counter wraps exactly once in 65536 increments");

    const TIMER1_IF_BIT: u16 = 1 << 4; // IE/IF bit layout: VBlank,HBlank,VCounter,Timer0,Timer1,...
    assert_ne!(irq.read_if() & TIMER1_IF_BIT, 0, "Timer1's overflow must raise its own IRQ source");

    irq.write_ie(TIMER1_IF_BIT);
    irq.set_ime(true);
    assert!(irq.irq_pending());
}

#[test]
fn timer1_irq_source_is_distinct_from_timer0() {
    let mut irq = InterruptController::new();
    irq.raise(Source::Timer1);
    irq.write_ie(1 << 4);
    irq.set_ime(true);
    assert!(irq.irq_pending());
    irq.write_if(1 << 3); // acknowledging Timer0's bit must not clear Timer1's
    assert!(irq.irq_pending(), "Timer1's bit is untouched by acknowledging Timer0");
}
