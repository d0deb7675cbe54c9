//! The scheduler's two load-bearing invariants: cycles consumed by a
//! driver always sum to the clock's advance, and an event inserted with
//! `add_event` always comes back out of `pop_event` at the time it was
//! scheduled for, ties breaking in insertion order.

use testrunner::libpocket::pocket_core::scheduler::{DriverKind, EventKind, Scheduler};

#[test]
fn advancing_by_a_driver_budget_matches_the_clock() {
    let mut scheduler = Scheduler::new();
    scheduler.add_event(EventKind::HBlankStart, 960);
    scheduler.engage_driver(DriverKind::Cpu);

    let mut total_consumed = 0u64;
    while scheduler.now() < scheduler.next_event_time() {
        let budget = scheduler.next_event_time() - scheduler.now();
        let consumed = budget.min(4); // stand in for one CPU instruction's cycles
        scheduler.advance(consumed);
        total_consumed += consumed;
    }

    assert_eq!(total_consumed, 960, "sum of every driver slice must equal the clock's advance");
    assert_eq!(scheduler.now(), 960);
}

#[test]
fn add_event_fires_at_the_requested_time_with_stable_ties() {
    let mut scheduler = Scheduler::new();
    scheduler.add_event(EventKind::NewScanline, 1232);
    scheduler.add_event(EventKind::HBlankStart, 960);
    scheduler.add_event(EventKind::IrqLatch, 960); // same time as HBlankStart, inserted after

    assert_eq!(scheduler.next_event_time(), 960);
    scheduler.advance(960);
    assert_eq!(scheduler.pop_event(), EventKind::HBlankStart, "earlier insertion wins a tie");
    assert_eq!(scheduler.pop_event(), EventKind::IrqLatch);
    assert_eq!(scheduler.now(), 960);

    scheduler.advance(1232 - 960);
    assert_eq!(scheduler.pop_event(), EventKind::NewScanline);
    assert_eq!(scheduler.now(), 1232);
}

#[test]
fn an_overrun_driver_snaps_now_forward_instead_of_erroring() {
    let mut scheduler = Scheduler::new();
    scheduler.add_event(EventKind::HBlankStart, 100);
    scheduler.advance(107); // driver ran 7 cycles past its budget
    assert_eq!(scheduler.pop_event(), EventKind::HBlankStart);
    assert_eq!(scheduler.now(), 107, "now never rewinds to the event's nominal time");
}
