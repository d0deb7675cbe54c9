//! Channel 3, word transfers, no repeat: copies exactly the requested
//! number of bytes, raises its IRQ source and disengages so the scheduler
//! never keeps picking it once it has nothing left to do.

use testrunner::libpocket::pocket_core::dma::DmaController;
use testrunner::libpocket::pocket_core::irq::{InterruptController, Source};
use testrunner::libpocket::pocket_core::scheduler::{DriverKind, Scheduler};

const SRC_BASE: u32 = 0x0200_0000;
const DST_BASE: u32 = 0x0600_0000;

#[test]
fn channel_3_immediate_32bit_no_repeat_copies_0x400_bytes_and_disengages() {
    let mut dma = DmaController::new();
    let mut scheduler = Scheduler::new();
    let mut irq = InterruptController::new();

    let mut ewram = vec![0u8; 0x4_0000];
    for (i, b) in ewram.iter_mut().enumerate() {
        *b = (i % 256) as u8;
    }
    let mut vram = vec![0u8; 0x1_8000];

    let channel = &mut dma.channels[3];
    for byte in 0..4 {
        channel.write_src_addr_byte(byte, SRC_BASE.to_le_bytes()[byte]);
        channel.write_dst_addr_byte(byte, DST_BASE.to_le_bytes()[byte]);
    }
    channel.write_count_byte(0, 0x00);
    channel.write_count_byte(1, 0x01); // count = 0x100

    let word_transfer: u16 = 1 << 10;
    let irq_enable: u16 = 1 << 14;
    let enable: u16 = 1 << 15;
    channel.write_control(word_transfer | irq_enable | enable, &mut scheduler);
    assert!(scheduler.is_engaged(DriverKind::Dma3), "an immediate-start channel engages on enable");

    let (cycles, completed, raise_irq) = channel.run(
        0x100,
        |addr, word| {
            let base = (addr - SRC_BASE) as usize;
            if word {
                u32::from_le_bytes(ewram[base..base + 4].try_into().unwrap())
            } else {
                u16::from_le_bytes(ewram[base..base + 2].try_into().unwrap()) as u32
            }
        },
        |addr, word, value| {
            let base = (addr - DST_BASE) as usize;
            if word {
                vram[base..base + 4].copy_from_slice(&value.to_le_bytes());
            } else {
                vram[base..base + 2].copy_from_slice(&(value as u16).to_le_bytes());
            }
        },
    );

    assert_eq!(cycles, 0x100, "one word transferred per cycle of budget");
    assert!(completed);
    assert!(raise_irq);
    assert!(!channel.is_enabled(), "a non-repeat transfer clears its own enable bit");
    assert_eq!(&vram[..0x400], &ewram[..0x400], "0x100 words = 0x400 bytes copied");

    if !channel.is_enabled() {
        scheduler.disengage_driver(channel.driver_kind());
    }
    assert!(!scheduler.is_engaged(DriverKind::Dma3), "the channel must not remain the head driver forever");

    irq.raise(channel.irq_source());
    assert_eq!(channel.irq_source(), Source::Dma3);
    assert_eq!(irq.read_if() & (1 << 11), 1 << 11, "Dma3 is IF bit 11");
}
