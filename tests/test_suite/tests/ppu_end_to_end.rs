//! Mode 3 is the simplest bitmap mode: one 16-bit BGR555 pixel per VRAM
//! halfword, no tiles or palette indirection. A single scanline pass over
//! a gradient must reproduce every pixel exactly as its RGB888 expansion.

use testrunner::libpocket::pocket_core::dma::DmaController;
use testrunner::libpocket::pocket_core::irq::InterruptController;
use testrunner::libpocket::pocket_core::ppu::registers::Dispcnt;
use testrunner::libpocket::pocket_core::ppu::{Ppu, FRAMEBUFFER_SIZE, LINES_UNTIL_VBLANK, TOTAL_NUM_LINES};
use testrunner::libpocket::pocket_core::scheduler::Scheduler;

fn rgb555_to_rgb888(entry: u16) -> [u8; 3] {
    let r = (entry & 0x1F) as u8;
    let g = ((entry >> 5) & 0x1F) as u8;
    let b = ((entry >> 10) & 0x1F) as u8;
    [(r << 3) | (r >> 2), (g << 3) | (g >> 2), (b << 3) | (b >> 2)]
}

#[test]
fn mode_3_bitmap_pixels_match_the_raw_vram_halfword() {
    let mut ppu = Ppu::new();
    let mut scheduler = Scheduler::new();
    let mut irq = InterruptController::new();
    let mut dma = DmaController::new();

    ppu.dispcnt = Dispcnt(0b11 | (1 << 10)); // bg_mode = 3, BG2 enabled

    let mut gradient = vec![0u8; (240 * 160 * 2) as usize];
    for y in 0..160u32 {
        for x in 0..240u32 {
            let red_channel = ((x * 31) / 239) as u16;
            let entry = red_channel; // pure red gradient, g = b = 0
            let offset = ((y * 240 + x) * 2) as usize;
            gradient[offset..offset + 2].copy_from_slice(&entry.to_le_bytes());
        }
    }
    ppu.write_vram(0, &gradient);

    for _ in 0..LINES_UNTIL_VBLANK {
        ppu.on_new_scanline(&mut scheduler, &mut irq, &mut dma);
    }

    assert_eq!(ppu.framebuffer().len(), FRAMEBUFFER_SIZE);

    for y in 0..160u32 {
        for x in 0..240u32 {
            let vram_offset = ((y * 240 + x) * 2) as usize;
            let entry = u16::from_le_bytes([ppu.vram_byte(vram_offset), ppu.vram_byte(vram_offset + 1)]);
            let expected = rgb555_to_rgb888(entry);

            let fb_offset = ((y * 240 + x) * 3) as usize;
            let actual = ppu.framebuffer()[fb_offset..fb_offset + 3].to_vec();
            assert_eq!(actual, expected.to_vec(), "pixel ({x}, {y}) must equal VRAM's raw RGB888 expansion");
        }
    }
}

#[test]
fn affine_background_reference_point_advances_by_pb_pd_each_scanline() {
    let mut ppu = Ppu::new();
    let mut scheduler = Scheduler::new();
    let mut irq = InterruptController::new();
    let mut dma = DmaController::new();

    ppu.dispcnt = Dispcnt(0b01 | (1 << 10)); // bg_mode = 1, BG2 enabled (affine)
    ppu.bg_affine[0].pa = 0x0100; // identity scale
    ppu.bg_affine[0].pb = 0x0002; // advance 2/256 px of X per scanline
    ppu.bg_affine[0].pc = 0x0000;
    ppu.bg_affine[0].pd = 0x0100;
    ppu.bg_affine[0].x_ref = 0;
    ppu.bg_affine[0].y_ref = 0;

    assert_eq!(ppu.bg_affine[0].internal_x, 0, "reference point starts at x_ref");

    for _ in 0..10 {
        ppu.on_new_scanline(&mut scheduler, &mut irq, &mut dma);
    }

    // Rendering line N uses the accumulator after N increments of pb; after
    // 10 calls the scanline about to be rendered is line 10, so the
    // accumulator must have stepped by pb exactly 10 times.
    assert_eq!(
        ppu.bg_affine[0].internal_x, 10 * 0x0002,
        "the accumulator must advance every scanline instead of staying frozen at x_ref"
    );

    for _ in 10..TOTAL_NUM_LINES {
        ppu.on_new_scanline(&mut scheduler, &mut irq, &mut dma);
    }
    assert_eq!(
        ppu.bg_affine[0].internal_x, 0,
        "the accumulator reloads from x_ref at the start of the next frame"
    );
}

#[test]
fn one_frame_is_228_scanlines_with_a_fixed_size_framebuffer() {
    let mut ppu = Ppu::new();
    let mut scheduler = Scheduler::new();
    let mut irq = InterruptController::new();
    let mut dma = DmaController::new();

    for _ in 0..TOTAL_NUM_LINES {
        ppu.on_new_scanline(&mut scheduler, &mut irq, &mut dma);
    }

    assert_eq!(ppu.v_counter, 0, "the v-counter wraps back to 0 after exactly one frame");
    assert_eq!(ppu.framebuffer().len(), FRAMEBUFFER_SIZE);
}
