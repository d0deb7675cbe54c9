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

//! The pixel processing unit: palette/VRAM/OAM storage, registers, the
//! scanline state machine and the framebuffer. Grounded in
//! `original_source`'s `gba::ppu` namespace (`ppu.hpp`/`ppu.cpp`).

pub mod registers;
pub mod render;

use alloc::vec;
use alloc::vec::Vec;

use crate::dma::DmaController;
use crate::irq::{InterruptController, Source};
use crate::scheduler::{EventKind, Scheduler};
use crate::serializer::{Serializer, Streamable};
use registers::{Bgcnt, Bldcnt, Dispcnt, Dispstat, Mosaic, Winin, Winout};

pub const DOTS_PER_LINE: u32 = 240;
pub const FRAMEBUFFER_WIDTH: u32 = 240;
pub const FRAMEBUFFER_HEIGHT: u32 = 160;
pub const FRAMEBUFFER_SIZE: usize = (FRAMEBUFFER_WIDTH * FRAMEBUFFER_HEIGHT * 3) as usize;
pub const LINES_UNTIL_VBLANK: u32 = 160;
pub const TOTAL_NUM_LINES: u32 = 228;
pub const MAX_OBJECTS: usize = 128;

pub const CYCLES_PER_LINE: u64 = 1232;
pub const CYCLES_UNTIL_HBLANK: u64 = 960;
pub const CYCLES_UNTIL_SET_HBLANK_FLAG: u64 = 1006;

const PALETTE_RAM_SIZE: usize = 0x400;
const OAM_SIZE: usize = 0x400;
const VRAM_SIZE: usize = 0x1_8000;

pub struct Ppu {
    pub dispcnt: Dispcnt,
    pub green_swap: bool,
    pub dispstat: Dispstat,
    pub v_counter: u32,

    pub bgcnt: [Bgcnt; 4],
    pub bghofs: [u16; 4],
    pub bgvofs: [u16; 4],
    pub bg_affine: [AffineBg; 2],

    pub winin: Winin,
    pub winout: Winout,
    pub win_h: [(u8, u8); 2], // (x1, x2)
    pub win_v: [(u8, u8); 2], // (y1, y2)

    pub mosaic: Mosaic,
    pub bldcnt: Bldcnt,
    pub eva: u8,
    pub evb: u8,
    pub evy: u8,

    pub in_hblank: bool,
    pub in_vblank: bool,

    palette_ram: Vec<u8>,
    vram: Vec<u8>,
    oam: Vec<u8>,
    framebuffer: Vec<u8>,
}

/// BG2/BG3 affine (rotate/scale) state: reference point plus the four
/// matrix parameters, per spec.md section 4.5.
#[derive(Debug, Copy, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AffineBg {
    pub x_ref: u32,
    pub y_ref: u32,
    pub pa: u16,
    pub pb: u16,
    pub pc: u16,
    pub pd: u16,
    /// Internal reference-point accumulator, in the same sign-extended 0.8
    /// fixed-point representation as `x_ref`/`y_ref` (see
    /// [registers::affine_ref_point_raw]). Reloaded from `x_ref`/`y_ref` once
    /// per frame and from then on incremented every visible scanline by
    /// `pb` (for X) and `pd` (for Y) -- the X/Y axes step with the affine
    /// matrix's row that multiplies the screen's Y coordinate, not with
    /// `pa`/`pc`, which instead step per-pixel across a single scanline.
    pub internal_x: i32,
    pub internal_y: i32,
}

impl Ppu {
    pub fn new() -> Self {
        Self {
            dispcnt: Dispcnt::default(),
            green_swap: false,
            dispstat: Dispstat::default(),
            v_counter: 0,
            bgcnt: [Bgcnt::default(); 4],
            bghofs: [0; 4],
            bgvofs: [0; 4],
            bg_affine: [AffineBg::default(); 2],
            winin: Winin::default(),
            winout: Winout::default(),
            win_h: [(0, 0); 2],
            win_v: [(0, 0); 2],
            mosaic: Mosaic::default(),
            bldcnt: Bldcnt::default(),
            eva: 0,
            evb: 0,
            evy: 0,
            in_hblank: false,
            in_vblank: false,
            palette_ram: vec![0u8; PALETTE_RAM_SIZE],
            vram: vec![0u8; VRAM_SIZE],
            oam: vec![0u8; OAM_SIZE],
            framebuffer: vec![0u8; FRAMEBUFFER_SIZE],
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn framebuffer(&self) -> &[u8] {
        &self.framebuffer
    }

    /// Schedule the first `HBlankStart` event. Called once when the
    /// device starts running (spec.md section 4.5, `AddInitialEvents`).
    pub fn schedule_initial_event(&self, scheduler: &mut Scheduler) {
        scheduler.add_event(EventKind::HBlankStart, CYCLES_UNTIL_HBLANK);
    }

    pub fn on_hblank_start(&mut self, scheduler: &mut Scheduler, dma: &mut DmaController) {
        scheduler.add_event(EventKind::HBlankSetFlag, CYCLES_UNTIL_SET_HBLANK_FLAG - CYCLES_UNTIL_HBLANK);
        self.in_hblank = true;
        dma.notify_hblank(scheduler);
    }

    pub fn on_hblank_set_flag(&mut self, scheduler: &mut Scheduler, irq: &mut InterruptController) {
        scheduler.add_event(EventKind::NewScanline, CYCLES_PER_LINE - CYCLES_UNTIL_SET_HBLANK_FLAG);
        self.dispstat.set_hblank(true);
        if self.dispstat.hblank_irq_enable() {
            irq.raise(Source::HBlank);
        }
    }

    pub fn on_new_scanline(
        &mut self,
        scheduler: &mut Scheduler,
        irq: &mut InterruptController,
        dma: &mut DmaController,
    ) {
        if self.v_counter < LINES_UNTIL_VBLANK {
            render::render_scanline(self);
        }

        scheduler.add_event(EventKind::HBlankStart, CYCLES_UNTIL_HBLANK);
        self.dispstat.set_hblank(false);
        self.in_hblank = false;
        self.v_counter += 1;

        let prev_match = self.dispstat.v_counter_match();
        let now_match = self.v_counter == self.dispstat.v_count_setting() as u32;
        self.dispstat.set_v_counter_match(now_match);
        if now_match && !prev_match && self.dispstat.v_counter_irq_enable() {
            irq.raise(Source::VCounter);
        }

        if self.v_counter < LINES_UNTIL_VBLANK {
            self.step_affine_reference_points();
        } else if self.v_counter == LINES_UNTIL_VBLANK {
            self.dispstat.set_vblank(true);
            self.in_vblank = true;
            if self.dispstat.vblank_irq_enable() {
                irq.raise(Source::VBlank);
            }
            dma.notify_vblank(scheduler);
        } else if self.v_counter == TOTAL_NUM_LINES - 1 {
            self.dispstat.set_vblank(false);
            self.in_vblank = false;
            self.reload_affine_reference_points();
        } else if self.v_counter >= TOTAL_NUM_LINES {
            self.v_counter %= TOTAL_NUM_LINES;
        }
    }

    /// Reload each affine background's internal reference point from
    /// BGxX/Y, mirroring `original_source`'s commented-out
    /// `UpdateRotateScalingRegisters` stub's reload-on-the-last-line pseudo
    /// code: this runs once per frame, on the last vblank line, so the
    /// accumulator is ready for scanline 0 of the next frame.
    fn reload_affine_reference_points(&mut self) {
        for bg in &mut self.bg_affine {
            bg.internal_x = registers::affine_ref_point_raw(bg.x_ref);
            bg.internal_y = registers::affine_ref_point_raw(bg.y_ref);
        }
    }

    /// Step each affine background's accumulator by one scanline's worth
    /// of `pb`/`pd`, preparing it for the next visible line's render. Per
    /// spec.md section 4.5, only `pb`/`pd` advance the per-scanline
    /// reference point; `pa`/`pc` instead step the sample position across
    /// pixels within a single scanline and are applied directly in
    /// `render::render_affine_bg`.
    fn step_affine_reference_points(&mut self) {
        for bg in &mut self.bg_affine {
            bg.internal_x = bg.internal_x.wrapping_add((bg.pb as i16) as i32);
            bg.internal_y = bg.internal_y.wrapping_add((bg.pd as i16) as i32);
        }
    }

    pub fn read_palette_ram<const N: usize>(&self, addr: u32) -> [u8; N] {
        let base = addr as usize & (PALETTE_RAM_SIZE - 1) & !(N - 1);
        let mut out = [0u8; N];
        out.copy_from_slice(&self.palette_ram[base..base + N]);
        out
    }

    pub fn write_palette_ram(&mut self, addr: u32, bytes: &[u8]) {
        let base = addr as usize & (PALETTE_RAM_SIZE - 1) & !(bytes.len() - 1);
        self.palette_ram[base..base + bytes.len()].copy_from_slice(bytes);
    }

    pub fn palette_entry(&self, index: usize) -> u16 {
        let base = (index * 2) & (PALETTE_RAM_SIZE - 1);
        u16::from_le_bytes([self.palette_ram[base], self.palette_ram[base + 1]])
    }

    pub fn read_vram(&self, addr: u32, len: usize) -> &[u8] {
        let mask = VRAM_SIZE - 1;
        let base = (addr as usize) & mask;
        &self.vram[base..(base + len).min(VRAM_SIZE)]
    }

    pub fn vram_byte(&self, offset: usize) -> u8 {
        self.vram[offset & (VRAM_SIZE - 1)]
    }

    pub fn write_vram(&mut self, addr: u32, bytes: &[u8]) {
        let base = (addr as usize) & (VRAM_SIZE - 1);
        let end = (base + bytes.len()).min(VRAM_SIZE);
        self.vram[base..end].copy_from_slice(&bytes[..end - base]);
    }

    pub fn oam_bytes(&self) -> &[u8] {
        &self.oam
    }

    pub fn write_oam(&mut self, addr: u32, bytes: &[u8]) {
        let base = (addr as usize) & (OAM_SIZE - 1);
        self.oam[base..base + bytes.len()].copy_from_slice(bytes);
    }
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}

impl Streamable for Ppu {
    fn stream_state(&mut self, s: &mut Serializer) {
        s.stream_trivial(&mut self.dispcnt.0);
        s.stream_trivial(&mut self.green_swap);
        s.stream_trivial(&mut self.dispstat.0);
        s.stream_trivial(&mut self.v_counter);
        for bg in &mut self.bgcnt { s.stream_trivial(&mut bg.0); }
        s.stream_trivial(&mut self.bghofs);
        s.stream_trivial(&mut self.bgvofs);
        for bg in &mut self.bg_affine {
            s.stream_trivial(&mut bg.x_ref);
            s.stream_trivial(&mut bg.y_ref);
            s.stream_trivial(&mut bg.pa);
            s.stream_trivial(&mut bg.pb);
            s.stream_trivial(&mut bg.pc);
            s.stream_trivial(&mut bg.pd);
            s.stream_trivial(&mut bg.internal_x);
            s.stream_trivial(&mut bg.internal_y);
        }
        s.stream_trivial(&mut self.winin.0);
        s.stream_trivial(&mut self.winout.0);
        for win in &mut self.win_h { s.stream_trivial(win); }
        for win in &mut self.win_v { s.stream_trivial(win); }
        s.stream_trivial(&mut self.mosaic.0);
        s.stream_trivial(&mut self.bldcnt.0);
        s.stream_trivial(&mut self.eva);
        s.stream_trivial(&mut self.evb);
        s.stream_trivial(&mut self.evy);
        s.stream_bytes(&mut self.palette_ram);
        s.stream_bytes(&mut self.vram);
        s.stream_bytes(&mut self.oam);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_frame_is_228_scanlines_and_framebuffer_stays_fixed_size() {
        let mut ppu = Ppu::new();
        let mut scheduler = Scheduler::new();
        let mut irq = InterruptController::new();
        let mut dma = DmaController::new();

        for _ in 0..TOTAL_NUM_LINES {
            ppu.on_new_scanline(&mut scheduler, &mut irq, &mut dma);
        }

        assert_eq!(ppu.v_counter, 0, "v_counter wraps back to 0 after a full frame");
        assert_eq!(ppu.framebuffer().len(), FRAMEBUFFER_SIZE);
    }

    #[test]
    fn vblank_flag_set_on_line_160_and_cleared_on_wraparound() {
        let mut ppu = Ppu::new();
        let mut scheduler = Scheduler::new();
        let mut irq = InterruptController::new();
        let mut dma = DmaController::new();

        for _ in 0..LINES_UNTIL_VBLANK {
            ppu.on_new_scanline(&mut scheduler, &mut irq, &mut dma);
        }
        assert!(ppu.dispstat.vblank());

        for _ in LINES_UNTIL_VBLANK..(TOTAL_NUM_LINES - 1) {
            ppu.on_new_scanline(&mut scheduler, &mut irq, &mut dma);
        }
        assert!(!ppu.dispstat.vblank());
    }
}
