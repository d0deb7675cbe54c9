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

//! The game cartridge: ROM (mirrored at `0x0800_0000-0x09FF_FFFF` and its
//! wait-state-2/3 mirrors) and the flat-model SRAM backup this crate
//! supports, per spec.md section 6. Grounded in `original_source`'s
//! `gba::cartridge` namespace.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use crate::error::{Error, ErrorCode, Result, Source};
use crate::utils::next_power_of_two;

pub const MAX_ROM_SIZE: usize = 32 * 1024 * 1024;
pub const SRAM_SIZE: usize = 64 * 1024;

pub struct Cartridge {
    rom: Box<[u8]>,
    /// `rom.len()` rounded up to a power of two; addresses mask against
    /// `mirror_mask` so reads past the real image repeat it, matching a
    /// real cartridge's address decoding (spec.md section 6).
    mirror_mask: usize,
    sram: Box<[u8]>,
}

impl Cartridge {
    pub fn empty() -> Self {
        Self {
            rom: Vec::new().into_boxed_slice(),
            mirror_mask: 0,
            sram: vec![0xFFu8; SRAM_SIZE].into_boxed_slice(),
        }
    }

    pub fn load_rom(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() || bytes.len() > MAX_ROM_SIZE {
            return Err(Error::new(
                Source::Rom,
                ErrorCode::FileSizeMismatch { expected: MAX_ROM_SIZE, got: bytes.len() },
            ));
        }

        let padded_size = next_power_of_two(bytes.len());
        let mut rom = vec![0u8; padded_size];
        rom[..bytes.len()].copy_from_slice(bytes);
        for chunk in rom[bytes.len()..].chunks_mut(bytes.len()) {
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
        self.rom = rom.into_boxed_slice();
        self.mirror_mask = padded_size - 1;
        Ok(())
    }

    pub fn rom_size(&self) -> usize {
        self.rom.len()
    }

    fn mirrored_offset(&self, addr: u32) -> usize {
        if self.mirror_mask == 0 { 0 } else { addr as usize & self.mirror_mask }
    }

    pub fn read_rom8(&self, addr: u32) -> u8 {
        if self.rom.is_empty() { return 0xFF; }
        self.rom[self.mirrored_offset(addr)]
    }

    pub fn read_rom16(&self, addr: u32) -> u16 {
        if self.rom.is_empty() { return 0xFFFF; }
        let base = self.mirrored_offset(addr) & !1;
        u16::from_le_bytes([self.rom[base], self.rom[base + 1]])
    }

    pub fn read_rom32(&self, addr: u32) -> u32 {
        if self.rom.is_empty() { return 0xFFFF_FFFF; }
        let base = self.mirrored_offset(addr) & !3;
        u32::from_le_bytes([
            self.rom[base], self.rom[base + 1], self.rom[base + 2], self.rom[base + 3],
        ])
    }

    pub fn read_sram(&self, addr: u32) -> u8 {
        self.sram[addr as usize & (SRAM_SIZE - 1)]
    }

    pub fn write_sram(&mut self, addr: u32, value: u8) {
        self.sram[addr as usize & (SRAM_SIZE - 1)] = value;
    }

    pub fn sram_bytes(&self) -> &[u8] {
        &self.sram
    }

    pub fn sram_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.sram
    }
}

impl Default for Cartridge {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rom_smaller_than_a_power_of_two_mirrors_into_the_slack() {
        let mut cart = Cartridge::empty();
        let mut image = vec![0u8; 0x180000]; // 1.5 MiB, pads to 2 MiB
        image[0] = 0x11;
        cart.load_rom(&image).unwrap();

        assert_eq!(cart.read_rom8(0), 0x11);
        // Past the real image but still inside the padded 2 MiB, it
        // mirrors back to the start of the image.
        assert_eq!(cart.read_rom8(0x180000), cart.read_rom8(0));
    }

    #[test]
    fn sram_initializes_to_all_ones() {
        let cart = Cartridge::empty();
        assert_eq!(cart.read_sram(0), 0xFF);
        assert_eq!(cart.read_sram(SRAM_SIZE as u32 - 1), 0xFF);
    }

    #[test]
    fn sram_wraps_at_64kib() {
        let mut cart = Cartridge::empty();
        cart.write_sram(0, 0x42);
        assert_eq!(cart.read_sram(SRAM_SIZE as u32), 0x42);
    }
}
