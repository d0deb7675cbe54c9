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

//! The 16 KiB GBA BIOS image, mapped at `0x0000_0000-0x0000_3FFF`.
//! Grounded in `original_source`'s `gba::bios` image loader; unlike a
//! real BIOS image this crate never ships one, so [Bios::load] is the
//! only way any bytes end up here (spec.md section 6: BIOS is supplied
//! by the host, never bundled).

use alloc::boxed::Box;
use alloc::vec;

use crate::error::{Error, ErrorCode, Result, Source};

pub const BIOS_SIZE: usize = 0x4000;

pub struct Bios {
    data: Box<[u8]>,
}

impl Bios {
    pub fn new() -> Self {
        Self { data: vec![0u8; BIOS_SIZE].into_boxed_slice() }
    }

    /// Load a BIOS image, which must be exactly [BIOS_SIZE] bytes.
    pub fn load(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() != BIOS_SIZE {
            return Err(Error::new(
                Source::Bios,
                ErrorCode::FileSizeMismatch { expected: BIOS_SIZE, got: bytes.len() },
            ));
        }
        self.data.copy_from_slice(bytes);
        Ok(())
    }

    pub fn read8(&self, addr: u32) -> u8 {
        self.data[addr as usize & (BIOS_SIZE - 1)]
    }

    pub fn read16(&self, addr: u32) -> u16 {
        let base = addr as usize & (BIOS_SIZE - 1) & !1;
        u16::from_le_bytes([self.data[base], self.data[base + 1]])
    }

    pub fn read32(&self, addr: u32) -> u32 {
        let base = addr as usize & (BIOS_SIZE - 1) & !3;
        u32::from_le_bytes([
            self.data[base], self.data[base + 1], self.data[base + 2], self.data[base + 3],
        ])
    }
}

impl Default for Bios {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_rejects_wrong_size() {
        let mut bios = Bios::new();
        let err = bios.load(&[0u8; 100]).unwrap_err();
        assert_eq!(err.error_code, ErrorCode::FileSizeMismatch { expected: BIOS_SIZE, got: 100 });
    }

    #[test]
    fn load_accepts_exact_size_and_reads_back() {
        let mut bios = Bios::new();
        let mut image = vec![0u8; BIOS_SIZE];
        image[4] = 0xAB;
        bios.load(&image).unwrap();
        assert_eq!(bios.read8(4), 0xAB);
    }
}
