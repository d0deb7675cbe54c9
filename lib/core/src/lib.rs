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

//! The CORE of the emulator: scheduler, ARM7TDMI CPU, bus/wait-states, DMA,
//! PPU, timers, APU, IRQ/keypad/serial I/O, the cartridge/BIOS data model,
//! and the [device::Device] that owns all of it behind the `Core` surface.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;
extern crate core;

pub mod apu;
pub mod bios;
pub mod bus;
pub mod cartridge;
pub mod config;
pub mod cpu;
pub mod device;
pub mod diag;
pub mod dma;
pub mod error;
pub mod irq;
pub mod keypad;
pub mod ppu;
pub mod scheduler;
pub mod serial;
pub mod serializer;
#[cfg(feature = "snapshots")]
pub mod snapshots;
pub mod timer;
pub mod utils;
