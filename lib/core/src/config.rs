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

//! Device configuration, analogous to `gemi_core::gameboy::DeviceConfig`.
//! `DeviceKind` only has a single variant today, but exists as an enum so a
//! future VR4300/RSP target (spec.md section 1's "partial Nintendo 64"
//! target) slots in without changing the shape of [crate::device::Device].

/// Which hardware target is currently running.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceKind {
    GameBoyAdvance,
}

impl Default for DeviceKind {
    fn default() -> Self {
        DeviceKind::GameBoyAdvance
    }
}

/// A struct containing the setup information of the running device.
#[derive(Copy, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceConfig {
    /// The hardware target being emulated.
    pub device: DeviceKind,

    /// Flag if executed opcodes should be printed for debugging.
    pub print_opcodes: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device: DeviceKind::GameBoyAdvance,
            print_opcodes: false,
        }
    }
}
