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

//! A small builder/facade around [pocket_core::device::Device], the
//! equivalent of `original_source`'s `EmulatorCore` setup helper. A host
//! picks a BIOS and a ROM image, gets back a [GameBoyAdvance], and drives it
//! frame by frame without ever touching `Device`'s internals directly.

#[cfg(feature = "std")]
use std::fmt::{Display, Formatter};

use pocket_core::config::{DeviceConfig, DeviceKind};
use pocket_core::device::Device;
use pocket_core::error::Result;
use pocket_core::keypad::Button;


/// Everything needed to create a [GameBoyAdvance], gathered up before the
/// device itself is constructed.
#[derive(Default)]
pub struct Builder {
    bios: Option<Vec<u8>>,
    rom: Option<Vec<u8>>,
    print_opcodes: bool,
}


/// Reasons a [Builder] may refuse to [Builder::finish].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BuilderErrorCode {
    /// No BIOS image was provided, and this target has no way to run
    /// without one (unlike the Game Boy's optional boot ROM).
    MissingBios,

    /// No cartridge ROM was provided.
    MissingRom,

    /// The BIOS or ROM image given didn't pass [Device::load_bios] /
    /// [Device::load_rom]'s own validation (wrong size, too large).
    InvalidImage,
}


impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the BIOS image. Must be exactly 16 KiB; checked by
    /// [Device::load_bios] once [Builder::finish] is called.
    pub fn set_bios(mut self, bios: Vec<u8>) -> Self {
        self.bios = Some(bios);
        self
    }

    /// Set the cartridge ROM image.
    pub fn set_rom(mut self, rom: Vec<u8>) -> Self {
        self.rom = Some(rom);
        self
    }

    pub fn set_print_opcodes(mut self, print_opcodes: bool) -> Self {
        self.print_opcodes = print_opcodes;
        self
    }

    /// Construct the [GameBoyAdvance], loading the BIOS and ROM and running
    /// the device's reset sequence.
    pub fn finish(self) -> core::result::Result<GameBoyAdvance, BuilderErrorCode> {
        let bios = self.bios.ok_or(BuilderErrorCode::MissingBios)?;
        let rom = self.rom.ok_or(BuilderErrorCode::MissingRom)?;

        let config = DeviceConfig {
            device: DeviceKind::GameBoyAdvance,
            print_opcodes: self.print_opcodes,
        };

        let mut device = Device::new(config);
        device.load_bios(&bios).map_err(|_| BuilderErrorCode::InvalidImage)?;
        device.load_rom(&rom).map_err(|_| BuilderErrorCode::InvalidImage)?;
        device.init();

        Ok(GameBoyAdvance { device })
    }
}


#[cfg(feature = "std")]
impl Display for BuilderErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BuilderErrorCode::MissingBios => write!(f, "no BIOS image was provided"),
            BuilderErrorCode::MissingRom => write!(f, "no cartridge ROM was provided"),
            BuilderErrorCode::InvalidImage => write!(f, "BIOS or ROM image failed validation"),
        }
    }
}


/// A ready-to-run device, built by [Builder]. Thin wrapper which translates
/// host-friendly calls (named buttons, "run until stopped") onto [Device]'s
/// lower-level scheduler-driven API.
pub struct GameBoyAdvance {
    device: Device,
}


impl GameBoyAdvance {
    /// Load a new ROM into an already-built device and reset it, without
    /// reloading the BIOS or re-allocating WRAM.
    pub fn load_rom(&mut self, rom: &[u8]) -> Result<()> {
        self.device.load_rom(rom)?;
        self.device.reset();
        Ok(())
    }

    pub fn reset(&mut self) {
        self.device.reset();
    }

    /// Run until the device calls [GameBoyAdvance::stop], typically reached
    /// from a host callback once a frame's worth of scanlines has been
    /// produced (see [Device::run]'s doc comment).
    pub fn run(&mut self) {
        self.device.run();
    }

    pub fn stop(&mut self) {
        self.device.stop();
    }

    /// Render exactly one frame.
    pub fn run_until_vblank(&mut self) {
        self.device.run_until_vblank();
    }

    pub fn set_button(&mut self, button: Button, pressed: bool) {
        self.device.notify_button_state(button as usize, pressed);
    }

    pub fn get_input_names(&self) -> &'static [&'static str] {
        self.device.get_input_names()
    }

    /// The current contents of the PPU's framebuffer, as packed 24-bit RGB.
    pub fn framebuffer(&self) -> &[u8] {
        self.device.framebuffer()
    }

    pub fn audio_output(&mut self) -> &mut pocket_core::apu::mixer::AudioOutput {
        self.device.audio_output()
    }

    pub fn get_device(&self) -> &Device {
        &self.device
    }

    pub fn get_device_mut(&mut self) -> &mut Device {
        &mut self.device
    }

    #[cfg(feature = "snapshots")]
    pub fn save_state(&mut self) -> Vec<u8> {
        pocket_core::snapshots::save(&mut self.device)
    }

    #[cfg(feature = "snapshots")]
    pub fn load_state(&mut self, bytes: &[u8]) -> Result<()> {
        pocket_core::snapshots::load(&mut self.device, bytes)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_bios() -> Vec<u8> {
        vec![0u8; 0x4000]
    }

    fn dummy_rom() -> Vec<u8> {
        vec![0u8; 0x8000]
    }

    #[test]
    fn builder_requires_both_bios_and_rom() {
        assert_eq!(Builder::new().finish().unwrap_err(), BuilderErrorCode::MissingBios);
        assert_eq!(
            Builder::new().set_bios(dummy_bios()).finish().unwrap_err(),
            BuilderErrorCode::MissingRom
        );
    }

    #[test]
    fn builder_produces_a_device_ready_to_run() {
        let gba = Builder::new()
            .set_bios(dummy_bios())
            .set_rom(dummy_rom())
            .finish()
            .expect("a BIOS and ROM should be enough to build");

        assert_eq!(gba.get_input_names().len(), 10);
        assert_eq!(gba.framebuffer().len(), 240 * 160 * 3);
    }

    #[test]
    fn set_button_does_not_panic_on_every_named_button() {
        let mut gba = Builder::new()
            .set_bios(dummy_bios())
            .set_rom(dummy_rom())
            .finish()
            .unwrap();

        gba.set_button(Button::A, true);
        gba.set_button(Button::A, false);
    }
}
