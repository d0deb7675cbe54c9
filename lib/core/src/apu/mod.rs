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

//! The four classic sound channels (pulse ×2, wave, noise), their frame
//! sequencer, and the stereo mixer/sink, per spec.md section 4.7.
//!
//! `Apu::step` is driven one CPU cycle at a time from [crate::device],
//! mirroring how the frame sequencer itself is tied to a DIV-like tick
//! rather than to the cooperative scheduler: audio generation runs far
//! too often to be worth its own scheduled events.

pub mod mixer;
pub mod noise;
pub mod pulse;
pub mod wave;

use crate::apu::mixer::{AudioOutput, Mixer};
use crate::apu::noise::NoiseChannel;
use crate::apu::pulse::PulseChannel;
use crate::apu::wave::WaveChannel;
use crate::serializer::{Serializer, Streamable};
use crate::utils::{get_bit8, get_high, get_low, to_u16};

/// Cycles between two frame sequencer ticks (512 Hz at the GBA's 2^24 Hz clock).
pub const FRAME_SEQUENCER_PERIOD: u32 = 8_192;

pub struct Apu {
    enabled: bool,
    fs_step: u8,
    fs_clock: u32,

    ch1: PulseChannel,
    ch2: PulseChannel,
    ch3: WaveChannel,
    ch4: NoiseChannel,

    mixer: Mixer,
    pub audio_output: AudioOutput,
}

impl Apu {
    pub fn new() -> Self {
        Self {
            enabled: true,
            fs_step: 0,
            fs_clock: 0,
            ch1: PulseChannel::with_sweep(),
            ch2: PulseChannel::default(),
            ch3: WaveChannel::default(),
            ch4: NoiseChannel::default(),
            mixer: Mixer::default(),
            audio_output: AudioOutput::new(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Advances the APU by `cycles` CPU cycles: frame sequencer ticks,
    /// per-channel timers, and the mixed sample pushed to the audio sink.
    pub fn step(&mut self, cycles: u32) {
        for _ in 0..cycles {
            if self.enabled {
                self.fs_clock += 1;
                if self.fs_clock >= FRAME_SEQUENCER_PERIOD {
                    self.fs_clock -= FRAME_SEQUENCER_PERIOD;
                    self.step_frame_sequencer();
                }

                self.ch1.step();
                self.ch2.step();
                self.ch3.step();
                self.ch4.step();
            }

            let mixed = self.mixer.mix([
                self.ch1.output(),
                self.ch2.output(),
                self.ch3.output(),
                self.ch4.output(),
            ]);
            self.audio_output.push(mixed);
        }
    }

    fn step_frame_sequencer(&mut self) {
        // 0/2/4/6 clock length; 2/6 also clock the CH1 sweep; 7 clocks envelopes.
        if self.fs_step % 2 == 0 {
            self.ch1.tick_length();
            self.ch2.tick_length();
            self.ch3.tick_length();
            self.ch4.tick_length();
        }
        if self.fs_step == 2 || self.fs_step == 6 {
            self.ch1.tick_sweep();
        }
        if self.fs_step == 7 {
            self.ch1.tick_envelope();
            self.ch2.tick_envelope();
            self.ch4.tick_envelope();
        }
        self.fs_step = (self.fs_step + 1) & 0x7;
    }

    fn power_on(&mut self) {
        self.fs_step = 0;
    }

    fn power_off(&mut self) {
        let ch3_wave_ram_backup: [u8; 16] = core::array::from_fn(|i| self.ch3.read_wave_ram(i as u8));
        *self = Self::new();
        for (i, byte) in ch3_wave_ram_backup.into_iter().enumerate() {
            self.ch3.write_wave_ram(i as u8, byte);
        }
        self.enabled = false;
    }

    pub fn read_register(&self, offset: u16) -> u8 {
        match offset {
            0x00 => 0x80 | (self.ch1.sweep.as_ref().map_or(0, |s| (s.period << 4) | ((s.decreasing as u8) << 3) | s.shift)),
            0x01 => (self.ch1.duty << 6) | 0x3F,
            0x02 => (self.ch1.envelope.initial_volume << 4) | ((self.ch1.envelope.increasing as u8) << 3) | self.ch1.envelope.period,
            0x04 => 0xBF,
            0x06 => (self.ch2.duty << 6) | 0x3F,
            0x07 => (self.ch2.envelope.initial_volume << 4) | ((self.ch2.envelope.increasing as u8) << 3) | self.ch2.envelope.period,
            0x09 => 0xBF,
            0x0A => (if self.ch3.dac_enabled { 0x80 } else { 0x00 }) | 0x7F,
            0x0C => (self.ch3.output_level << 5) | 0x9F,
            0x0E => 0xBF,
            0x11 => (self.ch4.envelope.initial_volume << 4) | ((self.ch4.envelope.increasing as u8) << 3) | self.ch4.envelope.period,
            0x12 => (self.ch4.clock_shift << 4) | ((self.ch4.narrow_width as u8) << 3) | self.ch4.divisor_code,
            0x13 => 0xBF,
            0x14 => self.mixer.read_nr50(),
            0x15 => self.mixer.read_nr51(),
            0x16 => {
                let mut v = 0x70;
                v |= (self.enabled as u8) << 7;
                v |= (self.ch1.enabled as u8) << 0;
                v |= (self.ch2.enabled as u8) << 1;
                v |= (self.ch3.enabled as u8) << 2;
                v |= (self.ch4.enabled as u8) << 3;
                v
            }
            0x20..=0x2F => self.ch3.read_wave_ram((offset - 0x20) as u8),
            _ => 0xFF,
        }
    }

    pub fn write_register(&mut self, offset: u16, value: u8) {
        if offset == 0x16 {
            let enable = get_bit8(value, 7);
            if self.enabled != enable {
                if enable {
                    self.enabled = true;
                    self.power_on();
                } else {
                    self.power_off();
                }
            }
            return;
        }

        if !self.enabled && offset != 0x16 && !(0x20..=0x2F).contains(&offset) {
            return;
        }

        match offset {
            0x00 => {
                if let Some(sweep) = &mut self.ch1.sweep {
                    sweep.period = (value >> 4) & 0x7;
                    sweep.decreasing = get_bit8(value, 3);
                    sweep.shift = value & 0x7;
                }
            }
            0x01 => {
                self.ch1.duty = (value >> 6) & 0x3;
                self.ch1.length_counter = 64 - (value & 0x3F) as u16;
            }
            0x02 => {
                self.ch1.envelope.initial_volume = (value >> 4) & 0xF;
                self.ch1.envelope.increasing = get_bit8(value, 3);
                self.ch1.envelope.period = value & 0x7;
                self.ch1.dac_enabled = (value & 0xF8) != 0;
                if !self.ch1.dac_enabled { self.ch1.enabled = false; }
            }
            0x03 => self.ch1.freq = to_u16(value, get_high(self.ch1.freq)),
            0x04 => {
                self.ch1.freq = to_u16(get_low(self.ch1.freq), value & 0x7);
                self.ch1.length_enabled = get_bit8(value, 6);
                if get_bit8(value, 7) { self.ch1.trigger(); }
            }
            0x06 => {
                self.ch2.duty = (value >> 6) & 0x3;
                self.ch2.length_counter = 64 - (value & 0x3F) as u16;
            }
            0x07 => {
                self.ch2.envelope.initial_volume = (value >> 4) & 0xF;
                self.ch2.envelope.increasing = get_bit8(value, 3);
                self.ch2.envelope.period = value & 0x7;
                self.ch2.dac_enabled = (value & 0xF8) != 0;
                if !self.ch2.dac_enabled { self.ch2.enabled = false; }
            }
            0x08 => self.ch2.freq = to_u16(value, get_high(self.ch2.freq)),
            0x09 => {
                self.ch2.freq = to_u16(get_low(self.ch2.freq), value & 0x7);
                self.ch2.length_enabled = get_bit8(value, 6);
                if get_bit8(value, 7) { self.ch2.trigger(); }
            }
            0x0A => {
                self.ch3.dac_enabled = get_bit8(value, 7);
                if !self.ch3.dac_enabled { self.ch3.enabled = false; }
            }
            0x0B => self.ch3.length_counter = 256 - value as u16,
            0x0C => self.ch3.output_level = (value >> 5) & 0x3,
            0x0D => self.ch3.freq = to_u16(value, get_high(self.ch3.freq)),
            0x0E => {
                self.ch3.freq = to_u16(get_low(self.ch3.freq), value & 0x7);
                self.ch3.length_enabled = get_bit8(value, 6);
                if get_bit8(value, 7) { self.ch3.trigger(); }
            }
            0x10 => self.ch4.length_counter = 64 - (value & 0x3F) as u16,
            0x11 => {
                self.ch4.envelope.initial_volume = (value >> 4) & 0xF;
                self.ch4.envelope.increasing = get_bit8(value, 3);
                self.ch4.envelope.period = value & 0x7;
                self.ch4.dac_enabled = (value & 0xF8) != 0;
                if !self.ch4.dac_enabled { self.ch4.enabled = false; }
            }
            0x12 => {
                self.ch4.clock_shift = (value >> 4) & 0xF;
                self.ch4.narrow_width = get_bit8(value, 3);
                self.ch4.divisor_code = value & 0x7;
            }
            0x13 => {
                self.ch4.length_enabled = get_bit8(value, 6);
                if get_bit8(value, 7) { self.ch4.trigger(); }
            }
            0x14 => self.mixer.write_nr50(value),
            0x15 => self.mixer.write_nr51(value),
            0x20..=0x2F => self.ch3.write_wave_ram((offset - 0x20) as u8, value),
            _ => {}
        }
    }
}

impl Default for Apu {
    fn default() -> Self {
        Self::new()
    }
}

impl Streamable for Apu {
    fn stream_state(&mut self, s: &mut Serializer) {
        s.stream_trivial(&mut self.enabled);
        s.stream_trivial(&mut self.fs_step);
        s.stream_trivial(&mut self.fs_clock);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_enables_channel_only_when_dac_is_on() {
        let mut apu = Apu::new();
        apu.write_register(0x04, 0x80); // trigger CH1 with DAC off
        assert!(!apu.ch1.enabled);

        apu.write_register(0x02, 0xF0); // max volume -> DAC on
        apu.write_register(0x04, 0x80);
        assert!(apu.ch1.enabled);
    }

    #[test]
    fn frame_sequencer_clocks_length_every_other_step() {
        let mut apu = Apu::new();
        apu.write_register(0x02, 0xF0);
        apu.write_register(0x01, 0x3F); // length = 1
        apu.write_register(0x04, 0x40); // enable length counter, no trigger
        apu.ch1.enabled = true;
        apu.ch1.length_counter = 1;

        apu.step(FRAME_SEQUENCER_PERIOD); // step 0: clocks length
        assert_eq!(apu.ch1.length_counter, 0);
        assert!(!apu.ch1.enabled);
    }

    #[test]
    fn nr52_reports_channel_enabled_bits() {
        let mut apu = Apu::new();
        apu.write_register(0x02, 0xF0);
        apu.write_register(0x04, 0x80);
        assert_eq!(apu.read_register(0x16) & 0x1, 0x1);
    }
}
