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

//! Channel panning/volume (`NR50`/`NR51`) and the resampling sink that
//! turns per-cycle mixed samples into fixed-rate stereo output, per
//! spec.md section 4.7's "Mixing" paragraph and section 6's audio sink.

use crate::cpu::CPU_CLOCK_SPEED;
use crate::utils::get_bit8;

#[derive(Copy, Clone, Default, PartialEq)]
pub struct StereoSample {
    pub left: f32,
    pub right: f32,
}

/// Per-channel enable/volume (`NR50`) and left/right panning (`NR51`).
#[derive(Default)]
pub struct Mixer {
    nr50: u8,
    nr51: u8,
}

impl Mixer {
    pub fn read_nr50(&self) -> u8 {
        self.nr50
    }

    pub fn write_nr50(&mut self, value: u8) {
        self.nr50 = value & 0x7F;
    }

    pub fn read_nr51(&self) -> u8 {
        self.nr51
    }

    pub fn write_nr51(&mut self, value: u8) {
        self.nr51 = value;
    }

    /// Mixes 4 channel outputs (range -1.0..1.0) into a stereo sample,
    /// routed per `NR51` and scaled by `NR50`'s two 3-bit master volumes.
    pub fn mix(&self, channels: [f32; 4]) -> StereoSample {
        let right_vol = (self.nr50 & 0x7) as f32 / 7.0;
        let left_vol = ((self.nr50 >> 4) & 0x7) as f32 / 7.0;

        let mut right = 0.0f32;
        let mut left = 0.0f32;

        for (i, sample) in channels.iter().enumerate() {
            if get_bit8(self.nr51, i as u8) {
                right += sample;
            }
            if get_bit8(self.nr51, i as u8 + 4) {
                left += sample;
            }
        }

        StereoSample {
            left: (left / 4.0) * left_vol,
            right: (right / 4.0) * right_vol,
        }
    }
}

pub const SAMPLE_BUFFER_SIZE: usize = 1024;
pub type SampleBuffer = [StereoSample; SAMPLE_BUFFER_SIZE];

#[cfg(feature = "std")]
pub type SamplesSender = std::sync::mpsc::Sender<alloc::boxed::Box<SampleBuffer>>;
#[cfg(feature = "std")]
pub type SamplesReceiver = std::sync::mpsc::Receiver<alloc::boxed::Box<SampleBuffer>>;

/// Resamples the per-cycle mixed stream down to a fixed host sample rate
/// and hands fixed-size buffers across an mpsc channel to the frontend.
pub struct AudioOutput {
    sample_rate: u32,
    time_passed: u64,
    next_sample_time: u64,
    sample_multiplier: f32,
    current_sample: StereoSample,
    buffer: alloc::boxed::Box<SampleBuffer>,
    buffer_insert_pos: usize,
    #[cfg(feature = "std")]
    sender: Option<SamplesSender>,
}

impl AudioOutput {
    pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

    pub fn new() -> Self {
        Self {
            sample_rate: Self::DEFAULT_SAMPLE_RATE,
            time_passed: 0,
            next_sample_time: 0,
            sample_multiplier: 0.0,
            current_sample: StereoSample::default(),
            buffer: alloc::boxed::Box::new([StereoSample::default(); SAMPLE_BUFFER_SIZE]),
            buffer_insert_pos: 0,
            #[cfg(feature = "std")]
            sender: None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Accumulates one cycle-wide mixed sample, emitting a fixed-rate
    /// sample (and flushing a full buffer) whenever enough time passed.
    pub fn push(&mut self, sample: StereoSample) {
        self.current_sample.left += sample.left * self.sample_multiplier;
        self.current_sample.right += sample.right * self.sample_multiplier;

        self.time_passed += 1;
        if self.time_passed >= self.next_sample_time {
            self.finish_sample();

            if self.next_sample_time > CPU_CLOCK_SPEED as u64 {
                self.next_sample_time -= CPU_CLOCK_SPEED as u64;
                self.time_passed -= CPU_CLOCK_SPEED as u64;
            }

            let sample_rate = self.sample_rate as u64;
            let last_sample_time = self.next_sample_time;
            let current_sample_number =
                (self.next_sample_time + 1) * sample_rate / CPU_CLOCK_SPEED as u64;
            let next_sample_number = current_sample_number + 1;
            let next_sample_time = next_sample_number * CPU_CLOCK_SPEED as u64 / sample_rate;
            self.next_sample_time = next_sample_time;

            let time_diff = next_sample_time - last_sample_time;
            self.sample_multiplier = 1.0 / (time_diff.max(1) as f32);
        }
    }

    fn finish_sample(&mut self) {
        self.buffer[self.buffer_insert_pos] = self.current_sample;
        self.current_sample = StereoSample::default();
        self.buffer_insert_pos += 1;

        if self.buffer_insert_pos >= SAMPLE_BUFFER_SIZE {
            #[cfg(feature = "std")]
            if let Some(sender) = &self.sender {
                if sender.send(self.buffer.clone()).is_err() {
                    self.sender = None;
                }
            }
            self.buffer_insert_pos = 0;
        }
    }

    #[cfg(feature = "std")]
    pub fn open_channel(&mut self, sample_rate: u32) -> Option<SamplesReceiver> {
        if sample_rate == 0 {
            return None;
        }
        let (s, r) = std::sync::mpsc::channel();
        self.sample_rate = sample_rate;
        self.sender = Some(s);
        Some(r)
    }
}

impl Default for AudioOutput {
    fn default() -> Self {
        Self::new()
    }
}
