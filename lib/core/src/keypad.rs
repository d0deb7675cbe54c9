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

//! KEYINPUT/KEYCNT, grounded in `original_source`'s `gba::keypad` namespace.
//! Button state bits are active-low in KEYINPUT, matching real hardware.

use crate::irq::{InterruptController, Source};
use crate::serializer::{Serializer, Streamable};
use crate::utils::get_bit16;

/// The 10 physical buttons, in the order `original_source` enumerates them
/// (also the order spec.md's `Core::get_input_names` returns).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Button {
    A,
    B,
    Select,
    Start,
    Right,
    Left,
    Up,
    Down,
    R,
    L,
}

pub const BUTTON_NAMES: [&str; 10] =
    ["A", "B", "Select", "Start", "Right", "Left", "Up", "Down", "R", "L"];

impl Button {
    pub fn from_index(index: usize) -> Option<Button> {
        match index {
            0 => Some(Button::A),
            1 => Some(Button::B),
            2 => Some(Button::Select),
            3 => Some(Button::Start),
            4 => Some(Button::Right),
            5 => Some(Button::Left),
            6 => Some(Button::Up),
            7 => Some(Button::Down),
            8 => Some(Button::R),
            9 => Some(Button::L),
            _ => None,
        }
    }

    fn bit(self) -> u16 {
        self as u16
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Keypad {
    /// KEYINPUT bits, active-low: 0 means pressed. Starts at all-1s (no
    /// buttons held).
    keyinput: u16,
    /// KEYCNT: bits 0-9 select which buttons participate in the IRQ
    /// condition, bit 14 enables it, bit 15 selects AND vs OR of the
    /// selected buttons.
    keycnt: u16,
}

impl Keypad {
    pub fn new() -> Self {
        Self { keyinput: 0x03FF, keycnt: 0 }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn set_button(&mut self, button: Button, pressed: bool) {
        if pressed {
            self.keyinput &= !(1 << button.bit());
        } else {
            self.keyinput |= 1 << button.bit();
        }
    }

    pub fn read_keyinput(&self) -> u16 {
        self.keyinput
    }

    pub fn read_keycnt(&self) -> u16 {
        self.keycnt
    }

    pub fn write_keycnt(&mut self, data: u16) {
        self.keycnt = data & 0xC3FF;
    }

    /// Check the KEYCNT IRQ condition against current button state and
    /// raise [Source::Keypad] if it's met. Called whenever button state or
    /// KEYCNT itself changes.
    pub fn check_irq_condition(&self, irq: &mut InterruptController) {
        if !get_bit16(self.keycnt, 14) {
            return;
        }
        let selected = self.keycnt & 0x03FF;
        let pressed_mask = (!self.keyinput) & 0x03FF;
        let logical_and = get_bit16(self.keycnt, 15);

        let condition_met = if logical_and {
            (pressed_mask & selected) == selected
        } else {
            (pressed_mask & selected) != 0
        };

        if condition_met {
            irq.raise(Source::Keypad);
        }
    }
}

impl Default for Keypad {
    fn default() -> Self {
        Self::new()
    }
}

impl Streamable for Keypad {
    fn stream_state(&mut self, s: &mut Serializer) {
        s.stream_trivial(&mut self.keyinput);
        s.stream_trivial(&mut self.keycnt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buttons_are_active_low() {
        let mut kp = Keypad::new();
        assert_eq!(kp.read_keyinput() & 1, 1);
        kp.set_button(Button::A, true);
        assert_eq!(kp.read_keyinput() & 1, 0);
        kp.set_button(Button::A, false);
        assert_eq!(kp.read_keyinput() & 1, 1);
    }

    #[test]
    fn or_condition_fires_on_any_selected_button() {
        let mut kp = Keypad::new();
        kp.write_keycnt((1 << 14) | 0b11); // enable, select A+B, OR mode
        kp.set_button(Button::A, true);

        let mut irq = InterruptController::new();
        kp.check_irq_condition(&mut irq);
        assert!(irq.read_if() & (1 << 12) != 0);
    }

    #[test]
    fn and_condition_requires_all_selected_buttons() {
        let mut kp = Keypad::new();
        kp.write_keycnt((1 << 14) | (1 << 15) | 0b11); // AND mode, select A+B
        kp.set_button(Button::A, true);

        let mut irq = InterruptController::new();
        kp.check_irq_condition(&mut irq);
        assert_eq!(irq.read_if(), 0, "only A is pressed, B is required too");

        kp.set_button(Button::B, true);
        kp.check_irq_condition(&mut irq);
        assert_ne!(irq.read_if(), 0);
    }
}
