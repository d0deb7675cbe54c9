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

//! A bidirectional byte stream used for save states, modeled on
//! `original_source`'s `Serializer` class: trivial values, length-prefixed
//! sequences and strings, all host little-endian per spec.md section 6.
//! Unlike the original, this one streams to an in-memory `Vec<u8>` rather
//! than a file -- loading/saving the resulting bytes from disk is a host
//! concern, not this crate's (spec.md treats file I/O as out of scope).

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::{Error, ErrorCode, Source};


#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Mode {
    Read,
    Write,
}


/// A bidirectional byte stream supporting trivial values, length-prefixed
/// sequences and strings.
pub struct Serializer {
    mode: Mode,
    buffer: Vec<u8>,
    read_pos: usize,
    has_error: bool,
}


impl Serializer {
    /// Create a writer, starting with an empty buffer.
    pub fn writer() -> Self {
        Self {
            mode: Mode::Write,
            buffer: Vec::new(),
            read_pos: 0,
            has_error: false,
        }
    }

    /// Create a reader over previously written bytes.
    pub fn reader(bytes: Vec<u8>) -> Self {
        Self {
            mode: Mode::Read,
            buffer: bytes,
            read_pos: 0,
            has_error: false,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn has_error(&self) -> bool {
        self.has_error
    }

    /// Take the accumulated bytes out of a writer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    fn raw(&mut self, bytes: &mut [u8]) {
        if self.has_error {
            return;
        }

        match self.mode {
            Mode::Write => {
                self.buffer.extend_from_slice(bytes);
            }

            Mode::Read => {
                let end = self.read_pos + bytes.len();
                if end > self.buffer.len() {
                    self.has_error = true;
                    return;
                }

                bytes.copy_from_slice(&self.buffer[self.read_pos..end]);
                self.read_pos = end;
            }
        }
    }

    /// Stream a `Copy` plain-old-data value, e.g. an integer or small struct.
    pub fn stream_trivial<T: Copy>(&mut self, value: &mut T) {
        let size = core::mem::size_of::<T>();
        let ptr = value as *mut T as *mut u8;

        // SAFETY: `T: Copy` guarantees it has no destructor and no
        // interior references that would be invalidated by a raw byte copy.
        let slice = unsafe { core::slice::from_raw_parts_mut(ptr, size) };
        self.raw(slice);
    }

    /// Stream a length-prefixed sequence of `Copy` values.
    pub fn stream_vec<T: Copy + Default>(&mut self, vec: &mut Vec<T>) {
        let mut len = vec.len() as u64;
        self.stream_trivial(&mut len);

        match self.mode {
            Mode::Write => {
                for item in vec.iter_mut() {
                    self.stream_trivial(item);
                }
            }

            Mode::Read => {
                vec.clear();
                vec.reserve(len as usize);
                for _ in 0..len {
                    let mut item = T::default();
                    self.stream_trivial(&mut item);
                    vec.push(item);
                }
            }
        }
    }

    /// Stream a fixed-size byte array in place.
    pub fn stream_bytes(&mut self, bytes: &mut [u8]) {
        self.raw(bytes);
    }

    /// Stream a length-prefixed UTF-8 string.
    pub fn stream_string(&mut self, value: &mut String) {
        match self.mode {
            Mode::Write => {
                let bytes = value.as_bytes();
                let mut len = bytes.len() as u64;
                self.stream_trivial(&mut len);
                self.raw(&mut bytes.to_vec());
            }

            Mode::Read => {
                let mut len: u64 = 0;
                self.stream_trivial(&mut len);

                let mut buf = alloc::vec![0u8; len as usize];
                self.raw(&mut buf);

                *value = String::from_utf8_lossy(&buf).into_owned();
            }
        }
    }

    /// Finish a read, failing if the stream had an error or trailing bytes.
    pub fn finish_read(self) -> Result<(), Error> {
        if self.has_error {
            return Err(Error::new(Source::SaveState, ErrorCode::InvalidSaveState));
        }

        Ok(())
    }
}


/// Implemented by components which can save/restore their state through a
/// [Serializer], mirroring `original_source`'s per-module `StreamState`.
pub trait Streamable {
    fn stream_state(&mut self, serializer: &mut Serializer);
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trivial_roundtrip() {
        let mut w = Serializer::writer();
        let mut a: u32 = 0xdead_beef;
        let mut b: i8 = -5;
        w.stream_trivial(&mut a);
        w.stream_trivial(&mut b);
        let bytes = w.into_bytes();

        let mut r = Serializer::reader(bytes);
        let mut a2: u32 = 0;
        let mut b2: i8 = 0;
        r.stream_trivial(&mut a2);
        r.stream_trivial(&mut b2);

        assert_eq!(a2, 0xdead_beef);
        assert_eq!(b2, -5);
        assert!(r.finish_read().is_ok());
    }

    #[test]
    fn vec_roundtrip() {
        let mut w = Serializer::writer();
        let mut v: Vec<u16> = alloc::vec![1, 2, 3, 4, 5];
        w.stream_vec(&mut v);
        let bytes = w.into_bytes();

        let mut r = Serializer::reader(bytes);
        let mut v2: Vec<u16> = Vec::new();
        r.stream_vec(&mut v2);

        assert_eq!(v, v2);
    }

    #[test]
    fn string_roundtrip() {
        let mut w = Serializer::writer();
        let mut s = String::from("hello pocket");
        w.stream_string(&mut s);
        let bytes = w.into_bytes();

        let mut r = Serializer::reader(bytes);
        let mut s2 = String::new();
        r.stream_string(&mut s2);

        assert_eq!(s, s2);
    }

    #[test]
    fn write_read_write_is_stable() {
        let mut w = Serializer::writer();
        let mut a: u64 = 123456789;
        w.stream_trivial(&mut a);
        let bytes1 = w.into_bytes();

        let mut r = Serializer::reader(bytes1.clone());
        let mut a2: u64 = 0;
        r.stream_trivial(&mut a2);

        let mut w2 = Serializer::writer();
        w2.stream_trivial(&mut a2);
        let bytes2 = w2.into_bytes();

        assert_eq!(bytes1, bytes2);
    }
}
