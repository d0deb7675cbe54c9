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

//! Recoverable error values returned by this crate.
//!
//! Emulated CPU exceptions (data abort, undefined instruction, SWI) are
//! *not* represented here: those are normal guest program behaviour,
//! dispatched to the guest's own exception vectors by [`crate::cpu`].

#[cfg(feature = "std")]
use std::fmt::{Display, Formatter};


/// Which subsystem an [Error] originated from.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Source {
    Bios,
    Rom,
    Sram,
    SaveState,
}


/// An error code describing what went wrong.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErrorCode {
    /// The underlying image could not be opened by the host.
    FileOpenFailure,

    /// A file had an unexpected size, e.g. a BIOS image not being exactly
    /// 16 KiB, or a ROM image larger than the maximum cartridge size.
    FileSizeMismatch { expected: usize, got: usize },

    /// An operation requires a feature which was compiled out or isn't
    /// implemented for the current device.
    UnsupportedFeature,

    /// The data given to [crate::serializer] didn't describe a valid
    /// save state (wrong length, or a stream which was opened for write).
    InvalidSaveState,

    /// A dynamic allocation failed.
    OutOfMemory,
}


/// Information about an error with the subsystem that raised it attached.
#[derive(Debug, Copy, Clone)]
pub struct Error {
    pub source: Source,
    pub error_code: ErrorCode,
}


/// An alias for [core::result::Result<T, Error>].
pub type Result<T> = core::result::Result<T, Error>;


impl Error {
    pub fn new(source: Source, error_code: ErrorCode) -> Self {
        Self { source, error_code }
    }
}


#[cfg(feature = "std")]
impl Display for Source {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Bios      => write!(f, "BIOS"),
            Source::Rom       => write!(f, "ROM"),
            Source::Sram      => write!(f, "SRAM"),
            Source::SaveState => write!(f, "save state"),
        }
    }
}


#[cfg(feature = "std")]
impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::FileOpenFailure => {
                write!(f, "failed to open file")
            }

            ErrorCode::FileSizeMismatch { expected, got } => {
                write!(f, "invalid size: {got} (expected: {expected})")
            }

            ErrorCode::UnsupportedFeature => {
                write!(f, "unsupported feature")
            }

            ErrorCode::InvalidSaveState => {
                write!(f, "invalid save state")
            }

            ErrorCode::OutOfMemory => {
                write!(f, "out of memory")
            }
        }
    }
}


#[cfg(feature = "std")]
impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.source, self.error_code)
    }
}


#[cfg(feature = "std")]
impl std::error::Error for Error {}
