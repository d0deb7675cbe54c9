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

//! The single entry point a host crate depends on: re-exports
//! [pocket_core] unconditionally, and [pocket_support] behind the
//! `support` feature for hosts which want the builder/facade rather than
//! wiring up a [pocket_core::device::Device] themselves.

#![cfg_attr(not(feature = "std"), no_std)]

pub use pocket_core;

#[cfg(feature = "support")]
pub use pocket_support;
