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

//! Compressed, versioned save states, built on top of [crate::serializer].
//! A plain [crate::serializer::Serializer] dump is already a valid save
//! state; this module exists for hosts which want to keep states small on
//! disk or pass them around as plain text (e.g. a shareable URL from a
//! browser-hosted frontend), matching the `zstd`/`base64` wiring this
//! feature pulls in.

use alloc::string::String;
use alloc::vec::Vec;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::config::DeviceKind;
use crate::device::Device;
use crate::error::{Error, ErrorCode, Result, Source};
use crate::serializer::Serializer;

/// Bumped whenever [Device::stream_state]'s layout changes in a way old
/// snapshots can't be read back with.
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Header {
    version: u32,
    device: DeviceKind,
}

fn bincode_config() -> impl bincode::config::Config {
    bincode::config::standard()
}

/// Serialize `device`'s full state, compress it, and prefix it with a small
/// versioned header identifying which hardware target it came from.
pub fn save(device: &mut Device) -> Vec<u8> {
    let mut serializer = Serializer::writer();
    device.stream_state(&mut serializer);
    let raw = serializer.into_bytes();

    let compressed = zstd::stream::encode_all(&raw[..], 0).unwrap_or(raw);

    let header = Header {
        version: SNAPSHOT_VERSION,
        device: device.config.device,
    };
    let mut out = bincode::serde::encode_to_vec(&header, bincode_config())
        .unwrap_or_default();
    out.extend_from_slice(&compressed);
    out
}

/// Restore `device`'s state from bytes produced by [save].
pub fn load(device: &mut Device, bytes: &[u8]) -> Result<()> {
    let (header, consumed): (Header, usize) =
        bincode::serde::decode_from_slice(bytes, bincode_config())
            .map_err(|_| Error::new(Source::SaveState, ErrorCode::InvalidSaveState))?;

    if header.version != SNAPSHOT_VERSION || header.device != device.config.device {
        return Err(Error::new(Source::SaveState, ErrorCode::InvalidSaveState));
    }

    let compressed = &bytes[consumed..];
    let raw = zstd::stream::decode_all(compressed)
        .map_err(|_| Error::new(Source::SaveState, ErrorCode::InvalidSaveState))?;

    let mut serializer = Serializer::reader(raw);
    device.stream_state(&mut serializer);
    serializer.finish_read()
}

/// [save], then base64-encode the result so it can be embedded in text
/// (a URL fragment, a save file that's safe to paste into a bug report).
pub fn save_to_base64(device: &mut Device) -> String {
    base64::engine::general_purpose::STANDARD.encode(save(device))
}

/// The inverse of [save_to_base64].
pub fn load_from_base64(device: &mut Device, text: &str) -> Result<()> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(text)
        .map_err(|_| Error::new(Source::SaveState, ErrorCode::InvalidSaveState))?;
    load(device, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;

    #[test]
    fn round_trips_through_bytes() {
        let mut device = Device::new(DeviceConfig::default());
        device.init();

        let bytes = save(&mut device);

        let mut restored = Device::new(DeviceConfig::default());
        restored.init();
        load(&mut restored, &bytes).expect("snapshot should load back");
    }

    #[test]
    fn round_trips_through_base64_text() {
        let mut device = Device::new(DeviceConfig::default());
        device.init();

        let text = save_to_base64(&mut device);

        let mut restored = Device::new(DeviceConfig::default());
        restored.init();
        load_from_base64(&mut restored, &text).expect("snapshot should load back");
    }

    #[test]
    fn rejects_garbage_input() {
        let mut device = Device::new(DeviceConfig::default());
        device.init();

        assert!(load(&mut device, &[1, 2, 3]).is_err());
    }
}
