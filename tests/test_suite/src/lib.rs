//! Thin re-export so the integration tests under `tests/` can pull in
//! `libpocket` through a stable crate name, mirroring how the rest of the
//! workspace's packages name their public dependency.

pub use libpocket;
