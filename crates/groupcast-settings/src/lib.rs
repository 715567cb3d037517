//! # groupcast-settings
//!
//! Configuration with layered sources for the groupcast server.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`GroupcastSettings::default()`]
//! 2. **User file**: `~/.groupcast/settings.json` or an explicit path
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `GROUPCAST_*` overrides (highest priority)
//!
//! The loaded value is passed explicitly to whatever needs it; there is no
//! process-wide singleton.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
