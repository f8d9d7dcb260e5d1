//! # alertline-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`AlertlineSettings::default()`]
//! 2. **Settings file**: `~/.alertline/settings.json` or an explicit path
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `ALERTLINE_*` overrides (highest priority)
//!
//! The merged result is validated before it is returned.

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
