//! lingo core library: settings types, settings persistence, errors.
//!
//! - [`types`]: settings document and backend identity
//! - [`error`]: [`SettingsError`]
//! - [`settings`]: load / save under `~/.lingo/`

pub mod error;
pub mod settings;
pub mod types;

pub use error::SettingsError;
pub use types::{
    BackendConfig, BackendKind, DeviceKind, ExecutionStrategy, GeneralSettings, ModelSettings,
    ServiceSettings, Settings,
};
