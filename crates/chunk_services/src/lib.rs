//! Chunk Bridge Services Layer
//!
//! Declarative data holders shared between the host and the bridge:
//! settings, script locators, and signed-bundle framing.

pub mod locator;
pub mod settings;
pub mod signing;

pub use locator::{LocatorError, ScriptLocator, VerifyMode};
pub use settings::{DispatchSettings, EngineSettings, LoggingSettings, Settings, SettingsError};
pub use signing::{split_signed_bundle, SignedBundle};

/// Bridge version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
