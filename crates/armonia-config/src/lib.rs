//! # armonia-config
//!
//! Serializable options for the armonia build plugin, config file discovery,
//! and the host-configuration merge used when patching build configs.

pub mod discovery;
pub mod error;
pub mod merge;
pub mod settings;

pub use discovery::{ConfigDiscovery, TARGET_ENV, discover};
pub use error::{ConfigError, Result};
pub use merge::{merge_config, merged};
pub use settings::{ArmoniaConfig, DEFAULT_SERVER_ROOT, ElectronSettings, SsrEntry, SsrSettings};
