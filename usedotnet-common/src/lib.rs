// usedotnet-common/src/lib.rs
pub mod config;
pub mod error;
pub mod model;

// Re-export key types
pub use config::{Config, PreviewPolicy};
pub use error::{Result, SchemaError, UseDotNetError};
pub use model::{Channel, ChannelVersion, FileEntry, PackageType, VersionInfo, VersionSpec};
