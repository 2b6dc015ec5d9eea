//! Configuration loading, merging and validation.

mod cache;
mod directory;
mod env;
mod error;
mod file;
mod loader;
mod merge;
mod schema;

pub use cache::{clear_cache, ConfigCache, MemoryCache};
pub use directory::{DirectoryLoader, FileSystemDirectory};
pub use env::{EnvVarSource, Environment, EnvironmentSource, FixedEnvironment, DEFAULT_ENV_VAR};
pub use error::{ConfigError, ErrorCode, FileReadCause, Violation};
pub use file::{read_config_file, read_config_file_as, Format};
pub use loader::{Loader, LoaderOptions, SchemaSource, DEFAULT_LAYER};
pub use merge::{deep_merge, merge};
pub use schema::{Schema, SchemaValidator, ValidatedConfig};
