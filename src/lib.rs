pub mod config;
pub mod context;

pub use config::{
    clear_cache, ConfigError, Environment, Loader, LoaderOptions, Schema, SchemaValidator,
    ValidatedConfig,
};
pub use context::{ExecutionContext, HostContext, StaticContext};
