use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::cache::{ConfigCache, MemoryCache};
use super::directory::{DirectoryLoader, FileSystemDirectory};
use super::env::{EnvVarSource, Environment, EnvironmentSource, DEFAULT_ENV_VAR};
use super::file::Format;
use super::merge::merge;
use super::schema::{Schema, SchemaValidator, ValidatedConfig};
use super::ConfigError;
use crate::context::{ExecutionContext, HostContext};

/// Name of the directory holding settings shared by every environment.
pub const DEFAULT_LAYER: &str = "default";

/// A schema given to [`LoaderOptions`], either as a raw document or already
/// compiled.
#[derive(Debug, Clone)]
pub enum SchemaSource {
    Document(Value),
    Compiled(Schema),
}

impl From<Value> for SchemaSource {
    fn from(document: Value) -> Self {
        Self::Document(document)
    }
}

impl From<Schema> for SchemaSource {
    fn from(schema: Schema) -> Self {
        Self::Compiled(schema)
    }
}

/// Options for a [`Loader`]. Fixed once the loader is built.
#[derive(Debug, Clone)]
#[must_use = "options do nothing until .build() is called"]
pub struct LoaderOptions {
    schema: SchemaSource,
    config_dir: PathBuf,
    cache: bool,
    default_env: Environment,
    include_base_config: bool,
    env_var: String,
    formats: Vec<Format>,
}

impl LoaderOptions {
    pub fn new(schema: impl Into<SchemaSource>) -> Self {
        Self {
            schema: schema.into(),
            config_dir: PathBuf::from("config"),
            cache: false,
            default_env: Environment::Development,
            include_base_config: false,
            env_var: DEFAULT_ENV_VAR.to_string(),
            formats: vec![Format::Json],
        }
    }

    /// Root holding `default/` and one directory per environment.
    pub fn config_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Stores validated results in the cache and serves repeat loads from it.
    pub fn cache(mut self, enabled: bool) -> Self {
        self.cache = enabled;
        self
    }

    /// Environment used when the runtime indicator is not set.
    pub fn default_env(mut self, env: Environment) -> Self {
        self.default_env = env;
        self
    }

    /// Accepted for compatibility; has no effect on the loaded configuration.
    pub fn include_base_config(mut self, include: bool) -> Self {
        self.include_base_config = include;
        self
    }

    /// Process environment variable holding the runtime environment name.
    pub fn env_var(mut self, var: impl Into<String>) -> Self {
        self.env_var = var.into();
        self
    }

    /// Document formats picked up from each directory.
    pub fn formats(mut self, formats: impl Into<Vec<Format>>) -> Self {
        self.formats = formats.into();
        self
    }

    /// Compiles the schema and builds the loader.
    pub fn build(self) -> Result<Loader, ConfigError> {
        Loader::new(self)
    }
}

/// Loads `default/` and the active environment's directory, merges them and
/// validates the result.
///
/// ```no_run
/// use layerconf::Loader;
/// use serde_json::json;
///
/// let loader = Loader::builder(json!({
///     "type": "object",
///     "required": ["port"],
///     "properties": {"port": {"type": "integer"}}
/// }))
/// .config_dir("config")
/// .cache(true)
/// .build()?;
///
/// let config = loader.load()?;
/// println!("port = {}", config.get("port").unwrap());
/// # Ok::<(), layerconf::ConfigError>(())
/// ```
#[derive(Debug)]
pub struct Loader {
    config_dir: PathBuf,
    validator: Arc<dyn SchemaValidator>,
    use_cache: bool,
    default_env: Environment,
    include_base_config: bool,
    cache: Arc<dyn ConfigCache>,
    directories: Arc<dyn DirectoryLoader>,
    environment: Arc<dyn EnvironmentSource>,
    context: Arc<dyn ExecutionContext>,
}

impl Loader {
    /// Starts a set of [`LoaderOptions`] for the given schema.
    pub fn builder(schema: impl Into<SchemaSource>) -> LoaderOptions {
        LoaderOptions::new(schema)
    }

    /// Builds a loader, compiling the schema up front.
    ///
    /// Fails with [`ConfigError::InvalidSchema`] if the schema is malformed.
    pub fn new(options: LoaderOptions) -> Result<Self, ConfigError> {
        let validator: Arc<dyn SchemaValidator> = match options.schema {
            SchemaSource::Document(document) => Arc::new(Schema::compile(&document)?),
            SchemaSource::Compiled(schema) => Arc::new(schema),
        };

        Ok(Self {
            config_dir: options.config_dir,
            validator,
            use_cache: options.cache,
            default_env: options.default_env,
            include_base_config: options.include_base_config,
            cache: MemoryCache::global(),
            directories: Arc::new(FileSystemDirectory::new(options.formats)),
            environment: Arc::new(EnvVarSource::new(options.env_var)),
            context: Arc::new(HostContext),
        })
    }

    /// Replaces the process-wide cache with a private one.
    pub fn with_cache(mut self, cache: Arc<dyn ConfigCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Validates with another engine instead of the compiled schema.
    pub fn with_validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_directory_loader(mut self, directories: Arc<dyn DirectoryLoader>) -> Self {
        self.directories = directories;
        self
    }

    pub fn with_environment_source(mut self, environment: Arc<dyn EnvironmentSource>) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_execution_context(mut self, context: Arc<dyn ExecutionContext>) -> Self {
        self.context = context;
        self
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn include_base_config(&self) -> bool {
        self.include_base_config
    }

    /// The runtime environment if set, otherwise the configured default.
    pub fn environment(&self) -> Environment {
        self.environment
            .current()
            .unwrap_or_else(|| self.default_env.clone())
    }

    pub fn cache_key(&self) -> String {
        self.cache_key_for(&self.environment())
    }

    fn cache_key_for(&self, env: &Environment) -> String {
        format!("{}-{}", self.config_dir.display(), env)
    }

    /// Runs the full pipeline and returns the validated configuration.
    ///
    /// Missing directories contribute nothing. Any error from reading,
    /// merging or validation is returned unchanged.
    pub fn load(&self) -> Result<ValidatedConfig, ConfigError> {
        let env = self.environment();
        let key = self.cache_key_for(&env);
        debug!(environment = %env, config_dir = %self.config_dir.display(), "loading configuration");

        if self.use_cache {
            if let Some(config) = self.cache.get(&key) {
                debug!(key = %key, "configuration cache hit");
                return Ok(config);
            }
            debug!(key = %key, "configuration cache miss");
        }

        let merged = if self.context.can_access_filesystem() {
            self.load_layers(&env)?
        } else {
            warn!("filesystem access unavailable, validating an empty configuration");
            Map::new()
        };

        let config = self.validator.validate(merged).inspect_err(|e| {
            if let Some(violations) = e.violations() {
                debug!(count = violations.len(), "configuration failed validation");
            }
        })?;

        if self.use_cache {
            self.cache.set(&key, config.clone());
        }
        Ok(config)
    }

    /// Loads and deserializes the configuration into `T`.
    pub fn load_as<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        self.load()?.deserialize()
    }

    /// Loads the default and environment layers concurrently and merges them.
    fn load_layers(&self, env: &Environment) -> Result<Map<String, Value>, ConfigError> {
        let default_dir = self.config_dir.join(DEFAULT_LAYER);
        let env_dir = self.config_dir.join(env.as_str());

        let (defaults, overrides) = thread::scope(|scope| {
            let defaults = scope.spawn(|| self.directories.load_directory(&default_dir));
            let overrides = scope.spawn(|| self.directories.load_directory(&env_dir));
            (
                join_layer(defaults, &default_dir),
                join_layer(overrides, &env_dir),
            )
        });

        Ok(merge(defaults?, overrides?))
    }
}

fn join_layer(
    handle: thread::ScopedJoinHandle<'_, Result<Map<String, Value>, ConfigError>>,
    dir: &Path,
) -> Result<Map<String, Value>, ConfigError> {
    handle
        .join()
        .map_err(|panic| worker_panicked(dir, &*panic))?
}

fn worker_panicked(dir: &Path, panic: &(dyn Any + Send)) -> ConfigError {
    let reason = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    ConfigError::load(
        format!("loading '{}' panicked: {reason}", dir.display()),
        None,
    )
}
