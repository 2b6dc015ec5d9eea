use layerconf::{Environment, Loader, Schema};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
struct AppConfig {
    app: AppSection,
    server: ServerSection,
    database: DatabaseSection,
}

#[derive(Debug, Deserialize)]
struct AppSection {
    name: String,
    debug: bool,
}

#[derive(Debug, Deserialize)]
struct ServerSection {
    host: Option<String>,
    port: u16,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct DatabaseSection {
    host: String,
    port: u16,
    #[serde(default)]
    replicas: Vec<String>,
}

fn main() -> Result<(), layerconf::ConfigError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // APP_ENV=production selects demos/config/production on top of default/
    let loader = Loader::builder(Schema::from_file("demos/schema.json")?)
        .config_dir("demos/config")
        .default_env(Environment::Development)
        .cache(true)
        .build()?;

    let config: AppConfig = loader.load_as()?;

    println!("environment: {}", loader.environment());
    println!("app: {} (debug={})", config.app.name, config.app.debug);
    println!(
        "listening on {}:{}",
        config.server.host.as_deref().unwrap_or("127.0.0.1"),
        config.server.port
    );
    println!("database: {} ({} replicas)", config.database.host, config.database.replicas.len());

    Ok(())
}
