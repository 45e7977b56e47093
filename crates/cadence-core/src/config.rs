use anyhow::Result;
use config::{Config, ConfigBuilder, builder::DefaultState};
use serde::{Deserialize, Serialize};

use crate::constants::{
    CLEANUP_SCHEDULE_ENV, DEFAULT_CLEANUP_SCHEDULE, DEFAULT_MATERIALIZATION_SCHEDULE,
    DEFAULT_MAX_CONCURRENT_JOBS, DEFAULT_MAX_ORGANIZATIONS, DEFAULT_METRICS_SCHEDULE,
    DEFAULT_METRICS_WINDOW_MINUTES, MATERIALIZATION_SCHEDULE_ENV, METRICS_ENABLED_ENV,
    METRICS_SCHEDULE_ENV, METRICS_WINDOW_MINUTES_ENV,
};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub scheduler: SchedulerConfig,
    pub materialization: MaterializationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// ## Summary
    /// Returns the bind address in the format "host:port".
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// Cron schedules for the background triggers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub materialization_schedule: String,
    pub cleanup_schedule: String,
    pub metrics_enabled: bool,
    pub metrics_schedule: String,
    pub metrics_window_minutes: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            materialization_schedule: DEFAULT_MATERIALIZATION_SCHEDULE.to_owned(),
            cleanup_schedule: DEFAULT_CLEANUP_SCHEDULE.to_owned(),
            metrics_enabled: false,
            metrics_schedule: DEFAULT_METRICS_SCHEDULE.to_owned(),
            metrics_window_minutes: DEFAULT_METRICS_WINDOW_MINUTES,
        }
    }
}

/// Initial materialization worker settings. Adjustable at runtime through the admin surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializationConfig {
    pub max_concurrent_jobs: usize,
    pub max_organizations: usize,
    pub enable_post_processing: bool,
}

impl Default for MaterializationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            max_organizations: DEFAULT_MAX_ORGANIZATIONS,
            enable_post_processing: true,
        }
    }
}

/// Settings keys that can also be set through their historical environment variable names.
const LEGACY_ENV_KEYS: [(&str, &str); 6] = [
    ("database.url", "DATABASE_URL"),
    ("scheduler.materialization_schedule", MATERIALIZATION_SCHEDULE_ENV),
    ("scheduler.cleanup_schedule", CLEANUP_SCHEDULE_ENV),
    ("scheduler.metrics_enabled", METRICS_ENABLED_ENV),
    ("scheduler.metrics_schedule", METRICS_SCHEDULE_ENV),
    ("scheduler.metrics_window_minutes", METRICS_WINDOW_MINUTES_ENV),
];

fn with_defaults(builder: ConfigBuilder<DefaultState>) -> Result<ConfigBuilder<DefaultState>> {
    let scheduler = SchedulerConfig::default();
    let materialization = MaterializationConfig::default();

    Ok(builder
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8698)?
        .set_default("database.pool_size", 8)?
        .set_default("logging.level", "info")?
        .set_default(
            "scheduler.materialization_schedule",
            scheduler.materialization_schedule,
        )?
        .set_default("scheduler.cleanup_schedule", scheduler.cleanup_schedule)?
        .set_default("scheduler.metrics_enabled", scheduler.metrics_enabled)?
        .set_default("scheduler.metrics_schedule", scheduler.metrics_schedule)?
        .set_default(
            "scheduler.metrics_window_minutes",
            u64::from(scheduler.metrics_window_minutes),
        )?
        .set_default(
            "materialization.max_concurrent_jobs",
            materialization.max_concurrent_jobs.to_string(),
        )?
        .set_default(
            "materialization.max_organizations",
            materialization.max_organizations.to_string(),
        )?
        .set_default(
            "materialization.enable_post_processing",
            materialization.enable_post_processing,
        )?)
}

impl Settings {
    /// ## Summary
    /// Loads configuration from defaults, an optional `config.toml`, and environment variables.
    /// `CADENCE__SECTION__KEY` variables override the file, and the historical names
    /// (`DATABASE_URL`, `EVENT_GENERATION_CRON_SCHEDULE`, ...) override both.
    ///
    /// ## Errors
    /// Returns an error if building the configuration or deserializing it fails.
    pub fn load() -> Result<Self> {
        let mut builder = with_defaults(Config::builder())?
            // TOML file
            .add_source(config::File::with_name("config.toml").required(false))
            // Env
            .add_source(
                config::Environment::with_prefix("CADENCE")
                    .prefix_separator("__")
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            );

        for (key, var) in LEGACY_ENV_KEYS {
            let value = std::env::var(var).ok().filter(|value| !value.is_empty());
            builder = builder.set_override_option(key, value)?;
        }

        Ok(builder.build()?.try_deserialize::<Self>()?)
    }
}

/// ## Summary
/// Loads configuration from environment variables and `.env` file.
///
/// ## Errors
/// Returns an error if loading or deserializing the configuration fails.
pub fn load_config() -> Result<Settings> {
    dotenvy::dotenv().ok();

    Settings::load()
}
