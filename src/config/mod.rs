//! Configuration loading.
//!
//! Settings come from an optional `config/default.*` file layered under
//! `TRANSMITTER_*` environment variables (nested keys use `__`, for example
//! `TRANSMITTER_BROKER__HOST`). Whatever is missing falls back to
//! `Settings::default()`.

mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{BrokerSettings, LoggingSettings, Settings, TransmitterSettings};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "TRANSMITTER";

/// Loads the configuration from `config/default` and the environment.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from("config/default")
}

/// Loads the configuration from the named file (extension optional, the
/// file may be absent) and the environment, merged over the defaults.
pub fn load_config_from(file: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(file).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}

#[cfg(test)]
mod tests;
