//! Handles settings for the service. Values come from the defaults below, then
//! an optional `settings.toml`, then `OPENSPLIT__*` environment variables
//! (`OPENSPLIT__SERVER__PORT=9000`). `MONGODB_URI` still overrides the
//! database URI.
use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Storage {
    Mongodb,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoDb {
    pub uri: String,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ledger {
    /// How many times a conflicting expense is recomputed before giving up.
    pub max_commit_retries: u32,
    /// Replay the expense history on every read and compare with the stored
    /// balances.
    pub verify_on_read: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Log {
    pub level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: Server,
    pub storage: Storage,
    pub mongodb: MongoDb,
    pub ledger: Ledger,
    pub log: Log,
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("server.bind", "0.0.0.0")?
        .set_default("server.port", 8080)?
        .set_default("storage", "mongodb")?
        .set_default("mongodb.uri", "mongodb://localhost:27017")?
        .set_default("mongodb.database", "OpenSplit")?
        .set_default("ledger.max_commit_retries", 3)?
        .set_default("ledger.verify_on_read", true)?
        .set_default("log.level", "info")
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let mut builder = defaults()?
            .add_source(File::with_name("settings").required(false))
            .add_source(
                Environment::with_prefix("OPENSPLIT")
                    .separator("__")
                    .try_parsing(true),
            );
        if let Ok(uri) = std::env::var("MONGODB_URI") {
            builder = builder.set_override("mongodb.uri", uri)?;
        }
        builder.build()?.try_deserialize()
    }

    /// Settings from a TOML snippet on top of the defaults.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        defaults()?
            .add_source(File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_mongodb() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.storage, Storage::Mongodb);
        assert_eq!(settings.mongodb.database, "OpenSplit");
        assert_eq!(settings.ledger.max_commit_retries, 3);
        assert!(settings.ledger.verify_on_read);
        assert_eq!(settings.log.level, "info");
    }

    #[test]
    fn file_values_override_defaults() {
        let settings = Settings::from_toml(
            r#"
            storage = "memory"

            [server]
            port = 9090

            [ledger]
            max_commit_retries = 0
            verify_on_read = false
            "#,
        )
        .unwrap();
        assert_eq!(settings.storage, Storage::Memory);
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.server.bind, "0.0.0.0");
        assert_eq!(settings.ledger.max_commit_retries, 0);
        assert!(!settings.ledger.verify_on_read);
    }

    #[test]
    fn unknown_storage_is_rejected() {
        assert!(Settings::from_toml(r#"storage = "postgres""#).is_err());
    }
}
