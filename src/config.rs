//! Application settings managed by Figment.
//!
//! Sources, later ones winning: built-in defaults, the TOML file (when it
//! exists), then `ORM_` environment variables with `__` as the section
//! separator (`ORM_DATABASE__DSN`, `ORM_LOG_LEVEL`, ...).

use crate::error::{OrmError, Result};
use crate::schema::SchemaRegistry;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[cfg(feature = "mysql")]
use sqlx::mysql::MySqlConnectOptions;
#[cfg(feature = "mysql")]
use std::str::FromStr;

pub const DEFAULT_CONFIG_FILE: &str = "orm.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// TOML: `[database]`
    #[serde(default)]
    pub database: DatabaseSettings,

    /// TOML: `[entities]`
    #[serde(default)]
    pub entities: EntitiesSettings,

    /// Tracing filter used when `RUST_LOG` is unset. Default: `info`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: DatabaseSettings::default(),
            entities: EntitiesSettings::default(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseSettings {
    /// Connection URL, e.g. `sqlite://app.db` or `mysql://localhost/app`.
    /// TOML: `database.dsn`. Default: `sqlite://orm.db`.
    #[serde(default = "default_dsn")]
    pub dsn: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Log every statement with its parameters inlined.
    /// TOML: `database.print_sql`. Default: `false`.
    #[serde(default)]
    pub print_sql: bool,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            dsn: default_dsn(),
            username: None,
            password: None,
            print_sql: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EntitiesSettings {
    /// Directory holding one `<Entity>.toml` schema declaration per entity.
    /// TOML: `entities.path`. Default: `entities`.
    #[serde(default = "default_entities_path")]
    pub path: PathBuf,
}

impl Default for EntitiesSettings {
    fn default() -> Self {
        Self {
            path: default_entities_path(),
        }
    }
}

fn default_dsn() -> String {
    "sqlite://orm.db".to_string()
}

fn default_entities_path() -> PathBuf {
    PathBuf::from("entities")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// Defaults, then `path` if it is a file, then `ORM_*` variables
    pub fn figment(path: &Path) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Settings::default()));
        if path.is_file() {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed("ORM_").split("__"))
    }

    /// Extract and validate the settings
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_figment(Self::figment(path))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let settings: Self = figment.extract()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.dsn.trim().is_empty() {
            return Err(OrmError::Config(
                "database.dsn must be set and non-empty".to_string(),
            ));
        }
        if self.entities.path.as_os_str().is_empty() {
            return Err(OrmError::Config(
                "entities.path must be set and non-empty".to_string(),
            ));
        }
        Ok(())
    }

    /// MySQL options from `dsn`, with `username`/`password` overriding the
    /// DSN's credentials when set. They are passed as values, never spliced
    /// into the URL.
    #[cfg(feature = "mysql")]
    pub fn mysql_options(&self) -> Result<MySqlConnectOptions> {
        let mut options = MySqlConnectOptions::from_str(self.database.dsn.trim())?;

        if let Some(username) = self.database.username.as_deref().filter(|u| !u.is_empty()) {
            options = options.username(username);
        }
        if let Some(password) = self.database.password.as_deref().filter(|p| !p.is_empty()) {
            options = options.password(password);
        }
        Ok(options)
    }

    /// Any other value of the same sources, e.g. an application's own `[mail]` table
    pub fn extract_section<T: DeserializeOwned>(figment: &Figment, key: &str) -> Result<T> {
        Ok(figment.extract_inner(key)?)
    }

    /// Registry reading schema declarations from `entities.path`
    pub fn schema_registry(&self) -> SchemaRegistry {
        SchemaRegistry::new(&self.entities.path)
    }
}
