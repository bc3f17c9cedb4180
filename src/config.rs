use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "bookmarker.toml";

/// Prefix of the environment variables that override configuration keys.
pub const ENV_PREFIX: &str = "BOOKMARKER";

/// The `AppConfig` struct holds the runtime configuration of the bookmarker.
///
/// User preferences (provider, API key, styles) are not configuration; they are part of the
/// persisted state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Where the state blob is read from and written to.
    pub state_path: PathBuf,
    /// Upper bound for a single provider request, in seconds.
    pub request_timeout_secs: u64,
    /// The user agent string used for provider requests.
    pub user_agent: String,
    /// Replaces the provider's API host, e.g. for a proxy.
    pub api_base_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from(crate::DEFAULT_STATE_PATH),
            request_timeout_secs: crate::DEFAULT_TIMEOUT.as_secs(),
            user_agent: format!("bookmarker/{}", env!("CARGO_PKG_VERSION")),
            api_base_url: None,
        }
    }
}

impl AppConfig {
    /// Loads configuration from defaults, then the given (or default) TOML file, then
    /// `BOOKMARKER_*` environment variables.
    ///
    /// An explicitly given file must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
