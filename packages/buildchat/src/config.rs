use anyhow::{Context, Result};
use buildchat_session::{DEFAULT_CONNECT_TIMEOUT, SessionConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

// =============================================================================
// Unified config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   config.toml:     [api]
//                    token = "..."
//
//   env var:         BUILDCHAT_API__TOKEN=...   (double underscore = nesting)
//
//   (single underscore stays within field names: BUILDCHAT_API__WS_URL)

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub api: ApiFileConfig,
    #[serde(default)]
    pub session: SessionFileConfig,
}

/// Server endpoints and credentials (lives under `[api]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiFileConfig {
    #[serde(default = "default_api_url")]
    pub url: String,
    /// Explicit WebSocket base; derived from `url` when unset
    #[serde(default)]
    pub ws_url: Option<String>,
    /// Web app origin used for share links; defaults to `url`
    #[serde(default)]
    pub web_url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for ApiFileConfig {
    fn default() -> Self {
        Self {
            url: default_api_url(),
            ws_url: None,
            web_url: None,
            token: None,
        }
    }
}

/// Session transport knobs (lives under `[session]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionFileConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for SessionFileConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_api_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_secs()
}

/// Build the layered figment: struct defaults, then `config.toml`, then
/// `BUILDCHAT_*` environment variables.
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("BUILDCHAT_").split("__"))
}

impl FileConfig {
    /// Resolve into the runtime view the session library uses.
    pub fn session_config(&self) -> Result<SessionConfig> {
        let api_url = Url::parse(&self.api.url)
            .with_context(|| format!("Invalid api.url: {}", self.api.url))?;
        let ws_url = self
            .api
            .ws_url
            .as_deref()
            .map(|raw| Url::parse(raw).with_context(|| format!("Invalid api.ws_url: {raw}")))
            .transpose()?;
        anyhow::ensure!(
            self.session.connect_timeout_secs > 0,
            "session.connect_timeout_secs must be positive"
        );

        let mut config = SessionConfig::new(api_url)
            .with_connect_timeout(Duration::from_secs(self.session.connect_timeout_secs));
        config.ws_url = ws_url;
        config.token = self.api.token.clone().filter(|t| !t.is_empty());
        Ok(config)
    }

    /// Origin of the web app, for share links.
    pub fn web_url(&self) -> Result<Url> {
        let raw = self.api.web_url.as_deref().unwrap_or(&self.api.url);
        Url::parse(raw).with_context(|| format!("Invalid web url: {raw}"))
    }
}

/// Resolved on-disk locations.
#[derive(Clone, Debug)]
pub struct BuildchatConfig {
    pub data_dir: PathBuf,
}

impl BuildchatConfig {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".buildchat"),
        };

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

        Ok(Self { data_dir })
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }

    pub fn load(&self) -> Result<FileConfig> {
        load_config(&self.data_dir)
            .extract()
            .with_context(|| format!("Failed to load {}", self.config_toml_path().display()))
    }
}
