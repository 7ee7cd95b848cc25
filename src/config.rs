use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "gmail-token-renew";
const CONFIG_FILE: &str = "config.toml";

/// Where the Google Cloud SDK installer puts gcloud by default
const SDK_GCLOUD: &str = "google-cloud-sdk/bin/gcloud";

/// Environment variable that overrides the configured project
pub const PROJECT_ENV: &str = "GOOGLE_CLOUD_PROJECT";

/// Environment variable that turns on the debug log
pub const DEBUG_ENV: &str = "GMAIL_TOKEN_RENEW_DEBUG";

/// Run settings. Every field has a default, so the config file is optional.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Google Cloud project holding the secrets
    pub project: String,
    /// Secret holding the OAuth client id
    pub client_id_secret: String,
    /// Secret holding the OAuth client secret
    pub client_secret_secret: String,
    /// Secret that receives the new refresh token
    pub refresh_token_secret: String,
    /// Explicit gcloud binary; `~/` is expanded
    pub gcloud_path: Option<String>,
    /// Loopback port for the OAuth redirect
    pub redirect_port: u16,
    /// Health endpoint suggested after a successful save
    pub health_check_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project: "mail-reader-433802".to_string(),
            client_id_secret: "gmail-oauth-client-id".to_string(),
            client_secret_secret: "gmail-oauth-client-secret".to_string(),
            refresh_token_secret: "gmail-oauth-refresh-token".to_string(),
            gcloud_path: None,
            redirect_port: 8080,
            health_check_url: Some(
                "https://ingestor-iswgxwwvra-uc.a.run.app/health/oauth".to_string(),
            ),
        }
    }
}

impl Settings {
    /// Applies environment overrides through `lookup`
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(project) = lookup(PROJECT_ENV).filter(|p| !p.trim().is_empty()) {
            self.project = project.trim().to_string();
        }
        self
    }

    /// The gcloud binary to run for this configuration
    pub fn gcloud_program(&self) -> PathBuf {
        resolve_gcloud(self.gcloud_path.as_deref(), dirs::home_dir().as_deref())
    }
}

/// Returns the configuration directory path
pub fn config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|p| p.join(APP_NAME))
        .context("Failed to determine config directory")
}

/// Returns the path to the optional settings file
pub fn config_path() -> Result<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE))
}

/// Ensures the config directory exists
pub fn ensure_config_dir() -> Result<PathBuf> {
    let dir = config_dir()?;
    if !dir.exists() {
        fs::create_dir_all(&dir).context("Failed to create config directory")?;
    }
    Ok(dir)
}

/// Parses settings from TOML content
pub fn parse_settings(content: &str) -> Result<Settings> {
    toml::from_str(content).context("Failed to parse config.toml")
}

/// Loads settings from the config file (if any), then the environment
pub fn load_settings() -> Result<Settings> {
    let path = config_path()?;
    let settings = if path.exists() {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings from {:?}", path))?;
        parse_settings(&content)?
    } else {
        Settings::default()
    };

    Ok(settings.apply_env(|key| std::env::var(key).ok()))
}

/// Whether the debug log was requested
pub fn debug_enabled(lookup: impl Fn(&str) -> Option<String>) -> bool {
    lookup(DEBUG_ENV)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Picks the gcloud binary: explicit path, then the SDK's home install, then PATH
pub fn resolve_gcloud(configured: Option<&str>, home: Option<&Path>) -> PathBuf {
    if let Some(path) = configured.map(str::trim).filter(|p| !p.is_empty()) {
        return match (path.strip_prefix("~/"), home) {
            (Some(rest), Some(home)) => home.join(rest),
            _ => PathBuf::from(path),
        };
    }

    if let Some(home) = home {
        let sdk = home.join(SDK_GCLOUD);
        if sdk.is_file() {
            return sdk;
        }
    }

    PathBuf::from("gcloud")
}
