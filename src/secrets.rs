use anyhow::{Context, Result};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::config::Settings;

/// OAuth client id/secret pair fetched from the secret store
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Trait for secret store operations - allows mocking in tests
#[cfg_attr(test, mockall::automock)]
pub trait SecretStore {
    /// Reads the latest version of a secret, trimmed
    fn access_latest(&self, secret: &str) -> Result<String>;

    /// Adds a new version of a secret with the given payload
    fn add_version(&self, secret: &str, payload: &str) -> Result<()>;
}

/// Secret Manager access through the gcloud CLI
pub struct GcloudSecretStore {
    program: PathBuf,
    project: String,
}

impl GcloudSecretStore {
    pub fn new(program: impl Into<PathBuf>, project: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            project: project.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.gcloud_program(), settings.project.clone())
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn project_arg(&self) -> String {
        format!("--project={}", self.project)
    }

    fn spawn_hint(&self) -> String {
        format!(
            "Failed to run '{}'. Is the Google Cloud SDK installed? \
             Install it or set gcloud_path in {}",
            self.program.display(),
            crate::config::config_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| "config.toml".to_string())
        )
    }
}

impl SecretStore for GcloudSecretStore {
    fn access_latest(&self, secret: &str) -> Result<String> {
        crate::debug_log!("access_latest: secret={} project={}", secret, self.project);
        let output = Command::new(&self.program)
            .args(["secrets", "versions", "access", "latest"])
            .arg(format!("--secret={}", secret))
            .arg(self.project_arg())
            .output()
            .with_context(|| self.spawn_hint())?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Failed to read secret '{}': {}", secret, stderr.trim());
        }

        let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if value.is_empty() {
            anyhow::bail!("Secret '{}' is empty", secret);
        }

        crate::debug_log!("access_latest: secret={} read {} chars", secret, value.len());
        Ok(value)
    }

    fn add_version(&self, secret: &str, payload: &str) -> Result<()> {
        crate::debug_log!("add_version: secret={} project={}", secret, self.project);
        let mut child = Command::new(&self.program)
            .args(["secrets", "versions", "add", secret, "--data-file=-"])
            .arg(self.project_arg())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| self.spawn_hint())?;

        {
            let mut stdin = child.stdin.take().context("Failed to open gcloud stdin")?;
            stdin
                .write_all(payload.as_bytes())
                .context("Failed to write secret payload to gcloud")?;
        }

        let output = child
            .wait_with_output()
            .context("Failed to wait for gcloud")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "Failed to add a version to secret '{}': {}",
                secret,
                stderr.trim()
            );
        }

        crate::debug_log!("add_version: secret={} stored", secret);
        Ok(())
    }
}

/// Fetches the OAuth client id and secret, id first
pub fn fetch_client_credentials<S: SecretStore + ?Sized>(
    store: &S,
    settings: &Settings,
) -> Result<ClientCredentials> {
    let client_id = store
        .access_latest(&settings.client_id_secret)
        .context("Failed to fetch the OAuth client id")?;
    let client_secret = store
        .access_latest(&settings.client_secret_secret)
        .context("Failed to fetch the OAuth client secret")?;

    Ok(ClientCredentials {
        client_id,
        client_secret,
    })
}
