use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use yup_oauth2::authenticator_delegate::InstalledFlowDelegate;
use yup_oauth2::storage::{TokenInfo, TokenStorage};
use yup_oauth2::{self as oauth2, ApplicationSecret};

use crate::gmail;
use crate::secrets::ClientCredentials;

pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";
const AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Re-prompt even for an already authorized client; Google only issues a
/// refresh token on a fresh consent.
const FORCE_CONSENT_PROMPT: bool = true;

/// Result of a completed consent flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintedToken {
    pub refresh_token: String,
    pub access_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Mailbox that granted consent, when the Gmail probe succeeded
    pub mailbox: Option<String>,
}

/// Trait for minting refresh tokens - allows mocking in tests
#[cfg_attr(test, mockall::automock)]
pub trait TokenMinter: Send + Sync {
    /// Runs the interactive consent flow for the given client
    fn mint(
        &self,
        credentials: &ClientCredentials,
    ) -> impl std::future::Future<Output = Result<MintedToken>> + Send;
}

/// Redirect URI registered for the loopback listener
pub fn loopback_redirect_uri(port: u16) -> String {
    format!("http://localhost:{}", port)
}

/// Builds the "installed" client configuration for Google's endpoints
pub fn application_secret(
    credentials: &ClientCredentials,
    redirect_uri: &str,
) -> ApplicationSecret {
    ApplicationSecret {
        client_id: credentials.client_id.clone(),
        client_secret: credentials.client_secret.clone(),
        auth_uri: AUTH_URI.to_string(),
        token_uri: TOKEN_URI.to_string(),
        redirect_uris: vec![redirect_uri.to_string()],
        ..Default::default()
    }
}

/// In-memory token storage so the refresh token can be read back after the flow.
/// Nothing touches disk.
#[derive(Clone, Default)]
struct CapturedToken {
    slot: Arc<Mutex<Option<(Vec<String>, TokenInfo)>>>,
}

impl CapturedToken {
    /// Copy of the stored token. The slot stays filled: the authenticator
    /// reads it back for every later API call.
    fn snapshot(&self) -> Option<TokenInfo> {
        self.slot
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|(_, token)| token.clone()))
    }
}

#[async_trait]
impl TokenStorage for CapturedToken {
    async fn set(&self, scopes: &[&str], token: TokenInfo) -> anyhow::Result<()> {
        let mut guard = self
            .slot
            .lock()
            .map_err(|_| anyhow::anyhow!("token capture lock poisoned"))?;
        *guard = Some((scopes.iter().map(|s| s.to_string()).collect(), token));
        Ok(())
    }

    async fn get(&self, target_scopes: &[&str]) -> Option<TokenInfo> {
        let guard = self.slot.lock().ok()?;
        let (scopes, token) = guard.as_ref()?;
        target_scopes
            .iter()
            .all(|target| scopes.iter().any(|s| s == target))
            .then(|| token.clone())
    }
}

/// Prints the consent URL and tries to open it in the browser
struct BrowserDelegate {
    redirect_uri: String,
}

impl InstalledFlowDelegate for BrowserDelegate {
    fn redirect_uri(&self) -> Option<&str> {
        Some(&self.redirect_uri)
    }

    fn present_user_url<'a>(
        &'a self,
        url: &'a str,
        need_code: bool,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<String, String>> + Send + 'a>> {
        Box::pin(async move {
            println!("If the browser does not open automatically, visit this URL:");
            println!("{}", url);
            println!();

            if let Err(e) = open::that_detached(url) {
                crate::debug_log!("present_user_url: failed to open browser: {}", e);
                println!("Could not open the browser automatically.");
            }

            if !need_code {
                return Ok(String::new());
            }

            println!("Enter the authorization code from the browser:");
            let mut code = String::new();
            std::io::stdin()
                .read_line(&mut code)
                .map_err(|e| format!("Failed to read authorization code: {}", e))?;
            Ok(code.trim().to_string())
        })
    }
}

/// Installed-app consent flow on a fixed loopback port
pub struct InstalledFlowMinter {
    redirect_port: u16,
}

impl InstalledFlowMinter {
    pub fn new(redirect_port: u16) -> Self {
        Self { redirect_port }
    }
}

impl TokenMinter for InstalledFlowMinter {
    async fn mint(&self, credentials: &ClientCredentials) -> Result<MintedToken> {
        let redirect_uri = loopback_redirect_uri(self.redirect_port);
        let secret = application_secret(credentials, &redirect_uri);
        let captured = CapturedToken::default();

        crate::debug_log!("mint: starting installed flow on {}", redirect_uri);
        let auth = oauth2::InstalledFlowAuthenticator::builder(
            secret,
            oauth2::InstalledFlowReturnMethod::HTTPPortRedirect(self.redirect_port),
        )
        .flow_delegate(Box::new(BrowserDelegate { redirect_uri }))
        .with_storage(Box::new(captured.clone()))
        .force_account_selection(FORCE_CONSENT_PROMPT)
        .build()
        .await
        .context("Failed to build authenticator")?;

        // Blocks until consent completes or fails
        auth.token(&[GMAIL_READONLY_SCOPE])
            .await
            .context("OAuth authorization flow failed")?;

        let minted = extract_minted(&captured)?;
        crate::debug_log!("mint: refresh token received ({} chars)", minted.refresh_token.len());

        let mailbox = match gmail::mailbox_address(auth).await {
            Ok(address) => Some(address),
            Err(e) => {
                crate::debug_log!("mint: mailbox probe failed: {:#}", e);
                None
            }
        };

        Ok(MintedToken { mailbox, ..minted })
    }
}

/// Reads the minted token out of the capture without emptying it
fn extract_minted(captured: &CapturedToken) -> Result<MintedToken> {
    let info = captured
        .snapshot()
        .context("Authorization finished but no token was captured")?;
    minted_from_info(info)
}

/// Converts captured token info, insisting on a refresh token
fn minted_from_info(info: TokenInfo) -> Result<MintedToken> {
    let refresh_token = info
        .refresh_token
        .filter(|t| !t.trim().is_empty())
        .context(
            "No refresh token was returned. Revoke this app's access at \
             https://myaccount.google.com/permissions and run again",
        )?;

    let expires_at = info
        .expires_at
        .and_then(|at| Utc.timestamp_opt(at.unix_timestamp(), 0).single());

    Ok(MintedToken {
        refresh_token,
        access_token: info.access_token,
        expires_at,
        mailbox: None,
    })
}
