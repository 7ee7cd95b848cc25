use anyhow::{Context, Result};
use std::io::{BufRead, Write};

use crate::auth::TokenMinter;
use crate::config::Settings;
use crate::report;
use crate::secrets::{self, SecretStore};

/// How a successful run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Saved,
    NotSaved,
}

/// Fetch credentials, mint a refresh token, show it, optionally store it
pub async fn run<S, M, R, W>(
    settings: &Settings,
    store: &S,
    minter: &M,
    input: &mut R,
    out: &mut W,
) -> Result<Outcome>
where
    S: SecretStore,
    M: TokenMinter,
    R: BufRead,
    W: Write,
{
    writeln!(out, "🔍 Fetching current credentials from Secret Manager...")?;
    writeln!(out)?;

    let credentials = secrets::fetch_client_credentials(store, settings)
        .context("Could not get OAuth credentials. Make sure you have access to Secret Manager")?;
    report::print_credential_previews(out, &credentials.client_id, &credentials.client_secret)?;

    writeln!(out, "📝 Generating new refresh token...")?;
    writeln!(out, "A browser window will open to authorize the application.")?;
    writeln!(out)?;
    out.flush()?;

    crate::debug_log!("run: credentials fetched, starting consent flow");
    let minted = minter.mint(&credentials).await?;
    crate::debug_log!(
        "run: minted (access token: {}, expires at: {:?})",
        minted.access_token.is_some(),
        minted.expires_at
    );

    writeln!(out)?;
    writeln!(out, "✅ Authentication successful!")?;
    if let Some(mailbox) = &minted.mailbox {
        writeln!(out, "✓ Authorized mailbox: {}", mailbox)?;
    }
    writeln!(out)?;
    report::print_token_banner(out, &minted.refresh_token)?;

    if !report::ask_to_save(input, out)? {
        crate::debug_log!("run: operator declined to save");
        report::print_manual_instructions(out, &settings.gcloud_program(), settings)?;
        return Ok(Outcome::NotSaved);
    }

    store
        .add_version(&settings.refresh_token_secret, &minted.refresh_token)
        .context("Failed to save the refresh token to Secret Manager")?;
    report::print_next_steps(out, settings)?;

    Ok(Outcome::Saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MintedToken, MockTokenMinter};
    use crate::secrets::MockSecretStore;
    use mockall::predicate::eq;

    const TOKEN: &str = "1//0gRefreshTokenValue";

    fn store_with_credentials() -> MockSecretStore {
        let mut store = MockSecretStore::new();
        store
            .expect_access_latest()
            .with(eq("gmail-oauth-client-id"))
            .returning(|_| Ok("123456789.apps.googleusercontent.com".to_string()));
        store
            .expect_access_latest()
            .with(eq("gmail-oauth-client-secret"))
            .returning(|_| Ok("GOCSPX-client-secret".to_string()));
        store
    }

    fn minter_returning(token: &'static str) -> MockTokenMinter {
        let mut minter = MockTokenMinter::new();
        minter
            .expect_mint()
            .withf(|c| {
                c.client_id == "123456789.apps.googleusercontent.com"
                    && c.client_secret == "GOCSPX-client-secret"
            })
            .times(1)
            .returning(move |_| {
                Box::pin(async move {
                    Ok(MintedToken {
                        refresh_token: token.to_string(),
                        access_token: Some("ya29.access".to_string()),
                        expires_at: None,
                        mailbox: Some("user@gmail.com".to_string()),
                    })
                })
            });
        minter
    }

    async fn run_with_answer(
        store: &MockSecretStore,
        minter: &MockTokenMinter,
        answer: &str,
    ) -> (Result<Outcome>, String) {
        let mut input = answer.as_bytes();
        let mut out = Vec::new();
        let result = run(&Settings::default(), store, minter, &mut input, &mut out).await;
        (result, String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn test_secret_fetch_failure_skips_flow() {
        let mut store = MockSecretStore::new();
        store
            .expect_access_latest()
            .returning(|_| Err(anyhow::anyhow!("gcloud: command not found")));
        store.expect_add_version().never();

        let mut minter = MockTokenMinter::new();
        minter.expect_mint().never();

        let (result, _) = run_with_answer(&store, &minter, "y\n").await;
        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("Secret Manager"));
    }

    #[tokio::test]
    async fn test_client_secret_failure_skips_flow() {
        let mut store = MockSecretStore::new();
        store
            .expect_access_latest()
            .with(eq("gmail-oauth-client-id"))
            .returning(|_| Ok("id".to_string()));
        store
            .expect_access_latest()
            .with(eq("gmail-oauth-client-secret"))
            .returning(|_| Err(anyhow::anyhow!("NOT_FOUND")));

        let mut minter = MockTokenMinter::new();
        minter.expect_mint().never();

        let (result, _) = run_with_answer(&store, &minter, "y\n").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_flow_failure_propagates() {
        let mut store = store_with_credentials();
        store.expect_add_version().never();

        let mut minter = MockTokenMinter::new();
        minter
            .expect_mint()
            .returning(|_| Box::pin(async { Err(anyhow::anyhow!("access_denied")) }));

        let (result, out) = run_with_answer(&store, &minter, "y\n").await;
        assert!(result.unwrap_err().to_string().contains("access_denied"));
        assert!(!out.contains("NEW REFRESH TOKEN"));
    }

    #[tokio::test]
    async fn test_affirmative_answers_save_once() {
        for answer in ["s\n", "y\n", "S\n", "Y\n"] {
            let mut store = store_with_credentials();
            store
                .expect_add_version()
                .with(eq("gmail-oauth-refresh-token"), eq(TOKEN))
                .times(1)
                .returning(|_, _| Ok(()));
            let minter = minter_returning(TOKEN);

            let (result, out) = run_with_answer(&store, &minter, answer).await;
            assert_eq!(result.unwrap(), Outcome::Saved, "answer {:?}", answer);
            assert!(out.contains("Token saved to Secret Manager"));
        }
    }

    #[tokio::test]
    async fn test_printed_token_matches_saved_payload() {
        let saved = std::sync::Arc::new(std::sync::Mutex::new(String::new()));
        let sink = saved.clone();

        let mut store = store_with_credentials();
        store
            .expect_add_version()
            .times(1)
            .returning(move |_, payload| {
                *sink.lock().unwrap() = payload.to_string();
                Ok(())
            });
        let minter = minter_returning(TOKEN);

        let (result, out) = run_with_answer(&store, &minter, "y\n").await;
        assert_eq!(result.unwrap(), Outcome::Saved);

        let saved = saved.lock().unwrap().clone();
        assert_eq!(saved, TOKEN);
        let banner_token = out
            .lines()
            .skip_while(|l| *l != "NEW REFRESH TOKEN:")
            .nth(2)
            .unwrap();
        assert_eq!(banner_token, saved);
        assert!(out.contains("✓ Authorized mailbox: user@gmail.com"));
    }

    #[tokio::test]
    async fn test_other_answers_print_manual_command() {
        for answer in ["n\n", "no\n", "yes\n", ""] {
            let mut store = store_with_credentials();
            store.expect_add_version().never();
            let minter = minter_returning(TOKEN);

            let (result, out) = run_with_answer(&store, &minter, answer).await;
            assert_eq!(result.unwrap(), Outcome::NotSaved, "answer {:?}", answer);

            let manual = out
                .lines()
                .find(|l| l.contains("secrets versions add"))
                .unwrap();
            assert!(manual.contains("YOUR_TOKEN"));
            assert!(!manual.contains(TOKEN));
            assert!(manual.contains("gmail-oauth-refresh-token --data-file=- --project=mail-reader-433802"));
        }
    }

    #[tokio::test]
    async fn test_save_failure_is_fatal_but_token_was_printed() {
        let mut store = store_with_credentials();
        store
            .expect_add_version()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("PERMISSION_DENIED")));
        let minter = minter_returning(TOKEN);

        let (result, out) = run_with_answer(&store, &minter, "s\n").await;
        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("PERMISSION_DENIED"));
        assert!(out.contains(TOKEN));
    }
}
