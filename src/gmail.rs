use anyhow::{Context, Result};
use google_gmail1::Gmail;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use yup_oauth2::authenticator::Authenticator;

use crate::auth::GMAIL_READONLY_SCOPE;

/// Asks Gmail which mailbox the freshly minted credentials belong to
pub async fn mailbox_address(
    auth: Authenticator<HttpsConnector<HttpConnector>>,
) -> Result<String> {
    let client = google_gmail1::hyper_util::client::legacy::Client::builder(
        google_gmail1::hyper_util::rt::TokioExecutor::new(),
    )
    .build(
        google_gmail1::hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .context("Failed to load native TLS roots")?
            .https_or_http()
            .enable_http1()
            .build(),
    );

    let hub = Gmail::new(client, auth);

    // Stay on the consented scope so the authenticator reuses the captured token
    let (_, profile) = hub
        .users()
        .get_profile("me")
        .add_scope(GMAIL_READONLY_SCOPE)
        .doit()
        .await
        .context("Failed to read Gmail profile")?;

    profile
        .email_address
        .filter(|address| !address.is_empty())
        .context("Gmail profile has no email address")
}
