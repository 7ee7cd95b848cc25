//! Operator-facing output: credential previews, the token banner, the save
//! prompt and the follow-up instructions.

use anyhow::Result;
use std::io::{BufRead, Write};
use std::path::Path;

use crate::config::Settings;

const BANNER_WIDTH: usize = 70;
const CLIENT_ID_PREVIEW: usize = 20;
const CLIENT_SECRET_PREVIEW: usize = 10;

/// Stands in for the real token in the manual command
pub const TOKEN_PLACEHOLDER: &str = "YOUR_TOKEN";

/// First `len` characters followed by an ellipsis
pub fn preview(value: &str, len: usize) -> String {
    let head: String = value.chars().take(len).collect();
    format!("{}...", head)
}

/// Shows just enough of the client id and secret to recognize them
pub fn print_credential_previews<W: Write>(
    out: &mut W,
    client_id: &str,
    client_secret: &str,
) -> Result<()> {
    writeln!(out, "✓ Client ID: {}", preview(client_id, CLIENT_ID_PREVIEW))?;
    writeln!(out, "✓ Client Secret: {}", preview(client_secret, CLIENT_SECRET_PREVIEW))?;
    writeln!(out)?;
    Ok(())
}

/// Prints the refresh token between `=` rules
pub fn print_token_banner<W: Write>(out: &mut W, refresh_token: &str) -> Result<()> {
    let rule = "=".repeat(BANNER_WIDTH);
    writeln!(out, "{}", rule)?;
    writeln!(out, "NEW REFRESH TOKEN:")?;
    writeln!(out, "{}", rule)?;
    writeln!(out, "{}", refresh_token)?;
    writeln!(out, "{}", rule)?;
    writeln!(out)?;
    Ok(())
}

/// Accepts `s` (sí) or `y` (yes), case-insensitive
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "s" | "y")
}

/// Asks whether to store the token. EOF counts as "no".
pub fn ask_to_save<R: BufRead, W: Write>(input: &mut R, out: &mut W) -> Result<bool> {
    write!(out, "💾 Save this token to Secret Manager automatically? (s/y/n): ")?;
    out.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(is_affirmative(&answer))
}

/// The command an operator runs to store the token by hand
pub fn manual_save_command(gcloud: &Path, settings: &Settings) -> String {
    format!(
        "echo -n \"{}\" | {} secrets versions add {} --data-file=- --project={}",
        TOKEN_PLACEHOLDER,
        gcloud.display(),
        settings.refresh_token_secret,
        settings.project
    )
}

/// Printed when the operator declines the automatic save
pub fn print_manual_instructions<W: Write>(
    out: &mut W,
    gcloud: &Path,
    settings: &Settings,
) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "To save the token manually, run:")?;
    writeln!(out, "{}", manual_save_command(gcloud, settings))?;
    Ok(())
}

/// Confirms the save and says how to check the deployed service
pub fn print_next_steps<W: Write>(out: &mut W, settings: &Settings) -> Result<()> {
    writeln!(out, "✓ Token saved to Secret Manager")?;
    writeln!(out)?;
    writeln!(out, "✅ All set! The service should work now.")?;
    writeln!(out)?;
    writeln!(out, "Next steps:")?;
    writeln!(out, "1. Wait ~30 seconds for Cloud Run to reload")?;
    if let Some(url) = &settings.health_check_url {
        writeln!(out, "2. Verify: curl {}", url)?;
    }
    Ok(())
}
