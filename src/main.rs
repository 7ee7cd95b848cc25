mod auth;
mod config;
mod debug;
mod gmail;
mod renew;
mod report;
mod secrets;

use std::io;

use anyhow::Result;

use auth::InstalledFlowMinter;
use secrets::GcloudSecretStore;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        crate::debug_log!("main: run failed: {:#}", e);
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let settings = config::load_settings()?;
    debug::init(
        config::debug_enabled(|key| std::env::var(key).ok()),
        &settings.project,
    );
    crate::debug_log!(
        "run: project={} port={}",
        settings.project,
        settings.redirect_port
    );

    let store = GcloudSecretStore::from_settings(&settings);
    crate::debug_log!("run: using gcloud at {}", store.program().display());
    let minter = InstalledFlowMinter::new(settings.redirect_port);

    // Not locked: the flow delegate may also read stdin for a pasted code
    let mut input = io::BufReader::new(io::stdin());
    let mut stdout = io::stdout();

    let outcome = renew::run(&settings, &store, &minter, &mut input, &mut stdout).await?;
    crate::debug_log!("run: finished with {:?}", outcome);

    Ok(())
}
