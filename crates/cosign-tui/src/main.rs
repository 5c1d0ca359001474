//! Cosign TUI entry point.
//!
//! # Usage
//!
//! ```bash
//! # Start a session as controller, then press `i` to copy the invite
//! cosign-tui --relay 127.0.0.1:4433
//!
//! # Join with the invite
//! cosign-tui --invite 'cosign://127.0.0.1:4433/<session>?role=guest'
//! ```

use std::{fs::File, sync::Mutex};

use clap::Parser;
use cosign_client::transport::TransportConfig;
use cosign_tui::{App, Runtime, TerminalDriver, cli::Args};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Without a log file nothing is logged: stdout belongs to the UI.
    let log_layer = match &args.log_file {
        Some(path) => {
            let file = File::create(path)?;
            Some(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        },
        None => None,
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(log_layer).with(filter).init();

    let invite = args.session_invite()?;
    let document = args.document_config();
    tracing::info!(%invite, "starting session");

    let mut app = App::new(invite, document.clone());
    app.set_status("i: copy invite | c/g/r: toggle/grant/revoke write access | arrows: pages | q: quit");

    let driver = TerminalDriver::new(TransportConfig::default(), &document)?;
    Runtime::new(driver, app, args.negotiation_config()).run().await?;

    Ok(())
}
