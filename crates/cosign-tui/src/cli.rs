//! Command-line arguments.

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use cosign_app::{Invite, InviteError, ParticipantRole};
use cosign_client::NegotiationConfig;
use cosign_core::{DocumentConfig, SystemEnv, env::Environment};
use cosign_proto::SessionId;

/// Cosign terminal client
#[derive(Parser, Debug)]
#[command(name = "cosign-tui")]
#[command(about = "Shared document annotation over a direct peer connection")]
#[command(version)]
pub struct Args {
    /// Relay address
    #[arg(short, long, default_value = "127.0.0.1:4433")]
    pub relay: String,

    /// Session to join. A fresh one is generated if omitted.
    #[arg(short, long, conflicts_with = "invite")]
    pub session: Option<String>,

    /// Invite reference (`cosign://relay/session?role=guest`).
    ///
    /// Overrides --relay, --session and --role.
    #[arg(short, long)]
    pub invite: Option<String>,

    /// Role in the session
    #[arg(long, default_value = "controller")]
    pub role: ParticipantRole,

    /// Pages in the document
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u32).range(1..))]
    pub pages: u32,

    /// Give up negotiating after this many seconds
    #[arg(long)]
    pub negotiation_timeout: Option<u64>,

    /// Write logs to this file (the terminal is taken by the UI)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Session reference for this run.
    pub fn session_invite(&self) -> Result<Invite, InviteError> {
        if let Some(invite) = &self.invite {
            return invite.parse();
        }

        let session_id = match &self.session {
            Some(session) => SessionId::new(session.as_str())?,
            None => SystemEnv::new().random_session_id(),
        };

        Ok(Invite { relay: self.relay.clone(), session_id, role: self.role })
    }

    /// Document geometry for this run.
    pub fn document_config(&self) -> DocumentConfig {
        DocumentConfig { page_count: self.pages, ..DocumentConfig::default() }
    }

    /// Negotiator settings for this run.
    pub fn negotiation_config(&self) -> NegotiationConfig {
        NegotiationConfig { negotiation_timeout: self.negotiation_timeout.map(Duration::from_secs) }
    }
}
