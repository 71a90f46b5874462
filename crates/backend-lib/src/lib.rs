// ============================
// crates/backend-lib/src/lib.rs
// ============================
//! Core backend-lib functionality for the Codemeet collaboration server.

pub mod auth;
pub mod broadcast;
pub mod chat;
pub mod config;
pub mod error;
pub mod language;
pub mod metrics;
pub mod proxy;
pub mod room;
pub mod sandbox;
pub mod transcript;
pub mod validation;
pub mod websocket;
pub mod ws_router;

use crate::auth::{CredentialService, InMemoryCredentials};
use crate::broadcast::BroadcastRouter;
use crate::chat::ChatLog;
use crate::config::Settings;
use crate::room::RoomRegistry;
use crate::sandbox::SandboxManager;
use crate::transcript::FlatFileTranscript;
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    /// Settings manager
    pub settings: Arc<Settings>,
    /// Room registry (presence + document store)
    pub rooms: RoomRegistry,
    /// Per-room chat history
    pub chat: ChatLog,
    /// Event fan-out to connections
    pub router: BroadcastRouter,
    /// Per-connection execution sessions
    pub sandbox: SandboxManager,
    /// Credential service
    pub auth: Arc<dyn CredentialService>,
    /// Client for the statistics proxy
    pub http: reqwest::Client,
}

impl AppState {
    /// Create a new application state
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        let transcript = Arc::new(FlatFileTranscript::new(&settings.logs_dir)?);
        let sandbox = SandboxManager::new(&settings.temp_dir, transcript)?;

        Ok(Self {
            settings: Arc::new(settings),
            rooms: RoomRegistry::new(),
            chat: ChatLog::new(),
            router: BroadcastRouter::new(),
            sandbox,
            auth: Arc::new(InMemoryCredentials::new()),
            http: reqwest::Client::new(),
        })
    }
}
