//! Application state shared across handlers.

use std::sync::Arc;

use anyhow::Result;

use crate::config::AppConfig;
use crate::session::SessionConfig;

#[derive(Clone)]
pub struct AppState {
    /// Effective configuration.
    pub config: Arc<AppConfig>,
    /// Settings handed to every terminal session and evaluation.
    pub sessions: Arc<SessionConfig>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self> {
        let sessions = SessionConfig::from_app(&config)?;
        Ok(Self {
            config: Arc::new(config),
            sessions: Arc::new(sessions),
        })
    }

    /// Capacity of each connection's outbound message queue.
    pub fn outbound_buffer(&self) -> usize {
        self.config.relay.outbound_buffer.max(1)
    }
}
