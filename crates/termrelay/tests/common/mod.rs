//! Test utilities and common setup.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;

use axum::Router;
use tempfile::TempDir;
use termrelay::api::{self, AppState};
use termrelay::config::AppConfig;
use tokio::net::TcpListener;

/// Configuration that runs submissions with `/bin/sh` inside `root`.
pub fn shell_config(root: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.interpreter.program = "/bin/sh".to_string();
    config.interpreter.args = Vec::new();
    config.interpreter.script_name = "main.sh".to_string();
    config.workspace.root = Some(root.display().to_string());
    config.workspace.prefix = "test-".to_string();
    config
}

/// Configuration that runs submissions with the real Python interpreter.
pub fn python_config(root: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.workspace.root = Some(root.display().to_string());
    config.workspace.prefix = "test-".to_string();
    config
}

/// Whether `python3` can be started on this machine.
pub fn python_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

/// Build a router from `config`.
pub fn test_app(config: AppConfig) -> Router {
    let state = AppState::new(config).unwrap();
    api::create_router(state)
}

/// A server listening on an ephemeral local port, with its own workspace root.
pub struct TestServer {
    pub addr: SocketAddr,
    pub root: TempDir,
}

impl TestServer {
    pub async fn start_with(make_config: impl FnOnce(&Path) -> AppConfig) -> Self {
        let root = tempfile::tempdir().unwrap();
        let app = test_app(make_config(root.path()));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, root }
    }

    pub async fn start() -> Self {
        Self::start_with(shell_config).await
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws/terminal", self.addr)
    }

    /// Number of session directories currently under the workspace root.
    pub fn workspace_count(&self) -> usize {
        std::fs::read_dir(self.root.path()).unwrap().count()
    }
}
