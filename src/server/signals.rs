// Unix signal handling for the query server

use crate::error::{ArticleCraftError, Result};
use tokio::signal::unix::{signal, Signal as TokioSignal, SignalKind};

/// What a received signal asks the server to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    Shutdown,
    Reload,
}

pub struct SignalHandler {
    sigterm: TokioSignal,
    sigint: TokioSignal,
    sighup: TokioSignal,
    sigusr1: TokioSignal,
}

impl SignalHandler {
    /// Install handlers for SIGTERM, SIGINT, SIGHUP and SIGUSR1
    pub fn new() -> Result<Self> {
        let install = |kind: SignalKind, name: &str| {
            signal(kind).map_err(|e| {
                ArticleCraftError::io(e, format!("Failed to setup {} handler", name))
            })
        };

        Ok(Self {
            sigterm: install(SignalKind::terminate(), "SIGTERM")?,
            sigint: install(SignalKind::interrupt(), "SIGINT")?,
            sighup: install(SignalKind::hangup(), "SIGHUP")?,
            sigusr1: install(SignalKind::user_defined1(), "SIGUSR1")?,
        })
    }

    /// Wait for the next signal
    pub async fn wait(&mut self) -> SignalAction {
        tokio::select! {
            _ = self.sigterm.recv() => {
                tracing::info!("Received SIGTERM");
                SignalAction::Shutdown
            }
            _ = self.sigint.recv() => {
                tracing::info!("Received SIGINT");
                SignalAction::Shutdown
            }
            _ = self.sighup.recv() => {
                tracing::info!("Received SIGHUP");
                SignalAction::Shutdown
            }
            _ = self.sigusr1.recv() => {
                tracing::info!("Received SIGUSR1");
                SignalAction::Reload
            }
        }
    }
}
