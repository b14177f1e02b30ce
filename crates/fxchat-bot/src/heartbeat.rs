//! Periodic presence re-announcement

use crate::session::SessionManager;
use fxchat_core::Transport;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Outcome of one heartbeat tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Beat {
    /// Presence re-sent
    Announced,
    /// Session not active or transport down; nothing sent
    Lost,
    /// Presence send failed
    Failed,
}

/// Re-sends presence while the session is active
///
/// The loop only observes: recovery belongs to the session's fault path.
pub struct HeartbeatLoop {
    session: Arc<SessionManager>,
    transport: Arc<dyn Transport>,
    interval: Duration,
}

impl HeartbeatLoop {
    pub fn new(
        session: Arc<SessionManager>,
        transport: Arc<dyn Transport>,
        interval: Duration,
    ) -> Self {
        Self {
            session,
            transport,
            interval,
        }
    }

    /// Run one tick
    pub async fn beat(&self) -> Beat {
        if !(self.session.is_active() && self.transport.is_connected()) {
            warn!("Heartbeat: lost connection");
            return Beat::Lost;
        }

        match self.transport.send_presence(true).await {
            Ok(()) => {
                debug!("Heartbeat: presence sent");
                Beat::Announced
            }
            Err(e) => {
                error!("Heartbeat: {}", e);
                Beat::Failed
            }
        }
    }

    /// Tick every interval until `shutdown` is cancelled
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.beat().await;
                }
            }
        }

        debug!("Heartbeat stopped");
    }
}
