//! Bot assembly and process lifecycle

use crate::config::BotConfig;
use crate::error::{BotError, Result};
use crate::heartbeat::HeartbeatLoop;
use crate::rates::RateStore;
use crate::router::CommandRouter;
use crate::session::{SessionManager, SessionState};
use crate::worker::ConversionWorker;
use fxchat_core::{RateSource, Transport};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Running bot: session, heartbeat and conversion worker
pub struct FxBot {
    worker: Arc<ConversionWorker>,
    session: Arc<SessionManager>,
    heartbeat_stop: CancellationToken,
    heartbeat_task: Mutex<Option<JoinHandle<()>>>,
    session_task: Mutex<Option<JoinHandle<()>>>,
}

impl FxBot {
    /// Wire the components together and start the session and heartbeat
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(
        config: BotConfig,
        transport: Arc<dyn Transport>,
        source: Arc<dyn RateSource>,
    ) -> Self {
        info!(
            "Starting {} {} (PID: {})",
            crate::BOT_NAME,
            crate::VERSION,
            std::process::id()
        );

        let config = Arc::new(config);

        let store = match &config.currencies {
            Some(codes) => {
                let codes: BTreeSet<String> = codes.iter().map(|c| c.to_uppercase()).collect();
                RateStore::with_currencies(source, config.staleness_window, codes)
            }
            None => RateStore::new(source, config.staleness_window),
        };
        let currencies = store.shared_currencies();
        info!("{} supported currencies", currencies.len());

        let worker = Arc::new(ConversionWorker::spawn(store, config.queue_capacity));
        let router = Arc::new(CommandRouter::new(
            Arc::clone(&transport),
            Arc::clone(&worker),
            currencies,
            Arc::clone(&config),
        ));
        let session = Arc::new(SessionManager::new(
            Arc::clone(&transport),
            router,
            &config,
        ));

        let session_task = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.run().await }
        });

        let heartbeat = HeartbeatLoop::new(
            Arc::clone(&session),
            transport,
            config.heartbeat_interval,
        );
        let heartbeat_stop = CancellationToken::new();
        let heartbeat_task = tokio::spawn({
            let stop = heartbeat_stop.clone();
            async move { heartbeat.run(stop).await }
        });

        Self {
            worker,
            session,
            heartbeat_stop,
            heartbeat_task: Mutex::new(Some(heartbeat_task)),
            session_task: Mutex::new(Some(session_task)),
        }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Drop the current session and establish a new one
    pub fn reinitialize(&self) {
        info!("Re-initializing {}", crate::BOT_NAME);
        self.session.reinitialize();
    }

    /// Stop in order: heartbeat, conversion worker (drained), session
    ///
    /// Queued conversions are answered before the transport closes.
    pub async fn shutdown(&self) -> Result<()> {
        self.heartbeat_stop.cancel();
        if let Some(task) = self.heartbeat_task.lock().await.take() {
            task.await
                .map_err(|e| BotError::Other(format!("Heartbeat task failed: {e}")))?;
        }
        info!("Stopped heartbeat");

        self.worker.shutdown().await?;
        info!("Shut down currency converter");

        self.session.shutdown();
        if let Some(task) = self.session_task.lock().await.take() {
            task.await
                .map_err(|e| BotError::Other(format!("Session task failed: {e}")))?;
        }
        info!("Shut down session");

        info!("Shut down {} (PID: {})", crate::BOT_NAME, std::process::id());
        Ok(())
    }
}
