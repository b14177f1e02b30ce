//! Session lifecycle
//!
//! The session walks an explicit state machine:
//!
//! ```text
//! Disconnected -> Connecting -> Authenticating -> Registered -> Active
//!       ^             |               |               |          |
//!       +---- Failed -+---------------+---------------+          |
//!                     ^                                          |
//!                     +------------- Fault / Reinitialize -------+
//! ```
//!
//! Any state except `Shutdown` moves to `Connecting` on a transport fault
//! or a re-initialize request, and to `Shutdown` on request. `Shutdown` is
//! terminal. [`SessionManager::run`] is the only writer of the state.

use crate::config::BotConfig;
use crate::replies::BOT_NAME;
use async_trait::async_trait;
use fxchat_core::{
    Credentials, Error, FaultHandler, MessageHandler, SoftwareVersion, Stage,
    SubscriptionHandler, SubscriptionKind, SubscriptionRequest, Transport, TransportFault,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle state of the chat session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticating,
    /// Handlers attached, initial presence pending
    Registered,
    Active,
    Shutdown,
}

/// Input to the session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Start (or retry) the lifecycle
    Connect,
    Connected,
    Authenticated,
    /// Initial presence went out
    Announced,
    /// A lifecycle step failed
    Failed,
    /// The transport reported a fault
    Fault,
    /// Operator asked for a fresh session
    Reinitialize,
    Shutdown,
}

impl SessionState {
    /// Transition table; `None` when `event` is not valid in this state
    pub fn on(self, event: SessionEvent) -> Option<SessionState> {
        use SessionEvent as E;
        use SessionState as S;

        match (self, event) {
            (S::Shutdown, _) => None,
            (_, E::Shutdown) => Some(S::Shutdown),
            (_, E::Fault | E::Reinitialize) => Some(S::Connecting),
            (S::Disconnected, E::Connect) => Some(S::Connecting),
            (S::Connecting, E::Connected) => Some(S::Authenticating),
            (S::Authenticating, E::Authenticated) => Some(S::Registered),
            (S::Registered, E::Announced) => Some(S::Active),
            (S::Connecting | S::Authenticating | S::Registered, E::Failed) => {
                Some(S::Disconnected)
            }
            _ => None,
        }
    }
}

/// Requests delivered to the supervisor loop
#[derive(Debug)]
enum SessionControl {
    Fault(TransportFault),
    Reinitialize,
}

/// Forwards transport faults to the supervisor
struct FaultForwarder {
    control: mpsc::UnboundedSender<SessionControl>,
}

impl FaultHandler for FaultForwarder {
    fn on_fault(&self, fault: TransportFault) {
        error!("{}", fault);
        if self.control.send(SessionControl::Fault(fault)).is_err() {
            debug!("Session supervisor gone, fault dropped");
        }
    }
}

/// Accepts every subscription request
///
/// There is no allow or deny list: anyone may add the bot.
pub struct SubscriptionAcceptor {
    transport: Arc<dyn Transport>,
}

impl SubscriptionAcceptor {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl SubscriptionHandler for SubscriptionAcceptor {
    async fn on_subscription(&self, request: SubscriptionRequest) {
        match request.kind {
            SubscriptionKind::Subscribe | SubscriptionKind::SubscribedFrom => {
                info!("Subscription request from {}", request.from);
                if let Err(e) = self.transport.accept_subscription(&request.from).await {
                    warn!("Failed to accept subscription from {}: {}", request.from, e);
                }
            }
            SubscriptionKind::Unsubscribe => {
                info!("Unsubscription request from {}", request.from);
            }
        }
    }
}

/// Owns the connection lifecycle and recovers it after faults
pub struct SessionManager {
    transport: Arc<dyn Transport>,
    credentials: Credentials,
    message_handler: Arc<dyn MessageHandler>,
    version: SoftwareVersion,
    reconnect_delay: Duration,
    state: watch::Sender<SessionState>,
    control_tx: mpsc::UnboundedSender<SessionControl>,
    control_rx: Mutex<mpsc::UnboundedReceiver<SessionControl>>,
    shutdown: CancellationToken,
}

impl SessionManager {
    /// Create a manager routing inbound messages to `message_handler`
    pub fn new(
        transport: Arc<dyn Transport>,
        message_handler: Arc<dyn MessageHandler>,
        config: &BotConfig,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        Self {
            transport,
            credentials: config.credentials(),
            message_handler,
            version: SoftwareVersion {
                name: BOT_NAME.to_string(),
                version: crate::VERSION.to_string(),
            },
            reconnect_delay: config.reconnect_delay,
            state,
            control_tx,
            control_rx: Mutex::new(control_rx),
            shutdown: CancellationToken::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch state changes
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Tear the session down and run the lifecycle again
    pub fn reinitialize(&self) {
        if self.control_tx.send(SessionControl::Reinitialize).is_err() {
            debug!("Session supervisor gone, re-initialize ignored");
        }
    }

    /// Stop the supervisor and close the transport
    ///
    /// [`SessionManager::run`] returns once the transport is closed.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Supervise the session until [`SessionManager::shutdown`]
    ///
    /// A failed lifecycle is retried after the configured reconnect delay,
    /// or at once when a fault or re-initialize request arrives.
    pub async fn run(&self) {
        let Ok(mut control) = self.control_rx.try_lock() else {
            warn!("Session supervisor already running");
            return;
        };

        let mut event = SessionEvent::Connect;

        loop {
            // Requests raised against the previous connection are moot now
            while control.try_recv().is_ok() {}

            if self.apply(event).is_none() {
                break;
            }

            let established = tokio::select! {
                () = self.shutdown.cancelled() => break,
                result = self.establish() => result,
            };

            if let Err(e) = established {
                error!("{}", e);
                self.apply(SessionEvent::Failed);
                self.close_transport().await;

                event = tokio::select! {
                    () = self.shutdown.cancelled() => break,
                    () = tokio::time::sleep(self.reconnect_delay) => SessionEvent::Connect,
                    request = control.recv() => match request {
                        Some(SessionControl::Reinitialize) => SessionEvent::Reinitialize,
                        Some(SessionControl::Fault(_)) => SessionEvent::Fault,
                        None => break,
                    },
                };
                continue;
            }

            info!("Start to receive messages");

            event = tokio::select! {
                () = self.shutdown.cancelled() => break,
                request = control.recv() => match request {
                    Some(SessionControl::Fault(fault)) => {
                        warn!("Restarting session after fault at {}", fault.stage);
                        SessionEvent::Fault
                    }
                    Some(SessionControl::Reinitialize) => {
                        info!("Re-initializing session");
                        SessionEvent::Reinitialize
                    }
                    None => break,
                },
            };

            self.close_transport().await;
        }

        self.apply(SessionEvent::Shutdown);
        self.close_transport().await;
        info!("Session stopped");
    }

    /// Connect, authenticate, register and announce; state is `Connecting`
    /// on entry and `Active` on success
    async fn establish(&self) -> fxchat_core::Result<()> {
        info!("Connecting as {}", self.credentials.jid);
        self.transport
            .connect()
            .await
            .map_err(|e| at_stage(Stage::Connect, e))?;
        self.apply(SessionEvent::Connected);
        info!("Connected to server as {}", self.credentials.jid);

        self.transport
            .authenticate(&self.credentials)
            .await
            .map_err(|e| at_stage(Stage::Authenticate, e))?;
        self.apply(SessionEvent::Authenticated);
        info!("Auth OK");

        self.register_handlers();

        self.transport
            .send_presence(true)
            .await
            .map_err(|e| at_stage(Stage::Presence, e))?;
        self.apply(SessionEvent::Announced);
        info!("Sent initial presence");

        Ok(())
    }

    fn register_handlers(&self) {
        self.transport
            .register_message_handler(Arc::clone(&self.message_handler));
        self.transport
            .register_subscription_handler(Arc::new(SubscriptionAcceptor::new(Arc::clone(
                &self.transport,
            ))));
        self.transport.register_fault_handler(Arc::new(FaultForwarder {
            control: self.control_tx.clone(),
        }));
        self.transport.register_version(&self.version);
        debug!("Registered handlers");
    }

    async fn close_transport(&self) {
        if let Err(e) = self.transport.disconnect().await {
            warn!("Disconnect failed: {}", e);
        }
    }

    fn apply(&self, event: SessionEvent) -> Option<SessionState> {
        let current = self.state();
        match current.on(event) {
            Some(next) => {
                self.state.send_replace(next);
                debug!("Session {:?} -> {:?} on {:?}", current, next, event);
                Some(next)
            }
            None => {
                warn!("Ignoring {:?} in session state {:?}", event, current);
                None
            }
        }
    }
}

/// Tag errors that do not already name their stage
fn at_stage(stage: Stage, err: Error) -> Error {
    match err {
        Error::Transport { .. } => err,
        other => Error::transport(stage, other.to_string()),
    }
}
