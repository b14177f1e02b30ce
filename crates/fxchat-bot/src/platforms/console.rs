//! Console transport
//!
//! Every non-empty input line is delivered as a chat message from
//! [`CONSOLE_SENDER`]; replies are written to the output one per line.
//! Useful for local runs and for poking at the command set without a
//! chat server.

use async_trait::async_trait;
use fxchat_core::{
    Credentials, Error, FaultHandler, InboundMessage, MessageHandler, Result, SoftwareVersion,
    Stage, SubscriptionHandler, Transport, TransportFault,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Sender address of console input
pub const CONSOLE_SENDER: &str = "console";

type Input = Box<dyn AsyncRead + Send + Unpin>;
type Output = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Default)]
struct Shared {
    connected: AtomicBool,
    message_handler: Mutex<Option<Arc<dyn MessageHandler>>>,
    fault_handler: Mutex<Option<Arc<dyn FaultHandler>>>,
}

impl Shared {
    fn message_handler(&self) -> Option<Arc<dyn MessageHandler>> {
        self.message_handler.lock().ok().and_then(|h| h.clone())
    }

    fn fault_handler(&self) -> Option<Arc<dyn FaultHandler>> {
        self.fault_handler.lock().ok().and_then(|h| h.clone())
    }
}

/// Transport over a line-oriented byte stream, stdin/stdout by default
pub struct ConsoleTransport {
    shared: Arc<Shared>,
    input: Mutex<Option<Input>>,
    output: tokio::sync::Mutex<Output>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl ConsoleTransport {
    pub fn new() -> Self {
        Self::with_io(tokio::io::stdin(), tokio::io::stdout())
    }

    pub fn with_io(
        input: impl AsyncRead + Send + Unpin + 'static,
        output: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            input: Mutex::new(Some(Box::new(input))),
            output: tokio::sync::Mutex::new(Box::new(output)),
            reader: Mutex::new(None),
        }
    }
}

impl Default for ConsoleTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConsoleTransport {
    fn drop(&mut self) {
        if let Some(handle) = self.reader.lock().ok().and_then(|mut r| r.take()) {
            handle.abort();
        }
    }
}

/// Feed input lines to the message handler until the input ends
///
/// The input is read once for the life of the transport; lines arriving
/// while disconnected are dropped.
async fn read_lines(shared: Arc<Shared>, input: Input) {
    let mut lines = BufReader::new(input).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if !shared.connected.load(Ordering::SeqCst) {
                    debug!("Dropping console input while disconnected");
                    continue;
                }
                match shared.message_handler() {
                    Some(handler) => {
                        handler
                            .on_message(InboundMessage::chat(CONSOLE_SENDER, line))
                            .await;
                    }
                    None => debug!("No message handler, dropping console input"),
                }
            }
            Ok(None) => {
                info!("Console input closed");
                break;
            }
            Err(e) => {
                shared.connected.store(false, Ordering::SeqCst);
                if let Some(handler) = shared.fault_handler() {
                    handler.on_fault(TransportFault::new(Stage::Session, e.to_string()));
                }
                break;
            }
        }
    }
}

fn lock_error(stage: Stage) -> Error {
    Error::transport(stage, "console state poisoned")
}

#[async_trait]
impl Transport for ConsoleTransport {
    async fn connect(&self) -> Result<()> {
        let input = self
            .input
            .lock()
            .map_err(|_| lock_error(Stage::Connect))?
            .take();

        if let Some(input) = input {
            let handle = tokio::spawn(read_lines(Arc::clone(&self.shared), input));
            *self.reader.lock().map_err(|_| lock_error(Stage::Connect))? = Some(handle);
        }

        self.shared.connected.store(true, Ordering::SeqCst);
        debug!("Console connected");
        Ok(())
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<()> {
        if credentials.jid.is_empty() {
            return Err(Error::transport(Stage::Authenticate, "empty JID"));
        }
        info!("Console session for {}", credentials.jid);
        Ok(())
    }

    async fn send_presence(&self, available: bool) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::transport(Stage::Presence, "not connected"));
        }
        debug!("Presence: {}", if available { "available" } else { "unavailable" });
        Ok(())
    }

    async fn send_message(&self, to: &str, body: &str) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::transport(Stage::Session, "not connected"));
        }
        debug!("Reply to {}", to);

        let mut output = self.output.lock().await;
        let line = format!("{body}\n");
        output
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::transport(Stage::Session, e.to_string()))?;
        output
            .flush()
            .await
            .map_err(|e| Error::transport(Stage::Session, e.to_string()))
    }

    async fn accept_subscription(&self, from: &str) -> Result<()> {
        info!("Accepted subscription from {}", from);
        Ok(())
    }

    fn register_message_handler(&self, handler: Arc<dyn MessageHandler>) {
        match self.shared.message_handler.lock() {
            Ok(mut slot) => *slot = Some(handler),
            Err(e) => warn!("Failed to register message handler: {}", e),
        }
    }

    fn register_subscription_handler(&self, _handler: Arc<dyn SubscriptionHandler>) {
        debug!("Console has no roster, subscription handler unused");
    }

    fn register_fault_handler(&self, handler: Arc<dyn FaultHandler>) {
        match self.shared.fault_handler.lock() {
            Ok(mut slot) => *slot = Some(handler),
            Err(e) => warn!("Failed to register fault handler: {}", e),
        }
    }

    fn register_version(&self, version: &SoftwareVersion) {
        info!("{} {}", version.name, version.version);
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) -> Result<()> {
        self.shared.connected.store(false, Ordering::SeqCst);
        debug!("Console disconnected");
        Ok(())
    }
}
