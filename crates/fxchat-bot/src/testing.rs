//! In-memory collaborators for unit tests

use async_trait::async_trait;
use fxchat_core::{
    Credentials, Error, FaultHandler, InboundMessage, MessageHandler, RateSource, RateTable,
    Result, SoftwareVersion, Stage, SubscriptionHandler, SubscriptionRequest, Transport,
    TransportFault,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

/// Rate source serving fixed tables and counting fetches per base
#[derive(Default)]
pub struct FakeRateSource {
    tables: Mutex<HashMap<String, RateTable>>,
    fetches: Mutex<HashMap<String, usize>>,
    failing: AtomicBool,
    gate: Option<Arc<Semaphore>>,
    started: Notify,
}

impl FakeRateSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(self, base: &str, target: &str, rate: f64) -> Self {
        self.tables
            .lock()
            .unwrap()
            .entry(base.to_string())
            .or_default()
            .insert(target.to_string(), rate);
        self
    }

    /// Make every fetch wait for a permit on the returned semaphore
    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn fetches(&self, base: &str) -> usize {
        self.fetches.lock().unwrap().get(base).copied().unwrap_or(0)
    }

    /// Resolves once a fetch has started
    pub async fn fetch_started(&self) {
        self.started.notified().await;
    }
}

#[async_trait]
impl RateSource for FakeRateSource {
    async fn fetch_rates(&self, base: &str) -> Result<RateTable> {
        *self
            .fetches
            .lock()
            .unwrap()
            .entry(base.to_string())
            .or_default() += 1;
        self.started.notify_one();

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::RateSource("service unavailable".to_string()));
        }

        self.tables
            .lock()
            .unwrap()
            .get(base)
            .cloned()
            .ok_or_else(|| Error::RateSource(format!("unsupported-code {base}")))
    }

    fn currencies(&self) -> BTreeSet<String> {
        let tables = self.tables.lock().unwrap();
        tables
            .iter()
            .flat_map(|(base, table)| std::iter::once(base.clone()).chain(table.keys().cloned()))
            .collect()
    }
}

/// Transport that records traffic and lets tests drive inbound events
#[derive(Default)]
pub struct FakeTransport {
    connected: AtomicBool,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    presences: AtomicUsize,
    failing_connects: AtomicUsize,
    sent: Mutex<Vec<(String, String)>>,
    accepted: Mutex<Vec<String>>,
    version: Mutex<Option<SoftwareVersion>>,
    message_handler: Mutex<Option<Arc<dyn MessageHandler>>>,
    subscription_handler: Mutex<Option<Arc<dyn SubscriptionHandler>>>,
    fault_handler: Mutex<Option<Arc<dyn FaultHandler>>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` connection attempts
    pub fn fail_connects(&self, n: usize) {
        self.failing_connects.store(n, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn presences(&self) -> usize {
        self.presences.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_bodies(&self) -> Vec<String> {
        self.sent().into_iter().map(|(_, body)| body).collect()
    }

    pub fn accepted(&self) -> Vec<String> {
        self.accepted.lock().unwrap().clone()
    }

    pub fn version(&self) -> Option<SoftwareVersion> {
        self.version.lock().unwrap().clone()
    }

    /// Deliver an inbound message to the registered handler
    pub async fn deliver(&self, message: InboundMessage) {
        let handler = self.message_handler.lock().unwrap().clone();
        handler.expect("no message handler registered").on_message(message).await;
    }

    /// Deliver a subscription event to the registered handler
    pub async fn deliver_subscription(&self, request: SubscriptionRequest) {
        let handler = self.subscription_handler.lock().unwrap().clone();
        handler
            .expect("no subscription handler registered")
            .on_subscription(request)
            .await;
    }

    /// Drop the connection and report it through the fault handler
    pub fn raise_fault(&self, message: &str) {
        self.connected.store(false, Ordering::SeqCst);
        let handler = self.fault_handler.lock().unwrap().clone();
        handler
            .expect("no fault handler registered")
            .on_fault(TransportFault::new(Stage::Session, message));
    }

    /// Wait until at least `count` messages were sent
    pub async fn wait_for_sent(&self, count: usize) -> Vec<String> {
        wait_until(|| self.sent.lock().unwrap().len() >= count).await;
        self.sent_bodies()
    }

    /// Wait until at least `count` presence broadcasts were sent
    pub async fn wait_for_presences(&self, count: usize) {
        wait_until(|| self.presences() >= count).await;
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failing_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_connects.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::transport(Stage::Connect, "connection refused"));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<()> {
        if credentials.password() == "wrong" {
            return Err(Error::transport(Stage::Authenticate, "not-authorized"));
        }
        Ok(())
    }

    async fn send_presence(&self, available: bool) -> Result<()> {
        if available {
            self.presences.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn send_message(&self, to: &str, body: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), body.to_string()));
        Ok(())
    }

    async fn accept_subscription(&self, from: &str) -> Result<()> {
        self.accepted.lock().unwrap().push(from.to_string());
        Ok(())
    }

    fn register_message_handler(&self, handler: Arc<dyn MessageHandler>) {
        *self.message_handler.lock().unwrap() = Some(handler);
    }

    fn register_subscription_handler(&self, handler: Arc<dyn SubscriptionHandler>) {
        *self.subscription_handler.lock().unwrap() = Some(handler);
    }

    fn register_fault_handler(&self, handler: Arc<dyn FaultHandler>) {
        *self.fault_handler.lock().unwrap() = Some(handler);
    }

    fn register_version(&self, version: &SoftwareVersion) {
        *self.version.lock().unwrap() = Some(version.clone());
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Poll `condition` until it holds, failing the test after two seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
