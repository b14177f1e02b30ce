//! Conversion worker
//!
//! A bounded FIFO queue drained by exactly one consumer task. The consumer
//! owns the [`RateStore`], so every rate lookup and refresh is serialized
//! without a lock, and a slow fetch only delays the queue, never the
//! transport's message path.

use crate::error::{BotError, Result};
use crate::rates::RateStore;
use crate::replies;
use crate::response::ResponseChannel;
use std::sync::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// One conversion request, consumed exactly once
#[derive(Debug)]
pub struct ConversionJob {
    /// Where the result goes
    pub reply: ResponseChannel,
    pub amount: u64,
    pub base: String,
    pub target: String,
}

impl ConversionJob {
    pub fn new(
        reply: ResponseChannel,
        amount: u64,
        base: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            reply,
            amount,
            base: base.into(),
            target: target.into(),
        }
    }
}

/// Bounded queue plus its single consumer
pub struct ConversionWorker {
    sender: Mutex<Option<mpsc::Sender<ConversionJob>>>,
    consumer: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    capacity: usize,
}

impl ConversionWorker {
    /// Start the consumer task; must be called inside a Tokio runtime
    pub fn spawn(store: RateStore, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        let consumer = tokio::spawn(consume(store, receiver));

        Self {
            sender: Mutex::new(Some(sender)),
            consumer: tokio::sync::Mutex::new(Some(consumer)),
            capacity,
        }
    }

    /// Queue `job` without waiting
    ///
    /// Fails with [`BotError::QueueFull`] when the queue is at capacity and
    /// with [`BotError::WorkerStopped`] after [`ConversionWorker::shutdown`].
    pub fn enqueue(&self, job: ConversionJob) -> Result<()> {
        let guard = self
            .sender
            .lock()
            .map_err(|e| BotError::Other(format!("Lock error: {e}")))?;
        let sender = guard.as_ref().ok_or(BotError::WorkerStopped)?;

        debug!("pushed to conversion queue: {} {} {}", job.amount, job.base, job.target);

        sender.try_send(job).map_err(|e| match e {
            TrySendError::Full(_) => BotError::QueueFull {
                capacity: self.capacity,
            },
            TrySendError::Closed(_) => BotError::WorkerStopped,
        })
    }

    /// Jobs waiting in the queue, not counting the one being processed
    pub fn pending(&self) -> usize {
        self.sender
            .lock()
            .ok()
            .and_then(|guard| {
                guard
                    .as_ref()
                    .map(|sender| sender.max_capacity() - sender.capacity())
            })
            .unwrap_or(0)
    }

    /// Whether new jobs are still accepted
    pub fn is_accepting(&self) -> bool {
        self.sender
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Stop accepting jobs, process everything already queued, then stop
    /// the consumer
    ///
    /// Later calls return immediately.
    pub async fn shutdown(&self) -> Result<()> {
        {
            let mut guard = self
                .sender
                .lock()
                .map_err(|e| BotError::Other(format!("Lock error: {e}")))?;
            // Dropping the only sender lets the consumer drain and exit.
            guard.take();
        }

        let handle = self.consumer.lock().await.take();
        if let Some(handle) = handle {
            handle
                .await
                .map_err(|e| BotError::Other(format!("Conversion worker panicked: {e}")))?;
        }

        Ok(())
    }
}

async fn consume(mut store: RateStore, mut receiver: mpsc::Receiver<ConversionJob>) {
    info!("Conversion worker started");

    while let Some(job) = receiver.recv().await {
        process(&mut store, job).await;
    }

    info!("Conversion worker drained and stopped");
}

async fn process(store: &mut RateStore, job: ConversionJob) {
    let ConversionJob {
        reply,
        amount,
        base,
        target,
    } = job;

    let delivered = match store.convert(amount, &base, &target).await {
        Ok(value) => {
            reply
                .send(&replies::conversion(amount, &base, value, &target))
                .await
        }
        Err(e) => {
            error!("Conversion of {} {} to {} failed: {}", amount, base, target, e);
            reply
                .error(&replies::conversion_failed(amount, &base, &target))
                .await
        }
    };

    if let Err(e) = delivered {
        warn!(
            "Failed to deliver reply to {}: {}",
            reply.target().destination(),
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::ReplyTarget;
    use crate::testing::{FakeRateSource, FakeTransport};
    use fxchat_core::RateSource;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn channel(transport: &Arc<FakeTransport>, to: &str) -> ResponseChannel {
        ResponseChannel::new(
            Arc::clone(transport) as Arc<dyn fxchat_core::Transport>,
            ReplyTarget::DirectChat { to: to.to_string() },
        )
    }

    fn worker_with(source: &Arc<FakeRateSource>, capacity: usize) -> ConversionWorker {
        let store = RateStore::new(
            Arc::clone(source) as Arc<dyn RateSource>,
            Duration::from_secs(1800),
        );
        ConversionWorker::spawn(store, capacity)
    }

    #[tokio::test]
    async fn test_conversion_reply() {
        let source = Arc::new(FakeRateSource::new().with_rate("USD", "JPY", 110.0));
        let transport = Arc::new(FakeTransport::new());
        let worker = worker_with(&source, 10);

        assert_ok!(worker.enqueue(ConversionJob::new(
            channel(&transport, "alice@example.org"),
            1000,
            "USD",
            "JPY"
        )));

        let sent = transport.wait_for_sent(1).await;
        assert_eq!(sent, vec!["1000 USD = 110000 JPY".to_string()]);
        assert_eq!(transport.sent()[0].0, "alice@example.org");
    }

    #[tokio::test]
    async fn test_jobs_are_replied_in_enqueue_order() {
        let source = Arc::new(
            FakeRateSource::new()
                .with_rate("USD", "JPY", 100.0)
                .with_rate("EUR", "JPY", 200.0),
        );
        let transport = Arc::new(FakeTransport::new());
        let worker = worker_with(&source, 10);

        for (amount, base, to) in [(1, "USD", "a@x"), (2, "EUR", "b@x"), (3, "USD", "a@x")] {
            assert_ok!(worker.enqueue(ConversionJob::new(channel(&transport, to), amount, base, "JPY")));
        }

        let sent = transport.wait_for_sent(3).await;
        assert_eq!(
            sent,
            vec![
                "1 USD = 100 JPY".to_string(),
                "2 EUR = 400 JPY".to_string(),
                "3 USD = 300 JPY".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_the_loop() {
        let source = Arc::new(FakeRateSource::new().with_rate("USD", "JPY", 110.0));
        let transport = Arc::new(FakeTransport::new());
        let worker = worker_with(&source, 10);

        // No table for GBP: the fetch fails
        assert_ok!(worker.enqueue(ConversionJob::new(channel(&transport, "a@x"), 5, "GBP", "JPY")));
        assert_ok!(worker.enqueue(ConversionJob::new(channel(&transport, "a@x"), 1, "USD", "JPY")));

        let sent = transport.wait_for_sent(2).await;
        assert!(sent[0].starts_with("ERROR: "));
        assert_eq!(sent[1], "1 USD = 110 JPY");
    }

    #[tokio::test]
    async fn test_identical_requests_fetch_once() {
        let source = Arc::new(FakeRateSource::new().with_rate("USD", "JPY", 110.0));
        let transport = Arc::new(FakeTransport::new());
        let worker = worker_with(&source, 10);

        for _ in 0..2 {
            assert_ok!(worker.enqueue(ConversionJob::new(channel(&transport, "a@x"), 10, "USD", "JPY")));
        }

        transport.wait_for_sent(2).await;
        assert_eq!(source.fetches("USD"), 1);
    }

    #[tokio::test]
    async fn test_full_queue_rejects_immediately() {
        let (source, gate) = FakeRateSource::new().with_rate("USD", "JPY", 110.0).gated();
        let source = Arc::new(source);
        let transport = Arc::new(FakeTransport::new());
        let worker = worker_with(&source, 2);

        // First job occupies the consumer inside the gated fetch
        assert_ok!(worker.enqueue(ConversionJob::new(channel(&transport, "a@x"), 1, "USD", "JPY")));
        source.fetch_started().await;

        assert_ok!(worker.enqueue(ConversionJob::new(channel(&transport, "a@x"), 2, "USD", "JPY")));
        assert_ok!(worker.enqueue(ConversionJob::new(channel(&transport, "a@x"), 3, "USD", "JPY")));
        assert_eq!(worker.pending(), 2);

        let err = assert_err!(worker.enqueue(ConversionJob::new(
            channel(&transport, "a@x"),
            4,
            "USD",
            "JPY"
        )));
        assert!(matches!(err, BotError::QueueFull { capacity: 2 }));

        gate.add_permits(10);
        assert_ok!(worker.shutdown().await);
        assert_eq!(transport.sent().len(), 3);
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let (source, gate) = FakeRateSource::new().with_rate("USD", "JPY", 110.0).gated();
        let source = Arc::new(source);
        let transport = Arc::new(FakeTransport::new());
        let worker = Arc::new(worker_with(&source, 10));

        for amount in 1..=3 {
            assert_ok!(worker.enqueue(ConversionJob::new(channel(&transport, "a@x"), amount, "USD", "JPY")));
        }

        let shutdown = tokio::spawn({
            let worker = Arc::clone(&worker);
            async move { worker.shutdown().await }
        });

        // Shutdown waits for queued work
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!shutdown.is_finished());
        assert!(!worker.is_accepting());

        gate.add_permits(10);
        assert_ok!(shutdown.await.unwrap());

        assert_eq!(
            transport.sent_bodies(),
            vec![
                "1 USD = 110 JPY".to_string(),
                "2 USD = 220 JPY".to_string(),
                "3 USD = 330 JPY".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_fails() {
        let source = Arc::new(FakeRateSource::new().with_rate("USD", "JPY", 110.0));
        let transport = Arc::new(FakeTransport::new());
        let worker = worker_with(&source, 10);

        assert_ok!(worker.shutdown().await);
        assert_ok!(worker.shutdown().await);

        let err = assert_err!(worker.enqueue(ConversionJob::new(channel(&transport, "a@x"), 1, "USD", "JPY")));
        assert!(matches!(err, BotError::WorkerStopped));
        assert_eq!(worker.pending(), 0);
    }
}
