//! The queue-consuming worker loop.
//!
//! Owns the message lifecycle around the pipeline: long-poll, parse,
//! hand the Job to the handler, and acknowledge. Deleting the message
//! is the only acknowledgement, and it happens exactly once, only
//! after a terminal outcome. A failed Job is never deleted here; the
//! queue's visibility window drives redelivery and the dead-letter
//! policy drains what never succeeds.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use atelier_core::error::PipelineError;
use atelier_core::job::{Job, TaskEnvelope};
use atelier_core::outcome::PipelineOutcome;
use atelier_notify::Notifier;
use atelier_pipeline::delivery::failure_message;
use atelier_pipeline::Orchestrator;
use atelier_queue::{JobQueue, QueueMessage};

/// Long-poll wait per receive call.
const POLL_WAIT_SECS: u32 = 20;

/// Pause after a queue receive error before the next attempt.
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Seam between the worker loop and the pipeline, so loop behavior is
/// testable without real backends.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, job: &Job) -> Result<PipelineOutcome, PipelineError>;
}

#[async_trait]
impl JobHandler for Orchestrator {
    async fn run(&self, job: &Job) -> Result<PipelineOutcome, PipelineError> {
        Orchestrator::run(self, job).await
    }
}

/// What processing one message concluded.
#[derive(Debug, PartialEq, Eq)]
enum MessageDisposition {
    /// Terminal outcome reached; the message was acknowledged.
    Done,
    /// Left on the queue for redelivery.
    Retry,
    /// Left on the queue with the user already informed; the
    /// dead-letter policy will drain it.
    GaveUp,
}

pub struct Worker {
    queue: Arc<dyn JobQueue>,
    handler: Arc<dyn JobHandler>,
    notifier: Arc<dyn Notifier>,
    concurrency: usize,
    max_retries: u32,
    retry_delay_secs: u32,
    processed: AtomicU64,
    errored: AtomicU64,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        handler: Arc<dyn JobHandler>,
        notifier: Arc<dyn Notifier>,
        concurrency: usize,
        max_retries: u32,
        retry_delay_secs: u32,
    ) -> Self {
        Self {
            queue,
            handler,
            notifier,
            concurrency: concurrency.max(1),
            max_retries: max_retries.max(1),
            retry_delay_secs,
            processed: AtomicU64::new(0),
            errored: AtomicU64::new(0),
        }
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn errored(&self) -> u64 {
        self.errored.load(Ordering::Relaxed)
    }

    /// Consume until cancelled. In-flight messages finish before the
    /// loop exits.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(concurrency = self.concurrency, "worker started");
        loop {
            let batch = tokio::select! {
                _ = cancel.cancelled() => break,
                batch = self.queue.receive(self.concurrency as u32, POLL_WAIT_SECS) => batch,
            };

            match batch {
                Ok(messages) => {
                    let _ = futures::future::join_all(
                        messages.iter().map(|m| self.handle_message(m)),
                    )
                    .await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "queue receive failed");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(RECEIVE_ERROR_BACKOFF) => {}
                    }
                }
            }
        }
        tracing::info!(
            processed = self.processed(),
            errored = self.errored(),
            "worker stopped"
        );
    }

    /// One receive-and-process cycle; returns how many messages were
    /// handled.
    pub async fn poll_once(&self) -> Result<usize, atelier_queue::QueueError> {
        let messages = self.queue.receive(self.concurrency as u32, 0).await?;
        let count = messages.len();
        let _ =
            futures::future::join_all(messages.iter().map(|m| self.handle_message(m))).await;
        Ok(count)
    }

    async fn handle_message(&self, message: &QueueMessage) -> MessageDisposition {
        let job = match parse_job(&message.body) {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(
                    message_id = %message.message_id,
                    error = %e,
                    "unparseable queue message"
                );
                self.errored.fetch_add(1, Ordering::Relaxed);
                if message.receive_count <= 1 {
                    self.notify_failure(user_id_from_body(&message.body), &e.to_string())
                        .await;
                } else {
                    self.postpone_redelivery(message).await;
                }
                return MessageDisposition::GaveUp;
            }
        };

        tracing::info!(
            job_id = %job.job_id,
            user_id = job.user_id,
            attempt = message.receive_count,
            "processing job"
        );

        match self.handler.run(&job).await {
            Ok(outcome) => {
                self.processed.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = self.queue.delete(&message.receipt_handle).await {
                    // The next redelivery re-runs an idempotent
                    // pipeline; losing the ack costs work, not
                    // correctness.
                    tracing::warn!(job_id = %job.job_id, error = %e, "acknowledge failed");
                }
                tracing::info!(job_id = %job.job_id, status = ?outcome.status, "job done");
                MessageDisposition::Done
            }
            Err(e) if e.is_retryable() && message.receive_count < self.max_retries => {
                self.errored.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    job_id = %job.job_id,
                    attempt = message.receive_count,
                    error = %e,
                    "job failed, leaving for redelivery"
                );
                self.postpone_redelivery(message).await;
                MessageDisposition::Retry
            }
            Err(e) => {
                // Fatal error, or the retry budget is spent. The user
                // hears about it once; the message stays for the
                // dead-letter policy, with later redeliveries pushed
                // out instead of re-notified.
                self.errored.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    job_id = %job.job_id,
                    attempt = message.receive_count,
                    error = %e,
                    "job failed terminally"
                );
                let first_terminal_delivery = if e.is_retryable() {
                    message.receive_count <= self.max_retries.max(1)
                } else {
                    message.receive_count <= 1
                };
                if first_terminal_delivery {
                    self.notify_failure(Some(job.user_id), &e.to_string()).await;
                } else {
                    self.postpone_redelivery(message).await;
                }
                MessageDisposition::GaveUp
            }
        }
    }

    /// Push the next redelivery out, backing off linearly with the
    /// attempt number.
    async fn postpone_redelivery(&self, message: &QueueMessage) {
        let delay = self.retry_delay_secs.saturating_mul(message.receive_count);
        if let Err(e) = self
            .queue
            .postpone(&message.receipt_handle, delay)
            .await
        {
            tracing::warn!(
                message_id = %message.message_id,
                error = %e,
                "could not postpone redelivery"
            );
        }
    }

    async fn notify_failure(&self, user_id: Option<i64>, error: &str) {
        let Some(chat_id) = user_id else {
            tracing::warn!("no user id recoverable, skipping failure notification");
            return;
        };
        if let Err(e) = self
            .notifier
            .send_message(chat_id, &failure_message(error))
            .await
        {
            tracing::warn!(chat_id, error = %e, "failure notification not sent");
        }
    }
}

/// Parse a queue message body into a Job.
fn parse_job(body: &str) -> Result<Job, PipelineError> {
    let envelope: TaskEnvelope = serde_json::from_str(body)
        .map_err(|e| PipelineError::Validation(format!("malformed task body: {e}")))?;
    envelope.into_job()
}

/// Best-effort user id extraction from a possibly malformed body, so
/// even a broken order can produce a user-facing failure notice.
fn user_id_from_body(body: &str) -> Option<i64> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value.get("data")?.get("user_id")?.as_i64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    use atelier_core::outcome::OutcomeStatus;
    use atelier_notify::NotifyError;
    use atelier_queue::QueueError;

    // ---- fakes ----

    struct StoredMessage {
        body: String,
        receive_count: u32,
    }

    #[derive(Default)]
    struct FakeQueue {
        visible: Mutex<VecDeque<StoredMessage>>,
        inflight: Mutex<HashMap<String, StoredMessage>>,
        deletes: AtomicUsize,
        postpone_delays: Mutex<Vec<u32>>,
        next_receipt: AtomicUsize,
    }

    impl FakeQueue {
        fn seed(&self, body: &str, receive_count_before: u32) {
            self.visible.lock().unwrap().push_back(StoredMessage {
                body: body.to_string(),
                receive_count: receive_count_before,
            });
        }

        /// Simulate the visibility window lapsing.
        fn requeue_inflight(&self) {
            let mut inflight = self.inflight.lock().unwrap();
            let mut visible = self.visible.lock().unwrap();
            for (_, message) in inflight.drain() {
                visible.push_back(message);
            }
        }

        fn delete_count(&self) -> usize {
            self.deletes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JobQueue for FakeQueue {
        async fn send(&self, body: &str, _delay: u32) -> Result<String, QueueError> {
            self.seed(body, 0);
            Ok("m-0".into())
        }

        async fn receive(&self, max: u32, _wait: u32) -> Result<Vec<QueueMessage>, QueueError> {
            let mut visible = self.visible.lock().unwrap();
            let mut inflight = self.inflight.lock().unwrap();
            let mut out = Vec::new();
            while out.len() < max as usize {
                let Some(mut stored) = visible.pop_front() else {
                    break;
                };
                stored.receive_count += 1;
                let receipt = format!("r-{}", self.next_receipt.fetch_add(1, Ordering::SeqCst));
                out.push(QueueMessage {
                    message_id: receipt.clone(),
                    receipt_handle: receipt.clone(),
                    body: stored.body.clone(),
                    receive_count: stored.receive_count,
                });
                inflight.insert(receipt, stored);
            }
            Ok(out)
        }

        async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError> {
            self.inflight.lock().unwrap().remove(receipt_handle);
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn postpone(&self, _receipt_handle: &str, delay: u32) -> Result<(), QueueError> {
            self.postpone_delays.lock().unwrap().push(delay);
            Ok(())
        }
    }

    enum HandlerMode {
        Succeed,
        FailTransient,
        FailValidation,
    }

    struct MockHandler {
        mode: HandlerMode,
        calls: AtomicUsize,
    }

    impl MockHandler {
        fn new(mode: HandlerMode) -> Self {
            Self {
                mode,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl JobHandler for MockHandler {
        async fn run(&self, _job: &Job) -> Result<PipelineOutcome, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.mode {
                HandlerMode::Succeed => Ok(PipelineOutcome {
                    status: OutcomeStatus::Success,
                    delivered_asset_urls: vec!["https://store/p.jpg".into()],
                    archive_url: None,
                    video_urls: vec![],
                    error: None,
                }),
                HandlerMode::FailTransient => {
                    Err(PipelineError::TransientProvider("backend 502".into()))
                }
                HandlerMode::FailValidation => {
                    Err(PipelineError::Validation("style must not be empty".into()))
                }
            }
        }
    }

    #[derive(Default)]
    struct MockNotifier {
        messages: Mutex<Vec<(i64, String)>>,
    }

    #[async_trait]
    impl Notifier for MockNotifier {
        async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), NotifyError> {
            self.messages.lock().unwrap().push((chat_id, text.into()));
            Ok(())
        }

        async fn send_media_group(
            &self,
            _chat_id: i64,
            _urls: &[String],
            _caption: &str,
        ) -> Result<(), NotifyError> {
            Ok(())
        }

        async fn send_document(&self, _chat_id: i64, _url: &str) -> Result<(), NotifyError> {
            Ok(())
        }
    }

    fn task_body() -> String {
        r#"{
            "task_type": "generate_images",
            "data": {
                "user_id": 42,
                "session_id": "sess-001",
                "brief": {
                    "package_type": "trial",
                    "purpose": "insta",
                    "style": "RL-01",
                    "background": "studio",
                    "lora_type": "realism",
                    "generator": "flux"
                },
                "photos": []
            }
        }"#
        .to_string()
    }

    fn worker(
        queue: Arc<FakeQueue>,
        handler: Arc<MockHandler>,
        notifier: Arc<MockNotifier>,
    ) -> Worker {
        Worker::new(queue, handler, notifier, 4, 3, 60)
    }

    // ---- scenarios ----

    #[tokio::test]
    async fn success_deletes_exactly_once() {
        let queue = Arc::new(FakeQueue::default());
        let handler = Arc::new(MockHandler::new(HandlerMode::Succeed));
        let notifier = Arc::new(MockNotifier::default());
        queue.seed(&task_body(), 0);

        let w = worker(queue.clone(), handler.clone(), notifier.clone());
        assert_eq!(w.poll_once().await.unwrap(), 1);

        assert_eq!(queue.delete_count(), 1);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(w.processed(), 1);
        assert_eq!(w.errored(), 0);
        // Nothing left to redeliver.
        queue.requeue_inflight();
        assert_eq!(w.poll_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn transient_failure_is_redelivered_with_bumped_count() {
        let queue = Arc::new(FakeQueue::default());
        let handler = Arc::new(MockHandler::new(HandlerMode::FailTransient));
        let notifier = Arc::new(MockNotifier::default());
        queue.seed(&task_body(), 0);

        let w = worker(queue.clone(), handler.clone(), notifier.clone());
        w.poll_once().await.unwrap();
        assert_eq!(queue.delete_count(), 0);
        // No user notification while retries remain; redelivery was
        // pushed out instead.
        assert!(notifier.messages.lock().unwrap().is_empty());
        assert_eq!(queue.postpone_delays.lock().unwrap().as_slice(), &[60]);

        queue.requeue_inflight();
        let received = queue.receive(1, 0).await.unwrap();
        assert_eq!(received[0].receive_count, 2);
    }

    #[tokio::test]
    async fn exhausted_retries_notify_and_leave_for_dead_letter() {
        let queue = Arc::new(FakeQueue::default());
        let handler = Arc::new(MockHandler::new(HandlerMode::FailTransient));
        let notifier = Arc::new(MockNotifier::default());
        // Third delivery of the same message.
        queue.seed(&task_body(), 2);

        let w = worker(queue.clone(), handler.clone(), notifier.clone());
        w.poll_once().await.unwrap();

        assert_eq!(queue.delete_count(), 0);
        {
            let messages = notifier.messages.lock().unwrap();
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].0, 42);
            assert!(messages[0].1.contains("could not finish"));
        }

        // A fourth delivery of the same dead job stays silent and is
        // pushed toward the dead-letter drain instead.
        queue.requeue_inflight();
        w.poll_once().await.unwrap();
        assert_eq!(notifier.messages.lock().unwrap().len(), 1);
        assert_eq!(queue.postpone_delays.lock().unwrap().len(), 1);
        assert_eq!(queue.delete_count(), 0);
    }

    #[tokio::test]
    async fn terminal_failure_notifies_once_across_redeliveries() {
        let queue = Arc::new(FakeQueue::default());
        let handler = Arc::new(MockHandler::new(HandlerMode::FailValidation));
        let notifier = Arc::new(MockNotifier::default());
        queue.seed(&task_body(), 0);

        let w = worker(queue.clone(), handler.clone(), notifier.clone());
        for _ in 0..3 {
            w.poll_once().await.unwrap();
            queue.requeue_inflight();
        }

        // One Job, one failure message, no matter how often the
        // visibility window lapses.
        assert_eq!(notifier.messages.lock().unwrap().len(), 1);
        assert_eq!(queue.delete_count(), 0);
        assert_eq!(queue.postpone_delays.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn retry_delay_scales_with_the_attempt() {
        let queue = Arc::new(FakeQueue::default());
        let handler = Arc::new(MockHandler::new(HandlerMode::FailTransient));
        let notifier = Arc::new(MockNotifier::default());
        queue.seed(&task_body(), 0);

        let w = worker(queue.clone(), handler.clone(), notifier.clone());
        w.poll_once().await.unwrap();
        queue.requeue_inflight();
        w.poll_once().await.unwrap();

        assert_eq!(queue.postpone_delays.lock().unwrap().as_slice(), &[60, 120]);
    }

    #[tokio::test]
    async fn validation_failure_notifies_immediately() {
        let queue = Arc::new(FakeQueue::default());
        let handler = Arc::new(MockHandler::new(HandlerMode::FailValidation));
        let notifier = Arc::new(MockNotifier::default());
        queue.seed(&task_body(), 0);

        let w = worker(queue.clone(), handler.clone(), notifier.clone());
        w.poll_once().await.unwrap();

        // First attempt, but fatal: user informed, message never acked.
        assert_eq!(queue.delete_count(), 0);
        assert_eq!(notifier.messages.lock().unwrap().len(), 1);
        assert_eq!(w.errored(), 1);
    }

    #[tokio::test]
    async fn malformed_body_skips_the_handler() {
        let queue = Arc::new(FakeQueue::default());
        let handler = Arc::new(MockHandler::new(HandlerMode::Succeed));
        let notifier = Arc::new(MockNotifier::default());
        queue.seed(r#"{"data": {"user_id": 7}}"#, 0);

        let w = worker(queue.clone(), handler.clone(), notifier.clone());
        w.poll_once().await.unwrap();

        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
        assert_eq!(queue.delete_count(), 0);
        // The recoverable user id still got a notice, and only one.
        assert_eq!(notifier.messages.lock().unwrap()[0].0, 7);
        queue.requeue_inflight();
        w.poll_once().await.unwrap();
        assert_eq!(notifier.messages.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_task_type_is_fatal() {
        let queue = Arc::new(FakeQueue::default());
        let handler = Arc::new(MockHandler::new(HandlerMode::Succeed));
        let notifier = Arc::new(MockNotifier::default());
        let body = task_body().replace("generate_images", "transcode_video");
        queue.seed(&body, 0);

        let w = worker(queue.clone(), handler.clone(), notifier.clone());
        w.poll_once().await.unwrap();
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
        assert_eq!(queue.delete_count(), 0);
    }

    #[tokio::test]
    async fn pre_cancelled_worker_exits_promptly() {
        let queue = Arc::new(FakeQueue::default());
        let handler = Arc::new(MockHandler::new(HandlerMode::Succeed));
        let notifier = Arc::new(MockNotifier::default());
        let w = worker(queue, handler, notifier);

        let cancel = CancellationToken::new();
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), w.run(cancel))
            .await
            .expect("cancelled worker must return");
    }

    #[test]
    fn user_id_extraction_is_best_effort() {
        assert_eq!(user_id_from_body(r#"{"data": {"user_id": 42}}"#), Some(42));
        assert_eq!(user_id_from_body(r#"{"data": {}}"#), None);
        assert_eq!(user_id_from_body("not json"), None);
    }
}
