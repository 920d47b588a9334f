use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::core::config::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ExamEventKind {
    Published,
    Started,
    Closed,
    EvaluationStarted,
    ResultsPublished,
}

impl ExamEventKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Published => "exam.published",
            Self::Started => "exam.started",
            Self::Closed => "exam.closed",
            Self::EvaluationStarted => "exam.evaluation_started",
            Self::ResultsPublished => "exam.results_published",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ExamEvent {
    pub(crate) kind: ExamEventKind,
    pub(crate) exam_id: String,
    pub(crate) exam_title: String,
    pub(crate) recipients: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) occurred_at: OffsetDateTime,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
    #[error("notification endpoint returned HTTP {0}")]
    Status(u16),
}

/// Fire-and-forget channel for exam lifecycle announcements.
#[async_trait]
pub(crate) trait Notifier: Send + Sync {
    async fn notify(&self, event: &ExamEvent) -> Result<(), NotifyError>;
}

/// Writes events to the log; used when no webhook is configured.
#[derive(Debug, Clone, Default)]
pub(crate) struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, event: &ExamEvent) -> Result<(), NotifyError> {
        tracing::info!(
            event = event.kind.as_str(),
            exam_id = %event.exam_id,
            recipients = event.recipients.len(),
            "Exam notification"
        );
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct WebhookNotifier {
    client: Client,
    target_url: String,
}

impl WebhookNotifier {
    pub(crate) fn new(target_url: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, target_url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &ExamEvent) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.target_url)
            .header("X-Event-Type", event.kind.as_str())
            .json(event)
            .send()
            .await
            .map_err(|err| NotifyError::Delivery(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        Ok(())
    }
}

pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Arc<dyn Notifier>> {
    let notifications = settings.notifications();
    match notifications.webhook_url.as_deref().map(str::trim).filter(|url| !url.is_empty()) {
        Some(url) => {
            tracing::info!(target_url = %url, "Exam notifications go to webhook");
            Ok(Arc::new(WebhookNotifier::new(
                url.to_string(),
                Duration::from_secs(notifications.timeout_seconds),
            )?))
        }
        None => Ok(Arc::new(TracingNotifier)),
    }
}

const OUTBOX_CAPACITY: usize = 1024;

enum OutboxMessage {
    Deliver(ExamEvent),
    #[cfg(test)]
    Flush(tokio::sync::oneshot::Sender<()>),
}

/// Queue between lifecycle transitions and the notifier.
///
/// A single background task drains the queue, so events leave in the order they were
/// queued and a slow endpoint never holds up the transition that raised the event.
#[derive(Clone)]
pub(crate) struct NotificationOutbox {
    sender: mpsc::Sender<OutboxMessage>,
}

impl NotificationOutbox {
    /// Spawns the delivery task; must be called from within a Tokio runtime.
    pub(crate) fn spawn(notifier: Arc<dyn Notifier>) -> Self {
        let (sender, receiver) = mpsc::channel(OUTBOX_CAPACITY);
        tokio::spawn(deliver_loop(notifier, receiver));
        Self { sender }
    }

    /// Never waits. Events are dropped with a warning when the queue is full.
    pub(crate) fn enqueue(&self, event: ExamEvent) {
        let kind = event.kind.as_str();
        let exam_id = event.exam_id.clone();
        match self.sender.try_send(OutboxMessage::Deliver(event)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                metrics::counter!("notifications_dropped_total").increment(1);
                tracing::warn!(event = kind, exam_id = %exam_id, "Notification outbox full; event dropped");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(event = kind, exam_id = %exam_id, "Notification outbox closed; event dropped");
            }
        }
    }

    /// Resolves once every event queued before the call has been handed to the notifier.
    #[cfg(test)]
    pub(crate) async fn flush(&self) {
        let (done, wait) = tokio::sync::oneshot::channel();
        if self.sender.send(OutboxMessage::Flush(done)).await.is_ok() {
            let _ = wait.await;
        }
    }
}

async fn deliver_loop(notifier: Arc<dyn Notifier>, mut receiver: mpsc::Receiver<OutboxMessage>) {
    while let Some(message) = receiver.recv().await {
        match message {
            OutboxMessage::Deliver(event) => {
                if let Err(err) = notifier.notify(&event).await {
                    tracing::warn!(
                        error = %err,
                        event = event.kind.as_str(),
                        exam_id = %event.exam_id,
                        "Failed to deliver exam notification"
                    );
                }
            }
            #[cfg(test)]
            OutboxMessage::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("Notification outbox closed");
}
