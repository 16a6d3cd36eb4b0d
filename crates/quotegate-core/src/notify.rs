//! Operator-facing notification events.
//!
//! The gateway never renders anything; it publishes [`Notification`]s to an injected
//! [`NotificationSink`] when a breaker opens or recovers, a fallback vendor serves a request,
//! a vendor reports a low remaining quota, or every vendor fails.

use std::fmt::{Display, Formatter};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

impl NotificationLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// Suggested on-screen duration for a UI consumer.
    pub const fn display_for(self) -> Duration {
        match self {
            Self::Info => Duration::from_secs(3),
            Self::Warning => Duration::from_secs(5),
            Self::Error => Duration::from_secs(8),
        }
    }
}

impl Display for NotificationLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discrete event published to the observability collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
    #[serde(with = "duration_millis")]
    pub display_for: Duration,
}

impl Notification {
    pub fn new(
        level: NotificationLevel,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
            display_for: level.display_for(),
        }
    }

    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, title, message)
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Warning, title, message)
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, title, message)
    }
}

/// Receiver of gateway notifications.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, notification: Notification);
}

/// Forwards notifications to `tracing` at a matching level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn publish(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Info => {
                tracing::info!(title = %notification.title, "{}", notification.message)
            }
            NotificationLevel::Warning => {
                tracing::warn!(title = %notification.title, "{}", notification.message)
            }
            NotificationLevel::Error => {
                tracing::error!(title = %notification.title, "{}", notification.message)
            }
        }
    }
}

/// Buffers notifications in memory; used by tests and the CLI summary.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Notification>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<Notification> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count_titled(&self, title: &str) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|event| event.title == title)
            .count()
    }

    pub fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl NotificationSink for MemorySink {
    fn publish(&self, notification: Notification) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }
}

/// Fans notifications out to any number of async subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<Notification>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

impl NotificationSink for BroadcastSink {
    fn publish(&self, notification: Notification) {
        // No subscribers is not an error.
        let _ = self.sender.send(notification);
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Titles shared by publishers and assertions.
pub mod titles {
    pub const CIRCUIT_OPENED: &str = "Vendor unavailable";
    pub const CIRCUIT_CLOSED: &str = "Vendor restored";
    pub const FALLBACK_USED: &str = "Fallback used";
    pub const RATE_LIMIT: &str = "Rate limit detected";
    pub const RETRIEVAL_FAILED: &str = "Data retrieval failed";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.publish(Notification::info("a", "first"));
        sink.publish(Notification::error("b", "second"));

        let events = sink.snapshot();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].level, NotificationLevel::Error);
        assert_eq!(events[1].display_for, Duration::from_secs(8));
        assert_eq!(sink.count_titled("a"), 1);
    }

    #[tokio::test]
    async fn broadcast_sink_delivers_to_subscribers() {
        let sink = BroadcastSink::new(8);
        let mut receiver = sink.subscribe();

        sink.publish(Notification::warning(titles::RATE_LIMIT, "polygon: 2 left"));

        let received = receiver.recv().await.expect("event");
        assert_eq!(received.title, titles::RATE_LIMIT);
    }

    #[test]
    fn broadcast_without_subscribers_is_silent() {
        BroadcastSink::new(1).publish(Notification::info("x", "y"));
    }

    #[test]
    fn notification_serializes_display_duration_in_millis() {
        let value = serde_json::to_value(Notification::info("t", "m")).expect("json");
        assert_eq!(value["display_for"], 3000);
        assert_eq!(value["level"], "info");
    }
}
