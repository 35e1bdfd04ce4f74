// src/notify.rs - Notification sinks
//
// Notifications are fire-and-forget: a sink must never block the control loop.
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub source: String,
    pub message: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, source: &str, message: &str, severity: Severity);
}

/// Routes notifications to the tracing subscriber.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, source: &str, message: &str, severity: Severity) {
        match severity {
            Severity::Info | Severity::Success => tracing::info!(source, "{}", message),
            Severity::Warning => tracing::warn!(source, "{}", message),
            Severity::Error => tracing::error!(source, "{}", message),
        }
    }
}

/// Queues notifications on a bounded channel; drops them when the queue is full.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::Sender<Notification>,
}

impl ChannelNotifier {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (sender, receiver) = mpsc::channel(buffer);
        (Self { sender }, receiver)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, source: &str, message: &str, severity: Severity) {
        let notification = Notification {
            source: source.to_string(),
            message: message.to_string(),
            severity,
            timestamp: Utc::now(),
        };
        if let Err(e) = self.sender.try_send(notification) {
            tracing::debug!("Dropping notification: {}", e);
        }
    }
}
