/// User-facing notifications
///
/// The orchestrator never fails silently: every success, failure and required
/// user action is turned into a `Notification` and handed to a `Notifier`. The
/// CLI logs them through `TracingNotifier`; a UI layer subscribes through
/// `ChannelNotifier`.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// How a notification leaves the screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dismissal {
    /// Disappears on its own
    Auto,
    /// Stays until the user dismisses it
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub level: NotificationLevel,
    pub message: String,
    pub dismissal: Dismissal,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>, dismissal: Dismissal) -> Self {
        Self {
            id: Uuid::new_v4(),
            level,
            message: message.into(),
            dismissal,
            created_at: Utc::now(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, message, Dismissal::Auto)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, message, Dismissal::Auto)
    }

    /// Error the user can dismiss
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, message, Dismissal::Auto)
    }

    /// Error asking the user to act; stays until dismissed
    pub fn action_required(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, message, Dismissal::Manual)
    }

    pub fn is_persistent(&self) -> bool {
        self.dismissal == Dismissal::Manual
    }
}

/// Sink for user-facing notifications
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self, notification: Notification);
}

/// Writes notifications to the log
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: Notification) {
        let persistent = notification.is_persistent();
        match notification.level {
            NotificationLevel::Error => error!(persistent, "{}", notification.message),
            NotificationLevel::Warning => warn!(persistent, "{}", notification.message),
            NotificationLevel::Success | NotificationLevel::Info => {
                info!(persistent, "{}", notification.message)
            }
        }
    }
}

/// Forwards notifications to a receiver, typically a UI event loop
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, notification: Notification) {
        if let Err(e) = self.sender.send(notification) {
            debug!("Notification dropped, receiver closed: {}", e.0.message);
        }
    }
}
