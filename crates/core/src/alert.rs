//! Alert envelope and the Notifier seam.
//!
//! Delivery of alerts to human operators is out of scope for the
//! engine: a `Notifier` implementation is handed in and treated as a
//! black box. The engine never awaits delivery success to continue its
//! own logic, and a notifier failure must never propagate back into
//! routing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// How urgent an alert is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A single outgoing alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Stable machine-readable code (e.g. "routing_failure").
    pub code: String,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    /// Structured context for downstream rendering.
    #[serde(default)]
    pub details: serde_json::Value,
}

impl Alert {
    pub fn new(
        code: impl Into<String>,
        severity: AlertSeverity,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            severity,
            title: title.into(),
            message: message.into(),
            details: serde_json::Value::Null,
        }
    }

    /// Attach structured details.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Fire-and-forget alert delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver an alert. Implementations should log and swallow their
    /// own failures; callers will not retry.
    async fn send_alert(&self, alert: Alert);
}
