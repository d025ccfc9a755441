//! Tracing-backed alert delivery for CLI runs.

use async_trait::async_trait;
use introute_core::alert::{Alert, AlertSeverity, Notifier};
use tracing::{info, warn};

/// Routes alerts to the log at a level matching their severity.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_alert(&self, alert: Alert) {
        match alert.severity {
            AlertSeverity::Critical | AlertSeverity::Warning => {
                warn!(
                    code = %alert.code,
                    severity = %alert.severity,
                    details = %alert.details,
                    "{}: {}",
                    alert.title,
                    alert.message
                );
            }
            AlertSeverity::Info => {
                info!(
                    code = %alert.code,
                    details = %alert.details,
                    "{}: {}",
                    alert.title,
                    alert.message
                );
            }
        }
    }
}
