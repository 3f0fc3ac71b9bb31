use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Error,
}

/// User-facing, advisory message about one file of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub severity: Severity,
    pub file_name: String,
    pub message: String,
}

impl Notification {
    pub fn success(file_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Success,
            file_name: file_name.into(),
            message: message.into(),
        }
    }

    pub fn error(file_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            file_name: file_name.into(),
            message: message.into(),
        }
    }
}

/// Fire-and-forget delivery; implementations must not block the pipeline.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: &Notification) {
        match notification.severity {
            Severity::Success => {
                info!(file = %notification.file_name, "{}", notification.message)
            }
            Severity::Error => {
                warn!(file = %notification.file_name, "{}", notification.message)
            }
        }
    }
}
