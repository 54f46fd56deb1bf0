//! Delivery of finished run reports.
//!
//! Building the [`Notification`] is pure; sending it goes through a
//! [`Notifier`]. A delivery failure is reported on its own and never changes
//! the outcome of the run it describes.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info};

use crate::error::NotifyError;
use crate::report::{RunReport, format_bytes};

/// Everything a delivery channel needs to render a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub subject: String,
    pub status: String,
    pub success_count: usize,
    pub fail_count: usize,
    pub skipped_count: usize,
    pub total_size: String,
    pub duration_secs: f64,
    pub timestamp: String,
    /// Plain-text summary, the same one printed on the terminal.
    pub summary: String,
    pub report: RunReport,
}

impl Notification {
    pub fn from_report(report: &RunReport) -> Self {
        let status = report.status();
        let emoji = if report.is_success() { "✓" } else { "⚠️" };
        Notification {
            subject: format!("{emoji} Backup {status}"),
            status: status.to_string(),
            success_count: report.success_count(),
            fail_count: report.fail_count(),
            skipped_count: report.skipped_count(),
            total_size: format_bytes(report.total_bytes()),
            duration_secs: report.duration_secs(),
            timestamp: report.finalized_at().format("%d-%m-%Y %H:%M:%S").to_string(),
            summary: report.to_string(),
            report: report.clone(),
        }
    }
}

/// A channel that delivers finished reports, e.g. a webhook or a mailer.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Posts notifications as JSON to an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        let response = self.client.post(&self.url).json(notification).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

/// Delivers `report` through `notifier`, reporting any failure to the operator.
///
/// Returns whether delivery succeeded.
pub async fn dispatch(notifier: &dyn Notifier, report: &RunReport) -> bool {
    let notification = Notification::from_report(report);
    match notifier.deliver(&notification).await {
        Ok(()) => {
            info!(status = %notification.status, "Report notification sent");
            true
        }
        Err(e) => {
            eprintln!("✗ Report notification failed: {e}");
            error!(error = %e, "Report notification failed");
            false
        }
    }
}
