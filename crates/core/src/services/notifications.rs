//! Notification dispatcher client.
//!
//! Fire-and-forget push delivery to explicit recipients. Send failures are
//! logged and swallowed; they never reach the client.

use serde::Serialize;
use tracing::{debug, warn};

use crate::model::UserRef;

/// A push message addressed to explicit recipients.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationMessage {
    pub org_id: String,
    pub app_id: String,
    pub recipients: Vec<UserRef>,
    pub subject: String,
    pub body: String,
    pub data: serde_json::Value,
}

/// Client for the notifications service.
#[derive(Clone)]
pub struct NotificationsClient {
    http: reqwest::Client,
    base_url: String,
    internal_api_key: String,
}

impl NotificationsClient {
    /// Create a new notifications client.
    #[must_use]
    pub const fn new(http: reqwest::Client, base_url: String, internal_api_key: String) -> Self {
        Self {
            http,
            base_url,
            internal_api_key,
        }
    }

    /// Dispatch a message on a background task. Empty subjects, bodies or
    /// recipient lists are dropped silently.
    pub fn send_notification(&self, message: NotificationMessage) {
        if message.subject.is_empty() || message.body.is_empty() || message.recipients.is_empty() {
            return;
        }

        let http = self.http.clone();
        let url = format!("{}/api/int/v2/message", self.base_url);
        let api_key = self.internal_api_key.clone();

        tokio::spawn(async move {
            let result = http
                .post(&url)
                .header("INTERNAL-API-KEY", api_key)
                .json(&message)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    debug!(subject = %message.subject, "Sent notification");
                }
                Ok(response) => {
                    warn!(status = %response.status(), "Notification rejected");
                }
                Err(e) => {
                    warn!(error = %e, "Notification dispatch failed");
                }
            }
        });
    }
}
