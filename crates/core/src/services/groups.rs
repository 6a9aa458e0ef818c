//! Group membership provider client.
//!
//! Talks to the external group service: membership lookups forward the
//! caller's bearer token, notification dispatch uses the internal API key.
//! Membership failures gate reads and therefore surface as errors;
//! notification dispatch is fire-and-forget.

use livepoll_common::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::{Group, GroupMembership};

/// A push message addressed to every member of a group.
#[derive(Debug, Clone, Serialize)]
pub struct GroupNotification {
    pub subject: String,
    pub body: String,
    pub data: serde_json::Value,
}

/// One group row as the provider reports it.
#[derive(Debug, Deserialize)]
struct UserGroup {
    id: String,
    #[serde(default)]
    membership_status: String,
}

/// Client for the group membership provider.
#[derive(Clone)]
pub struct GroupsClient {
    http: reqwest::Client,
    base_url: String,
    internal_api_key: String,
}

impl GroupsClient {
    /// Create a new groups client.
    #[must_use]
    pub const fn new(http: reqwest::Client, base_url: String, internal_api_key: String) -> Self {
        Self {
            http,
            base_url,
            internal_api_key,
        }
    }

    /// Retrieve the groups the token's user belongs to, partitioned into
    /// admin-of and member-of. An empty token yields no membership.
    pub async fn get_groups_membership(&self, token: &str) -> AppResult<Option<GroupMembership>> {
        if token.is_empty() {
            return Ok(None);
        }

        let url = format!("{}/api/user/group-memberships", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("group membership request: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::ExternalService(format!(
                "group membership request failed with status {}",
                response.status()
            )));
        }

        let groups: Vec<UserGroup> = response
            .json()
            .await
            .map_err(|e| AppError::ExternalService(format!("group membership response: {e}")))?;

        Ok(Some(partition_membership(groups)))
    }

    /// Retrieve group metadata.
    pub async fn get_group_details(&self, token: &str, group_id: &str) -> AppResult<Option<Group>> {
        if group_id.is_empty() {
            return Ok(None);
        }

        let url = format!("{}/api/v2/groups/{group_id}", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("group details request: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::ExternalService(format!(
                "group details request failed with status {}",
                response.status()
            )));
        }

        let group: Group = response
            .json()
            .await
            .map_err(|e| AppError::ExternalService(format!("group details response: {e}")))?;

        Ok(Some(group))
    }

    /// Dispatch a push message to the members of a group. Fire-and-forget:
    /// failures are logged, never surfaced.
    pub fn send_group_notification(&self, group_id: &str, notification: GroupNotification) {
        if group_id.is_empty() || notification.subject.is_empty() || notification.body.is_empty() {
            return;
        }

        let http = self.http.clone();
        let url = format!(
            "{}/api/int/group/{group_id}/notification",
            self.base_url
        );
        let api_key = self.internal_api_key.clone();
        let group_id = group_id.to_string();

        tokio::spawn(async move {
            let result = http
                .post(&url)
                .header("INTERNAL-API-KEY", api_key)
                .json(&notification)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    debug!(group_id, "Sent group notification");
                }
                Ok(response) => {
                    warn!(group_id, status = %response.status(), "Group notification rejected");
                }
                Err(e) => {
                    warn!(group_id, error = %e, "Group notification failed");
                }
            }
        });
    }

    /// Tell the group service a poll in the group changed. Best-effort.
    pub fn touch_group_date_updated(&self, token: &str, group_id: &str) {
        if group_id.is_empty() {
            return;
        }

        let http = self.http.clone();
        let url = format!("{}/api/bbs/groups/{group_id}/date-updated", self.base_url);
        let token = token.to_string();
        let group_id = group_id.to_string();

        tokio::spawn(async move {
            let result = http
                .put(&url)
                .bearer_auth(token)
                .json(&serde_json::json!({ "operation": "poll_update" }))
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    warn!(group_id, status = %response.status(), "Group date-updated touch rejected");
                }
                Err(e) => {
                    warn!(group_id, error = %e, "Group date-updated touch failed");
                }
            }
        });
    }
}

/// Partition provider rows by membership status. Unknown statuses are
/// ignored.
fn partition_membership(groups: Vec<UserGroup>) -> GroupMembership {
    let mut membership = GroupMembership::default();
    for group in groups {
        match group.membership_status.as_str() {
            "admin" => membership.admin_of.push(group.id),
            "member" => membership.member_of.push(group.id),
            _ => {}
        }
    }
    membership
}
