//! Poll service.
//!
//! Orchestrates poll CRUD, the lifecycle state machine, voting and
//! subscriptions under the visibility resolver. Side effects on mutating
//! operations run in a fixed order: the store write first (fatal on
//! failure), then the notification dispatch (async, best-effort), then the
//! in-process hub emit.

use std::sync::Arc;

use livepoll_common::{AppError, AppResult, IdGenerator, IdentityContext};
use livepoll_db::entities::poll::{self, PollStatus, PollVote};
use livepoll_db::repositories::{PollRepository, PollUpdate, PollsFilter};
use sea_orm::Set;
use tokio::sync::mpsc;
use validator::Validate;

use crate::hub::{EVENT_POLL_DELETED, EVENT_POLL_END, EVENT_POLL_STARTED, PollEvent, SseHub};
use crate::model::{GroupMembership, PollData, PollResult, notification_recipients};
use crate::services::groups::{GroupNotification, GroupsClient};
use crate::services::notifications::{NotificationMessage, NotificationsClient};
use crate::visibility;

const NOTIFICATION_SUBJECT: &str = "Polls";

/// Poll service for business logic.
#[derive(Clone)]
pub struct PollService {
    poll_repo: PollRepository,
    groups: GroupsClient,
    notifications: NotificationsClient,
    hub: Arc<SseHub>,
    id_gen: IdGenerator,
}

impl PollService {
    /// Create a new poll service.
    #[must_use]
    pub const fn new(
        poll_repo: PollRepository,
        groups: GroupsClient,
        notifications: NotificationsClient,
        hub: Arc<SseHub>,
    ) -> Self {
        Self {
            poll_repo,
            groups,
            notifications,
            hub,
            id_gen: IdGenerator::new(),
        }
    }

    /// The hub this service emits to.
    #[must_use]
    pub fn hub(&self) -> Arc<SseHub> {
        Arc::clone(&self.hub)
    }

    /// List polls visible to the caller, projected per viewer.
    ///
    /// `force_my_polls` narrows the listing to the caller's own polls
    /// regardless of the submitted filter (the `/user/polls` surface).
    pub async fn get_polls(
        &self,
        identity: &IdentityContext,
        filter: &PollsFilter,
        force_my_polls: bool,
    ) -> AppResult<Vec<PollResult>> {
        let membership = self.groups.get_groups_membership(&identity.token).await?;
        let (admin_of, member_of) = membership
            .as_ref()
            .map(|m| (m.admin_of.clone(), m.member_of.clone()))
            .unwrap_or_default();

        let mut filter = filter.clone();
        if force_my_polls {
            filter.my_polls = Some(true);
        }

        let models = self
            .poll_repo
            .get_polls(
                &identity.org_id,
                &identity.subject,
                &filter,
                &admin_of,
                &member_of,
                true,
            )
            .await?;

        // The query already projects visibility; re-check here so the two
        // layers can never drift apart.
        Ok(models
            .iter()
            .filter(|m| visibility::can_view(m, &identity.subject, membership.as_ref()))
            .map(|m| PollResult::project(m, &identity.subject))
            .collect())
    }

    /// Fetch a single poll, projected for the caller.
    pub async fn get_poll(
        &self,
        identity: &IdentityContext,
        id: &str,
    ) -> AppResult<PollResult> {
        let model = self.fetch_visible(identity, id).await?;
        Ok(PollResult::project(&model, &identity.subject))
    }

    /// Create a poll. The server assigns the id and stamps the creator,
    /// tenant and creation time.
    pub async fn create(
        &self,
        identity: &IdentityContext,
        data: &PollData,
    ) -> AppResult<PollResult> {
        data.validate()?;

        let status = data
            .status
            .clone()
            .unwrap_or_else(|| PollStatus::Created.as_str().to_string());

        let model = poll::ActiveModel {
            id: Set(self.id_gen.generate()),
            org_id: Set(identity.org_id.clone()),
            app_id: Set(identity.app_id.clone()),
            creator_id: Set(identity.subject.clone()),
            creator_name: Set(identity.name.clone()),
            question: Set(data.question.clone()),
            options: Set(serde_json::json!(data.options)),
            to_members: Set(encode_to_members(data)?),
            group_id: Set(data.group_id.clone()),
            pin: Set(data.pin),
            multi_choice: Set(data.multi_choice),
            repeat: Set(data.repeat),
            show_results: Set(data.show_results),
            stadium: Set(data.stadium.clone()),
            geo_fence: Set(data.geo_fence),
            status: Set(status),
            responses: Set(None),
            results: Set(None),
            date_created: Set(chrono::Utc::now().into()),
            date_updated: Set(None),
        };

        let created = self.poll_repo.create(model).await?;

        self.notify(
            identity,
            &created,
            "poll_created",
            format!("Poll '{}' has been created", created.question),
        );

        Ok(PollResult::project(&created, &identity.subject))
    }

    /// Update a poll's whitelisted fields.
    pub async fn update(
        &self,
        identity: &IdentityContext,
        id: &str,
        data: &PollData,
    ) -> AppResult<PollResult> {
        data.validate()?;

        let existing = self.fetch_mutable(identity, id).await?;

        let update = PollUpdate {
            question: data.question.clone(),
            options: serde_json::json!(data.options),
            to_members: encode_to_members(data)?,
            group_id: data.group_id.clone(),
            pin: data.pin,
            multi_choice: data.multi_choice,
            repeat: data.repeat,
            show_results: data.show_results,
            stadium: data.stadium.clone(),
            geo_fence: data.geo_fence,
            // The whitelist deliberately includes status; an absent status
            // keeps the stored one.
            status: data.status.clone().unwrap_or_else(|| existing.status.clone()),
        };

        let updated = self
            .poll_repo
            .update(&identity.org_id, id, &update)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("poll {id}")))?;

        if let Some(group_id) = &updated.group_id {
            self.groups.touch_group_date_updated(&identity.token, group_id);
        }

        Ok(PollResult::project(&updated, &identity.subject))
    }

    /// Start a poll. Idempotent: a started poll keeps its status, but the
    /// explicit call still announces `poll_started` to subscribers. A
    /// terminated poll stays terminated and announces nothing.
    pub async fn start(&self, identity: &IdentityContext, id: &str) -> AppResult<()> {
        let existing = self.fetch_mutable(identity, id).await?;

        match existing.poll_status() {
            PollStatus::Terminated => {
                tracing::debug!(poll_id = id, "Ignoring start of terminated poll");
                return Ok(());
            }
            PollStatus::Created => {
                self.poll_repo
                    .set_status(&identity.org_id, id, PollStatus::Started)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("poll {id}")))?;
            }
            PollStatus::Started => {}
        }

        self.notify(
            identity,
            &existing,
            "poll_started",
            format!("Poll '{}' has been started", existing.question),
        );
        self.hub.emit(id, EVENT_POLL_STARTED).await;
        Ok(())
    }

    /// End a poll. Announces `poll_end` and then closes every subscription
    /// for the poll. Ending an already-terminated poll changes nothing and
    /// announces nothing.
    pub async fn end(&self, identity: &IdentityContext, id: &str) -> AppResult<()> {
        let existing = self.fetch_mutable(identity, id).await?;

        if existing.poll_status() == PollStatus::Terminated {
            tracing::debug!(poll_id = id, "Ignoring end of terminated poll");
            return Ok(());
        }

        self.poll_repo
            .set_status(&identity.org_id, id, PollStatus::Terminated)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("poll {id}")))?;

        self.notify(
            identity,
            &existing,
            "poll_ended",
            format!("Poll '{}' has ended", existing.question),
        );
        self.hub.emit(id, EVENT_POLL_END).await;
        self.hub.close_poll(id).await;
        Ok(())
    }

    /// Delete a poll and close its subscriptions.
    pub async fn delete(&self, identity: &IdentityContext, id: &str) -> AppResult<()> {
        let _existing = self.fetch_mutable(identity, id).await?;

        self.poll_repo.delete(&identity.org_id, id).await?;

        self.hub.emit(id, EVENT_POLL_DELETED).await;
        self.hub.close_poll(id).await;
        Ok(())
    }

    /// Append a vote. No notification and no direct hub emit: the change
    /// feed observes the append and delivers `poll_updated` to subscribers.
    pub async fn vote(
        &self,
        identity: &IdentityContext,
        id: &str,
        vote: &PollVote,
    ) -> AppResult<()> {
        let _visible = self.fetch_visible(identity, id).await?;
        self.poll_repo.vote(id, vote).await
    }

    /// Register the caller for live events on a poll. Events carry only the
    /// per-viewer projection, so no visibility check happens here.
    pub async fn subscribe(
        &self,
        identity: &IdentityContext,
        poll_id: &str,
    ) -> mpsc::Receiver<PollEvent> {
        self.hub.register(&identity.subject, poll_id).await
    }

    /// Remove every poll created by one of the given accounts. Serves the
    /// account-scoped data deletion surface.
    pub async fn delete_account_data(
        &self,
        org_id: &str,
        account_ids: &[String],
    ) -> AppResult<u64> {
        self.poll_repo
            .delete_polls_for_accounts(org_id, account_ids)
            .await
    }

    /// Map every group-scoped poll in the tenant to its group id. Serves
    /// the internal group-polls surface.
    pub async fn group_poll_mapping(
        &self,
        org_id: &str,
    ) -> AppResult<std::collections::HashMap<String, String>> {
        let models = self.poll_repo.get_group_polls(org_id).await?;
        Ok(models
            .into_iter()
            .filter_map(|m| m.group_id.map(|group_id| (m.id, group_id)))
            .collect())
    }

    /// Fetch a poll the caller may see; invisible and missing polls are
    /// indistinguishable.
    async fn fetch_visible(
        &self,
        identity: &IdentityContext,
        id: &str,
    ) -> AppResult<poll::Model> {
        let model = self
            .poll_repo
            .get_poll(&identity.org_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("poll {id}")))?;

        let membership = self.membership_if_group(identity, &model).await?;
        if !visibility::can_view(&model, &identity.subject, membership.as_ref()) {
            return Err(AppError::NotFound(format!("poll {id}")));
        }
        Ok(model)
    }

    /// Fetch a poll the caller may mutate.
    async fn fetch_mutable(
        &self,
        identity: &IdentityContext,
        id: &str,
    ) -> AppResult<poll::Model> {
        let model = self
            .poll_repo
            .get_poll(&identity.org_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("poll {id}")))?;

        let membership = self.membership_if_group(identity, &model).await?;
        if !visibility::can_view(&model, &identity.subject, membership.as_ref()) {
            return Err(AppError::NotFound(format!("poll {id}")));
        }
        if !visibility::can_mutate(&model, &identity.subject, membership.as_ref()) {
            return Err(AppError::Forbidden(format!(
                "not allowed to modify poll {id}"
            )));
        }
        Ok(model)
    }

    /// Membership is only consulted for group-scoped polls viewed by
    /// someone other than the creator; fetching it for the rest would put
    /// the group service on every request path.
    async fn membership_if_group(
        &self,
        identity: &IdentityContext,
        model: &poll::Model,
    ) -> AppResult<Option<GroupMembership>> {
        if model.group_id.is_some() && model.creator_id != identity.subject {
            self.groups.get_groups_membership(&identity.token).await
        } else {
            Ok(None)
        }
    }

    /// Announce a poll mutation out-of-band: to the poll's group when it has
    /// one, otherwise to its explicit recipients (minus the actor).
    fn notify(
        &self,
        identity: &IdentityContext,
        model: &poll::Model,
        operation: &str,
        body: String,
    ) {
        let data = notification_data(model, operation);

        if let Some(group_id) = &model.group_id {
            self.groups.send_group_notification(
                group_id,
                GroupNotification {
                    subject: NOTIFICATION_SUBJECT.to_string(),
                    body,
                    data,
                },
            );
            return;
        }

        let recipients = notification_recipients(model, &identity.subject);
        self.notifications.send_notification(NotificationMessage {
            org_id: model.org_id.clone(),
            app_id: model.app_id.clone(),
            recipients,
            subject: NOTIFICATION_SUBJECT.to_string(),
            body,
            data,
        });
    }
}

fn encode_to_members(data: &PollData) -> AppResult<Option<serde_json::Value>> {
    match &data.to_members {
        None => Ok(None),
        Some(members) => serde_json::to_value(members)
            .map(Some)
            .map_err(|e| AppError::Internal(e.to_string())),
    }
}

/// Payload attached to every poll notification.
fn notification_data(model: &poll::Model, operation: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "poll",
        "operation": operation,
        "entity_type": "poll",
        "entity_id": model.id,
        "entity_name": model.question,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_data_payload() {
        let model = poll::Model {
            id: "62f0a1b2c3d4e5f601234567".into(),
            org_id: "o1".into(),
            app_id: "a1".into(),
            creator_id: "u1".into(),
            creator_name: String::new(),
            question: "lunch?".into(),
            options: serde_json::json!(["a", "b"]),
            to_members: None,
            group_id: None,
            pin: 0,
            multi_choice: false,
            repeat: false,
            show_results: true,
            stadium: String::new(),
            geo_fence: false,
            status: "created".into(),
            responses: None,
            results: None,
            date_created: chrono::Utc::now().into(),
            date_updated: None,
        };

        let data = notification_data(&model, "poll_created");
        assert_eq!(data["operation"], "poll_created");
        assert_eq!(data["entity_id"], "62f0a1b2c3d4e5f601234567");
        assert_eq!(data["entity_name"], "lunch?");
    }
}
