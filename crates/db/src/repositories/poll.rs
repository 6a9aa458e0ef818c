//! Poll repository.
//!
//! All storage operations for the polls collection. Every read is scoped by
//! the caller's organization; the visibility clause is pushed into the query
//! so the database can prune before sorting and paging. Committed mutations
//! are re-read and published on the change stream.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use livepoll_common::{AppError, AppResult, is_valid_id};
use sea_orm::sea_query::{Expr, SimpleExpr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use serde::Deserialize;

use crate::change_stream::PollChangeStream;
use crate::entities::{Poll, poll};

/// Structured filter for poll listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PollsFilter {
    pub pin: Option<i32>,
    #[serde(default)]
    pub poll_ids: Option<Vec<String>>,
    #[serde(default)]
    pub my_polls: Option<bool>,
    #[serde(default)]
    pub group_ids: Option<Vec<String>>,
    #[serde(default)]
    pub responded_polls: Option<bool>,
    #[serde(default)]
    pub statuses: Option<Vec<String>>,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
}

/// The fixed set of fields a poll update may patch.
#[derive(Debug, Clone)]
pub struct PollUpdate {
    pub question: String,
    pub options: serde_json::Value,
    pub to_members: Option<serde_json::Value>,
    pub group_id: Option<String>,
    pub pin: i32,
    pub multi_choice: bool,
    pub repeat: bool,
    pub show_results: bool,
    pub stadium: String,
    pub geo_fence: bool,
    pub status: String,
}

/// Poll repository for database operations.
#[derive(Clone)]
pub struct PollRepository {
    db: Arc<DatabaseConnection>,
    changes: PollChangeStream,
    op_timeout: Duration,
}

impl PollRepository {
    /// Create a new poll repository.
    #[must_use]
    pub const fn new(
        db: Arc<DatabaseConnection>,
        changes: PollChangeStream,
        op_timeout: Duration,
    ) -> Self {
        Self {
            db,
            changes,
            op_timeout,
        }
    }

    /// The change stream this repository publishes to.
    #[must_use]
    pub const fn change_stream(&self) -> &PollChangeStream {
        &self.changes
    }

    async fn run<T, F>(&self, op: &str, fut: F) -> AppResult<T>
    where
        F: std::future::Future<Output = Result<T, DbErr>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result.map_err(|e| AppError::Database(e.to_string())),
            Err(_) => Err(AppError::Database(format!("{op} timed out"))),
        }
    }

    /// List polls visible to `viewer` within `org_id`.
    ///
    /// `admin_group_ids` and `member_group_ids` feed the visibility clause
    /// (admin grants override the recipient list, plain membership gates
    /// group-scoped polls); `filter_by_to_members` toggles the visibility
    /// projection (internal callers skip it).
    pub async fn get_polls(
        &self,
        org_id: &str,
        viewer: &str,
        filter: &PollsFilter,
        admin_group_ids: &[String],
        member_group_ids: &[String],
        filter_by_to_members: bool,
    ) -> AppResult<Vec<poll::Model>> {
        let mut query = Poll::find().filter(poll::Column::OrgId.eq(org_id));

        if let Some(ids) = &filter.poll_ids {
            // Malformed ids are dropped, not rejected; an all-invalid list
            // matches nothing.
            query = query.filter(poll::Column::Id.is_in(sanitize_ids(ids)));
        }
        if let Some(pin) = filter.pin {
            query = query.filter(poll::Column::Pin.eq(pin));
        }
        if let Some(group_ids) = &filter.group_ids {
            query = query.filter(poll::Column::GroupId.is_in(group_ids.clone()));
        }
        if let Some(statuses) = &filter.statuses {
            query = query.filter(poll::Column::Status.is_in(statuses.clone()));
        }

        match (
            filter.my_polls.unwrap_or(false),
            filter.responded_polls.unwrap_or(false),
        ) {
            // Both flags requested: their conjunction is replaced by their
            // disjunction.
            (true, true) => {
                query = query.filter(
                    Condition::any()
                        .add(poll::Column::CreatorId.eq(viewer))
                        .add(responded_by(viewer)),
                );
            }
            (true, false) => query = query.filter(poll::Column::CreatorId.eq(viewer)),
            (false, true) => query = query.filter(responded_by(viewer)),
            (false, false) => {}
        }

        if filter_by_to_members {
            query = query.filter(visible_to(viewer, admin_group_ids, member_group_ids));
        }

        // Created polls surface before started before terminated, newest
        // first within each bucket.
        query = query
            .order_by_asc(poll::Column::Status)
            .order_by_desc(poll::Column::Id);

        if let Some(offset) = filter.offset {
            query = query.offset(offset);
        }
        if let Some(limit) = filter.limit {
            query = query.limit(limit);
        }

        self.run("GetPolls", query.all(self.db.as_ref())).await
    }

    /// Point read by `(org_id, id)`.
    pub async fn get_poll(&self, org_id: &str, id: &str) -> AppResult<Option<poll::Model>> {
        if !is_valid_id(id) {
            return Err(AppError::BadRequest(format!("malformed poll id: {id}")));
        }

        let query = Poll::find()
            .filter(poll::Column::OrgId.eq(org_id))
            .filter(poll::Column::Id.eq(id));

        self.run("GetPoll", query.one(self.db.as_ref())).await
    }

    /// Insert a new poll record.
    pub async fn create(&self, model: poll::ActiveModel) -> AppResult<poll::Model> {
        let created = self
            .run("CreatePoll", model.insert(self.db.as_ref()))
            .await?;
        self.changes.publish(created.clone());
        Ok(created)
    }

    /// Patch the update whitelist on `(org_id, id)` and stamp `date_updated`.
    ///
    /// Returns the updated record, or `None` when no row matched.
    pub async fn update(
        &self,
        org_id: &str,
        id: &str,
        update: &PollUpdate,
    ) -> AppResult<Option<poll::Model>> {
        let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();
        let statement = Poll::update_many()
            .col_expr(poll::Column::Question, Expr::value(update.question.clone()))
            .col_expr(poll::Column::Options, Expr::value(update.options.clone()))
            .col_expr(
                poll::Column::ToMembers,
                Expr::value(update.to_members.clone()),
            )
            .col_expr(poll::Column::GroupId, Expr::value(update.group_id.clone()))
            .col_expr(poll::Column::Pin, Expr::value(update.pin))
            .col_expr(poll::Column::MultiChoice, Expr::value(update.multi_choice))
            .col_expr(poll::Column::Repeat, Expr::value(update.repeat))
            .col_expr(poll::Column::ShowResults, Expr::value(update.show_results))
            .col_expr(poll::Column::Stadium, Expr::value(update.stadium.clone()))
            .col_expr(poll::Column::GeoFence, Expr::value(update.geo_fence))
            .col_expr(poll::Column::Status, Expr::value(update.status.clone()))
            .col_expr(poll::Column::DateUpdated, Expr::value(now))
            .filter(poll::Column::OrgId.eq(org_id))
            .filter(poll::Column::Id.eq(id));

        self.run("UpdatePoll", statement.exec(self.db.as_ref()))
            .await?;

        self.reload_and_publish(id).await
    }

    /// Set the lifecycle status on `(org_id, id)`.
    pub async fn set_status(
        &self,
        org_id: &str,
        id: &str,
        status: poll::PollStatus,
    ) -> AppResult<Option<poll::Model>> {
        let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();
        let statement = Poll::update_many()
            .col_expr(poll::Column::Status, Expr::value(status.as_str()))
            .col_expr(poll::Column::DateUpdated, Expr::value(now))
            .filter(poll::Column::OrgId.eq(org_id))
            .filter(poll::Column::Id.eq(id));

        self.run("SetPollStatus", statement.exec(self.db.as_ref()))
            .await?;

        self.reload_and_publish(id).await
    }

    /// Append a vote to the poll's response log.
    ///
    /// A single atomic statement keyed on id only — no tenancy filter, so
    /// replicated appends from the change feed apply unconditionally. Callers
    /// above enforce visibility first.
    pub async fn vote(&self, poll_id: &str, vote: &poll::PollVote) -> AppResult<()> {
        if !is_valid_id(poll_id) {
            return Err(AppError::BadRequest(format!(
                "malformed poll id: {poll_id}"
            )));
        }

        let mut vote = vote.clone();
        vote.created = Some(Utc::now());
        let vote_json = serde_json::to_value(&vote)
            .map_err(|e| AppError::Internal(e.to_string()))?
            .to_string();

        let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();
        let statement = Poll::update_many()
            .col_expr(
                poll::Column::Responses,
                Expr::cust_with_values(
                    r#"COALESCE("responses", '[]'::jsonb) || ?::jsonb"#,
                    [vote_json],
                ),
            )
            .col_expr(poll::Column::DateUpdated, Expr::value(now))
            .filter(poll::Column::Id.eq(poll_id));

        self.run("VotePoll", statement.exec(self.db.as_ref()))
            .await?;

        self.reload_and_publish(poll_id).await?;
        Ok(())
    }

    /// Delete a poll by `(org_id, id)`.
    pub async fn delete(&self, org_id: &str, id: &str) -> AppResult<()> {
        let statement = Poll::delete_many()
            .filter(poll::Column::OrgId.eq(org_id))
            .filter(poll::Column::Id.eq(id));

        self.run("DeletePoll", statement.exec(self.db.as_ref()))
            .await?;
        Ok(())
    }

    /// Delete every poll created by one of `account_ids` within `org_id`.
    ///
    /// Serves account-scoped data deletion; returns the number of rows
    /// removed.
    pub async fn delete_polls_for_accounts(
        &self,
        org_id: &str,
        account_ids: &[String],
    ) -> AppResult<u64> {
        if account_ids.is_empty() {
            return Ok(0);
        }

        let statement = Poll::delete_many()
            .filter(poll::Column::OrgId.eq(org_id))
            .filter(poll::Column::CreatorId.is_in(account_ids.to_vec()));

        let result = self
            .run("DeletePollsForAccounts", statement.exec(self.db.as_ref()))
            .await?;
        Ok(result.rows_affected)
    }

    /// List every group-scoped poll within `org_id`.
    ///
    /// Serves the internal poll-to-group mapping; no visibility projection.
    pub async fn get_group_polls(&self, org_id: &str) -> AppResult<Vec<poll::Model>> {
        let query = Poll::find()
            .filter(poll::Column::OrgId.eq(org_id))
            .filter(poll::Column::GroupId.is_not_null());

        self.run("GetGroupPolls", query.all(self.db.as_ref())).await
    }

    /// Assign the default tenant to legacy records that lack an org id.
    ///
    /// Runs at every startup; a no-op when zero records match.
    pub async fn backfill_missing_org(&self, default_org_id: &str) -> AppResult<u64> {
        let statement = Poll::update_many()
            .col_expr(poll::Column::OrgId, Expr::value(default_org_id))
            .filter(poll::Column::OrgId.eq(""));

        let result = self
            .run("BackfillMissingOrg", statement.exec(self.db.as_ref()))
            .await?;

        if result.rows_affected > 0 {
            tracing::info!(
                count = result.rows_affected,
                org_id = default_org_id,
                "Migrated legacy polls to default tenant"
            );
        }
        Ok(result.rows_affected)
    }

    /// Re-read a mutated row (by id alone) and publish it on the change
    /// stream. The write is committed before anything observes the event.
    async fn reload_and_publish(&self, id: &str) -> AppResult<Option<poll::Model>> {
        let reloaded = self
            .run("ReloadPoll", Poll::find_by_id(id).one(self.db.as_ref()))
            .await?;

        if let Some(model) = &reloaded {
            self.changes.publish(model.clone());
        }
        Ok(reloaded)
    }
}

/// Keep only well-formed 24-hex ids; malformed entries are silently dropped.
fn sanitize_ids(ids: &[String]) -> Vec<String> {
    ids.iter()
        .filter(|id| is_valid_id(id))
        .cloned()
        .collect()
}

/// `viewer` appears in the poll's response log.
fn responded_by(viewer: &str) -> SimpleExpr {
    let probe = serde_json::json!([{ "userid": viewer }]).to_string();
    Expr::cust_with_values(r#""responses" @> ?::jsonb"#, [probe])
}

/// `viewer` appears in the poll's explicit visibility list.
fn listed_in_to_members(viewer: &str) -> SimpleExpr {
    let probe = serde_json::json!([{ "user_id": viewer }]).to_string();
    Expr::cust_with_values(r#""to_members" @> ?::jsonb"#, [probe])
}

/// Query-time rendering of the read-visibility predicate. Mirrors the
/// in-process visibility resolver clause for clause; the two must stay in
/// lockstep:
/// - no explicit recipient list AND (no group, or the viewer belongs to
///   the poll's group in any role);
/// - or the viewer is listed, owns the poll, or administers the group.
fn visible_to(viewer: &str, admin_group_ids: &[String], member_group_ids: &[String]) -> Condition {
    let no_recipients = Condition::any()
        .add(poll::Column::ToMembers.is_null())
        .add(Expr::cust(r#""to_members" = '[]'::jsonb"#));

    let viewer_groups: Vec<String> = member_group_ids
        .iter()
        .chain(admin_group_ids.iter())
        .cloned()
        .collect();
    let group_gate = if viewer_groups.is_empty() {
        Condition::all().add(poll::Column::GroupId.is_null())
    } else {
        Condition::any()
            .add(poll::Column::GroupId.is_null())
            .add(poll::Column::GroupId.is_in(viewer_groups))
    };

    let mut visible = Condition::any()
        .add(Condition::all().add(no_recipients).add(group_gate))
        .add(listed_in_to_members(viewer))
        .add(poll::Column::CreatorId.eq(viewer));

    if !admin_group_ids.is_empty() {
        visible = visible.add(poll::Column::GroupId.is_in(admin_group_ids.to_vec()));
    }
    visible
}
