//! Domain model: request/response shapes and the per-viewer tally.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use livepoll_db::entities::poll::{self, ToMember};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// The mutable body of a poll, as submitted by clients and echoed in
/// results. Wire names follow the stored documents (`userid`, `username`).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PollData {
    /// Creator user id; server-stamped on create, echoed on reads.
    #[serde(rename = "userid", default)]
    pub user_id: String,
    /// Creator display name; server-stamped on create.
    #[serde(rename = "username", default)]
    pub user_name: String,
    /// Explicit visibility list. Absent or empty means visible to everyone
    /// otherwise eligible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_members: Option<Vec<ToMember>>,
    #[validate(length(min = 1, message = "question must not be empty"))]
    pub question: String,
    #[validate(
        length(min = 2, message = "a poll needs at least two options"),
        custom(function = validate_option_labels)
    )]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0, max = 9999))]
    pub pin: i32,
    #[serde(default)]
    pub multi_choice: bool,
    #[serde(default)]
    pub repeat: bool,
    #[serde(default)]
    pub show_results: bool,
    #[serde(default)]
    pub stadium: String,
    #[serde(rename = "geo_fence", default)]
    pub geo_fence: bool,
    /// Lifecycle status. Optional on input; create accepts only `created`
    /// or `started`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = validate_submitted_status))]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_updated: Option<DateTime<Utc>>,
}

fn validate_option_labels(options: &[String]) -> Result<(), ValidationError> {
    if options.iter().any(|o| o.trim().is_empty()) {
        return Err(ValidationError::new("empty_option"));
    }
    Ok(())
}

fn validate_submitted_status(status: &str) -> Result<(), ValidationError> {
    match status {
        "created" | "started" => Ok(()),
        _ => Err(ValidationError::new("invalid_status")),
    }
}

impl PollData {
    /// Rebuild the client-facing shape from a stored record.
    #[must_use]
    pub fn from_model(model: &poll::Model) -> Self {
        let to_members = model.to_member_list();
        Self {
            user_id: model.creator_id.clone(),
            user_name: model.creator_name.clone(),
            to_members: if to_members.is_empty() {
                None
            } else {
                Some(to_members)
            },
            question: model.question.clone(),
            options: model.option_labels(),
            group_id: model.group_id.clone(),
            pin: model.pin,
            multi_choice: model.multi_choice,
            repeat: model.repeat,
            show_results: model.show_results,
            stadium: model.stadium.clone(),
            geo_fence: model.geo_fence,
            status: Some(model.status.clone()),
            date_created: Some(model.date_created.with_timezone(&Utc)),
            date_updated: model.date_updated.map(|d| d.with_timezone(&Utc)),
        }
    }
}

/// Per-viewer projection of a poll: the poll body plus tallied results.
#[derive(Debug, Clone, Serialize)]
pub struct PollResult {
    pub id: String,
    pub poll: PollData,
    /// Option indices observed in the responses, echoed only to the poll's
    /// creator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voted: Option<Vec<i64>>,
    pub results: Vec<i64>,
    pub unique_voters_count: usize,
    pub total: i64,
}

impl PollResult {
    /// Project a stored poll for a specific viewer.
    ///
    /// When the record carries responses, `results[i]` counts the votes for
    /// option `i`; answers outside `[0, options.len())` are ignored. Without
    /// responses the stored tally is copied. `voted` is populated only when
    /// the viewer is the poll's creator.
    #[must_use]
    pub fn project(model: &poll::Model, viewer: &str) -> Self {
        let options = model.option_labels();
        let count = options.len();
        let mut results = vec![0i64; count];
        let mut voters: HashSet<String> = HashSet::new();
        let mut voted: BTreeSet<i64> = BTreeSet::new();

        let responses = model.vote_list();
        if responses.is_empty() {
            let stored = model.stored_results();
            for (i, slot) in results.iter_mut().enumerate() {
                *slot = stored.get(i).copied().unwrap_or(0);
            }
        } else {
            let viewer_is_creator = model.creator_id == viewer;
            for vote in &responses {
                voters.insert(vote.user_id.clone());
                for &answer in &vote.answer {
                    if answer >= 0 && (answer as usize) < count {
                        results[answer as usize] += 1;
                        if viewer_is_creator {
                            voted.insert(answer);
                        }
                    }
                }
            }
        }

        let total = results.iter().sum();

        Self {
            id: model.id.clone(),
            poll: PollData::from_model(model),
            voted: if voted.is_empty() {
                None
            } else {
                Some(voted.into_iter().collect())
            },
            results,
            unique_voters_count: voters.len(),
            total,
        }
    }
}

/// A user's group memberships, partitioned by role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupMembership {
    pub admin_of: Vec<String>,
    pub member_of: Vec<String>,
}

impl GroupMembership {
    /// Whether the user administers `group_id`.
    #[must_use]
    pub fn is_admin(&self, group_id: &str) -> bool {
        self.admin_of.iter().any(|g| g == group_id)
    }

    /// Whether the user belongs to `group_id` in any role.
    #[must_use]
    pub fn belongs_to(&self, group_id: &str) -> bool {
        self.is_admin(group_id) || self.member_of.iter().any(|g| g == group_id)
    }
}

/// Group metadata from the membership provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub privacy: String,
}

/// A notification recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRef {
    pub user_id: String,
    #[serde(default)]
    pub name: String,
}

/// Notification recipients for a poll: its explicit member list minus the
/// acting user.
#[must_use]
pub fn notification_recipients(model: &poll::Model, actor: &str) -> Vec<UserRef> {
    model
        .to_member_list()
        .into_iter()
        .filter(|m| m.user_id != actor)
        .map(|m| UserRef {
            user_id: m.user_id,
            name: m.name,
        })
        .collect()
}
