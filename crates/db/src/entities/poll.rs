//! Poll entity.
//!
//! One row per poll. The document-shaped payloads (`options`, `to_members`,
//! `responses`, `results`) live in JSONB columns; [`ToMember`] and
//! [`PollVote`] are their typed forms.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "polls")]
pub struct Model {
    /// Opaque 12-byte id rendered as 24 hex characters.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Tenant discriminator; every query is scoped by this.
    pub org_id: String,

    /// Application id within the tenant.
    pub app_id: String,

    /// Creator user id.
    pub creator_id: String,

    /// Creator display name.
    pub creator_name: String,

    pub question: String,

    /// Ordered option labels (JSON array of strings, length >= 2).
    #[sea_orm(column_type = "JsonBinary")]
    pub options: JsonValue,

    /// Explicit visibility list (JSON array of `ToMember`).
    /// Null or empty means visible to everyone otherwise eligible.
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub to_members: Option<JsonValue>,

    /// Scoping group, when the poll belongs to one.
    #[sea_orm(nullable)]
    pub group_id: Option<String>,

    /// Four-digit access pin (0-9999).
    pub pin: i32,

    pub multi_choice: bool,

    pub repeat: bool,

    pub show_results: bool,

    pub stadium: String,

    pub geo_fence: bool,

    /// One of `created`, `started`, `terminated`.
    pub status: String,

    /// Append-only vote log (JSON array of `PollVote`).
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub responses: Option<JsonValue>,

    /// Precomputed tally, consulted only when `responses` is empty.
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub results: Option<JsonValue>,

    pub date_created: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub date_updated: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Poll lifecycle status.
///
/// `created -> started -> terminated`, with `end` also legal on an unstarted
/// poll. `terminated` is terminal. Start and end are idempotent, so the
/// transition check treats re-entry as legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollStatus {
    Created,
    Started,
    Terminated,
}

impl PollStatus {
    /// The stored string form. The words order lexicographically as
    /// created < started < terminated, which is what the poll listing's
    /// `status asc` sort relies on.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::Terminated => "terminated",
        }
    }

    /// Parse a stored status string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "started" => Some(Self::Started),
            "terminated" => Some(Self::Terminated),
            _ => None,
        }
    }

    /// Whether the state machine admits `self -> next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match next {
            // started can be (re-)entered from created or started
            Self::Started => matches!(self, Self::Created | Self::Started),
            // terminated can be entered from anywhere and is terminal
            Self::Terminated => true,
            Self::Created => matches!(self, Self::Created),
        }
    }
}

impl std::fmt::Display for PollStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a poll's explicit visibility list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToMember {
    pub user_id: String,
    #[serde(default)]
    pub external_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

/// One vote record: a voter and the option indices they selected.
///
/// Wire names follow the original poll documents (`userid`, not `user_id`) —
/// the responded-polls containment probe depends on the stored key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollVote {
    #[serde(rename = "userid")]
    pub user_id: String,
    pub answer: Vec<i64>,
    #[serde(default)]
    pub created: Option<chrono::DateTime<chrono::Utc>>,
}

impl Model {
    /// Typed view of the `options` column.
    #[must_use]
    pub fn option_labels(&self) -> Vec<String> {
        serde_json::from_value(self.options.clone()).unwrap_or_default()
    }

    /// Typed view of the `to_members` column; null and `[]` are equivalent.
    #[must_use]
    pub fn to_member_list(&self) -> Vec<ToMember> {
        self.to_members
            .clone()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    /// Typed view of the `responses` column.
    #[must_use]
    pub fn vote_list(&self) -> Vec<PollVote> {
        self.responses
            .clone()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    /// Typed view of the stored `results` column.
    #[must_use]
    pub fn stored_results(&self) -> Vec<i64> {
        self.results
            .clone()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    /// Parsed status; records only ever hold the three known words.
    #[must_use]
    pub fn poll_status(&self) -> PollStatus {
        PollStatus::parse(&self.status).unwrap_or(PollStatus::Created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [PollStatus::Created, PollStatus::Started, PollStatus::Terminated] {
            assert_eq!(PollStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PollStatus::parse("closed"), None);
    }

    #[test]
    fn test_status_sort_order_matches_lifecycle() {
        // The poll listing sorts `status asc` and expects created polls to
        // surface before started before terminated.
        let mut words = vec!["terminated", "created", "started"];
        words.sort_unstable();
        assert_eq!(words, vec!["created", "started", "terminated"]);
    }

    #[test]
    fn test_transitions() {
        use PollStatus::{Created, Started, Terminated};

        assert!(Created.can_transition_to(Started));
        assert!(Started.can_transition_to(Started)); // idempotent start
        assert!(Started.can_transition_to(Terminated));
        assert!(Created.can_transition_to(Terminated)); // end before start
        assert!(Terminated.can_transition_to(Terminated)); // idempotent end
        assert!(!Terminated.can_transition_to(Created));
    }

    #[test]
    fn test_vote_wire_names() {
        let vote = PollVote {
            user_id: "u1".into(),
            answer: vec![0, 2],
            created: None,
        };
        let json = serde_json::to_value(&vote).unwrap();
        assert_eq!(json["userid"], "u1");
        assert!(json.get("user_id").is_none());
    }

    #[test]
    fn test_to_members_null_and_empty_equivalent() {
        let base = Model {
            id: "62f0a1b2c3d4e5f601234567".into(),
            org_id: "o1".into(),
            app_id: "a1".into(),
            creator_id: "u1".into(),
            creator_name: "User One".into(),
            question: "q".into(),
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
        assert!(base.to_member_list().is_empty());

        let empty = Model {
            to_members: Some(serde_json::json!([])),
            ..base
        };
        assert!(empty.to_member_list().is_empty());
    }
}
