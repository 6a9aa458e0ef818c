//! Visibility resolver.
//!
//! Pure predicates deciding what a viewer may see and mutate. The storage
//! layer embeds the same read predicate in its listing query; the two must
//! stay in lockstep. A missing membership behaves as an empty one.

use livepoll_db::entities::poll;

use crate::model::GroupMembership;

/// Whether `viewer` may see (and therefore vote on) the poll.
#[must_use]
pub fn can_view(model: &poll::Model, viewer: &str, membership: Option<&GroupMembership>) -> bool {
    if model.creator_id == viewer {
        return true;
    }

    // Group admins see everything in their group, listed or not.
    if let Some(group_id) = &model.group_id {
        if membership.is_some_and(|m| m.is_admin(group_id)) {
            return true;
        }
    }

    let to_members = model.to_member_list();
    if to_members.is_empty() {
        // Public within the tenant, unless scoped to a group the viewer is
        // not part of.
        return match &model.group_id {
            None => true,
            Some(group_id) => membership.is_some_and(|m| m.belongs_to(group_id)),
        };
    }

    to_members.iter().any(|m| m.user_id == viewer)
}

/// Whether `viewer` may mutate the poll (update, start, end, delete).
#[must_use]
pub fn can_mutate(model: &poll::Model, viewer: &str, membership: Option<&GroupMembership>) -> bool {
    if model.creator_id == viewer {
        return true;
    }

    match &model.group_id {
        Some(group_id) => membership.is_some_and(|m| m.is_admin(group_id)),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poll(creator: &str) -> poll::Model {
        poll::Model {
            id: "62f0a1b2c3d4e5f601234567".into(),
            org_id: "o1".into(),
            app_id: "a1".into(),
            creator_id: creator.into(),
            creator_name: String::new(),
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
        }
    }

    fn restricted_to(model: &mut poll::Model, users: &[&str]) {
        let members: Vec<serde_json::Value> = users
            .iter()
            .map(|u| serde_json::json!({ "user_id": u, "external_id": "", "name": "", "email": "" }))
            .collect();
        model.to_members = Some(serde_json::Value::Array(members));
    }

    fn membership(admin_of: &[&str], member_of: &[&str]) -> GroupMembership {
        GroupMembership {
            admin_of: admin_of.iter().map(ToString::to_string).collect(),
            member_of: member_of.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn test_creator_always_sees_and_mutates() {
        let mut model = poll("u1");
        restricted_to(&mut model, &["u3"]);

        assert!(can_view(&model, "u1", None));
        assert!(can_mutate(&model, "u1", None));
    }

    #[test]
    fn test_public_poll_visible_to_everyone() {
        let model = poll("u1");
        assert!(can_view(&model, "u2", None));
        assert!(!can_mutate(&model, "u2", None));
    }

    #[test]
    fn test_explicit_recipients_gate_visibility() {
        let mut model = poll("u1");
        restricted_to(&mut model, &["u3"]);

        assert!(can_view(&model, "u3", None));
        assert!(!can_view(&model, "u2", None));
    }

    #[test]
    fn test_empty_to_members_same_as_absent() {
        let mut model = poll("u1");
        model.to_members = Some(serde_json::json!([]));
        assert!(can_view(&model, "u2", None));
    }

    #[test]
    fn test_group_poll_requires_membership() {
        let mut model = poll("u1");
        model.group_id = Some("g1".into());

        assert!(!can_view(&model, "u2", None));
        assert!(can_view(&model, "u2", Some(&membership(&[], &["g1"]))));
        assert!(can_view(&model, "u2", Some(&membership(&["g1"], &[]))));
        assert!(!can_view(&model, "u2", Some(&membership(&[], &["g2"]))));
    }

    #[test]
    fn test_group_admin_overrides_recipient_list() {
        let mut model = poll("u1");
        model.group_id = Some("g1".into());
        restricted_to(&mut model, &["u3"]);

        // A plain member is excluded by the list; an admin is not.
        assert!(!can_view(&model, "u2", Some(&membership(&[], &["g1"]))));
        assert!(can_view(&model, "u2", Some(&membership(&["g1"], &[]))));
    }

    #[test]
    fn test_group_admin_may_mutate() {
        let mut model = poll("u1");
        model.group_id = Some("g1".into());

        assert!(can_mutate(&model, "u2", Some(&membership(&["g1"], &[]))));
        assert!(!can_mutate(&model, "u2", Some(&membership(&[], &["g1"]))));
        assert!(!can_mutate(&model, "u2", None));
    }

    #[test]
    fn test_deterministic() {
        let mut model = poll("u1");
        model.group_id = Some("g1".into());
        let m = membership(&["g1"], &[]);

        for _ in 0..3 {
            assert!(can_view(&model, "u2", Some(&m)));
            assert!(can_mutate(&model, "u2", Some(&m)));
        }
    }
}
