//! Poll repository integration tests.
//!
//! These tests require a running `PostgreSQL` instance.
//! Run with: `cargo test --test poll_repository -- --ignored`
//!
//! Environment variables:
//!   `TEST_DB_HOST` (default: localhost)
//!   `TEST_DB_PORT` (default: 5433)
//!   `TEST_DB_USER` (default: `livepoll_test`)
//!   `TEST_DB_PASSWORD` (default: `livepoll_test`)
//!   `TEST_DB_NAME` (default: `livepoll_test`)

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use livepoll_common::IdGenerator;
use livepoll_db::entities::poll::{self, PollStatus, PollVote};
use livepoll_db::repositories::{PollRepository, PollUpdate, PollsFilter};
use livepoll_db::test_utils::TestDatabase;
use livepoll_db::PollChangeStream;
use sea_orm::Set;

async fn repository(db: &TestDatabase) -> PollRepository {
    let conn = sea_orm::Database::connect(db.config.database_url())
        .await
        .unwrap();
    PollRepository::new(
        Arc::new(conn),
        PollChangeStream::default(),
        Duration::from_millis(500),
    )
}

fn new_poll(org_id: &str, creator: &str, question: &str) -> poll::ActiveModel {
    poll::ActiveModel {
        id: Set(IdGenerator::new().generate()),
        org_id: Set(org_id.to_string()),
        app_id: Set("app1".to_string()),
        creator_id: Set(creator.to_string()),
        creator_name: Set(format!("{creator} name")),
        question: Set(question.to_string()),
        options: Set(serde_json::json!(["a", "b"])),
        to_members: Set(None),
        group_id: Set(None),
        pin: Set(0),
        multi_choice: Set(false),
        repeat: Set(false),
        show_results: Set(true),
        stadium: Set(String::new()),
        geo_fence: Set(false),
        status: Set("created".to_string()),
        responses: Set(None),
        results: Set(None),
        date_created: Set(chrono::Utc::now().into()),
        date_updated: Set(None),
    }
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_create_then_get_roundtrip() {
    let db = TestDatabase::create_unique().await.unwrap();
    let repo = repository(&db).await;

    let created = repo.create(new_poll("o1", "u1", "favorite color?")).await.unwrap();
    let fetched = repo.get_poll("o1", &created.id).await.unwrap().unwrap();

    assert_eq!(fetched.question, "favorite color?");
    assert_eq!(fetched.status, "created");
    assert_eq!(fetched.creator_id, "u1");

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_cross_tenant_isolation() {
    let db = TestDatabase::create_unique().await.unwrap();
    let repo = repository(&db).await;

    let created = repo.create(new_poll("o1", "u1", "q")).await.unwrap();

    // Point read from another org sees nothing.
    assert!(repo.get_poll("o2", &created.id).await.unwrap().is_none());

    // Listing with an empty org id returns empty.
    let listed = repo
        .get_polls("", "u4", &PollsFilter::default(), &[], &[], true)
        .await
        .unwrap();
    assert!(listed.is_empty());

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_to_members_visibility_projection() {
    let db = TestDatabase::create_unique().await.unwrap();
    let repo = repository(&db).await;

    let mut restricted = new_poll("o1", "u1", "restricted");
    restricted.to_members = Set(Some(serde_json::json!([
        { "user_id": "u3", "external_id": "", "name": "", "email": "" }
    ])));
    repo.create(restricted).await.unwrap();
    repo.create(new_poll("o1", "u1", "public")).await.unwrap();

    let filter = PollsFilter::default();

    // u2 is neither listed nor the creator: only the public poll.
    let seen_by_u2 = repo.get_polls("o1", "u2", &filter, &[], &[], true).await.unwrap();
    assert_eq!(seen_by_u2.len(), 1);
    assert_eq!(seen_by_u2[0].question, "public");

    // u3 is listed: both.
    let seen_by_u3 = repo.get_polls("o1", "u3", &filter, &[], &[], true).await.unwrap();
    assert_eq!(seen_by_u3.len(), 2);

    // The creator always sees their own.
    let seen_by_u1 = repo.get_polls("o1", "u1", &filter, &[], &[], true).await.unwrap();
    assert_eq!(seen_by_u1.len(), 2);

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_group_admin_sees_restricted_group_poll() {
    let db = TestDatabase::create_unique().await.unwrap();
    let repo = repository(&db).await;

    let mut poll = new_poll("o1", "u1", "group poll");
    poll.group_id = Set(Some("g1".to_string()));
    poll.to_members = Set(Some(serde_json::json!([
        { "user_id": "u3", "external_id": "", "name": "", "email": "" }
    ])));
    repo.create(poll).await.unwrap();

    let filter = PollsFilter::default();

    let as_plain = repo.get_polls("o1", "u2", &filter, &[], &[], true).await.unwrap();
    assert!(as_plain.is_empty());

    let as_admin = repo
        .get_polls("o1", "u2", &filter, &["g1".to_string()], &[], true)
        .await
        .unwrap();
    assert_eq!(as_admin.len(), 1);

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_group_poll_without_recipients_gated_on_membership() {
    let db = TestDatabase::create_unique().await.unwrap();
    let repo = repository(&db).await;

    let mut group_poll = new_poll("o1", "u1", "group poll");
    group_poll.group_id = Set(Some("g1".to_string()));
    repo.create(group_poll).await.unwrap();
    let public = repo.create(new_poll("o1", "u1", "public")).await.unwrap();

    let filter = PollsFilter::default();

    // A viewer outside g1 must not consume page slots with the group poll.
    let outsider = repo.get_polls("o1", "u2", &filter, &[], &[], true).await.unwrap();
    assert_eq!(outsider.len(), 1);
    assert_eq!(outsider[0].id, public.id);

    // A plain member sees it; so does an admin.
    let member = repo
        .get_polls("o1", "u2", &filter, &[], &["g1".to_string()], true)
        .await
        .unwrap();
    assert_eq!(member.len(), 2);

    let admin = repo
        .get_polls("o1", "u2", &filter, &["g1".to_string()], &[], true)
        .await
        .unwrap();
    assert_eq!(admin.len(), 2);

    // Paging cannot be hollowed out by invisible rows: with limit 1 the
    // outsider still gets the visible poll.
    let paged = PollsFilter {
        limit: Some(1),
        ..Default::default()
    };
    let first_page = repo.get_polls("o1", "u2", &paged, &[], &[], true).await.unwrap();
    assert_eq!(first_page.len(), 1);
    assert_eq!(first_page[0].id, public.id);

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_group_poll_mapping_listing() {
    let db = TestDatabase::create_unique().await.unwrap();
    let repo = repository(&db).await;

    let mut grouped = new_poll("o1", "u1", "grouped");
    grouped.group_id = Set(Some("g1".to_string()));
    let grouped = repo.create(grouped).await.unwrap();
    repo.create(new_poll("o1", "u1", "ungrouped")).await.unwrap();

    let mut other_org = new_poll("o2", "u1", "other org");
    other_org.group_id = Set(Some("g2".to_string()));
    repo.create(other_org).await.unwrap();

    let listed = repo.get_group_polls("o1").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, grouped.id);
    assert_eq!(listed[0].group_id.as_deref(), Some("g1"));

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_vote_append_and_responded_filter() {
    let db = TestDatabase::create_unique().await.unwrap();
    let repo = repository(&db).await;

    let created = repo.create(new_poll("o1", "u1", "q")).await.unwrap();

    repo.vote(
        &created.id,
        &PollVote {
            user_id: "u2".to_string(),
            answer: vec![0],
            created: None,
        },
    )
    .await
    .unwrap();
    repo.vote(
        &created.id,
        &PollVote {
            user_id: "u2".to_string(),
            answer: vec![1],
            created: None,
        },
    )
    .await
    .unwrap();

    let reloaded = repo.get_poll("o1", &created.id).await.unwrap().unwrap();
    assert_eq!(reloaded.vote_list().len(), 2);
    assert!(reloaded.date_updated.is_some());

    let responded = PollsFilter {
        responded_polls: Some(true),
        ..Default::default()
    };
    let for_voter = repo.get_polls("o1", "u2", &responded, &[], &[], true).await.unwrap();
    assert_eq!(for_voter.len(), 1);

    let for_other = repo.get_polls("o1", "u3", &responded, &[], &[], true).await.unwrap();
    assert!(for_other.is_empty());

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_my_and_responded_combine_as_disjunction() {
    let db = TestDatabase::create_unique().await.unwrap();
    let repo = repository(&db).await;

    let mine = repo.create(new_poll("o1", "u2", "mine")).await.unwrap();
    let other = repo.create(new_poll("o1", "u1", "voted on")).await.unwrap();
    repo.create(new_poll("o1", "u1", "unrelated")).await.unwrap();

    repo.vote(
        &other.id,
        &PollVote {
            user_id: "u2".to_string(),
            answer: vec![0],
            created: None,
        },
    )
    .await
    .unwrap();

    let both = PollsFilter {
        my_polls: Some(true),
        responded_polls: Some(true),
        ..Default::default()
    };
    let listed = repo.get_polls("o1", "u2", &both, &[], &[], true).await.unwrap();
    let ids: Vec<&str> = listed.iter().map(|p| p.id.as_str()).collect();

    assert_eq!(listed.len(), 2);
    assert!(ids.contains(&mine.id.as_str()));
    assert!(ids.contains(&other.id.as_str()));

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_listing_sorts_status_then_newest() {
    let db = TestDatabase::create_unique().await.unwrap();
    let repo = repository(&db).await;

    let first = repo.create(new_poll("o1", "u1", "first")).await.unwrap();
    let second = repo.create(new_poll("o1", "u1", "second")).await.unwrap();
    repo.set_status("o1", &first.id, PollStatus::Terminated)
        .await
        .unwrap();

    let listed = repo
        .get_polls("o1", "u1", &PollsFilter::default(), &[], &[], true)
        .await
        .unwrap();

    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, second.id); // created before terminated
    assert_eq!(listed[1].id, first.id);

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_update_whitelist_allows_status() {
    let db = TestDatabase::create_unique().await.unwrap();
    let repo = repository(&db).await;

    let created = repo.create(new_poll("o1", "u1", "q")).await.unwrap();
    repo.set_status("o1", &created.id, PollStatus::Terminated)
        .await
        .unwrap();

    // Update is deliberately permissive: it can drive terminated -> started.
    let update = PollUpdate {
        question: "q2".to_string(),
        options: serde_json::json!(["a", "b", "c"]),
        to_members: None,
        group_id: None,
        pin: 42,
        multi_choice: true,
        repeat: false,
        show_results: true,
        stadium: String::new(),
        geo_fence: false,
        status: "started".to_string(),
    };
    let updated = repo.update("o1", &created.id, &update).await.unwrap().unwrap();

    assert_eq!(updated.question, "q2");
    assert_eq!(updated.status, "started");
    assert_eq!(updated.pin, 42);
    assert!(updated.date_updated.is_some());

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_mutations_publish_on_change_stream() {
    let db = TestDatabase::create_unique().await.unwrap();
    let repo = repository(&db).await;
    let mut rx = repo.change_stream().subscribe();

    let created = repo.create(new_poll("o1", "u1", "q")).await.unwrap();
    let change = rx.recv().await.unwrap();
    assert_eq!(change.collection, "polls");
    assert_eq!(change.full_document.id, created.id);

    repo.vote(
        &created.id,
        &PollVote {
            user_id: "u2".to_string(),
            answer: vec![1],
            created: None,
        },
    )
    .await
    .unwrap();
    let change = rx.recv().await.unwrap();
    assert_eq!(change.full_document.vote_list().len(), 1);

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_delete_polls_for_accounts() {
    let db = TestDatabase::create_unique().await.unwrap();
    let repo = repository(&db).await;

    repo.create(new_poll("o1", "u1", "a")).await.unwrap();
    repo.create(new_poll("o1", "u1", "b")).await.unwrap();
    repo.create(new_poll("o1", "u2", "c")).await.unwrap();
    repo.create(new_poll("o2", "u1", "other org")).await.unwrap();

    let removed = repo
        .delete_polls_for_accounts("o1", &["u1".to_string()])
        .await
        .unwrap();
    assert_eq!(removed, 2);

    let remaining = repo
        .get_polls("o1", "u2", &PollsFilter::default(), &[], &[], false)
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);

    db.drop_database().await.unwrap();
}
