//! Core domain logic for livepoll.
//!
//! This crate contains the poll coordination engine:
//!
//! - **Visibility**: who may see and mutate a poll, in [`visibility`]
//! - **Tally**: per-viewer result projection, in [`model`]
//! - **Poll service**: CRUD, lifecycle and voting orchestration, in
//!   [`services::poll`]
//! - **SSE hub**: subscriber registry and fan-out, in [`hub`]
//! - **Change feed**: storage mutations to live updates, in [`change_feed`]
//! - **Collaborator clients**: group membership and notifications, in
//!   [`services`]

pub mod change_feed;
pub mod hub;
pub mod model;
pub mod services;
pub mod visibility;

pub use hub::{PollEvent, SseHub};
pub use model::{Group, GroupMembership, PollData, PollResult, UserRef};
pub use services::{GroupsClient, NotificationsClient, PollService};
