//! Data access repositories.

pub mod poll;

pub use poll::{PollRepository, PollUpdate, PollsFilter};
