//! API endpoints.

pub mod internal;
pub mod poll;
