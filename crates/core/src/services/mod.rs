//! Domain services.

pub mod groups;
pub mod notifications;
pub mod poll;

pub use groups::{GroupNotification, GroupsClient};
pub use notifications::{NotificationMessage, NotificationsClient};
pub use poll::PollService;
