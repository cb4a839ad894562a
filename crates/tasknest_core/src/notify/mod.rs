//! User-facing notifications.

pub mod center;

pub use center::{NotificationCenter, SubscriptionId};
