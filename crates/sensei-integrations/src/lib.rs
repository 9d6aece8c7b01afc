//! External collaborators: the fire-and-forget focus-event notifier and
//! bearer-token verification for real-time connections.

pub mod auth;
pub mod notify;

pub use auth::{AuthError, TokenVerifier};
pub use notify::{FocusNotice, HttpNotifier, NotificationSink};
