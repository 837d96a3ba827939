//! Broker destinations.
//!
//! The backend exposes one broadcast topic for presence changes, a private
//! queue per user, and three application endpoints the client publishes to.

/// Presence broadcast. Any frame here means "the roster changed".
pub const PRESENCE_TOPIC: &str = "/topic/user";

/// Register the sender as online.
pub const ADD_USER: &str = "/app/user.addUser";

/// Announce an explicit leave.
pub const DISCONNECT_USER: &str = "/app/user.disconnectUser";

/// Deliver a one-to-one chat message.
pub const CHAT: &str = "/app/chat";

/// Subscription id for [`PRESENCE_TOPIC`].
pub const PRESENCE_SUBSCRIPTION_ID: &str = "sub-presence";

/// Subscription id for the private inbox.
pub const INBOX_SUBSCRIPTION_ID: &str = "sub-inbox";

/// Private inbox of `username`.
pub fn inbox(username: &str) -> String {
    format!("/user/{username}/queue/messages")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbox_is_per_user() {
        assert_eq!(inbox("alice"), "/user/alice/queue/messages");
        assert_ne!(inbox("alice"), inbox("bob"));
    }
}
