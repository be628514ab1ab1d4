//! Typed model of Bots Long Poll updates.
//!
//! Updates arrive as `{"type": "...", "object": {...}}` and are dispatched
//! into variants by serde tag matching. Types the bot does not care about
//! collapse into [`Update::Unknown`] and are skipped by the dispatcher.

use serde::Deserialize;
use serde_json::Value;

/// An inbound chat message.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    /// Sender's user id.
    pub from_id: i64,
    /// Conversation id (equals `from_id` for private chats).
    #[serde(default)]
    pub peer_id: i64,
    /// Plain message text. Empty for pure-attachment messages.
    #[serde(default)]
    pub text: String,
    /// Raw attachments, kept opaque.
    #[serde(default)]
    pub attachments: Vec<Value>,
}

/// A group membership change (join or leave).
#[derive(Debug, Clone, Deserialize)]
pub struct Membership {
    /// The user who joined or left.
    pub user_id: i64,
}

/// One long-poll update.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "object", rename_all = "snake_case")]
pub enum Update {
    /// A new inbound message.
    MessageNew(Message),
    /// A user joined the group.
    GroupJoin(Membership),
    /// A user left the group.
    GroupLeave(Membership),
    /// Any update type the bot does not handle.
    #[serde(other)]
    Unknown,
}

impl Update {
    /// Parses one raw update, mapping unparseable items to [`Update::Unknown`]
    /// rather than failing the whole batch.
    pub fn from_value(raw: Value) -> Self {
        serde_json::from_value(raw).unwrap_or(Update::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_message_new() {
        let update = Update::from_value(json!({
            "type": "message_new",
            "object": {"from_id": 7, "peer_id": 7, "text": "Баланс"}
        }));
        match update {
            Update::MessageNew(msg) => {
                assert_eq!(msg.from_id, 7);
                assert_eq!(msg.text, "Баланс");
            }
            other => panic!("expected MessageNew, got {other:?}"),
        }
    }

    #[test]
    fn parses_membership_changes() {
        let join = Update::from_value(json!({
            "type": "group_join",
            "object": {"user_id": 3, "join_type": "join"}
        }));
        assert!(matches!(join, Update::GroupJoin(Membership { user_id: 3 })));

        let leave = Update::from_value(json!({
            "type": "group_leave",
            "object": {"user_id": 4, "self": 0}
        }));
        assert!(matches!(leave, Update::GroupLeave(Membership { user_id: 4 })));
    }

    #[test]
    fn unknown_types_do_not_fail() {
        let update = Update::from_value(json!({
            "type": "wall_post_new",
            "object": {"id": 1}
        }));
        assert!(matches!(update, Update::Unknown));
    }

    #[test]
    fn missing_text_defaults_to_empty() {
        let update = Update::from_value(json!({
            "type": "message_new",
            "object": {"from_id": 7, "attachments": [{"type": "sticker"}]}
        }));
        match update {
            Update::MessageNew(msg) => assert!(msg.text.is_empty()),
            other => panic!("expected MessageNew, got {other:?}"),
        }
    }
}
