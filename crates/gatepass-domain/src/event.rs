//! Inbound events consumed by the allocation engine.

use serde::{Deserialize, Serialize};

use crate::id::{EventId, GroupId, UserId};
use crate::membership::MembershipChange;

/// Kind of chat a command arrived in. Only private chats qualify for a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
    Other,
}

impl ChatKind {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "private" => Self::Private,
            "group" => Self::Group,
            "supergroup" => Self::Supergroup,
            "channel" => Self::Channel,
            _ => Self::Other,
        }
    }
}

/// One event from the event source. Several events may share an id when a
/// single upstream update carries more than one roster change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// The qualifying command was sent by `user_id`.
    Command { user_id: UserId, chat_kind: ChatKind },
    /// `user_id` joined or left `group_id`.
    MembershipChanged {
        user_id: UserId,
        group_id: GroupId,
        change: MembershipChange,
    },
    /// Safely skippable: consumed only to advance the cursor.
    Ignored,
}

impl Event {
    pub fn command(id: i64, user_id: i64, chat_kind: ChatKind) -> Self {
        Self {
            id: EventId(id),
            kind: EventKind::Command {
                user_id: UserId(user_id),
                chat_kind,
            },
        }
    }

    pub fn membership(id: i64, user_id: i64, group_id: i64, change: MembershipChange) -> Self {
        Self {
            id: EventId(id),
            kind: EventKind::MembershipChanged {
                user_id: UserId(user_id),
                group_id: GroupId(group_id),
                change,
            },
        }
    }

    pub fn ignored(id: i64) -> Self {
        Self {
            id: EventId(id),
            kind: EventKind::Ignored,
        }
    }
}
