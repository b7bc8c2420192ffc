//! Group membership types.

use serde::{Deserialize, Serialize};

/// A user's status in a group, as reported by the membership oracle.
///
/// Wire format: lowercase string (`"member"`, `"administrator"`, ...).
/// Unrecognised values parse as [`MemberStatus::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Creator,
    Administrator,
    Member,
    Restricted,
    Left,
    Kicked,
    Unknown,
}

impl MemberStatus {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "creator" => Self::Creator,
            "administrator" => Self::Administrator,
            "member" => Self::Member,
            "restricted" => Self::Restricted,
            "left" => Self::Left,
            "kicked" => Self::Kicked,
            _ => Self::Unknown,
        }
    }

    /// Only members, administrators and creators count as active members.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Member | Self::Administrator | Self::Creator)
    }
}

/// Roster transition observed in a monitored group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipChange {
    Left,
    Joined,
}
