use gatepass_domain::id::{AccessCode, GroupId};

/// An unused code observed in the pool, plus the store's version token at read time.
///
/// `version` is whatever the store uses for optimistic concurrency (Firestore:
/// the document `updateTime`). A conditional mark succeeds only if the document
/// still carries this version, i.e. it is still unused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeCandidate {
    pub code: AccessCode,
    pub version: String,
}

/// Result of a conditional `used=false -> used=true` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    /// The precondition no longer held: someone else claimed or changed the code.
    Conflict,
}

/// Result of creating an assignment that must not already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFormat {
    Plain,
    Markdown,
}

/// A formatted message for the notification sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub text: String,
    pub format: MessageFormat,
}

/// Engine settings, built once from configuration and handed to the engine.
#[derive(Debug, Clone)]
pub struct EnginePolicy {
    /// Groups whose membership qualifies a user and whose roster events revoke grants.
    pub monitored_groups: Vec<GroupId>,
    /// Upper bound on fetch/mark rounds before reporting the pool as exhausted.
    pub max_claim_attempts: u32,
    /// Link prefix completed with the code in the delivery message.
    pub form_prefill_base: Option<String>,
}

impl EnginePolicy {
    pub fn monitors(&self, group: GroupId) -> bool {
        self.monitored_groups.contains(&group)
    }
}

/// Default bound on allocation rounds under contention.
pub const DEFAULT_MAX_CLAIM_ATTEMPTS: u32 = 5;

/// What handling one event did. Logged by the worker and asserted on in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A freshly allocated code was delivered.
    Delivered(AccessCode),
    /// A reserved but undelivered code was delivered on retry.
    Redelivered(AccessCode),
    /// The user already received their code; nothing was sent.
    AlreadyDelivered,
    /// No unused code could be claimed; the user was told.
    PoolExhausted,
    /// Membership could not be confirmed; any assignment was removed.
    NotMember,
    /// A roster change removed the user's assignment.
    Revoked,
    /// A concurrent consumer created the assignment first; nothing was sent.
    DuplicateSuppressed,
    /// The code was reserved but the send failed; the next command retries it.
    DeliveryFailed(AccessCode),
    /// The event does not concern the engine.
    Ignored,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Delivered(_) => "delivered",
            Self::Redelivered(_) => "redelivered",
            Self::AlreadyDelivered => "already_delivered",
            Self::PoolExhausted => "pool_exhausted",
            Self::NotMember => "not_member",
            Self::Revoked => "revoked",
            Self::DuplicateSuppressed => "duplicate_suppressed",
            Self::DeliveryFailed(_) => "delivery_failed",
            Self::Ignored => "ignored",
        }
    }
}
