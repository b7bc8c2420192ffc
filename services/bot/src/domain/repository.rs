#![allow(async_fn_in_trait)]

use gatepass_domain::assignment::Assignment;
use gatepass_domain::event::Event;
use gatepass_domain::id::{AccessCode, GroupId, UserId};
use gatepass_domain::membership::MemberStatus;

use crate::domain::types::{ClaimOutcome, CodeCandidate, CreateOutcome, Notification};
use crate::error::BotError;

/// Ordered, at-least-once stream of inbound events.
pub trait EventSource {
    /// Return events with id >= `cursor`, waiting up to the source's long-poll timeout.
    async fn poll(&mut self, cursor: i64) -> Result<Vec<Event>, BotError>;
}

/// Authority on group membership.
pub trait MembershipOracle {
    async fn status(&self, user: UserId, group: GroupId) -> Result<MemberStatus, BotError>;
}

/// Shared document store holding the code pool and per-user assignments.
pub trait CodePoolStore {
    /// Any one code with `used=false`, or `None` when the pool is empty.
    async fn fetch_one_unused(&self) -> Result<Option<CodeCandidate>, BotError>;

    /// Set `used=true` only if the code is still in the state observed in `candidate`.
    async fn mark_used(&self, candidate: &CodeCandidate) -> Result<ClaimOutcome, BotError>;

    async fn get_assignment(&self, user: UserId) -> Result<Option<Assignment>, BotError>;

    /// Create a reserved (`sent=false`) assignment for `user` only if none exists.
    async fn create_assignment(
        &self,
        user: UserId,
        code: &AccessCode,
    ) -> Result<CreateOutcome, BotError>;

    async fn upsert_assignment(
        &self,
        user: UserId,
        assignment: &Assignment,
    ) -> Result<(), BotError>;

    /// Remove the user's assignment. Deleting a missing record is not an error.
    async fn delete_assignment(&self, user: UserId) -> Result<(), BotError>;
}

/// Delivers a message to a user.
pub trait NotificationSink {
    async fn send(&self, user: UserId, notification: &Notification) -> Result<(), BotError>;
}

/// Supplies bearer tokens for authenticated store calls.
pub trait TokenSource {
    async fn bearer(&self) -> Result<String, BotError>;
}
