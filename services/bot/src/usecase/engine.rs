use gatepass_domain::assignment::Assignment;
use gatepass_domain::event::{ChatKind, Event, EventKind};
use gatepass_domain::id::{AccessCode, GroupId, UserId};
use gatepass_domain::membership::MembershipChange;
use tracing::{debug, error, info, warn};

use crate::domain::repository::{CodePoolStore, MembershipOracle, NotificationSink};
use crate::domain::types::{CreateOutcome, EnginePolicy, Outcome};
use crate::error::BotError;
use crate::usecase::allocate::ClaimCodeUseCase;
use crate::usecase::messages;

/// Grants each verified member one code and revokes it on roster changes.
///
/// Per-user cycle: no assignment → reserved → delivered once the send succeeds →
/// deleted on a roster change → no assignment. Every store mutation is either the
/// conditional claim, a conditional create, or an upsert/delete keyed by user, so
/// redelivered events and concurrent engines never hand one code to two users.
pub struct AllocationEngine<M, S, N>
where
    M: MembershipOracle,
    S: CodePoolStore,
    N: NotificationSink,
{
    policy: EnginePolicy,
    membership: M,
    store: S,
    notifier: N,
}

impl<M, S, N> AllocationEngine<M, S, N>
where
    M: MembershipOracle,
    S: CodePoolStore,
    N: NotificationSink,
{
    pub fn new(policy: EnginePolicy, membership: M, store: S, notifier: N) -> Self {
        Self {
            policy,
            membership,
            store,
            notifier,
        }
    }

    /// Handle one event. An `Err` means the effect was deferred and the event must be
    /// retried; the caller must not advance its cursor past it.
    pub async fn handle(&self, event: &Event) -> Result<Outcome, BotError> {
        match &event.kind {
            EventKind::Command {
                user_id,
                chat_kind: ChatKind::Private,
            } => self.handle_command(*user_id).await,
            EventKind::Command { user_id, chat_kind } => {
                debug!(user_id = %user_id, ?chat_kind, "command outside private chat ignored");
                Ok(Outcome::Ignored)
            }
            EventKind::MembershipChanged {
                user_id,
                group_id,
                change,
            } => {
                self.handle_membership_changed(*user_id, *group_id, *change)
                    .await
            }
            EventKind::Ignored => Ok(Outcome::Ignored),
        }
    }

    pub async fn handle_command(&self, user: UserId) -> Result<Outcome, BotError> {
        // 1. Membership gate (fail-closed)
        if !self.is_active_member(user).await {
            self.store.delete_assignment(user).await?;
            info!(user_id = %user, "membership not confirmed, assignment cleared");
            return Ok(Outcome::NotMember);
        }

        // 2. Idempotency guard on the existing record
        match self.store.get_assignment(user).await? {
            Some(existing) => match existing.code() {
                Some(_) if existing.sent => {
                    debug!(user_id = %user, "code already delivered");
                    Ok(Outcome::AlreadyDelivered)
                }
                Some(code) => self.redeliver(user, code.clone()).await,
                None => {
                    // Legacy shape without a code: clear it so the conditional create can succeed.
                    self.store.delete_assignment(user).await?;
                    self.allocate(user).await
                }
            },
            None => self.allocate(user).await,
        }
    }

    /// Any roster change in a monitored group invalidates the user's grant.
    pub async fn handle_membership_changed(
        &self,
        user: UserId,
        group: GroupId,
        change: MembershipChange,
    ) -> Result<Outcome, BotError> {
        if !self.policy.monitors(group) {
            debug!(user_id = %user, group_id = %group, "roster change in unmonitored group ignored");
            return Ok(Outcome::Ignored);
        }
        self.store.delete_assignment(user).await?;
        info!(user_id = %user, group_id = %group, ?change, "assignment revoked");
        Ok(Outcome::Revoked)
    }

    /// Active in at least one monitored group. Oracle errors count as "not a member".
    async fn is_active_member(&self, user: UserId) -> bool {
        for group in &self.policy.monitored_groups {
            match self.membership.status(user, *group).await {
                Ok(status) if status.is_active() => return true,
                Ok(status) => {
                    debug!(user_id = %user, group_id = %group, ?status, "not an active member");
                }
                Err(e) => {
                    warn!(user_id = %user, group_id = %group, error = %e, "membership lookup failed, failing closed");
                }
            }
        }
        false
    }

    async fn allocate(&self, user: UserId) -> Result<Outcome, BotError> {
        let claim = ClaimCodeUseCase {
            store: &self.store,
            max_attempts: self.policy.max_claim_attempts,
        };
        let Some(code) = claim.execute().await? else {
            warn!(user_id = %user, "no unused codes available");
            if let Err(e) = self.notifier.send(user, &messages::pool_exhausted()).await {
                error!(user_id = %user, error = %e, "failed to send exhaustion notice");
            }
            return Ok(Outcome::PoolExhausted);
        };

        match self.store.create_assignment(user, &code).await? {
            CreateOutcome::Created => {}
            CreateOutcome::AlreadyExists => {
                // Another consumer won the same command; the claimed code stays consumed.
                warn!(user_id = %user, "assignment created concurrently, claimed code orphaned");
                debug!(user_id = %user, code = %code, "orphaned code");
                return Ok(Outcome::DuplicateSuppressed);
            }
        }

        if self.deliver(user, &code).await? {
            Ok(Outcome::Delivered(code))
        } else {
            Ok(Outcome::DeliveryFailed(code))
        }
    }

    /// Send a code that was reserved earlier but never acknowledged.
    async fn redeliver(&self, user: UserId, code: AccessCode) -> Result<Outcome, BotError> {
        if self.deliver(user, &code).await? {
            Ok(Outcome::Redelivered(code))
        } else {
            Ok(Outcome::DeliveryFailed(code))
        }
    }

    /// Send a reserved code, then mark the assignment delivered. Returns whether the
    /// send went through; a failed send leaves the reservation untouched.
    ///
    /// `sent=true` is written only after a successful send. If that write fails the
    /// event is retried and the user may get the same code twice, never zero times.
    async fn deliver(&self, user: UserId, code: &AccessCode) -> Result<bool, BotError> {
        let notification =
            messages::code_delivery(code, self.policy.form_prefill_base.as_deref());
        if let Err(e) = self.notifier.send(user, &notification).await {
            error!(user_id = %user, error = %e, "code delivery failed, keeping reservation");
            return Ok(false);
        }
        self.store
            .upsert_assignment(user, &Assignment::delivered(code.clone()))
            .await?;
        info!(user_id = %user, "access code delivered");
        Ok(true)
    }
}
