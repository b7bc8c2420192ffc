use gatepass_domain::id::AccessCode;
use tracing::{debug, warn};

use crate::domain::repository::CodePoolStore;
use crate::domain::types::ClaimOutcome;
use crate::error::BotError;

// ── ClaimCode ────────────────────────────────────────────────────────────────

/// Claims exactly one unused code from the pool.
///
/// Each round fetches a candidate and marks it used with a conditional write. A lost
/// race re-fetches; after `max_attempts` rounds (or as soon as the pool is empty)
/// the result is `None` and the caller reports exhaustion.
pub struct ClaimCodeUseCase<'a, S: CodePoolStore> {
    pub store: &'a S,
    pub max_attempts: u32,
}

impl<S: CodePoolStore> ClaimCodeUseCase<'_, S> {
    pub async fn execute(&self) -> Result<Option<AccessCode>, BotError> {
        for attempt in 1..=self.max_attempts.max(1) {
            let Some(candidate) = self.store.fetch_one_unused().await? else {
                debug!(attempt, "code pool empty");
                return Ok(None);
            };
            match self.store.mark_used(&candidate).await? {
                ClaimOutcome::Claimed => return Ok(Some(candidate.code)),
                ClaimOutcome::Conflict => {
                    debug!(attempt, "lost claim race, refetching");
                }
            }
        }
        warn!(
            attempts = self.max_attempts,
            "claim attempts exhausted under contention"
        );
        Ok(None)
    }
}
