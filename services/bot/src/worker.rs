use std::time::Duration;

use gatepass_core::health::Heartbeat;
use tracing::{debug, error, info};

use crate::domain::repository::{CodePoolStore, EventSource, MembershipOracle, NotificationSink};
use crate::error::BotError;
use crate::usecase::engine::AllocationEngine;

/// Single logical consumer: long-polls the event source and feeds the engine one
/// event at a time.
///
/// The cursor only moves past events the engine handled successfully, so a failed
/// event is fetched again on the next cycle. Events are delivered at least once;
/// the engine absorbs the duplicates.
pub struct Poller<E, M, S, N>
where
    E: EventSource,
    M: MembershipOracle,
    S: CodePoolStore,
    N: NotificationSink,
{
    source: E,
    engine: AllocationEngine<M, S, N>,
    cursor: i64,
    error_delay: Duration,
    heartbeat: Heartbeat,
}

impl<E, M, S, N> Poller<E, M, S, N>
where
    E: EventSource,
    M: MembershipOracle,
    S: CodePoolStore,
    N: NotificationSink,
{
    pub fn new(
        source: E,
        engine: AllocationEngine<M, S, N>,
        error_delay: Duration,
        heartbeat: Heartbeat,
    ) -> Self {
        Self {
            source,
            engine,
            cursor: 0,
            error_delay,
            heartbeat,
        }
    }

    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    /// Run one poll cycle. Returns the number of events handled.
    ///
    /// Stops at the first event whose handling fails and returns that error. One
    /// upstream update may fan out into several events sharing an id; the cursor
    /// moves past an id only once every event carrying it was handled, so a partly
    /// handled update is fetched again in full.
    pub async fn poll_once(&mut self) -> Result<usize, BotError> {
        let events = self.source.poll(self.cursor).await?;
        let mut handled = 0;
        for (i, event) in events.iter().enumerate() {
            let outcome = self.engine.handle(event).await.inspect_err(|e| {
                error!(
                    event_id = %event.id,
                    cursor = self.cursor,
                    error = %e,
                    kind = e.kind(),
                    "event handling deferred"
                );
            })?;
            debug!(event_id = %event.id, outcome = outcome.label(), "event handled");
            handled += 1;
            let last_of_id = events.get(i + 1).is_none_or(|next| next.id != event.id);
            if last_of_id {
                self.cursor = self.cursor.max(event.id.next());
            }
        }
        Ok(handled)
    }

    /// Poll forever. Errors are logged and followed by a short pause; they never end the loop.
    pub async fn run(&mut self) {
        info!(cursor = self.cursor, "poller started");
        loop {
            match self.poll_once().await {
                Ok(handled) => {
                    self.heartbeat.beat();
                    if handled > 0 {
                        debug!(handled, cursor = self.cursor, "poll cycle complete");
                    }
                }
                Err(e) => {
                    let delay = self.backoff(&e);
                    error!(
                        error = %e,
                        kind = e.kind(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "poll cycle failed"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn backoff(&self, e: &BotError) -> Duration {
        e.retry_after()
            .map_or(self.error_delay, |d| d.max(self.error_delay))
    }
}
