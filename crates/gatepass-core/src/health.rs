use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use chrono::Utc;

/// Liveness signal shared between a background worker and the readiness probe.
///
/// The worker calls [`Heartbeat::beat`] after every completed cycle; `/readyz`
/// reports unavailable until the first beat and whenever the last beat is older
/// than `stale_after`.
#[derive(Clone, Debug)]
pub struct Heartbeat {
    last_beat_ms: Arc<AtomicI64>,
    stale_after: Duration,
}

impl Heartbeat {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            last_beat_ms: Arc::new(AtomicI64::new(0)),
            stale_after,
        }
    }

    pub fn beat(&self) {
        self.last_beat_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn is_fresh(&self) -> bool {
        let last = self.last_beat_ms.load(Ordering::Relaxed);
        if last == 0 {
            return false;
        }
        let age_ms = Utc::now().timestamp_millis().saturating_sub(last);
        let limit_ms = i64::try_from(self.stale_after.as_millis()).unwrap_or(i64::MAX);
        age_ms <= limit_ms
    }
}

/// Handler for `GET /healthz`: liveness check.
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Handler for `GET /readyz`: ready while the worker keeps beating.
pub async fn readyz(State(heartbeat): State<Heartbeat>) -> StatusCode {
    if heartbeat.is_fresh() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
