use std::time::Duration;

use gatepass_core::config::{ConfigError, Env};
use gatepass_domain::id::GroupId;

use crate::domain::types::{DEFAULT_MAX_CLAIM_ATTEMPTS, EnginePolicy};

/// Bot service configuration, loaded once at startup and passed down explicitly.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Telegram bot token. Env var: `TELEGRAM_BOT_TOKEN`.
    pub telegram_bot_token: String,
    /// Telegram Bot API base (default `https://api.telegram.org`). Env var: `TELEGRAM_API_BASE`.
    pub telegram_api_base: String,
    /// Groups whose members may request a code. Env var: `ONBOARDING_GROUP_ID` (comma-separated).
    pub monitored_groups: Vec<GroupId>,
    /// Qualifying command (default `/getcode`). Env var: `BOT_COMMAND`.
    pub command: String,
    /// Firebase project id. Env var: `FIREBASE_PROJECT_ID`.
    pub firebase_project_id: String,
    /// Firestore REST base. `FIRESTORE_API_BASE`, or `http://$FIRESTORE_EMULATOR_HOST/v1`.
    pub firestore_api_base: String,
    /// True when talking to the Firestore emulator (no service account needed).
    pub firestore_emulator: bool,
    /// Service account key JSON. Env var: `SERVICE_ACCOUNT_JSON` (required unless emulator).
    pub service_account_json: Option<String>,
    /// Code pool collection (default `accessCodes`). Env var: `ACCESS_CODES_COLLECTION`.
    pub access_codes_collection: String,
    /// Assignment collection (default `userCodes`). Env var: `ASSIGNMENTS_COLLECTION`.
    pub assignments_collection: String,
    /// Sign-up form link prefix, completed with the code. Env var: `FORM_PREFILL_BASE`.
    pub form_prefill_base: Option<String>,
    /// Long-poll timeout (default 20s). Env var: `POLL_TIMEOUT_SECS`.
    pub poll_timeout: Duration,
    /// Timeout for every non-poll request (default 10s). Env var: `REQUEST_TIMEOUT_SECS`.
    pub request_timeout: Duration,
    /// Pause after a failed poll cycle (default 1000ms). Env var: `POLL_ERROR_DELAY_MS`.
    pub poll_error_delay: Duration,
    /// Allocation rounds under contention (default 5). Env var: `MAX_CLAIM_ATTEMPTS`.
    pub max_claim_attempts: u32,
    /// Health endpoint port (default 8080). Env var: `HEALTH_PORT`.
    pub health_port: u16,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(&Env::process())
    }

    pub fn load<F>(env: &Env<F>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let emulator_host = env.optional("FIRESTORE_EMULATOR_HOST");
        let firestore_emulator = emulator_host.is_some();
        let firestore_api_base = match emulator_host {
            Some(host) => format!("http://{host}/v1"),
            None => env.string_or("FIRESTORE_API_BASE", "https://firestore.googleapis.com/v1"),
        };
        let service_account_json = if firestore_emulator {
            env.optional("SERVICE_ACCOUNT_JSON")
        } else {
            Some(env.required("SERVICE_ACCOUNT_JSON")?)
        };

        let max_claim_attempts = env.parse_or("MAX_CLAIM_ATTEMPTS", DEFAULT_MAX_CLAIM_ATTEMPTS)?;
        if max_claim_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: "MAX_CLAIM_ATTEMPTS".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }

        Ok(Self {
            telegram_bot_token: env.required("TELEGRAM_BOT_TOKEN")?,
            telegram_api_base: env
                .string_or("TELEGRAM_API_BASE", "https://api.telegram.org")
                .trim_end_matches('/')
                .to_owned(),
            monitored_groups: env.required_list("ONBOARDING_GROUP_ID")?,
            command: env.string_or("BOT_COMMAND", "/getcode"),
            firebase_project_id: env.required("FIREBASE_PROJECT_ID")?,
            firestore_api_base: firestore_api_base.trim_end_matches('/').to_owned(),
            firestore_emulator,
            service_account_json,
            access_codes_collection: env.string_or("ACCESS_CODES_COLLECTION", "accessCodes"),
            assignments_collection: env.string_or("ASSIGNMENTS_COLLECTION", "userCodes"),
            form_prefill_base: env.optional("FORM_PREFILL_BASE"),
            poll_timeout: Duration::from_secs(env.parse_or("POLL_TIMEOUT_SECS", 20)?),
            request_timeout: Duration::from_secs(env.parse_or("REQUEST_TIMEOUT_SECS", 10)?),
            poll_error_delay: Duration::from_millis(env.parse_or("POLL_ERROR_DELAY_MS", 1000)?),
            max_claim_attempts,
            health_port: env.parse_or("HEALTH_PORT", 8080)?,
        })
    }

    pub fn engine_policy(&self) -> EnginePolicy {
        EnginePolicy {
            monitored_groups: self.monitored_groups.clone(),
            max_claim_attempts: self.max_claim_attempts,
            form_prefill_base: self.form_prefill_base.clone(),
        }
    }

    /// Readiness window: a few missed poll cycles before `/readyz` reports unavailable.
    pub fn heartbeat_stale_after(&self) -> Duration {
        (self.poll_timeout + self.request_timeout) * 3
    }
}
