use std::time::Duration;

use anyhow::Context as _;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::warn;

use gatepass_domain::event::{ChatKind, Event};
use gatepass_domain::id::{GroupId, UserId};
use gatepass_domain::membership::{MemberStatus, MembershipChange};

use crate::domain::repository::{EventSource, MembershipOracle, NotificationSink};
use crate::domain::types::{MessageFormat, Notification};
use crate::error::BotError;

/// Update types requested from `getUpdates`.
const ALLOWED_UPDATES: [&str; 2] = ["message", "chat_member"];

/// Telegram Bot API client. Serves as event source, membership oracle and
/// notification sink.
#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    bot_base: String,
    command: String,
    poll_timeout: Duration,
    request_timeout: Duration,
}

impl TelegramClient {
    pub fn new(
        client: Client,
        api_base: &str,
        bot_token: &str,
        command: &str,
        poll_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            client,
            bot_base: format!("{}/bot{}", api_base.trim_end_matches('/'), bot_token),
            command: command.to_owned(),
            poll_timeout,
            request_timeout,
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<T, BotError> {
        let resp = self
            .client
            .post(format!("{}/{}", self.bot_base, method))
            .json(payload)
            .timeout(timeout)
            .send()
            .await?;
        let status = resp.status();
        let body: ApiResponse<T> = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                BotError::Timeout
            } else {
                BotError::Telegram {
                    code: i64::from(status.as_u16()),
                    description: format!("unreadable {method} response"),
                }
            }
        })?;
        body.into_result(method)
    }
}

impl EventSource for TelegramClient {
    async fn poll(&mut self, cursor: i64) -> Result<Vec<Event>, BotError> {
        let payload = json!({
            "offset": cursor,
            "timeout": self.poll_timeout.as_secs(),
            "allowed_updates": ALLOWED_UPDATES,
        });
        let updates: Vec<Value> = self
            .call("getUpdates", &payload, self.poll_timeout + self.request_timeout)
            .await?;
        Ok(events_from_updates(updates, &self.command))
    }
}

impl MembershipOracle for TelegramClient {
    async fn status(&self, user: UserId, group: GroupId) -> Result<MemberStatus, BotError> {
        let payload = json!({ "chat_id": group.0, "user_id": user.0 });
        let member: ChatMember = self
            .call("getChatMember", &payload, self.request_timeout)
            .await?;
        Ok(MemberStatus::from_wire(&member.status))
    }
}

impl NotificationSink for TelegramClient {
    async fn send(&self, user: UserId, notification: &Notification) -> Result<(), BotError> {
        let mut payload = json!({
            "chat_id": user.0,
            "text": notification.text,
            "disable_web_page_preview": true,
        });
        if notification.format == MessageFormat::Markdown {
            payload["parse_mode"] = json!("Markdown");
        }
        let _: Value = self
            .call("sendMessage", &payload, self.request_timeout)
            .await?;
        Ok(())
    }
}

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i64>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

impl<T> ApiResponse<T> {
    fn into_result(self, method: &str) -> Result<T, BotError> {
        if self.ok {
            return self
                .result
                .with_context(|| format!("{method} returned ok without result"))
                .map_err(BotError::from);
        }
        let code = self.error_code.unwrap_or(0);
        if let Some(retry_after) = self.parameters.and_then(|p| p.retry_after) {
            return Err(BotError::RateLimited { retry_after });
        }
        if code == 429 {
            return Err(BotError::RateLimited { retry_after: 1 });
        }
        Err(BotError::Telegram {
            code,
            description: self
                .description
                .unwrap_or_else(|| format!("{method} failed")),
        })
    }
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
    chat_member: Option<ChatMemberUpdated>,
}

#[derive(Debug, Deserialize)]
struct Message {
    from: Option<User>,
    chat: Chat,
    text: Option<String>,
    #[serde(default)]
    new_chat_members: Vec<User>,
    left_chat_member: Option<User>,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
    #[serde(default)]
    is_bot: bool,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct ChatMemberUpdated {
    chat: Chat,
    old_chat_member: ChatMember,
    new_chat_member: ChatMember,
}

#[derive(Debug, Deserialize)]
struct ChatMember {
    status: String,
    user: Option<User>,
}

// ── Update mapping ────────────────────────────────────────────────────────────

/// Map raw updates to engine events. Every update with a readable `update_id`
/// yields at least one event so the cursor can move past it.
fn events_from_updates(updates: Vec<Value>, command: &str) -> Vec<Event> {
    let mut events = Vec::with_capacity(updates.len());
    for raw in updates {
        let Some(update_id) = raw.get("update_id").and_then(Value::as_i64) else {
            warn!("update without update_id skipped");
            continue;
        };
        match serde_json::from_value::<Update>(raw) {
            Ok(update) => events.extend(events_from_update(&update, command)),
            Err(e) => {
                warn!(update_id, error = %e, "unreadable update skipped");
                events.push(Event::ignored(update_id));
            }
        }
    }
    events
}

fn events_from_update(update: &Update, command: &str) -> Vec<Event> {
    let id = update.update_id;
    if let Some(message) = &update.message {
        let chat_kind = ChatKind::from_wire(&message.chat.kind);
        if message
            .text
            .as_deref()
            .is_some_and(|text| is_command(text, command))
        {
            let user_id = message.from.as_ref().map_or(message.chat.id, |u| u.id);
            return vec![Event::command(id, user_id, chat_kind)];
        }

        let group_id = message.chat.id;
        let mut events: Vec<Event> = message
            .new_chat_members
            .iter()
            .filter(|u| !u.is_bot)
            .map(|u| Event::membership(id, u.id, group_id, MembershipChange::Joined))
            .collect();
        if let Some(left) = message.left_chat_member.as_ref().filter(|u| !u.is_bot) {
            events.push(Event::membership(
                id,
                left.id,
                group_id,
                MembershipChange::Left,
            ));
        }
        if !events.is_empty() {
            return events;
        }
    }

    if let Some(updated) = &update.chat_member {
        let old = MemberStatus::from_wire(&updated.old_chat_member.status);
        let new = MemberStatus::from_wire(&updated.new_chat_member.status);
        let change = match new {
            MemberStatus::Left | MemberStatus::Kicked => Some(MembershipChange::Left),
            s if s.is_active() && !old.is_active() => Some(MembershipChange::Joined),
            _ => None,
        };
        if let (Some(change), Some(user)) = (change, &updated.new_chat_member.user) {
            return vec![Event::membership(id, user.id, updated.chat.id, change)];
        }
    }

    vec![Event::ignored(id)]
}

/// First token of `text` equals `command`, allowing a `@botname` suffix.
fn is_command(text: &str, command: &str) -> bool {
    let Some(token) = text.split_whitespace().next() else {
        return false;
    };
    let name = token.split_once('@').map_or(token, |(name, _)| name);
    name == command
}
