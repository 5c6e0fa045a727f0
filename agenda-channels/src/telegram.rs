use crate::traits::ChannelAdapter;
use crate::types::{ActionButton, InboundMessage, InboundMessageKind, MessageId, OutboundMessage};
use anyhow::Result;
use chrono::Utc;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;

const TELEGRAM_CHANNEL_ID: &str = "telegram";
const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const TELEGRAM_LONG_POLL_TIMEOUT_SECS: &str = "30";
const TELEGRAM_ALLOWED_UPDATES: &str = r#"["message","callback_query"]"#;
const TELEGRAM_NON_TEXT_PLACEHOLDER: &str = "[telegram non-text message]";
const TELEGRAM_NON_TRANSIENT_DELAY: Duration = Duration::from_secs(10);
const TELEGRAM_RETRY_BASE_MS: u64 = 250;
const TELEGRAM_RETRY_MAX_MS: u64 = 30_000;

#[derive(Clone)]
pub struct TelegramAdapter {
    http: reqwest::Client,
    bot_token: String,
    api_base: String,
}

impl TelegramAdapter {
    pub fn new(bot_token: &str) -> Result<Self> {
        Self::with_api_base(bot_token, TELEGRAM_API_BASE)
    }

    pub fn with_api_base(bot_token: &str, api_base: &str) -> Result<Self> {
        if bot_token.trim().is_empty() {
            return Err(anyhow::anyhow!("telegram bot token is required"));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            bot_token: bot_token.trim().to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    fn api_url(&self, method: &str) -> Result<Url> {
        Ok(Url::parse(&format!(
            "{}/bot{}/{}",
            self.api_base, self.bot_token, method
        ))?)
    }

    async fn call(&self, method: &str, body: serde_json::Value) -> Result<()> {
        let url = self.api_url(method)?;
        let resp = self.http.post(url).json(&body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await?;
            return Err(anyhow::anyhow!(
                "telegram {method} failed: status={status} body={text}"
            ));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ChannelAdapter for TelegramAdapter {
    fn channel_id(&self) -> &str {
        TELEGRAM_CHANNEL_ID
    }

    async fn start(&self, tx: mpsc::Sender<InboundMessage>) -> Result<()> {
        let adapter = self.clone();
        tokio::spawn(async move {
            if let Err(e) = adapter.run_poll_loop(tx).await {
                tracing::error!(%e, "telegram poll loop exited");
            }
        });
        Ok(())
    }

    async fn send(&self, recipient_id: &str, message: OutboundMessage) -> Result<()> {
        let mut body = json!({
            "chat_id": recipient_id,
            "text": message.content,
        });
        if let Some(reply_to) = message.reply_to_message_id.as_ref() {
            body["reply_to_message_id"] = numeric_id(reply_to);
        }
        if !message.actions.is_empty() {
            body["reply_markup"] = inline_keyboard(&message.actions);
        }
        self.call("sendMessage", body).await
    }

    async fn edit(
        &self,
        recipient_id: &str,
        message_id: &MessageId,
        message: OutboundMessage,
    ) -> Result<()> {
        let body = json!({
            "chat_id": recipient_id,
            "message_id": numeric_id(message_id),
            "text": message.content,
            "reply_markup": inline_keyboard(&message.actions),
        });
        self.call("editMessageText", body).await
    }

    async fn acknowledge_action(&self, action_token: &str) -> Result<()> {
        self.call(
            "answerCallbackQuery",
            json!({ "callback_query_id": action_token }),
        )
        .await
    }

    async fn send_typing(&self, recipient_id: &str) -> Result<()> {
        self.call(
            "sendChatAction",
            json!({ "chat_id": recipient_id, "action": "typing" }),
        )
        .await
    }

    fn supports_actions(&self) -> bool {
        true
    }

    fn supports_typing_events(&self) -> bool {
        true
    }
}

impl TelegramAdapter {
    #[tracing::instrument(level = "info", skip_all)]
    async fn run_poll_loop(&self, tx: mpsc::Sender<InboundMessage>) -> Result<()> {
        let mut offset: i64 = 0;
        let mut consecutive_failures: u32 = 0;

        loop {
            let url = self.api_url("getUpdates")?;
            let response = match self
                .http
                .get(url)
                .query(&[
                    ("timeout", TELEGRAM_LONG_POLL_TIMEOUT_SECS),
                    ("offset", &offset.to_string()),
                    ("allowed_updates", TELEGRAM_ALLOWED_UPDATES),
                ])
                .send()
                .await
            {
                Ok(response) => response,
                Err(error) => {
                    consecutive_failures += 1;
                    let delay = transient_retry_delay(consecutive_failures);
                    tracing::warn!(
                        %error,
                        attempt = consecutive_failures,
                        ?delay,
                        "telegram getUpdates request failed; retrying with backoff"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_else(|error| {
                    format!("<failed to read telegram error body: {error}>")
                });
                if is_transient_status(status) {
                    consecutive_failures += 1;
                    let delay = transient_retry_delay(consecutive_failures);
                    tracing::warn!(
                        %status,
                        %body,
                        attempt = consecutive_failures,
                        ?delay,
                        "telegram getUpdates transient failure; retrying with backoff"
                    );
                    tokio::time::sleep(delay).await;
                } else {
                    consecutive_failures = 0;
                    tracing::error!(
                        %status,
                        %body,
                        ?TELEGRAM_NON_TRANSIENT_DELAY,
                        "telegram getUpdates non-transient failure; keeping poll loop alive"
                    );
                    tokio::time::sleep(TELEGRAM_NON_TRANSIENT_DELAY).await;
                }
                continue;
            }

            let parsed = match response.json::<TelegramGetUpdatesResponse>().await {
                Ok(parsed) => parsed,
                Err(error) => {
                    consecutive_failures += 1;
                    let delay = transient_retry_delay(consecutive_failures);
                    tracing::warn!(
                        %error,
                        attempt = consecutive_failures,
                        ?delay,
                        "telegram getUpdates payload parse failed; retrying with backoff"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            consecutive_failures = 0;

            let mut updates = parsed.result;
            updates.sort_by_key(|update| update.update_id);
            for update in updates {
                // Advance offset before conversion to avoid poison-update replay loops.
                if update.update_id < offset {
                    continue;
                }
                offset = update.update_id.saturating_add(1);

                for inbound in build_inbound_messages(&update) {
                    tx.send(inbound)
                        .await
                        .map_err(|e| anyhow::anyhow!("telegram inbound queue closed: {e}"))?;
                }
            }
        }
    }
}

/// Telegram ids are integers; ours are strings.
fn numeric_id(id: &MessageId) -> serde_json::Value {
    id.as_str()
        .parse::<i64>()
        .map(|v| json!(v))
        .unwrap_or_else(|_| json!(id.as_str()))
}

fn inline_keyboard(rows: &[Vec<ActionButton>]) -> serde_json::Value {
    let keyboard: Vec<Vec<serde_json::Value>> = rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| json!({ "text": b.label, "callback_data": b.data }))
                .collect()
        })
        .collect();
    json!({ "inline_keyboard": keyboard })
}

fn transient_retry_delay(attempt: u32) -> Duration {
    let multiplier = 1_u64 << attempt.saturating_sub(1).min(10);
    Duration::from_millis((TELEGRAM_RETRY_BASE_MS * multiplier).min(TELEGRAM_RETRY_MAX_MS))
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn build_inbound_messages(update: &TelegramUpdate) -> Vec<InboundMessage> {
    let mut inbound = Vec::new();
    if let Some(message) = build_message_inbound(update.update_id, update.message.as_ref()) {
        inbound.push(message);
    }
    if let Some(action) = build_action_inbound(update.callback_query.as_ref()) {
        inbound.push(action);
    }
    inbound
}

fn build_message_inbound(
    update_id: i64,
    message: Option<&TelegramMessage>,
) -> Option<InboundMessage> {
    let message = message?;
    let chat = message.chat.as_ref()?;
    let content = extract_message_content(message)?;
    let sender_id = message
        .from
        .as_ref()
        .map(|user| user.id.to_string())
        .unwrap_or_else(|| format!("chat:{}", chat.id));
    let message_id = message
        .message_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| format!("update:{update_id}:message"));

    Some(InboundMessage {
        kind: InboundMessageKind::Message,
        message_id: message_id.into(),
        channel_id: TELEGRAM_CHANNEL_ID.into(),
        sender_id: sender_id.into(),
        thread_id: Some(chat.id.to_string().into()),
        is_group: chat.r#type != "private",
        content,
        action_token: None,
        metadata: serde_json::to_value(message).unwrap_or(serde_json::Value::Null),
        received_at: Utc::now(),
    })
}

/// Button presses only count when attached to a message we can still edit.
fn build_action_inbound(query: Option<&TelegramCallbackQuery>) -> Option<InboundMessage> {
    let query = query?;
    let data = query.data.as_deref().map(str::trim).filter(|d| !d.is_empty())?;
    let message = query.message.as_ref()?;
    let chat = message.chat.as_ref()?;
    let message_id = message.message_id?;

    Some(InboundMessage {
        kind: InboundMessageKind::Action,
        message_id: message_id.to_string().into(),
        channel_id: TELEGRAM_CHANNEL_ID.into(),
        sender_id: query.from.id.to_string().into(),
        thread_id: Some(chat.id.to_string().into()),
        is_group: chat.r#type != "private",
        content: data.to_string(),
        action_token: Some(query.id.clone()),
        metadata: serde_json::Value::Null,
        received_at: Utc::now(),
    })
}

fn extract_message_content(message: &TelegramMessage) -> Option<String> {
    if let Some(text) = message.text.as_deref().map(str::trim) {
        if !text.is_empty() {
            return Some(text.to_string());
        }
    }
    if let Some(caption) = message.caption.as_deref().map(str::trim) {
        if !caption.is_empty() {
            return Some(caption.to_string());
        }
    }
    if message.has_non_text_payload() {
        return Some(TELEGRAM_NON_TEXT_PLACEHOLDER.to_string());
    }
    None
}

#[derive(Debug, Deserialize)]
struct TelegramGetUpdatesResponse {
    #[serde(default)]
    result: Vec<TelegramUpdate>,
}

#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    #[serde(default)]
    message: Option<TelegramMessage>,
    #[serde(default)]
    callback_query: Option<TelegramCallbackQuery>,
}

#[derive(Debug, Deserialize, serde::Serialize)]
struct TelegramMessage {
    #[serde(default)]
    message_id: Option<i64>,
    #[serde(default)]
    from: Option<TelegramUser>,
    #[serde(default)]
    chat: Option<TelegramChat>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    photo: Vec<serde_json::Value>,
    #[serde(default)]
    sticker: Option<serde_json::Value>,
    #[serde(default)]
    document: Option<serde_json::Value>,
    #[serde(default)]
    voice: Option<serde_json::Value>,
    #[serde(default)]
    video: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TelegramCallbackQuery {
    id: String,
    from: TelegramUser,
    #[serde(default)]
    message: Option<TelegramMessage>,
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Deserialize, serde::Serialize)]
struct TelegramUser {
    id: i64,
}

#[derive(Debug, Deserialize, serde::Serialize)]
struct TelegramChat {
    id: i64,
    #[serde(rename = "type")]
    r#type: String,
}

impl TelegramMessage {
    fn has_non_text_payload(&self) -> bool {
        !self.photo.is_empty()
            || self.sticker.is_some()
            || self.document.is_some()
            || self.voice.is_some()
            || self.video.is_some()
    }
}
