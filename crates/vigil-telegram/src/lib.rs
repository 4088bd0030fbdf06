//! Vigil Telegram Adapter
//!
//! Telegram Bot API long-polling with offset persistence and client
//! recreation, plus the moderation effect surface: delete, restrict, ban,
//! kick, pin, chat lock and slow mode. Effect delivery is best-effort; the
//! moderation decision is final once made and failures here are only logged.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::sync::broadcast;
use tracing::{info, warn};
use vigil_config::TelegramAccount;
use vigil_ipc::{Effect, Envelope, EventBus, EventKind, OutboundEffect, ReplyRef, Sender};
use vigil_moderation::{AdminDirectory, ContentKind};

const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub date: i64,
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub photo: Option<Vec<TelegramPhotoSize>>,
    #[serde(default)]
    pub document: Option<TelegramDocument>,
    #[serde(default)]
    pub video: Option<TelegramVideo>,
    #[serde(default)]
    pub sticker: Option<TelegramSticker>,
    pub chat: TelegramChat,
    pub from: Option<TelegramUser>,
    #[serde(default)]
    pub reply_to_message: Option<Box<TelegramReplyToMessage>>,
    #[serde(default)]
    pub new_chat_members: Option<Vec<TelegramUser>>,
    #[serde(default)]
    pub left_chat_member: Option<TelegramUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramPhotoSize {
    pub file_id: String,
    pub width: i64,
    pub height: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramDocument {
    pub file_id: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramVideo {
    pub file_id: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramSticker {
    pub file_id: String,
    #[serde(default)]
    pub emoji: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: Option<bool>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramReplyToMessage {
    pub message_id: i64,
    pub from: Option<TelegramUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramChatMember {
    pub user: TelegramUser,
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: T,
}

fn sender_from_user(user: &TelegramUser) -> Sender {
    Sender {
        id: user.id,
        is_bot: user.is_bot.unwrap_or(false),
        username: user.username.clone(),
        first_name: user.first_name.clone(),
    }
}

/// Classifies a message for the filter pipeline. Only the kinds the filter
/// distinguishes are mapped; anything else is `Other`.
fn content_kind(message: &TelegramMessage) -> ContentKind {
    if message.photo.as_ref().is_some_and(|p| !p.is_empty()) {
        ContentKind::Photo
    } else if message.video.is_some() {
        ContentKind::Video
    } else if message.document.is_some() {
        ContentKind::Document
    } else if message.sticker.is_some() {
        ContentKind::Sticker
    } else if message.text.is_some() {
        ContentKind::Text
    } else {
        ContentKind::Other
    }
}

pub struct TelegramAdapter {
    client: Client,
    account_tag: String,
    allowed_chats: Option<HashSet<i64>>,
    api_url: String,
    data_dir: PathBuf,
    bot_token: String,
    poll_timeout_secs: u64,
    client_recreate_interval_secs: u64,
    event_bus: Option<EventBus>,
}

impl TelegramAdapter {
    pub fn new(
        account: &TelegramAccount,
        data_dir: PathBuf,
        config_timeout: Option<u64>,
        config_recreate: Option<u64>,
    ) -> Self {
        let api_url = format!("https://api.telegram.org/bot{}", account.bot_token);
        let account_tag = account
            .bot_token
            .split(':')
            .next()
            .unwrap_or("default")
            .to_string();
        let allowed_chats = account
            .allowed_chats
            .clone()
            .map(|items| items.into_iter().collect());
        let client = Self::build_client();
        let poll_timeout_secs = config_timeout.unwrap_or(60);
        let client_recreate_interval_secs = config_recreate.unwrap_or(60);

        Self {
            client,
            account_tag,
            allowed_chats,
            api_url,
            data_dir,
            bot_token: account.bot_token.clone(),
            poll_timeout_secs,
            client_recreate_interval_secs,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn account_tag(&self) -> &str {
        &self.account_tag
    }

    fn build_client() -> Client {
        ClientBuilder::new()
            .pool_idle_timeout(Duration::from_secs(600))
            .pool_max_idle_per_host(10)
            .tcp_keepalive(Some(Duration::from_secs(30)))
            .timeout(Duration::from_secs(180))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client")
    }

    fn offset_path(&self) -> PathBuf {
        let runtime_dir = self.data_dir.join("runtime");
        let _ = std::fs::create_dir_all(&runtime_dir);
        let bot_id = self.bot_token.split(':').next().unwrap_or("default");
        runtime_dir.join(format!("telegram.{}.offset", bot_id))
    }

    fn is_chat_allowed(&self, chat_id: i64) -> bool {
        self.allowed_chats
            .as_ref()
            .is_none_or(|allowed| allowed.contains(&chat_id))
    }

    async fn read_offset(&self) -> Option<i64> {
        let p = self.offset_path();
        match fs::read_to_string(&p).await {
            Ok(content) => content.trim().parse().ok(),
            Err(_) => None,
        }
    }

    async fn write_offset(&self, offset: i64) {
        let p = self.offset_path();
        if let Some(parent) = p.parent() {
            let _ = fs::create_dir_all(parent).await;
        }
        let _ = fs::write(&p, format!("{}\n", offset)).await;
    }

    /// Generic "call method, expect ok=true" for all the simple endpoints.
    async fn call_method(&self, method: &str, payload: serde_json::Value) -> Result<()> {
        let url = format!("{}/{}", self.api_url, method);
        let resp = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow!("telegram {} request failed: {}", method, e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("telegram {} HTTP {}: {}", method, status, body));
        }

        let parsed: ApiResponse<serde_json::Value> = resp
            .json()
            .await
            .map_err(|e| anyhow!("telegram {} decode failed: {}", method, e))?;
        if !parsed.ok {
            return Err(anyhow!("telegram {} returned ok=false", method));
        }

        Ok(())
    }

    pub async fn get_me(&self) -> Result<TelegramUser> {
        let url = format!("{}/getMe", self.api_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("telegram getMe request failed: {}", e))?
            .error_for_status()
            .map_err(|e| anyhow!("telegram getMe HTTP error: {}", e))?;

        let parsed: ApiResponse<TelegramUser> = resp
            .json()
            .await
            .map_err(|e| anyhow!("telegram getMe decode failed: {}", e))?;
        if !parsed.ok {
            return Err(anyhow!("telegram getMe returned ok=false"));
        }
        Ok(parsed.result)
    }

    pub async fn get_updates(
        &self,
        client: &Client,
        offset: Option<i64>,
    ) -> Result<Vec<TelegramUpdate>> {
        let url = format!("{}/getUpdates", self.api_url);

        let mut payload = serde_json::json!({
            "timeout": self.poll_timeout_secs,
            "allowed_updates": ["message"],
        });

        if let Some(offset) = offset {
            payload["offset"] = serde_json::json!(offset);
        }

        let resp = client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow!("telegram getUpdates request failed: {}", e))?
            .error_for_status()
            .map_err(|e| anyhow!("telegram getUpdates HTTP error: {}", e))?;

        let parsed: ApiResponse<Vec<TelegramUpdate>> = resp
            .json()
            .await
            .map_err(|e| anyhow!("telegram getUpdates decode failed: {}", e))?;

        if !parsed.ok {
            return Err(anyhow!("telegram getUpdates returned ok=false"));
        }

        Ok(parsed.result)
    }

    pub async fn get_chat_administrators(&self, chat_id: i64) -> Result<HashSet<i64>> {
        let url = format!("{}/getChatAdministrators", self.api_url);
        let payload = serde_json::json!({ "chat_id": chat_id });

        let resp = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow!("telegram getChatAdministrators request failed: {}", e))?
            .error_for_status()
            .map_err(|e| anyhow!("telegram getChatAdministrators HTTP error: {}", e))?;

        let parsed: ApiResponse<Vec<TelegramChatMember>> = resp
            .json()
            .await
            .map_err(|e| anyhow!("telegram getChatAdministrators decode failed: {}", e))?;
        if !parsed.ok {
            return Err(anyhow!("telegram getChatAdministrators returned ok=false"));
        }

        Ok(parsed.result.into_iter().map(|m| m.user.id).collect())
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<()> {
        let chunks = self.chunk_message(text);

        for (i, chunk) in chunks.iter().enumerate() {
            let url = format!("{}/sendMessage", self.api_url);

            let mut payload = serde_json::json!({
                "chat_id": chat_id,
                "text": chunk,
                "parse_mode": "Markdown",
            });

            if let Some(reply_to_message_id) = reply_to {
                if i == 0 {
                    payload["reply_to_message_id"] = serde_json::json!(reply_to_message_id);
                }
            }

            self.send_with_markdown_fallback(&url, payload).await?;
        }

        Ok(())
    }

    pub async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()> {
        self.call_method(
            "deleteMessage",
            serde_json::json!({ "chat_id": chat_id, "message_id": message_id }),
        )
        .await
    }

    /// Takes away send permission until `until_unix`.
    pub async fn restrict_chat_member(
        &self,
        chat_id: i64,
        user_id: i64,
        until_unix: i64,
    ) -> Result<()> {
        self.call_method(
            "restrictChatMember",
            serde_json::json!({
                "chat_id": chat_id,
                "user_id": user_id,
                "permissions": { "can_send_messages": false },
                "until_date": until_unix,
            }),
        )
        .await
    }

    pub async fn lift_restrictions(&self, chat_id: i64, user_id: i64) -> Result<()> {
        self.call_method(
            "restrictChatMember",
            serde_json::json!({
                "chat_id": chat_id,
                "user_id": user_id,
                "permissions": full_permissions(),
            }),
        )
        .await
    }

    pub async fn ban_chat_member(
        &self,
        chat_id: i64,
        user_id: i64,
        until_unix: Option<i64>,
    ) -> Result<()> {
        let mut payload = serde_json::json!({ "chat_id": chat_id, "user_id": user_id });
        if let Some(until) = until_unix {
            payload["until_date"] = serde_json::json!(until);
        }
        self.call_method("banChatMember", payload).await
    }

    pub async fn unban_chat_member(&self, chat_id: i64, user_id: i64) -> Result<()> {
        self.call_method(
            "unbanChatMember",
            serde_json::json!({ "chat_id": chat_id, "user_id": user_id, "only_if_banned": true }),
        )
        .await
    }

    /// Telegram has no standalone kick: ban then unban, so the user is out
    /// but free to rejoin.
    pub async fn kick_chat_member(&self, chat_id: i64, user_id: i64) -> Result<()> {
        self.call_method(
            "banChatMember",
            serde_json::json!({ "chat_id": chat_id, "user_id": user_id }),
        )
        .await?;
        self.call_method(
            "unbanChatMember",
            serde_json::json!({ "chat_id": chat_id, "user_id": user_id }),
        )
        .await
    }

    pub async fn set_chat_locked(&self, chat_id: i64, locked: bool) -> Result<()> {
        let permissions = if locked {
            serde_json::json!({ "can_send_messages": false })
        } else {
            full_permissions()
        };
        self.call_method(
            "setChatPermissions",
            serde_json::json!({ "chat_id": chat_id, "permissions": permissions }),
        )
        .await
    }

    pub async fn pin_chat_message(&self, chat_id: i64, message_id: i64) -> Result<()> {
        self.call_method(
            "pinChatMessage",
            serde_json::json!({ "chat_id": chat_id, "message_id": message_id }),
        )
        .await
    }

    pub async fn unpin_chat_message(&self, chat_id: i64) -> Result<()> {
        self.call_method("unpinChatMessage", serde_json::json!({ "chat_id": chat_id }))
            .await
    }

    pub async fn set_slow_mode(&self, chat_id: i64, seconds: u32) -> Result<()> {
        self.call_method(
            "setChatSlowModeDelay",
            serde_json::json!({ "chat_id": chat_id, "seconds": seconds }),
        )
        .await
    }

    async fn send_with_markdown_fallback(
        &self,
        url: &str,
        payload: serde_json::Value,
    ) -> Result<()> {
        let endpoint = url.rsplit('/').next().unwrap_or("telegram");

        let first_resp = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow!("telegram {} request failed: {}", endpoint, e))?;

        if first_resp.status().is_success() {
            let parsed: ApiResponse<serde_json::Value> = first_resp
                .json()
                .await
                .map_err(|e| anyhow!("telegram {} decode failed: {}", endpoint, e))?;
            if parsed.ok {
                return Ok(());
            }
            warn!(
                "telegram {} returned ok=false with Markdown payload, retrying without parse_mode",
                endpoint
            );
        } else {
            let status = first_resp.status();
            let body = first_resp.text().await.unwrap_or_default();
            warn!(
                "telegram {} HTTP {} with Markdown payload, retrying without parse_mode: {}",
                endpoint, status, body
            );
        }

        let mut fallback_payload = payload;
        if let Some(obj) = fallback_payload.as_object_mut() {
            obj.remove("parse_mode");
        }

        let fallback_resp = self
            .client
            .post(url)
            .json(&fallback_payload)
            .send()
            .await
            .map_err(|e| anyhow!("telegram {} fallback request failed: {}", endpoint, e))?;

        if !fallback_resp.status().is_success() {
            let status = fallback_resp.status();
            let body = fallback_resp.text().await.unwrap_or_default();
            // Replies to a message the bot just deleted fail like this;
            // retry as a plain send.
            if Self::is_reply_target_missing(&body) {
                let mut no_reply_payload = fallback_payload.clone();
                if Self::remove_reply_to_message_id(&mut no_reply_payload) {
                    warn!(
                        "telegram {} failed due to missing reply target; retrying without reply_to_message_id",
                        endpoint
                    );
                    return self.call_json(url, endpoint, no_reply_payload).await;
                }
            }
            return Err(anyhow!(
                "telegram {} fallback HTTP {}: {}",
                endpoint,
                status,
                body
            ));
        }

        let parsed: ApiResponse<serde_json::Value> = fallback_resp
            .json()
            .await
            .map_err(|e| anyhow!("telegram {} fallback decode failed: {}", endpoint, e))?;
        if !parsed.ok {
            return Err(anyhow!("telegram {} fallback returned ok=false", endpoint));
        }

        Ok(())
    }

    async fn call_json(
        &self,
        url: &str,
        endpoint: &str,
        payload: serde_json::Value,
    ) -> Result<()> {
        let resp = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow!("telegram {} retry request failed: {}", endpoint, e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!(
                "telegram {} retry HTTP {}: {}",
                endpoint,
                status,
                body
            ));
        }

        let parsed: ApiResponse<serde_json::Value> = resp
            .json()
            .await
            .map_err(|e| anyhow!("telegram {} retry decode failed: {}", endpoint, e))?;
        if !parsed.ok {
            return Err(anyhow!("telegram {} retry returned ok=false", endpoint));
        }

        Ok(())
    }

    fn remove_reply_to_message_id(payload: &mut serde_json::Value) -> bool {
        payload
            .as_object_mut()
            .map(|obj| obj.remove("reply_to_message_id").is_some())
            .unwrap_or(false)
    }

    fn is_reply_target_missing(body: &str) -> bool {
        body.to_ascii_lowercase()
            .contains("message to be replied not found")
    }

    fn chunk_message(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        if chars.len() <= TELEGRAM_MAX_MESSAGE_LEN {
            return vec![text.to_string()];
        }

        let mut chunks = Vec::new();
        let mut start = 0usize;

        while start < chars.len() {
            let mut end = (start + TELEGRAM_MAX_MESSAGE_LEN).min(chars.len());

            if end < chars.len() {
                let mut split = end;
                for i in (start..end).rev() {
                    let c = chars[i];
                    if c == '\n' || c == ' ' || c == '.' || c == '!' || c == '?' {
                        split = i + 1;
                        break;
                    }
                }
                if split > start {
                    end = split;
                }
            }

            chunks.push(chars[start..end].iter().collect::<String>());
            start = end;
        }

        chunks
    }

    pub async fn poll(&self) -> Result<()> {
        let mut offset: Option<i64> = self.read_offset().await;

        info!(offset = ?offset, "Telegram polling started");

        let mut client = self.client.clone();
        let mut client_recreate_at =
            Instant::now() + Duration::from_secs(self.client_recreate_interval_secs);

        if let Err(err) = self.sync_bot_commands(&client).await {
            warn!("Failed to sync Telegram bot commands: {}", err);
        } else {
            info!("Telegram bot commands synced");
        }

        loop {
            if Instant::now() >= client_recreate_at {
                info!("Recreating HTTP client to prevent stale connections");
                client = Self::build_client();
                client_recreate_at =
                    Instant::now() + Duration::from_secs(self.client_recreate_interval_secs);
            }

            let updates = match self.get_updates(&client, offset).await {
                Ok(v) => v,
                Err(err) => {
                    warn!("Telegram polling error: {}", err);
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    continue;
                }
            };

            for update in updates {
                offset = Some(update.update_id + 1);
                self.write_offset(update.update_id + 1).await;

                if let Some(message) = &update.message {
                    self.handle_message(message).await;
                }
            }
        }
    }

    async fn sync_bot_commands(&self, client: &Client) -> Result<()> {
        let url = format!("{}/setMyCommands", self.api_url);
        let commands = serde_json::json!([
            { "command": "help", "description": "Show commands" },
            { "command": "warn", "description": "Warn the replied user" },
            { "command": "clearwarn", "description": "Clear warnings" },
            { "command": "kick", "description": "Kick the replied user" },
            { "command": "ban", "description": "Ban the replied user" },
            { "command": "unban", "description": "Unban the replied user" },
            { "command": "mute", "description": "Mute for 10 minutes" },
            { "command": "unmute", "description": "Lift restrictions" },
            { "command": "tban", "description": "Temp-ban for N minutes" },
            { "command": "shadowban", "description": "Silently delete a user's messages" },
            { "command": "unshadow", "description": "Lift a shadowban" },
            { "command": "purge", "description": "Delete from the replied message down" },
            { "command": "role", "description": "Assign a role label" },
            { "command": "myrole", "description": "Show your role" },
            { "command": "pin", "description": "Pin the replied message" },
            { "command": "unpin", "description": "Unpin" },
            { "command": "lock", "description": "Lock the chat" },
            { "command": "unlock", "description": "Unlock the chat" },
            { "command": "slowmode", "description": "Set slow mode seconds" },
            { "command": "antilink", "description": "Toggle link blocking" },
            { "command": "antimedia", "description": "Toggle media blocking" },
            { "command": "flood", "description": "Toggle flood protection" },
            { "command": "use_real_admins", "description": "Toggle live admin checks" }
        ]);

        let payload = serde_json::json!({ "commands": commands });
        let resp = client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow!("telegram setMyCommands request failed: {}", e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("telegram setMyCommands HTTP {}: {}", status, body));
        }

        let parsed: ApiResponse<serde_json::Value> = resp
            .json()
            .await
            .map_err(|e| anyhow!("telegram setMyCommands decode failed: {}", e))?;

        if !parsed.ok {
            return Err(anyhow!("telegram setMyCommands returned ok=false"));
        }

        Ok(())
    }

    async fn handle_message(&self, message: &TelegramMessage) {
        let chat_id = message.chat.id;

        if !self.is_chat_allowed(chat_id) {
            info!("Skipping message from unauthorized chat {}", chat_id);
            return;
        }

        let Some(event_bus) = &self.event_bus else {
            info!("No event bus configured, message not forwarded");
            return;
        };

        let kind = if let Some(new_members) = &message.new_chat_members {
            EventKind::Joined {
                users: new_members.iter().map(sender_from_user).collect(),
            }
        } else if let Some(left) = &message.left_chat_member {
            EventKind::Left {
                user: sender_from_user(left),
            }
        } else {
            let Some(from) = &message.from else {
                return;
            };
            let text = message.text.clone().or_else(|| message.caption.clone());
            let reply_to = message.reply_to_message.as_ref().map(|reply| ReplyRef {
                message_id: reply.message_id,
                from: reply.from.as_ref().map(sender_from_user),
            });
            EventKind::Message {
                from: sender_from_user(from),
                content: content_kind(message),
                text,
                reply_to,
            }
        };

        let envelope = Envelope::new("telegram", chat_id, kind)
            .with_account_tag(&self.account_tag)
            .with_message_id(message.message_id);

        if let Err(e) = event_bus.publish(envelope) {
            warn!("Failed to publish event to event bus: {}", e);
        }
    }

    async fn apply_effect(&self, effect: &Effect) -> Result<()> {
        match effect {
            Effect::SendMessage {
                chat_id,
                text,
                reply_to,
            } => self.send_message(*chat_id, text, *reply_to).await,
            Effect::DeleteMessage {
                chat_id,
                message_id,
            } => self.delete_message(*chat_id, *message_id).await,
            Effect::RestrictUser {
                chat_id,
                user_id,
                until_unix,
            } => {
                self.restrict_chat_member(*chat_id, *user_id, *until_unix)
                    .await
            }
            Effect::LiftRestrictions { chat_id, user_id } => {
                self.lift_restrictions(*chat_id, *user_id).await
            }
            Effect::BanUser {
                chat_id,
                user_id,
                until_unix,
            } => self.ban_chat_member(*chat_id, *user_id, *until_unix).await,
            Effect::UnbanUser { chat_id, user_id } => {
                self.unban_chat_member(*chat_id, *user_id).await
            }
            Effect::KickUser { chat_id, user_id } => {
                self.kick_chat_member(*chat_id, *user_id).await
            }
            Effect::SetChatLocked { chat_id, locked } => {
                self.set_chat_locked(*chat_id, *locked).await
            }
            Effect::PinMessage {
                chat_id,
                message_id,
            } => self.pin_chat_message(*chat_id, *message_id).await,
            Effect::UnpinMessage { chat_id } => self.unpin_chat_message(*chat_id).await,
            Effect::SetSlowMode { chat_id, seconds } => {
                self.set_slow_mode(*chat_id, *seconds).await
            }
        }
    }

    pub async fn run_effect_handler(&self, mut receiver: broadcast::Receiver<OutboundEffect>) {
        info!("Telegram effect handler started");

        loop {
            match receiver.recv().await {
                Ok(outbound) => {
                    if outbound.channel != "telegram" {
                        continue;
                    }
                    if let Some(account_tag) = &outbound.account_tag {
                        if account_tag != &self.account_tag {
                            continue;
                        }
                    }

                    if let Err(e) = self.apply_effect(&outbound.effect).await {
                        warn!("Failed to apply {:?}: {}", outbound.effect, e);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Telegram effect handler stopped: channel closed");
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Telegram effect handler lagged; skipped {} effects", skipped);
                }
            }
        }
    }
}

/// The permission set restored by unmute and unlock.
fn full_permissions() -> serde_json::Value {
    serde_json::json!({
        "can_send_messages": true,
        "can_send_media_messages": true,
        "can_send_other_messages": true,
        "can_add_web_page_previews": true,
        "can_invite_users": true,
        "can_send_polls": true,
    })
}

#[async_trait]
impl AdminDirectory for TelegramAdapter {
    async fn chat_administrators(&self, chat_id: i64) -> Result<HashSet<i64>> {
        self.get_chat_administrators(chat_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_config::TelegramAccount;

    fn make_adapter() -> TelegramAdapter {
        let account = TelegramAccount {
            bot_token: "123456:TESTTOKEN".to_string(),
            bot_name: None,
            allowed_chats: None,
        };
        TelegramAdapter::new(&account, std::env::temp_dir(), Some(60), Some(60))
    }

    fn parse_message(json: &str) -> TelegramMessage {
        serde_json::from_str(json).expect("valid message JSON")
    }

    #[test]
    fn chunk_message_preserves_content_for_unicode_text() {
        let adapter = make_adapter();
        let text = format!("{} {}", "😀".repeat(5000), "fine");
        let chunks = adapter.chunk_message(&text);
        assert!(chunks.len() > 1);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn chunk_message_respects_telegram_limit_by_characters() {
        let adapter = make_adapter();
        let text = "abc😀".repeat(1500);
        let chunks = adapter.chunk_message(&text);
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 4096));
    }

    #[test]
    fn account_tag_is_the_token_prefix() {
        let adapter = make_adapter();
        assert_eq!(adapter.account_tag(), "123456");
    }

    #[test]
    fn content_kind_classifies_text_and_media() {
        let text = parse_message(
            r#"{"message_id":1,"date":0,"text":"hi","chat":{"id":-1,"type":"supergroup"}}"#,
        );
        assert_eq!(content_kind(&text), ContentKind::Text);

        let photo = parse_message(
            r#"{"message_id":1,"date":0,"photo":[{"file_id":"x","width":1,"height":1}],"chat":{"id":-1,"type":"supergroup"}}"#,
        );
        assert_eq!(content_kind(&photo), ContentKind::Photo);

        let sticker = parse_message(
            r#"{"message_id":1,"date":0,"sticker":{"file_id":"x"},"chat":{"id":-1,"type":"supergroup"}}"#,
        );
        assert_eq!(content_kind(&sticker), ContentKind::Sticker);

        let bare = parse_message(
            r#"{"message_id":1,"date":0,"chat":{"id":-1,"type":"supergroup"}}"#,
        );
        assert_eq!(content_kind(&bare), ContentKind::Other);
    }

    #[test]
    fn service_message_fields_deserialize() {
        let joined = parse_message(
            r#"{"message_id":1,"date":0,"chat":{"id":-1,"type":"supergroup"},"new_chat_members":[{"id":7,"is_bot":true,"first_name":"SpamBot"}]}"#,
        );
        let members = joined.new_chat_members.expect("members");
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, 7);
        assert_eq!(members[0].is_bot, Some(true));

        let left = parse_message(
            r#"{"message_id":2,"date":0,"chat":{"id":-1,"type":"supergroup"},"left_chat_member":{"id":9}}"#,
        );
        assert_eq!(left.left_chat_member.expect("left").id, 9);
    }

    #[test]
    fn chat_administrators_response_parses_to_ids() {
        let body = r#"{"ok":true,"result":[
            {"user":{"id":1,"is_bot":false,"first_name":"A"},"status":"creator"},
            {"user":{"id":2,"is_bot":false,"first_name":"B"},"status":"administrator"}
        ]}"#;
        let parsed: ApiResponse<Vec<TelegramChatMember>> =
            serde_json::from_str(body).expect("parse");
        assert!(parsed.ok);
        let ids: HashSet<i64> = parsed.result.into_iter().map(|m| m.user.id).collect();
        assert_eq!(ids, HashSet::from([1, 2]));
    }

    #[test]
    fn remove_reply_to_message_id_when_present() {
        let mut payload = serde_json::json!({
            "chat_id": 123,
            "text": "hello",
            "reply_to_message_id": 42
        });
        assert!(TelegramAdapter::remove_reply_to_message_id(&mut payload));
        assert!(payload.get("reply_to_message_id").is_none());
    }

    #[test]
    fn detect_missing_reply_target_error() {
        let body = r#"{"ok":false,"error_code":400,"description":"Bad Request: message to be replied not found"}"#;
        assert!(TelegramAdapter::is_reply_target_missing(body));
    }
}
