//! Vigil IPC
//!
//! Event bus between the chat adapter and the moderation dispatcher:
//! inbound envelopes carry chat events, outbound effects carry the platform
//! actions a decision produced.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;
use vigil_moderation::ContentKind;

static NEXT_TRACE_COUNTER: AtomicU64 = AtomicU64::new(1);

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn now_unix_secs_f64() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn generate_trace_id() -> String {
    let ts = now_unix_secs();
    let n = NEXT_TRACE_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("trace-{}-{}", ts, n)
}

fn default_schema_version() -> u16 {
    1
}

fn default_trace_id() -> String {
    generate_trace_id()
}

fn default_received_at() -> f64 {
    now_unix_secs_f64()
}

/// A chat participant as the adapter saw them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sender {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
}

impl Sender {
    pub fn display_name(&self) -> &str {
        self.first_name
            .as_deref()
            .or(self.username.as_deref())
            .unwrap_or("there")
    }
}

/// The message a command replies to; its author is the moderation target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyRef {
    pub message_id: i64,
    pub from: Option<Sender>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventKind {
    #[serde(rename = "message")]
    Message {
        from: Sender,
        content: ContentKind,
        text: Option<String>,
        reply_to: Option<ReplyRef>,
    },

    #[serde(rename = "joined")]
    Joined { users: Vec<Sender> },

    #[serde(rename = "left")]
    Left { user: Sender },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default = "default_schema_version")]
    pub schema_version: u16,
    #[serde(default = "default_trace_id")]
    pub trace_id: String,
    pub channel: String,
    #[serde(default)]
    pub account_tag: Option<String>,
    pub kind: EventKind,
    pub chat_id: i64,
    pub message_id: Option<i64>,
    /// Wall-clock receipt time in seconds, sampled by the adapter. Flood
    /// detection keys off this, not the platform's coarse message date.
    #[serde(default = "default_received_at")]
    pub received_at: f64,
}

impl Envelope {
    pub fn new(channel: &str, chat_id: i64, kind: EventKind) -> Self {
        Self {
            schema_version: default_schema_version(),
            trace_id: generate_trace_id(),
            channel: channel.to_string(),
            account_tag: None,
            kind,
            chat_id,
            message_id: None,
            received_at: now_unix_secs_f64(),
        }
    }

    pub fn with_account_tag(mut self, account_tag: &str) -> Self {
        self.account_tag = Some(account_tag.to_string());
        self
    }

    pub fn with_message_id(mut self, message_id: i64) -> Self {
        self.message_id = Some(message_id);
        self
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// A platform action the dispatcher decided on. Delivery is best-effort: the
/// adapter logs failures and moves on, it never feeds them back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    SendMessage {
        chat_id: i64,
        text: String,
        reply_to: Option<i64>,
    },
    DeleteMessage {
        chat_id: i64,
        message_id: i64,
    },
    /// Remove send permission until the given unix timestamp.
    RestrictUser {
        chat_id: i64,
        user_id: i64,
        until_unix: i64,
    },
    LiftRestrictions {
        chat_id: i64,
        user_id: i64,
    },
    BanUser {
        chat_id: i64,
        user_id: i64,
        until_unix: Option<i64>,
    },
    UnbanUser {
        chat_id: i64,
        user_id: i64,
    },
    /// Ban-then-unban: removes the user but lets them rejoin.
    KickUser {
        chat_id: i64,
        user_id: i64,
    },
    SetChatLocked {
        chat_id: i64,
        locked: bool,
    },
    PinMessage {
        chat_id: i64,
        message_id: i64,
    },
    UnpinMessage {
        chat_id: i64,
    },
    SetSlowMode {
        chat_id: i64,
        seconds: u32,
    },
}

#[derive(Debug, Clone)]
pub struct OutboundEffect {
    pub channel: String,
    pub account_tag: Option<String>,
    pub effect: Effect,
}

pub const EVENT_BUS_CAPACITY: usize = 256;
pub const OUTBOUND_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct EventBus {
    inbound: broadcast::Sender<Envelope>,
    outbound: broadcast::Sender<OutboundEffect>,
}

impl EventBus {
    pub fn new() -> Self {
        let (inbound_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        let (outbound_tx, _) = broadcast::channel(OUTBOUND_CAPACITY);

        Self {
            inbound: inbound_tx,
            outbound: outbound_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.inbound.subscribe()
    }

    pub fn publish(&self, envelope: Envelope) -> anyhow::Result<()> {
        self.inbound.send(envelope)?;
        Ok(())
    }

    pub fn outbound_sender(&self) -> broadcast::Sender<OutboundEffect> {
        self.outbound.clone()
    }

    pub fn outbound_subscribe(&self) -> broadcast::Receiver<OutboundEffect> {
        self.outbound.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
