//! Vigil Core
//!
//! The moderation dispatcher: subscribes to the event bus, routes admin
//! commands through admin/target resolution into state mutation, runs every
//! plain message through the filter pipeline, and emits the resulting
//! platform effects. Events are processed one at a time in arrival order, so
//! counter and window invariants need no further locking discipline.

pub mod commands;

use anyhow::{Context, Result};
use commands::{is_known_command, parse_command, until_from_now};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info, warn};
use vigil_config::Config;
use vigil_ipc::{Effect, Envelope, EventBus, EventKind, OutboundEffect, Sender};
use vigil_moderation::{
    AdminDirectory, AdminResolver, ContentKind, FilterAction, InboundMessage, JoinVerdict,
    ModerationEngine, TargetResolver,
};
use vigil_telegram::TelegramAdapter;

pub(crate) struct AccountContext {
    pub(crate) directory: Arc<dyn AdminDirectory>,
    pub(crate) targets: TargetResolver,
}

/// Shared handles the event loop works with. One engine serves every
/// account and chat; scoping lives inside the stores.
pub(crate) struct Dispatcher {
    pub(crate) engine: Arc<Mutex<ModerationEngine>>,
    pub(crate) admins: Arc<AdminResolver>,
    contexts: HashMap<String, AccountContext>,
    outbound: broadcast::Sender<OutboundEffect>,
    welcome_message: String,
}

impl Dispatcher {
    fn context_for(&self, envelope: &Envelope) -> Option<&AccountContext> {
        envelope
            .account_tag
            .as_deref()
            .and_then(|tag| self.contexts.get(tag))
            .or_else(|| self.contexts.values().next())
    }

    async fn process(&self, envelope: &Envelope) -> Result<()> {
        let ctx = self
            .context_for(envelope)
            .context("no account context for inbound event")?;

        match &envelope.kind {
            EventKind::Joined { users } => self.handle_join(ctx, envelope, users).await,
            EventKind::Left { .. } => {
                self.handle_leave(envelope).await;
                Ok(())
            }
            EventKind::Message {
                from,
                content,
                text,
                reply_to,
            } => {
                if *content == ContentKind::Text {
                    if let Some((name, args)) = text.as_deref().and_then(parse_command) {
                        if is_known_command(&name) {
                            return self
                                .handle_command(
                                    ctx,
                                    envelope,
                                    from,
                                    reply_to.as_ref(),
                                    &name,
                                    &args,
                                )
                                .await;
                        }
                    }
                }
                self.apply_filter(envelope, from, *content, text.as_deref())
                    .await;
                Ok(())
            }
        }
    }

    async fn apply_filter(
        &self,
        envelope: &Envelope,
        from: &Sender,
        content: ContentKind,
        text: Option<&str>,
    ) {
        let action = {
            let mut engine = self.engine.lock().await;
            engine.evaluate_message(&InboundMessage {
                user_id: from.id,
                chat_id: envelope.chat_id,
                content,
                text,
                received_at: envelope.received_at,
            })
        };

        match action {
            FilterAction::Allow => {}
            FilterAction::Delete => {
                if let Some(message_id) = envelope.message_id {
                    self.send_effect(
                        envelope,
                        Effect::DeleteMessage {
                            chat_id: envelope.chat_id,
                            message_id,
                        },
                    );
                }
            }
            FilterAction::DeleteAndRestrict { mute_secs } => {
                info!(
                    chat_id = envelope.chat_id,
                    user_id = from.id,
                    "flood detected"
                );
                if let Some(message_id) = envelope.message_id {
                    self.send_effect(
                        envelope,
                        Effect::DeleteMessage {
                            chat_id: envelope.chat_id,
                            message_id,
                        },
                    );
                }
                self.send_effect(
                    envelope,
                    Effect::RestrictUser {
                        chat_id: envelope.chat_id,
                        user_id: from.id,
                        until_unix: until_from_now(mute_secs),
                    },
                );
                self.announce(
                    envelope,
                    format!("🚫 Flood detected! Muted for {}s", mute_secs),
                );
            }
        }
    }

    async fn handle_join(
        &self,
        ctx: &AccountContext,
        envelope: &Envelope,
        users: &[Sender],
    ) -> Result<()> {
        let (clean_join, use_real_admins) = {
            let engine = self.engine.lock().await;
            (engine.flags.clean_join, engine.flags.use_real_admins)
        };

        if clean_join {
            if let Some(message_id) = envelope.message_id {
                self.send_effect(
                    envelope,
                    Effect::DeleteMessage {
                        chat_id: envelope.chat_id,
                        message_id,
                    },
                );
            }
        }

        for user in users {
            let is_admin = self
                .admins
                .is_admin(
                    ctx.directory.as_ref(),
                    user.id,
                    envelope.chat_id,
                    use_real_admins,
                )
                .await;

            let verdict = self.engine.lock().await.join_verdict(user.is_bot, is_admin);
            match verdict {
                JoinVerdict::Kick => {
                    info!(
                        chat_id = envelope.chat_id,
                        user_id = user.id,
                        "kicking bot account on join"
                    );
                    self.send_effect(
                        envelope,
                        Effect::KickUser {
                            chat_id: envelope.chat_id,
                            user_id: user.id,
                        },
                    );
                }
                JoinVerdict::Welcome => {
                    let text = self.welcome_message.replace("{name}", user.display_name());
                    self.announce(envelope, text);
                }
            }
        }

        Ok(())
    }

    async fn handle_leave(&self, envelope: &Envelope) {
        let clean_leave = self.engine.lock().await.flags.clean_leave;
        if clean_leave {
            if let Some(message_id) = envelope.message_id {
                self.send_effect(
                    envelope,
                    Effect::DeleteMessage {
                        chat_id: envelope.chat_id,
                        message_id,
                    },
                );
            }
        }
    }

    fn send_effect(&self, envelope: &Envelope, effect: Effect) {
        let _ = self.outbound.send(OutboundEffect {
            channel: envelope.channel.clone(),
            account_tag: envelope.account_tag.clone(),
            effect,
        });
    }

    /// Plain chat announcement.
    pub(crate) fn announce(&self, envelope: &Envelope, text: String) {
        self.send_effect(
            envelope,
            Effect::SendMessage {
                chat_id: envelope.chat_id,
                text,
                reply_to: None,
            },
        );
    }

    /// Reply attached to the triggering message.
    pub(crate) fn reply(&self, envelope: &Envelope, text: String) {
        self.send_effect(
            envelope,
            Effect::SendMessage {
                chat_id: envelope.chat_id,
                text,
                reply_to: envelope.message_id,
            },
        );
    }
}

pub struct Runtime {
    config: Config,
    data_dir: PathBuf,
    event_bus: EventBus,
}

impl Runtime {
    pub fn new(config: Config, data_dir: PathBuf) -> Self {
        Self {
            config,
            data_dir,
            event_bus: EventBus::new(),
        }
    }

    pub async fn run(&self) -> Result<()> {
        info!("Vigil runtime starting...");

        let engine = Arc::new(Mutex::new(ModerationEngine::from_config(
            &self.config.moderation,
        )));
        let admins = Arc::new(AdminResolver::new(
            self.config.moderation.static_admins.iter().copied().collect(),
        ));

        let poll_timeout = self.config.telegram.poll_timeout_secs;
        let recreate_interval = self.config.telegram.client_recreate_interval_secs;

        let mut contexts: HashMap<String, AccountContext> = HashMap::new();
        for (idx, account) in self.config.telegram.accounts.iter().enumerate() {
            let lookup = Arc::new(TelegramAdapter::new(
                account,
                self.data_dir.clone(),
                poll_timeout,
                recreate_interval,
            ));
            let me = lookup
                .get_me()
                .await
                .with_context(|| format!("getMe failed for telegram account #{}", idx + 1))?;
            info!(
                bot_id = me.id,
                username = me.username.as_deref().unwrap_or(""),
                "Telegram account #{} resolved",
                idx + 1
            );

            let account_tag = lookup.account_tag().to_string();
            contexts.insert(
                account_tag,
                AccountContext {
                    directory: lookup,
                    targets: TargetResolver::new(me.id),
                },
            );

            let effect_adapter = TelegramAdapter::new(
                account,
                self.data_dir.clone(),
                poll_timeout,
                recreate_interval,
            );
            let outbound_rx = self.event_bus.outbound_subscribe();
            tokio::spawn(async move {
                effect_adapter.run_effect_handler(outbound_rx).await;
            });

            let poll_adapter = TelegramAdapter::new(
                account,
                self.data_dir.clone(),
                poll_timeout,
                recreate_interval,
            )
            .with_event_bus(self.event_bus.clone());
            tokio::spawn(async move {
                if let Err(e) = poll_adapter.poll().await {
                    error!("Telegram adapter failed: {}", e);
                }
            });
        }

        let dispatcher = Dispatcher {
            engine,
            admins,
            contexts,
            outbound: self.event_bus.outbound_sender(),
            welcome_message: self.config.moderation.welcome_message.clone(),
        };

        let mut inbound_rx = self.event_bus.subscribe();
        info!("Vigil dispatcher started");

        loop {
            match inbound_rx.recv().await {
                Ok(envelope) => {
                    let trace_id = envelope.trace_id.clone();
                    if let Err(e) = dispatcher.process(&envelope).await {
                        error!("Error processing event (trace_id={}): {}", trace_id, e);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Event bus closed, stopping dispatcher");
                    return Ok(());
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Event bus lagged by {} events", n);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use vigil_config::ModerationConfig;
    use vigil_ipc::ReplyRef;

    const BOT_ID: i64 = 999;
    const CHAT: i64 = -100;
    const ADMIN: i64 = 1;
    const OTHER_ADMIN: i64 = 2;
    const MEMBER: i64 = 7;
    const TAG: &str = "123456";

    struct StubDirectory {
        admins: HashSet<i64>,
    }

    #[async_trait]
    impl AdminDirectory for StubDirectory {
        async fn chat_administrators(&self, _chat_id: i64) -> Result<HashSet<i64>> {
            Ok(self.admins.clone())
        }
    }

    fn dispatcher() -> (Dispatcher, broadcast::Receiver<OutboundEffect>) {
        let bus = EventBus::new();
        let rx = bus.outbound_subscribe();

        let mut contexts = HashMap::new();
        contexts.insert(
            TAG.to_string(),
            AccountContext {
                directory: Arc::new(StubDirectory {
                    admins: HashSet::from([ADMIN, OTHER_ADMIN]),
                }),
                targets: TargetResolver::new(BOT_ID),
            },
        );

        let dispatcher = Dispatcher {
            engine: Arc::new(Mutex::new(ModerationEngine::from_config(
                &ModerationConfig::default(),
            ))),
            admins: Arc::new(AdminResolver::new(HashSet::new())),
            contexts,
            outbound: bus.outbound_sender(),
            welcome_message: "Welcome, {name}!".to_string(),
        };

        (dispatcher, rx)
    }

    fn sender(id: i64) -> Sender {
        Sender {
            id,
            is_bot: false,
            username: None,
            first_name: Some(format!("user{id}")),
        }
    }

    fn message(from: i64, text: &str, reply_to_user: Option<i64>) -> Envelope {
        let reply_to = reply_to_user.map(|id| ReplyRef {
            message_id: 50,
            from: Some(sender(id)),
        });
        Envelope::new(
            "telegram",
            CHAT,
            EventKind::Message {
                from: sender(from),
                content: ContentKind::Text,
                text: Some(text.to_string()),
                reply_to,
            },
        )
        .with_account_tag(TAG)
        .with_message_id(100)
    }

    fn drain(rx: &mut broadcast::Receiver<OutboundEffect>) -> Vec<Effect> {
        let mut effects = Vec::new();
        while let Ok(outbound) = rx.try_recv() {
            effects.push(outbound.effect);
        }
        effects
    }

    fn sent_texts(effects: &[Effect]) -> Vec<&str> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::SendMessage { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn non_admin_command_is_denied() {
        let (dispatcher, mut rx) = dispatcher();
        dispatcher
            .process(&message(MEMBER, "/warn", Some(8)))
            .await
            .unwrap();
        let effects = drain(&mut rx);
        assert_eq!(sent_texts(&effects), vec!["❌ You don't have permission."]);
    }

    #[tokio::test]
    async fn warn_without_reply_surfaces_no_target() {
        let (dispatcher, mut rx) = dispatcher();
        dispatcher
            .process(&message(ADMIN, "/warn", None))
            .await
            .unwrap();
        let effects = drain(&mut rx);
        assert_eq!(sent_texts(&effects), vec!["Reply to a user's message."]);
    }

    #[tokio::test]
    async fn third_warning_bans_the_target() {
        let (dispatcher, mut rx) = dispatcher();
        for _ in 0..2 {
            dispatcher
                .process(&message(ADMIN, "/warn", Some(MEMBER)))
                .await
                .unwrap();
        }
        let early = drain(&mut rx);
        assert!(!early.iter().any(|e| matches!(e, Effect::BanUser { .. })));

        dispatcher
            .process(&message(ADMIN, "/warn", Some(MEMBER)))
            .await
            .unwrap();
        let effects = drain(&mut rx);
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::BanUser {
                chat_id: CHAT,
                user_id: MEMBER,
                until_unix: None
            }
        )));
        assert!(sent_texts(&effects)[0].contains("auto-banned"));
    }

    #[tokio::test]
    async fn self_warn_is_self_target_even_for_admins() {
        let (dispatcher, mut rx) = dispatcher();
        dispatcher
            .process(&message(ADMIN, "/warn", Some(ADMIN)))
            .await
            .unwrap();
        let effects = drain(&mut rx);
        assert_eq!(sent_texts(&effects), vec!["You cannot target yourself."]);
    }

    #[tokio::test]
    async fn warning_another_admin_is_rejected() {
        let (dispatcher, mut rx) = dispatcher();
        dispatcher
            .process(&message(ADMIN, "/warn", Some(OTHER_ADMIN)))
            .await
            .unwrap();
        let effects = drain(&mut rx);
        assert_eq!(sent_texts(&effects), vec!["Admins cannot be moderated."]);
    }

    #[tokio::test]
    async fn shadowbanned_user_messages_are_deleted() {
        let (dispatcher, mut rx) = dispatcher();
        dispatcher
            .process(&message(ADMIN, "/shadowban", Some(MEMBER)))
            .await
            .unwrap();
        drain(&mut rx);

        dispatcher
            .process(&message(MEMBER, "perfectly innocent text", None))
            .await
            .unwrap();
        let effects = drain(&mut rx);
        assert!(matches!(
            effects.as_slice(),
            [Effect::DeleteMessage {
                chat_id: CHAT,
                message_id: 100
            }]
        ));
    }

    #[tokio::test]
    async fn link_message_is_deleted_when_antilink_is_on() {
        let (dispatcher, mut rx) = dispatcher();
        dispatcher
            .process(&message(MEMBER, "join t.me/spamgroup now", None))
            .await
            .unwrap();
        let effects = drain(&mut rx);
        assert!(matches!(effects.as_slice(), [Effect::DeleteMessage { .. }]));
    }

    #[tokio::test]
    async fn toggle_command_flips_the_flag() {
        let (dispatcher, mut rx) = dispatcher();
        dispatcher
            .process(&message(ADMIN, "/antilink off", None))
            .await
            .unwrap();
        let effects = drain(&mut rx);
        assert_eq!(sent_texts(&effects), vec!["🔗 Anti-link disabled"]);

        dispatcher
            .process(&message(MEMBER, "see https://example.com", None))
            .await
            .unwrap();
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn toggle_with_bad_argument_is_a_usage_error() {
        let (dispatcher, mut rx) = dispatcher();
        dispatcher
            .process(&message(ADMIN, "/flood sideways", None))
            .await
            .unwrap();
        let effects = drain(&mut rx);
        assert_eq!(sent_texts(&effects), vec!["Use: on/off"]);
    }

    #[tokio::test]
    async fn myrole_works_for_everyone() {
        let (dispatcher, mut rx) = dispatcher();
        dispatcher
            .process(&message(ADMIN, "/role night watch", Some(MEMBER)))
            .await
            .unwrap();
        drain(&mut rx);

        dispatcher
            .process(&message(MEMBER, "/myrole", None))
            .await
            .unwrap();
        let effects = drain(&mut rx);
        assert_eq!(sent_texts(&effects), vec!["Your role: *night watch*"]);
    }

    #[tokio::test]
    async fn bot_joining_is_kicked_and_humans_are_welcomed() {
        let (dispatcher, mut rx) = dispatcher();
        let bot_joiner = Sender {
            id: 55,
            is_bot: true,
            username: Some("spam_bot".to_string()),
            first_name: Some("SpamBot".to_string()),
        };
        let human = Sender {
            id: 56,
            is_bot: false,
            username: None,
            first_name: Some("Alice".to_string()),
        };
        let envelope = Envelope::new(
            "telegram",
            CHAT,
            EventKind::Joined {
                users: vec![bot_joiner, human],
            },
        )
        .with_account_tag(TAG)
        .with_message_id(200);

        dispatcher.process(&envelope).await.unwrap();
        let effects = drain(&mut rx);

        // Service message removed (clean_join), bot kicked, human welcomed.
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::DeleteMessage {
                message_id: 200,
                ..
            }
        )));
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::KickUser {
                user_id: 55,
                ..
            }
        )));
        assert!(sent_texts(&effects).contains(&"Welcome, Alice!"));
    }

    #[tokio::test]
    async fn leave_service_message_is_cleaned() {
        let (dispatcher, mut rx) = dispatcher();
        let envelope = Envelope::new(
            "telegram",
            CHAT,
            EventKind::Left { user: sender(77) },
        )
        .with_account_tag(TAG)
        .with_message_id(300);

        dispatcher.process(&envelope).await.unwrap();
        let effects = drain(&mut rx);
        assert!(matches!(
            effects.as_slice(),
            [Effect::DeleteMessage {
                message_id: 300,
                ..
            }]
        ));
    }

    #[tokio::test]
    async fn purge_deletes_the_whole_range() {
        let (dispatcher, mut rx) = dispatcher();
        // Replied message 50, command message 100: both ends inclusive.
        dispatcher
            .process(&message(ADMIN, "/purge", Some(MEMBER)))
            .await
            .unwrap();
        let effects = drain(&mut rx);
        let deletes = effects
            .iter()
            .filter(|e| matches!(e, Effect::DeleteMessage { .. }))
            .count();
        assert_eq!(deletes, 51);
        assert!(sent_texts(&effects).contains(&"🗑 Purge complete."));
    }

    #[tokio::test]
    async fn unknown_command_goes_through_the_filter() {
        let (dispatcher, mut rx) = dispatcher();
        dispatcher
            .process(&message(ADMIN, "/shadowban", Some(MEMBER)))
            .await
            .unwrap();
        drain(&mut rx);

        // Not a known command, so it is filtered like any message and the
        // shadowban wins.
        dispatcher
            .process(&message(MEMBER, "/dance", None))
            .await
            .unwrap();
        let effects = drain(&mut rx);
        assert!(matches!(effects.as_slice(), [Effect::DeleteMessage { .. }]));
    }
}
