//! Admin command handling
//!
//! Every handler starts with an explicit admin check against the resolver
//! and surfaces the specific target rejection when one applies; the actual
//! chat-platform work is emitted as effects.

use crate::{AccountContext, Dispatcher};
use anyhow::Result;
use tracing::info;
use vigil_ipc::{Effect, Envelope, ReplyRef, Sender};
use vigil_moderation::{parse_toggle, PolicyFlag};

/// Mute duration for the plain /mute command.
const MUTE_SECS: u32 = 600;

/// Splits `/name@bot args...` into a lowercase command name and the raw
/// remainder. Returns None for text that is not a command.
pub fn parse_command(text: &str) -> Option<(String, String)> {
    let rest = text.trim().strip_prefix('/')?;
    let (word, args) = rest
        .split_once(char::is_whitespace)
        .unwrap_or((rest, ""));
    let name = word.split('@').next().unwrap_or(word).to_ascii_lowercase();
    if name.is_empty() {
        return None;
    }
    Some((name, args.trim().to_string()))
}

pub fn is_known_command(name: &str) -> bool {
    matches!(
        name,
        "start"
            | "help"
            | "myrole"
            | "kick"
            | "ban"
            | "unban"
            | "mute"
            | "unmute"
            | "tban"
            | "warn"
            | "clearwarn"
            | "shadowban"
            | "unshadow"
            | "purge"
            | "role"
            | "pin"
            | "unpin"
            | "lock"
            | "unlock"
            | "slowmode"
            | "antilink"
            | "antimedia"
            | "flood"
            | "use_real_admins"
    )
}

fn help_text() -> String {
    "*Vigil — group moderation*\n\n\
     *Moderation*\n\
     /kick /ban /unban — remove the replied user\n\
     /mute /unmute — 10m send restriction\n\
     /tban <minutes> — temporary ban\n\
     /warn /clearwarn — warnings, auto-ban at the threshold\n\
     /shadowban /unshadow — silent message deletion\n\
     /purge — delete from the replied message down\n\n\
     *Chat*\n\
     /lock /unlock — chat-wide send permission\n\
     /pin /unpin — pinned message\n\
     /slowmode <seconds>\n\n\
     *Roles*\n\
     /role <label> — assign (reply)\n\
     /myrole — show your role\n\n\
     *Protection*\n\
     /antilink on|off\n\
     /antimedia on|off\n\
     /flood on|off\n\
     /use_real_admins on|off"
        .to_string()
}

impl Dispatcher {
    pub(crate) async fn handle_command(
        &self,
        ctx: &AccountContext,
        envelope: &Envelope,
        from: &Sender,
        reply_to: Option<&ReplyRef>,
        name: &str,
        args: &str,
    ) -> Result<()> {
        let chat_id = envelope.chat_id;

        // Open to everyone.
        match name {
            "start" | "help" => {
                self.reply(envelope, help_text());
                return Ok(());
            }
            "myrole" => {
                let engine = self.engine.lock().await;
                let role = engine.roles.role_or_default(from.id).to_string();
                drop(engine);
                self.reply(envelope, format!("Your role: *{}*", role));
                return Ok(());
            }
            _ => {}
        }

        let use_real_admins = self.engine.lock().await.flags.use_real_admins;
        if !self
            .admins
            .is_admin(ctx.directory.as_ref(), from.id, chat_id, use_real_admins)
            .await
        {
            self.reply(envelope, "❌ You don't have permission.".to_string());
            return Ok(());
        }

        match name {
            "kick" | "ban" | "unban" | "mute" | "unmute" | "tban" | "warn" | "clearwarn"
            | "shadowban" | "unshadow" => {
                self.handle_target_command(ctx, envelope, from, reply_to, name, args, use_real_admins)
                    .await?;
            }
            "purge" => {
                let Some(reply) = reply_to else {
                    self.reply(envelope, "Reply to a message to purge from.".to_string());
                    return Ok(());
                };
                let Some(command_message_id) = envelope.message_id else {
                    return Ok(());
                };
                for message_id in reply.message_id..=command_message_id {
                    self.send_effect(
                        envelope,
                        Effect::DeleteMessage {
                            chat_id,
                            message_id,
                        },
                    );
                }
                self.announce(envelope, "🗑 Purge complete.".to_string());
            }
            "role" => {
                let Some(target) = reply_to.and_then(|r| r.from.as_ref()) else {
                    self.reply(envelope, "Reply to a user's message.".to_string());
                    return Ok(());
                };
                if args.is_empty() {
                    self.reply(envelope, "Usage: /role <text>".to_string());
                    return Ok(());
                }
                self.engine.lock().await.roles.assign_role(target.id, args);
                self.announce(envelope, format!("🎖 Assigned role: `{}`", args));
            }
            "pin" => {
                let Some(reply) = reply_to else {
                    self.reply(envelope, "Reply to a message to pin.".to_string());
                    return Ok(());
                };
                self.send_effect(
                    envelope,
                    Effect::PinMessage {
                        chat_id,
                        message_id: reply.message_id,
                    },
                );
            }
            "unpin" => {
                self.send_effect(envelope, Effect::UnpinMessage { chat_id });
            }
            "lock" => {
                self.send_effect(
                    envelope,
                    Effect::SetChatLocked {
                        chat_id,
                        locked: true,
                    },
                );
                self.announce(envelope, "🔐 Chat locked".to_string());
            }
            "unlock" => {
                self.send_effect(
                    envelope,
                    Effect::SetChatLocked {
                        chat_id,
                        locked: false,
                    },
                );
                self.announce(envelope, "🔓 Chat unlocked".to_string());
            }
            "slowmode" => match args.parse::<u32>() {
                Ok(seconds) => {
                    self.send_effect(envelope, Effect::SetSlowMode { chat_id, seconds });
                    self.announce(envelope, format!("🐢 Slowmode set to {}s", seconds));
                }
                Err(_) => {
                    self.reply(envelope, "Usage: /slowmode <seconds>".to_string());
                }
            },
            "antilink" => self.toggle_flag(envelope, PolicyFlag::BlockLinks, "🔗 Anti-link", args).await,
            "antimedia" => self.toggle_flag(envelope, PolicyFlag::BlockMedia, "📵 Anti-media", args).await,
            "flood" => {
                self.toggle_flag(envelope, PolicyFlag::FloodProtection, "🚨 Anti-flood", args)
                    .await
            }
            "use_real_admins" => {
                self.toggle_flag(envelope, PolicyFlag::UseRealAdmins, "🛡 Real admin check", args)
                    .await
            }
            _ => {}
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_target_command(
        &self,
        ctx: &AccountContext,
        envelope: &Envelope,
        from: &Sender,
        reply_to: Option<&ReplyRef>,
        name: &str,
        args: &str,
        use_real_admins: bool,
    ) -> Result<()> {
        let chat_id = envelope.chat_id;
        let replied_user = reply_to.and_then(|r| r.from.as_ref()).map(|s| s.id);

        let target = match ctx
            .targets
            .resolve(
                &self.admins,
                ctx.directory.as_ref(),
                use_real_admins,
                from.id,
                replied_user,
                chat_id,
            )
            .await
        {
            Ok(target) => target,
            Err(rejection) => {
                self.reply(envelope, rejection.to_string());
                return Ok(());
            }
        };

        match name {
            "kick" => {
                self.send_effect(envelope, Effect::KickUser { chat_id, user_id: target });
                self.announce(envelope, format!("👢 Kicked `{}`", target));
            }
            "ban" => {
                self.send_effect(
                    envelope,
                    Effect::BanUser {
                        chat_id,
                        user_id: target,
                        until_unix: None,
                    },
                );
                self.announce(envelope, format!("🚫 Banned `{}`", target));
            }
            "unban" => {
                self.send_effect(envelope, Effect::UnbanUser { chat_id, user_id: target });
                self.announce(envelope, format!("♻️ Unbanned `{}`", target));
            }
            "mute" => {
                self.send_effect(
                    envelope,
                    Effect::RestrictUser {
                        chat_id,
                        user_id: target,
                        until_unix: until_from_now(MUTE_SECS),
                    },
                );
                self.announce(envelope, format!("🔇 Muted `{}` for 10m", target));
            }
            "unmute" => {
                self.send_effect(
                    envelope,
                    Effect::LiftRestrictions {
                        chat_id,
                        user_id: target,
                    },
                );
                self.announce(envelope, format!("🔊 Unmuted `{}`", target));
            }
            "tban" => match args.parse::<u32>() {
                Ok(minutes) if minutes > 0 => {
                    self.send_effect(
                        envelope,
                        Effect::BanUser {
                            chat_id,
                            user_id: target,
                            until_unix: Some(until_from_now(minutes.saturating_mul(60))),
                        },
                    );
                    self.announce(
                        envelope,
                        format!("⛔ Temp-banned `{}` for {} minutes", target, minutes),
                    );
                }
                _ => {
                    self.reply(envelope, "Usage: reply + /tban <minutes>".to_string());
                }
            },
            "warn" => {
                let (outcome, threshold) = {
                    let mut engine = self.engine.lock().await;
                    let outcome = engine.warnings.warn(chat_id, target);
                    (outcome, engine.warnings.threshold())
                };
                if outcome.escalated {
                    info!(chat_id, user_id = target, "warning threshold reached, banning");
                    self.send_effect(
                        envelope,
                        Effect::BanUser {
                            chat_id,
                            user_id: target,
                            until_unix: None,
                        },
                    );
                    self.announce(
                        envelope,
                        format!("⛔ `{}` auto-banned ({} warnings)", target, threshold),
                    );
                } else {
                    self.announce(
                        envelope,
                        format!("⚠ Warning {}/{} for `{}`", outcome.count, threshold, target),
                    );
                }
            }
            "clearwarn" => {
                self.engine.lock().await.warnings.clear(chat_id, target);
                self.announce(envelope, format!("✨ Warnings cleared for `{}`", target));
            }
            "shadowban" => {
                self.engine.lock().await.shadowbans.shadowban(target);
                self.announce(envelope, format!("👁 Shadow-banned `{}`", target));
            }
            "unshadow" => {
                self.engine.lock().await.shadowbans.unshadow(target);
                self.announce(envelope, format!("👁 Removed shadowban for `{}`", target));
            }
            _ => {}
        }

        Ok(())
    }

    async fn toggle_flag(&self, envelope: &Envelope, flag: PolicyFlag, label: &str, args: &str) {
        let value = match parse_toggle(args) {
            Ok(value) => value,
            Err(_) => {
                self.reply(envelope, "Use: on/off".to_string());
                return;
            }
        };
        self.engine.lock().await.flags.set(flag, value);
        info!(flag = %flag, value, "policy flag changed");
        self.reply(
            envelope,
            format!("{} {}", label, if value { "enabled" } else { "disabled" }),
        );
    }
}

pub(crate) fn until_from_now(seconds: u32) -> i64 {
    chrono::Utc::now().timestamp() + i64::from(seconds)
}
