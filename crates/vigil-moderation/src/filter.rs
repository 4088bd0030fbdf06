//! Message filter pipeline
//!
//! Fixed-order checks over every inbound message: shadowban, link blocking,
//! media blocking, flood detection. First match wins and decides the action;
//! later checks are skipped, so a shadowbanned user never feeds the flood
//! window.

use crate::flags::PolicyFlags;
use crate::flood::{FloodDetector, FloodVerdict};
use crate::registry::ShadowbanSet;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// The content classes the filter distinguishes. Everything else (voice,
/// location, polls, ...) passes through as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Text,
    Photo,
    Video,
    Document,
    Sticker,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterAction {
    Allow,
    Delete,
    DeleteAndRestrict { mute_secs: u32 },
}

#[derive(Debug, Clone)]
pub struct InboundMessage<'a> {
    pub user_id: i64,
    pub chat_id: i64,
    pub content: ContentKind,
    pub text: Option<&'a str>,
    /// Receipt time in seconds, fed to the flood window.
    pub received_at: f64,
}

const URL_PATTERN: &str = r"(?i)(https?://\S+|www\.\S+|t\.me/\S+|telegram\.me/\S+)";

pub struct MessageFilterPipeline {
    url_pattern: Regex,
    auto_mute_secs: u32,
}

impl MessageFilterPipeline {
    pub fn new(auto_mute_secs: u32) -> Self {
        Self {
            url_pattern: Regex::new(URL_PATTERN).expect("URL pattern compiles"),
            auto_mute_secs,
        }
    }

    pub fn evaluate(
        &self,
        flags: &PolicyFlags,
        shadowbans: &ShadowbanSet,
        flood: &mut FloodDetector,
        msg: &InboundMessage<'_>,
    ) -> FilterAction {
        if shadowbans.is_shadowbanned(msg.user_id) {
            return FilterAction::Delete;
        }

        if flags.block_links && msg.content == ContentKind::Text {
            if let Some(text) = msg.text {
                if self.url_pattern.is_match(text) {
                    return FilterAction::Delete;
                }
            }
        }

        if flags.block_media
            && matches!(
                msg.content,
                ContentKind::Photo | ContentKind::Video | ContentKind::Document | ContentKind::Sticker
            )
        {
            return FilterAction::Delete;
        }

        // No window bookkeeping while flood protection is off; state from
        // earlier enabled periods is retained, not flushed.
        if flags.flood_protection
            && flood.record_and_check(msg.user_id, msg.received_at) == FloodVerdict::Flood
        {
            return FilterAction::DeleteAndRestrict {
                mute_secs: self.auto_mute_secs,
            };
        }

        FilterAction::Allow
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinVerdict {
    /// Bot account joining without admin status while anti-bot is on.
    Kick,
    Welcome,
}

pub fn join_verdict(flags: &PolicyFlags, joiner_is_bot: bool, joiner_is_admin: bool) -> JoinVerdict {
    if flags.anti_bot && joiner_is_bot && !joiner_is_admin {
        JoinVerdict::Kick
    } else {
        JoinVerdict::Welcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_message(user_id: i64, text: &str) -> InboundMessage<'_> {
        InboundMessage {
            user_id,
            chat_id: -100,
            content: ContentKind::Text,
            text: Some(text),
            received_at: 0.0,
        }
    }

    fn media_message(user_id: i64, content: ContentKind) -> InboundMessage<'static> {
        InboundMessage {
            user_id,
            chat_id: -100,
            content,
            text: None,
            received_at: 0.0,
        }
    }

    struct Fixture {
        flags: PolicyFlags,
        shadowbans: ShadowbanSet,
        flood: FloodDetector,
        pipeline: MessageFilterPipeline,
    }

    fn fixture() -> Fixture {
        Fixture {
            flags: PolicyFlags::default(),
            shadowbans: ShadowbanSet::new(),
            flood: FloodDetector::new(4.0, 5),
            pipeline: MessageFilterPipeline::new(30),
        }
    }

    impl Fixture {
        fn evaluate(&mut self, msg: &InboundMessage<'_>) -> FilterAction {
            self.pipeline
                .evaluate(&self.flags, &self.shadowbans, &mut self.flood, msg)
        }
    }

    #[test]
    fn clean_text_is_allowed() {
        let mut fx = fixture();
        assert_eq!(fx.evaluate(&text_message(1, "hello there")), FilterAction::Allow);
    }

    #[test]
    fn shadowban_deletes_regardless_of_flags() {
        let mut fx = fixture();
        fx.flags.block_links = false;
        fx.flags.block_media = false;
        fx.flags.flood_protection = false;
        fx.shadowbans.shadowban(1);
        assert_eq!(fx.evaluate(&text_message(1, "hello")), FilterAction::Delete);
        assert_eq!(
            fx.evaluate(&media_message(1, ContentKind::Photo)),
            FilterAction::Delete
        );
    }

    #[test]
    fn shadowban_short_circuits_the_flood_window() {
        let mut fx = fixture();
        fx.shadowbans.shadowban(1);
        for _ in 0..10 {
            fx.evaluate(&text_message(1, "spam"));
        }
        assert_eq!(fx.flood.window_len(1), 0);
    }

    #[test]
    fn url_variants_are_deleted_when_links_blocked() {
        let mut fx = fixture();
        for text in [
            "check https://example.com/x",
            "HTTP://EXAMPLE.COM",
            "go to www.example.com now",
            "join t.me/somegroup",
            "or telegram.me/other",
        ] {
            assert_eq!(fx.evaluate(&text_message(1, text)), FilterAction::Delete, "{text}");
        }
    }

    #[test]
    fn bare_scheme_without_rest_is_not_a_link() {
        let mut fx = fixture();
        assert_eq!(fx.evaluate(&text_message(1, "https:// is a prefix")), FilterAction::Allow);
    }

    #[test]
    fn links_pass_when_flag_is_off() {
        let mut fx = fixture();
        fx.flags.block_links = false;
        assert_eq!(
            fx.evaluate(&text_message(1, "https://example.com")),
            FilterAction::Allow
        );
    }

    #[test]
    fn media_kinds_are_deleted_when_media_blocked() {
        let mut fx = fixture();
        fx.flags.block_media = true;
        for kind in [
            ContentKind::Photo,
            ContentKind::Video,
            ContentKind::Document,
            ContentKind::Sticker,
        ] {
            assert_eq!(fx.evaluate(&media_message(1, kind)), FilterAction::Delete);
        }
        assert_eq!(fx.evaluate(&media_message(1, ContentKind::Other)), FilterAction::Allow);
    }

    #[test]
    fn flooding_user_is_deleted_and_restricted() {
        let mut fx = fixture();
        let mut action = FilterAction::Allow;
        for i in 0..6 {
            let msg = InboundMessage {
                received_at: i as f64 * 0.1,
                ..text_message(1, "hi")
            };
            action = fx.evaluate(&msg);
        }
        assert_eq!(action, FilterAction::DeleteAndRestrict { mute_secs: 30 });
    }

    #[test]
    fn no_window_bookkeeping_while_flood_protection_is_off() {
        let mut fx = fixture();
        fx.flags.flood_protection = false;
        for _ in 0..10 {
            assert_eq!(fx.evaluate(&text_message(1, "hi")), FilterAction::Allow);
        }
        assert_eq!(fx.flood.window_len(1), 0);
    }

    #[test]
    fn anti_bot_kicks_non_admin_bots_only() {
        let flags = PolicyFlags::default();
        assert_eq!(join_verdict(&flags, true, false), JoinVerdict::Kick);
        assert_eq!(join_verdict(&flags, true, true), JoinVerdict::Welcome);
        assert_eq!(join_verdict(&flags, false, false), JoinVerdict::Welcome);

        let mut off = flags;
        off.anti_bot = false;
        assert_eq!(join_verdict(&off, true, false), JoinVerdict::Welcome);
    }
}
