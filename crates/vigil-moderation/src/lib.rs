//! Vigil Moderation Engine
//!
//! Warning ledger, shadowban set, role registry, per-user flood windows,
//! policy flags and the ordered message filter pipeline. All state is
//! in-memory; the engine performs no I/O except the admin-list fetch, which
//! goes through the [`admin::AdminDirectory`] seam.

pub mod admin;
pub mod error;
pub mod filter;
pub mod flags;
pub mod flood;
pub mod registry;
pub mod target;
pub mod warnings;

pub use admin::{AdminDirectory, AdminResolver};
pub use error::ModerationError;
pub use filter::{
    join_verdict, ContentKind, FilterAction, InboundMessage, JoinVerdict, MessageFilterPipeline,
};
pub use flags::{parse_toggle, PolicyFlag, PolicyFlags};
pub use flood::{FloodDetector, FloodVerdict};
pub use registry::{RoleRegistry, ShadowbanSet, DEFAULT_ROLE};
pub use target::{TargetRejection, TargetResolver};
pub use warnings::{WarnOutcome, WarningLedger};

use vigil_config::ModerationConfig;

/// Owned moderation state, passed by handle into the dispatcher. One engine
/// serves all chats; the per-chat/global scoping lives inside the individual
/// stores.
pub struct ModerationEngine {
    pub flags: PolicyFlags,
    pub warnings: WarningLedger,
    pub shadowbans: ShadowbanSet,
    pub roles: RoleRegistry,
    pub flood: FloodDetector,
    pipeline: MessageFilterPipeline,
    mute_secs: u32,
}

impl ModerationEngine {
    pub fn from_config(config: &ModerationConfig) -> Self {
        Self {
            flags: PolicyFlags::from_config(&config.flags),
            warnings: WarningLedger::new(config.warn_threshold),
            shadowbans: ShadowbanSet::new(),
            roles: RoleRegistry::new(),
            flood: FloodDetector::new(config.flood.window_secs, config.flood.max_messages),
            pipeline: MessageFilterPipeline::new(config.flood.auto_mute_secs),
            mute_secs: config.flood.auto_mute_secs,
        }
    }

    /// Flood auto-mute duration in seconds.
    pub fn mute_secs(&self) -> u32 {
        self.mute_secs
    }

    pub fn evaluate_message(&mut self, msg: &InboundMessage<'_>) -> FilterAction {
        self.pipeline
            .evaluate(&self.flags, &self.shadowbans, &mut self.flood, msg)
    }

    pub fn join_verdict(&self, joiner_is_bot: bool, joiner_is_admin: bool) -> JoinVerdict {
        join_verdict(&self.flags, joiner_is_bot, joiner_is_admin)
    }
}
