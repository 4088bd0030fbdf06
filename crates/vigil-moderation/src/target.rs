//! Target derivation for moderation commands
//!
//! The target is the author of the message the command replies to, with
//! ordered exclusions: missing reply, self-targeting, the bot itself, and
//! protected admins each produce their own user-visible rejection.

use crate::admin::{AdminDirectory, AdminResolver};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetRejection {
    NoTarget,
    SelfTarget,
    SelfProtect,
    ProtectedAdmin,
}

impl fmt::Display for TargetRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TargetRejection::NoTarget => "Reply to a user's message.",
            TargetRejection::SelfTarget => "You cannot target yourself.",
            TargetRejection::SelfProtect => "I refuse to punish myself.",
            TargetRejection::ProtectedAdmin => "Admins cannot be moderated.",
        };
        f.write_str(text)
    }
}

pub struct TargetResolver {
    bot_id: i64,
}

impl TargetResolver {
    pub fn new(bot_id: i64) -> Self {
        Self { bot_id }
    }

    /// Checks run in priority order, so a self-reply is reported as
    /// `SelfTarget` even when the issuer is also an admin.
    pub async fn resolve(
        &self,
        resolver: &AdminResolver,
        directory: &dyn AdminDirectory,
        use_real_admins: bool,
        issuer_id: i64,
        replied_to: Option<i64>,
        chat_id: i64,
    ) -> Result<i64, TargetRejection> {
        let target = replied_to.ok_or(TargetRejection::NoTarget)?;

        if target == issuer_id {
            return Err(TargetRejection::SelfTarget);
        }
        if target == self.bot_id {
            return Err(TargetRejection::SelfProtect);
        }
        if resolver
            .is_admin(directory, target, chat_id, use_real_admins)
            .await
        {
            return Err(TargetRejection::ProtectedAdmin);
        }

        Ok(target)
    }
}
