//! Shadowban membership and role assignments.

use std::collections::{HashMap, HashSet};

pub const DEFAULT_ROLE: &str = "No role assigned";

/// One set across all chats: shadowbanning a user silences them everywhere
/// the bot moderates, unlike warnings which are per-chat.
#[derive(Debug, Clone, Default)]
pub struct ShadowbanSet {
    users: HashSet<i64>,
}

impl ShadowbanSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shadowban(&mut self, user_id: i64) {
        self.users.insert(user_id);
    }

    pub fn unshadow(&mut self, user_id: i64) {
        self.users.remove(&user_id);
    }

    pub fn is_shadowbanned(&self, user_id: i64) -> bool {
        self.users.contains(&user_id)
    }
}

/// Free-text role labels, last write wins.
#[derive(Debug, Clone, Default)]
pub struct RoleRegistry {
    roles: HashMap<i64, String>,
}

impl RoleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign_role(&mut self, user_id: i64, label: impl Into<String>) {
        self.roles.insert(user_id, label.into());
    }

    pub fn role(&self, user_id: i64) -> Option<&str> {
        self.roles.get(&user_id).map(String::as_str)
    }

    pub fn role_or_default(&self, user_id: i64) -> &str {
        self.role(user_id).unwrap_or(DEFAULT_ROLE)
    }
}
