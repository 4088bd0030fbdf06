//! Admin resolution
//!
//! Membership checks against the live chat administrator list when
//! `use_real_admins` is on, degrading to the static set from config whenever
//! the fetch fails. Admin checks never propagate errors to the caller.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

/// Collaborator that knows the authoritative administrator list of a chat.
/// Implemented by the Telegram adapter; tests swap in fixed or failing stubs.
#[async_trait]
pub trait AdminDirectory: Send + Sync {
    async fn chat_administrators(&self, chat_id: i64) -> Result<HashSet<i64>>;
}

/// Short TTL: keeps getChatAdministrators volume bounded while a revoked
/// admin loses privileges within seconds.
const ADMIN_CACHE_TTL: Duration = Duration::from_secs(5);

struct CachedAdmins {
    fetched_at: Instant,
    admins: HashSet<i64>,
}

pub struct AdminResolver {
    static_admins: HashSet<i64>,
    cache: Mutex<HashMap<i64, CachedAdmins>>,
}

impl AdminResolver {
    pub fn new(static_admins: HashSet<i64>) -> Self {
        Self {
            static_admins,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn static_admins(&self) -> &HashSet<i64> {
        &self.static_admins
    }

    /// Never fails. With `use_real_admins` off the static set is
    /// authoritative; with it on, a failed live fetch falls back to the
    /// static set instead of surfacing the error.
    pub async fn is_admin(
        &self,
        directory: &dyn AdminDirectory,
        user_id: i64,
        chat_id: i64,
        use_real_admins: bool,
    ) -> bool {
        if !use_real_admins {
            return self.static_admins.contains(&user_id);
        }

        match self.live_admins(directory, chat_id).await {
            Some(admins) => admins.contains(&user_id),
            None => self.static_admins.contains(&user_id),
        }
    }

    async fn live_admins(
        &self,
        directory: &dyn AdminDirectory,
        chat_id: i64,
    ) -> Option<HashSet<i64>> {
        {
            let cache = self.cache.lock().await;
            if let Some(entry) = cache.get(&chat_id) {
                if entry.fetched_at.elapsed() < ADMIN_CACHE_TTL {
                    return Some(entry.admins.clone());
                }
            }
        }

        match directory.chat_administrators(chat_id).await {
            Ok(admins) => {
                let mut cache = self.cache.lock().await;
                cache.insert(
                    chat_id,
                    CachedAdmins {
                        fetched_at: Instant::now(),
                        admins: admins.clone(),
                    },
                );
                Some(admins)
            }
            Err(err) => {
                warn!(chat_id, "admin list fetch failed, using static set: {}", err);
                None
            }
        }
    }
}
