//! Vigil Configuration
//!
//! TOML configuration loading and validation

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub moderation: ModerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CoreConfig {
    pub data_dir: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelegramConfig {
    pub poll_timeout_secs: Option<u64>,
    pub client_recreate_interval_secs: Option<u64>,
    #[serde(default)]
    pub accounts: Vec<TelegramAccount>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelegramAccount {
    pub bot_token: String,
    #[serde(default)]
    pub bot_name: Option<String>,
    #[serde(default)]
    pub allowed_chats: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    /// Fallback administrator set, used when the live admin fetch fails or
    /// `use_real_admins` is off.
    #[serde(default)]
    pub static_admins: Vec<i64>,
    #[serde(default = "default_warn_threshold")]
    pub warn_threshold: u32,
    #[serde(default = "default_welcome_message")]
    pub welcome_message: String,
    #[serde(default)]
    pub flood: FloodConfig,
    #[serde(default)]
    pub flags: FlagsConfig,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            static_admins: Vec::new(),
            warn_threshold: default_warn_threshold(),
            welcome_message: default_welcome_message(),
            flood: FloodConfig::default(),
            flags: FlagsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloodConfig {
    #[serde(default = "default_flood_max_messages")]
    pub max_messages: usize,
    #[serde(default = "default_flood_window_secs")]
    pub window_secs: f64,
    #[serde(default = "default_flood_auto_mute_secs")]
    pub auto_mute_secs: u32,
}

impl Default for FloodConfig {
    fn default() -> Self {
        Self {
            max_messages: default_flood_max_messages(),
            window_secs: default_flood_window_secs(),
            auto_mute_secs: default_flood_auto_mute_secs(),
        }
    }
}

/// Startup values for the runtime policy flags. Admins flip these at runtime
/// with the toggle commands; the config only seeds the initial state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagsConfig {
    #[serde(default = "default_true")]
    pub use_real_admins: bool,
    #[serde(default = "default_true")]
    pub block_links: bool,
    #[serde(default)]
    pub block_media: bool,
    #[serde(default = "default_true")]
    pub flood_protection: bool,
    #[serde(default = "default_true")]
    pub anti_bot: bool,
    #[serde(default = "default_true")]
    pub clean_join: bool,
    #[serde(default = "default_true")]
    pub clean_leave: bool,
}

impl Default for FlagsConfig {
    fn default() -> Self {
        Self {
            use_real_admins: true,
            block_links: true,
            block_media: false,
            flood_protection: true,
            anti_bot: true,
            clean_join: true,
            clean_leave: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_warn_threshold() -> u32 {
    3
}

fn default_welcome_message() -> String {
    "Welcome, {name}!".to_string()
}

fn default_flood_max_messages() -> usize {
    5
}

fn default_flood_window_secs() -> f64 {
    4.0
}

fn default_flood_auto_mute_secs() -> u32 {
    30
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_path() -> Option<std::path::PathBuf> {
        dirs::config_dir().map(|dir| dir.join("vigil").join("config.toml"))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.telegram.accounts.is_empty() {
            anyhow::bail!("At least one [[telegram.accounts]] entry is required");
        }

        let mut seen_tokens = HashSet::new();
        for (idx, account) in self.telegram.accounts.iter().enumerate() {
            let token = account.bot_token.trim();
            if token.is_empty() {
                anyhow::bail!("telegram.accounts[{}].bot_token cannot be empty", idx);
            }
            if !seen_tokens.insert(token.to_string()) {
                anyhow::bail!("Duplicate bot_token in telegram.accounts[{}]", idx);
            }
        }

        if self.moderation.warn_threshold == 0 {
            anyhow::bail!("moderation.warn_threshold must be at least 1");
        }
        if self.moderation.flood.max_messages == 0 {
            anyhow::bail!("moderation.flood.max_messages must be at least 1");
        }
        if !(self.moderation.flood.window_secs > 0.0) {
            anyhow::bail!("moderation.flood.window_secs must be positive");
        }
        if self.moderation.flood.auto_mute_secs == 0 {
            anyhow::bail!("moderation.flood.auto_mute_secs must be at least 1");
        }

        Ok(())
    }

    /// Annotated starter config, written by `vigil config example`.
    pub fn example_toml() -> &'static str {
        r#"[core]
# data_dir = "/home/user/.local/share/vigil"
# log_level = "info"

[telegram]
# poll_timeout_secs = 60
# client_recreate_interval_secs = 60

[[telegram.accounts]]
bot_token = "123456789:REPLACE_WITH_BOT_TOKEN"
# allowed_chats = [-1001234567890]

[moderation]
static_admins = [123456789]
warn_threshold = 3
welcome_message = "Welcome, {name}!"

[moderation.flood]
max_messages = 5
window_secs = 4.0
auto_mute_secs = 30

[moderation.flags]
use_real_admins = true
block_links = true
block_media = false
flood_protection = true
anti_bot = true
clean_join = true
clean_leave = true
"#
    }
}

#[cfg(test)]
mod tests {
    use super::Config;

    fn parse_config(input: &str) -> Config {
        let cfg: Config = toml::from_str(input).expect("valid TOML");
        cfg
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = parse_config(
            r#"
[[telegram.accounts]]
bot_token = "123:abc"
"#,
        );
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.moderation.warn_threshold, 3);
        assert_eq!(cfg.moderation.flood.max_messages, 5);
        assert_eq!(cfg.moderation.flood.window_secs, 4.0);
        assert_eq!(cfg.moderation.flood.auto_mute_secs, 30);
        assert!(cfg.moderation.flags.block_links);
        assert!(!cfg.moderation.flags.block_media);
        assert!(cfg.moderation.flags.use_real_admins);
    }

    #[test]
    fn validate_rejects_missing_accounts() {
        let cfg = parse_config(
            r#"
[moderation]
static_admins = [1]
"#,
        );
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_bot_token() {
        let cfg = parse_config(
            r#"
[[telegram.accounts]]
bot_token = "  "
"#,
        );
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_duplicate_bot_tokens() {
        let cfg = parse_config(
            r#"
[[telegram.accounts]]
bot_token = "123:abc"

[[telegram.accounts]]
bot_token = "123:abc"
"#,
        );
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_warn_threshold() {
        let cfg = parse_config(
            r#"
[[telegram.accounts]]
bot_token = "123:abc"

[moderation]
warn_threshold = 0
"#,
        );
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_degenerate_flood_window() {
        let cfg = parse_config(
            r#"
[[telegram.accounts]]
bot_token = "123:abc"

[moderation.flood]
window_secs = 0.0
"#,
        );
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn example_config_parses_and_validates() {
        let cfg = parse_config(Config::example_toml());
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.moderation.static_admins, vec![123456789]);
    }

    #[test]
    fn flag_overrides_survive_parsing() {
        let cfg = parse_config(
            r#"
[[telegram.accounts]]
bot_token = "123:abc"

[moderation.flags]
block_links = false
block_media = true
"#,
        );
        assert!(!cfg.moderation.flags.block_links);
        assert!(cfg.moderation.flags.block_media);
        assert!(cfg.moderation.flags.flood_protection);
    }
}
