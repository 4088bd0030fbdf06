//! Runtime policy flags
//!
//! A fixed-shape set of booleans addressed through a closed enum. Unknown
//! flag names are rejected at the boundary instead of silently creating new
//! state.

use crate::error::ModerationError;
use std::fmt;
use std::str::FromStr;
use vigil_config::FlagsConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyFlag {
    BlockMedia,
    BlockLinks,
    FloodProtection,
    UseRealAdmins,
    AntiBot,
    CleanJoin,
    CleanLeave,
}

impl PolicyFlag {
    pub const ALL: [PolicyFlag; 7] = [
        PolicyFlag::BlockMedia,
        PolicyFlag::BlockLinks,
        PolicyFlag::FloodProtection,
        PolicyFlag::UseRealAdmins,
        PolicyFlag::AntiBot,
        PolicyFlag::CleanJoin,
        PolicyFlag::CleanLeave,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PolicyFlag::BlockMedia => "block_media",
            PolicyFlag::BlockLinks => "block_links",
            PolicyFlag::FloodProtection => "flood_protection",
            PolicyFlag::UseRealAdmins => "use_real_admins",
            PolicyFlag::AntiBot => "anti_bot",
            PolicyFlag::CleanJoin => "clean_join",
            PolicyFlag::CleanLeave => "clean_leave",
        }
    }
}

impl fmt::Display for PolicyFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PolicyFlag {
    type Err = ModerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "block_media" => Ok(PolicyFlag::BlockMedia),
            "block_links" => Ok(PolicyFlag::BlockLinks),
            "flood_protection" => Ok(PolicyFlag::FloodProtection),
            "use_real_admins" => Ok(PolicyFlag::UseRealAdmins),
            "anti_bot" => Ok(PolicyFlag::AntiBot),
            "clean_join" => Ok(PolicyFlag::CleanJoin),
            "clean_leave" => Ok(PolicyFlag::CleanLeave),
            other => Err(ModerationError::UnknownFlag(other.to_string())),
        }
    }
}

/// Mutable at runtime via admin toggle commands only; the config seeds the
/// initial values.
#[derive(Debug, Clone, Copy)]
pub struct PolicyFlags {
    pub block_media: bool,
    pub block_links: bool,
    pub flood_protection: bool,
    pub use_real_admins: bool,
    pub anti_bot: bool,
    pub clean_join: bool,
    pub clean_leave: bool,
}

impl PolicyFlags {
    pub fn from_config(config: &FlagsConfig) -> Self {
        Self {
            block_media: config.block_media,
            block_links: config.block_links,
            flood_protection: config.flood_protection,
            use_real_admins: config.use_real_admins,
            anti_bot: config.anti_bot,
            clean_join: config.clean_join,
            clean_leave: config.clean_leave,
        }
    }

    pub fn get(&self, flag: PolicyFlag) -> bool {
        match flag {
            PolicyFlag::BlockMedia => self.block_media,
            PolicyFlag::BlockLinks => self.block_links,
            PolicyFlag::FloodProtection => self.flood_protection,
            PolicyFlag::UseRealAdmins => self.use_real_admins,
            PolicyFlag::AntiBot => self.anti_bot,
            PolicyFlag::CleanJoin => self.clean_join,
            PolicyFlag::CleanLeave => self.clean_leave,
        }
    }

    pub fn set(&mut self, flag: PolicyFlag, value: bool) {
        match flag {
            PolicyFlag::BlockMedia => self.block_media = value,
            PolicyFlag::BlockLinks => self.block_links = value,
            PolicyFlag::FloodProtection => self.flood_protection = value,
            PolicyFlag::UseRealAdmins => self.use_real_admins = value,
            PolicyFlag::AntiBot => self.anti_bot = value,
            PolicyFlag::CleanJoin => self.clean_join = value,
            PolicyFlag::CleanLeave => self.clean_leave = value,
        }
    }

    /// Parse a flag by name and set it, rejecting unknown names before any
    /// mutation happens.
    pub fn set_by_name(&mut self, name: &str, value: bool) -> Result<PolicyFlag, ModerationError> {
        let flag = name.parse::<PolicyFlag>()?;
        self.set(flag, value);
        Ok(flag)
    }
}

impl Default for PolicyFlags {
    fn default() -> Self {
        Self::from_config(&FlagsConfig::default())
    }
}

/// Toggle-command argument parsing: exactly `on` or `off`, case-insensitive.
pub fn parse_toggle(value: &str) -> Result<bool, ModerationError> {
    match value.to_ascii_lowercase().as_str() {
        "on" => Ok(true),
        "off" => Ok(false),
        other => Err(ModerationError::InvalidToggle(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_flag_round_trips_through_its_name() {
        for flag in PolicyFlag::ALL {
            assert_eq!(flag.name().parse::<PolicyFlag>(), Ok(flag));
        }
    }

    #[test]
    fn unknown_flag_name_is_rejected_without_mutation() {
        let mut flags = PolicyFlags::default();
        let before = flags;
        let err = flags.set_by_name("block_everything", true).unwrap_err();
        assert_eq!(
            err,
            ModerationError::UnknownFlag("block_everything".to_string())
        );
        for flag in PolicyFlag::ALL {
            assert_eq!(flags.get(flag), before.get(flag));
        }
    }

    #[test]
    fn set_and_get_agree() {
        let mut flags = PolicyFlags::default();
        flags.set(PolicyFlag::BlockMedia, true);
        assert!(flags.get(PolicyFlag::BlockMedia));
        flags.set(PolicyFlag::BlockMedia, false);
        assert!(!flags.get(PolicyFlag::BlockMedia));
    }

    #[test]
    fn defaults_match_config_defaults() {
        let flags = PolicyFlags::default();
        assert!(flags.block_links);
        assert!(!flags.block_media);
        assert!(flags.flood_protection);
        assert!(flags.use_real_admins);
        assert!(flags.anti_bot);
        assert!(flags.clean_join);
        assert!(flags.clean_leave);
    }

    #[test]
    fn toggle_parsing_accepts_on_off_only() {
        assert_eq!(parse_toggle("on"), Ok(true));
        assert_eq!(parse_toggle("OFF"), Ok(false));
        assert_eq!(
            parse_toggle("maybe"),
            Err(ModerationError::InvalidToggle("maybe".to_string()))
        );
    }
}
