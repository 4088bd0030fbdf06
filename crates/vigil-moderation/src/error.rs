use thiserror::Error;

/// Caller errors raised by the policy switchboard. Everything else in the
/// engine either succeeds or returns a domain verdict; only malformed flag
/// names and toggle arguments are rejected outright.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModerationError {
    #[error("unknown policy flag '{0}'")]
    UnknownFlag(String),

    #[error("invalid toggle value '{0}', use on/off")]
    InvalidToggle(String),
}
