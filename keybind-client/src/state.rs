//! The license state the agent publishes to the application.

use crate::verifier::VerifyReply;
use keybind_types::Timestamp;
use std::fmt;

/// Why the application is locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockoutReason {
    /// The authority does not know the key.
    Invalid,
    /// The key is bound to another installation.
    InvalidDevice,
    /// The authority reported the key as expired.
    Expired,
    /// No key has been entered yet.
    NoKey,
}

impl fmt::Display for LockoutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Invalid => "Invalid license key.",
            Self::InvalidDevice => "This license key is already in use on another device.",
            Self::Expired => "Your license has expired.",
            Self::NoKey => "Please enter your license key.",
        })
    }
}

/// Current license state as seen by this installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LicenseState {
    /// A key is held but no verdict has arrived yet.
    #[default]
    Unverified,
    /// Last verdict was valid and the local countdown has not run out.
    Active { expires_at: Timestamp },
    /// Countdown reached zero before the next poll confirmed anything.
    LocallyExpired { expires_at: Timestamp },
    LockedOut(LockoutReason),
}

impl LicenseState {
    /// Whether gated features may run.
    #[must_use]
    pub fn allows_protected_actions(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    /// Whether the user should be asked for a (new) key.
    #[must_use]
    pub fn needs_key_entry(&self) -> bool {
        matches!(self, Self::LocallyExpired { .. } | Self::LockedOut(_))
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<Timestamp> {
        match self {
            Self::Active { expires_at } | Self::LocallyExpired { expires_at } => Some(*expires_at),
            _ => None,
        }
    }

    /// State implied by a domain reply, or `None` for transient ones.
    #[must_use]
    pub fn from_reply(reply: &VerifyReply) -> Option<Self> {
        match reply {
            VerifyReply::Valid { expires_at } => Some(Self::Active {
                expires_at: *expires_at,
            }),
            VerifyReply::Invalid => Some(Self::LockedOut(LockoutReason::Invalid)),
            VerifyReply::InvalidDevice => Some(Self::LockedOut(LockoutReason::InvalidDevice)),
            VerifyReply::Expired => Some(Self::LockedOut(LockoutReason::Expired)),
            VerifyReply::MalformedRequest(_) | VerifyReply::ServerError => None,
        }
    }
}
