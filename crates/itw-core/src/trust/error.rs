//! Failure taxonomy for trust decisions and their storage.

use thiserror::Error;

use crate::config::SecurityLevel;

/// A launch was refused.
///
/// Fatal to the launch of that one application only; the reason names who
/// refused it (security policy or the user, including a remembered user
/// decision). Store trouble never surfaces here: persistence failures are
/// logged and the in-memory decision stands.
#[derive(Debug, Error)]
pub enum LaunchDenied {
    /// The security level (or a trust-none override) forbids running the
    /// application, no prompt was shown.
    #[error("unsigned application at {codebase} denied by security policy (level {level})")]
    PolicyDenied {
        /// Codebase of the refused application.
        codebase: String,
        /// The effective security level at the time of refusal.
        level: SecurityLevel,
    },

    /// The user declined, either at the prompt or through a remembered
    /// NEVER decision.
    #[error("unsigned application at {codebase} denied by user")]
    UserDenied {
        /// Codebase of the refused application.
        codebase: String,
    },

    /// The user declined a partially-signed application.
    #[error("partially signed application at {codebase} denied by user")]
    PartiallySignedUserDenied {
        /// Codebase of the refused application.
        codebase: String,
    },
}

/// Failures of the persistent action storage.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("action storage I/O failure on {path}: {reason}")]
    Io {
        /// The backing file.
        path: String,
        /// The underlying I/O error, rendered.
        reason: String,
    },

    /// The atomic rename into the backing file failed.
    #[error("failed to persist action storage to {path}: {reason}")]
    Persist {
        /// The backing file.
        path: String,
        /// The underlying error, rendered.
        reason: String,
    },

    /// A writer panicked while holding the store lock. Callers treat
    /// this like a canceled interaction, not a fatal error.
    #[error("action storage lock poisoned")]
    LockPoisoned,

    /// Mutation was attempted on a read-only tier.
    #[error("action storage {path} is read-only")]
    ReadOnly {
        /// The backing file.
        path: String,
    },
}
