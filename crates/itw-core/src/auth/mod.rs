//! HTTP/proxy authentication with a per-host credential cache.
//!
//! A single HTTP transaction may probe credentials several times, and
//! several resources usually load from the same host at once. The
//! [`Authenticator`] keeps one credential pair per host so the user is
//! prompted once, re-offers rejected credentials a bounded number of
//! times before re-prompting, and latches a cancel so a dismissed dialog
//! is not shown again for the authenticator's lifetime.
//!
//! The whole decide-and-cache sequence for one call runs under one
//! mutex; a thread blocked here while another thread's prompt is open is
//! expected and correct — it inherits the freshly cached answer instead
//! of racing to open a second dialog.
//!
//! In-flight attempt tracking is request-scoped, not global, so it lives
//! in an explicit [`ThreadAuthContext`] the caller owns per worker thread
//! rather than in thread-local storage; that keeps the retry logic
//! testable without real threads.

mod state;

#[cfg(test)]
mod tests;

pub use state::{
    AuthAttempt, AuthPrompt, AuthRequest, Authenticator, Credentials, ThreadAuthContext,
};
