//! Prompt collaborator contract.
//!
//! The decision controller never renders UI. When no remembered decision
//! applies it calls a [`TrustPrompt`], blocking until a human (or a
//! headless stand-in) answers. Implementations live outside this crate;
//! [`HeadlessTrustPrompt`] is the one answer this crate does provide,
//! because refusing to hang without a display is part of the engine's
//! contract rather than a UI concern.

use tracing::debug;

use super::action::ExecuteAction;
use super::descriptor::{AppDescriptor, CertSummary};

/// What the user answered at a trust prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptResult {
    /// The chosen action. [`ExecuteAction::Cancel`] means the dialog was
    /// dismissed: the launch is refused and nothing is recorded.
    pub action: ExecuteAction,
    /// Whether the decision should apply to the whole codebase rather
    /// than to this exact application.
    pub remember_for_codebase: bool,
}

impl PromptResult {
    /// A dismissed prompt.
    #[must_use]
    pub const fn canceled() -> Self {
        Self {
            action: ExecuteAction::Cancel,
            remember_for_codebase: false,
        }
    }
}

/// Blocking trust-confirmation prompt.
///
/// Called while the user-tier store lock is held; see the storage module
/// for why that coarseness is deliberate. Implementations must eventually
/// return — a headless implementation returns immediately.
pub trait TrustPrompt: Send + Sync {
    /// Asks whether an unsigned application may run.
    fn prompt_unsigned(&self, app: &AppDescriptor) -> PromptResult;

    /// Asks whether a partially-signed application may run, with the
    /// sandbox outcome available.
    fn prompt_partially_signed(&self, app: &AppDescriptor, cert: &CertSummary) -> PromptResult;
}

/// Prompt for environments with no interaction capability.
///
/// Always answers [`ExecuteAction::Cancel`], which the controller maps to
/// a refusal with nothing recorded — the fail-closed reading of "cannot
/// ask".
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessTrustPrompt;

impl TrustPrompt for HeadlessTrustPrompt {
    fn prompt_unsigned(&self, app: &AppDescriptor) -> PromptResult {
        debug!(codebase = %app.code_base, "headless: cannot confirm unsigned application");
        PromptResult::canceled()
    }

    fn prompt_partially_signed(&self, app: &AppDescriptor, _cert: &CertSummary) -> PromptResult {
        debug!(codebase = %app.code_base, "headless: cannot confirm partially signed application");
        PromptResult::canceled()
    }
}
