//! The trust-decision controller.
//!
//! [`TrustConfirmation`] decides, for one launching application and one
//! trust-sensitive action, whether the launch proceeds. The order of
//! consultation is fixed and security-relevant:
//!
//! 1. security level / operator overrides that forbid outright — checked
//!    before anything else so they fail closed;
//! 2. security level / operator overrides that allow without asking;
//! 3. remembered sticky decisions, user tier before global tier;
//! 4. the blocking prompt collaborator, whose answer is then persisted
//!    to the user tier according to the remember flags.
//!
//! Steps 3–4 run under the user-tier store guard, so two threads racing
//! on the same application produce one prompt and one persisted entry.

use chrono::Utc;
use tracing::{debug, warn};

use crate::config::DeploymentConfig;
use crate::urls;

use super::action::{ActionId, ActionSet, ExecuteAction};
use super::descriptor::{AppDescriptor, CertSummary};
use super::entry::AppletActionEntry;
use super::error::{LaunchDenied, StoreError};
use super::pattern::UrlRegex;
use super::prompt::TrustPrompt;
use super::store::{ActionStore, ActionStoreGuard};

/// Collaborator that can demote the launching application to sandbox
/// privileges, implemented by the launch pipeline.
pub trait SecurityDelegate {
    /// Restricts the application to sandbox privileges.
    fn set_run_in_sandbox(&self);
}

/// The normalized form of one application's matching triple, computed
/// once per decision so both lookups and the persisted patterns see the
/// same strings.
struct Query {
    document_base: String,
    code_base: String,
    archives: Vec<String>,
}

impl Query {
    fn of(app: &AppDescriptor) -> Self {
        Self {
            document_base: app.normalized_document_base(),
            code_base: app.normalized_code_base(),
            archives: app.relative_archives(),
        }
    }
}

/// Trust-decision engine over a user and a global policy tier.
///
/// Constructed once at process start with explicit store instances; tests
/// build isolated engines the same way.
pub struct TrustConfirmation {
    config: DeploymentConfig,
    user_store: ActionStore,
    global_store: ActionStore,
    prompt: Box<dyn TrustPrompt>,
}

impl std::fmt::Debug for TrustConfirmation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustConfirmation")
            .field("config", &self.config)
            .field("user_store", &self.user_store)
            .field("global_store", &self.global_store)
            .finish_non_exhaustive()
    }
}

impl TrustConfirmation {
    /// Creates the engine.
    ///
    /// `user_store` must be writable; `global_store` is typically opened
    /// read-only (the controller never writes the global tier).
    #[must_use]
    pub fn new(
        config: DeploymentConfig,
        user_store: ActionStore,
        global_store: ActionStore,
        prompt: Box<dyn TrustPrompt>,
    ) -> Self {
        Self {
            config,
            user_store,
            global_store,
            prompt,
        }
    }

    /// Confirms an unsigned application, prompting if required.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchDenied`] when the application must not run: the
    /// security level forbids it, a remembered NEVER applies, or the
    /// user declined.
    pub fn check_unsigned_with_user_if_required(
        &self,
        app: &AppDescriptor,
    ) -> Result<(), LaunchDenied> {
        let codebase = app.code_base.to_string();
        let level = self.config.security.level;

        if level.forbids_unsigned() || self.config.security.trust_none {
            warn!(
                %codebase,
                %level,
                "not running unsigned application: disallowed by security policy"
            );
            return Err(LaunchDenied::PolicyDenied { codebase, level });
        }

        if !level.requires_confirmation() || self.config.security.trust_all {
            debug!(
                %codebase,
                "running unsigned application without confirmation per security policy"
            );
            return Ok(());
        }

        let mut user_guard = match self.user_store.lock() {
            Ok(guard) => guard,
            Err(err) => {
                warn!(%codebase, %err, "user store unavailable, treating as canceled prompt");
                return Err(LaunchDenied::UserDenied { codebase });
            }
        };

        let query = Query::of(app);
        let stored = self.stored_action_locked(&user_guard, &query, ActionId::UnsignedApplet);
        debug!(%codebase, stored = ?stored.map(ExecuteAction::as_str), "stored action for unsigned application");

        let allowed = match stored {
            Some(ExecuteAction::Always) => true,
            Some(ExecuteAction::Never) => false,
            _ => {
                // No sticky decision on file: ask.
                let response = self.prompt.prompt_unsigned(app);
                let allowed = matches!(
                    response.action,
                    ExecuteAction::Yes | ExecuteAction::Always
                );
                self.record_response(
                    &mut user_guard,
                    app,
                    &query,
                    response.action,
                    response.remember_for_codebase,
                    ActionId::UnsignedApplet,
                );
                debug!(%codebase, action = %response.action, "decided action for unsigned application");
                allowed
            }
        };

        if allowed {
            Ok(())
        } else {
            Err(LaunchDenied::UserDenied { codebase })
        }
    }

    /// Confirms a partially-signed application, prompting if required.
    ///
    /// Unlike the unsigned path this one has a third outcome: the
    /// application may run with reduced privileges, in which case
    /// `delegate` is told to sandbox it before `Ok` is returned.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchDenied`] when the application must not run.
    pub fn check_partially_signed_with_user_if_required(
        &self,
        app: &AppDescriptor,
        cert: &CertSummary,
        delegate: &dyn SecurityDelegate,
    ) -> Result<(), LaunchDenied> {
        let codebase = app.code_base.to_string();

        if self.config.security.trust_none {
            debug!(%codebase, "trust-none: running partially signed application in sandbox");
            delegate.set_run_in_sandbox();
            return Ok(());
        }
        if self.config.security.trust_all {
            debug!(%codebase, "trust-all: running partially signed application");
            return Ok(());
        }
        if !self.config.security.level.requires_confirmation() {
            debug!(
                %codebase,
                "running partially signed application without confirmation per security policy"
            );
            return Ok(());
        }

        let mut user_guard = match self.user_store.lock() {
            Ok(guard) => guard,
            Err(err) => {
                warn!(%codebase, %err, "user store unavailable, treating as canceled prompt");
                return Err(LaunchDenied::PartiallySignedUserDenied { codebase });
            }
        };

        let query = Query::of(app);
        let stored = self.stored_action_locked(&user_guard, &query, ActionId::UnsignedApplet);
        debug!(%codebase, stored = ?stored.map(ExecuteAction::as_str), "stored action for partially signed application");

        let allowed = match stored {
            Some(ExecuteAction::Always) => true,
            Some(ExecuteAction::Never) => false,
            _ => {
                let response = self.prompt.prompt_partially_signed(app, cert);
                if response.action == ExecuteAction::Sandbox {
                    delegate.set_run_in_sandbox();
                }
                let allowed = matches!(
                    response.action,
                    ExecuteAction::Yes | ExecuteAction::Always | ExecuteAction::Sandbox
                );
                self.record_response(
                    &mut user_guard,
                    app,
                    &query,
                    response.action,
                    response.remember_for_codebase,
                    ActionId::UnsignedApplet,
                );
                debug!(%codebase, action = %response.action, "decided action for partially signed application");
                allowed
            }
        };

        if allowed {
            Ok(())
        } else {
            Err(LaunchDenied::PartiallySignedUserDenied { codebase })
        }
    }

    /// The remembered entry for `app` and `id`, consulting the user tier
    /// first: a sticky user decision wins, then a sticky global one,
    /// then whatever non-sticky record the user tier holds.
    ///
    /// Returns `None` when nothing is on file or the stores are
    /// unavailable.
    #[must_use]
    pub fn stored_entry(&self, app: &AppDescriptor, id: ActionId) -> Option<AppletActionEntry> {
        let user_guard = match self.user_store.lock() {
            Ok(guard) => guard,
            Err(err) => {
                warn!(%err, "user store unavailable for stored-entry lookup");
                return None;
            }
        };
        let query = Query::of(app);
        self.stored_entry_locked(&user_guard, &query, id)
    }

    /// The remembered decision for `app` and `id`, consulting the user
    /// tier first.
    ///
    /// Returns `None` when nothing is on file or the stores are
    /// unavailable. A non-sticky remembered action is returned as-is;
    /// callers decide whether it short-circuits (it never does for the
    /// launch checks).
    #[must_use]
    pub fn stored_action(&self, app: &AppDescriptor, id: ActionId) -> Option<ExecuteAction> {
        self.stored_entry(app, id)
            .and_then(|entry| entry.actions.action(id))
    }

    /// Persists a prompt answer for `app` to the user tier.
    ///
    /// With `remember_for_codebase`, the entry's documentbase pattern is
    /// the parent directory plus wildcard and any archive set matches;
    /// otherwise the patterns are exact and the current archive list is
    /// recorded. An existing matching entry is updated in place.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the user tier cannot be locked or the
    /// write-through fails.
    pub fn update_applet_action(
        &self,
        app: &AppDescriptor,
        action: ExecuteAction,
        remember_for_codebase: bool,
        id: ActionId,
    ) -> Result<(), StoreError> {
        let mut guard = self.user_store.lock()?;
        let query = Query::of(app);
        Self::update_in_guard(&mut guard, app, &query, action, remember_for_codebase, id)
    }

    /// Sticky user entry, else sticky global entry, else whatever the
    /// user tier holds (possibly nothing). The global tier being
    /// unavailable only loses its tier, never the decision.
    fn stored_entry_locked(
        &self,
        user_guard: &ActionStoreGuard<'_>,
        query: &Query,
        id: ActionId,
    ) -> Option<AppletActionEntry> {
        let user_entry = user_guard
            .matching_entry(&query.document_base, &query.code_base, &query.archives, Some(id))
            .cloned();
        let user_action = user_entry.as_ref().and_then(|entry| entry.actions.action(id));
        if user_action.is_some_and(ExecuteAction::is_sticky) {
            return user_entry;
        }

        let global_entry = match self.global_store.lock() {
            Ok(global_guard) => global_guard
                .matching_entry(&query.document_base, &query.code_base, &query.archives, Some(id))
                .cloned(),
            Err(err) => {
                warn!(%err, "global store unavailable, skipping tier");
                None
            }
        };
        let global_action = global_entry
            .as_ref()
            .and_then(|entry| entry.actions.action(id));
        if global_action.is_some_and(ExecuteAction::is_sticky) {
            return global_entry;
        }

        user_entry
    }

    fn stored_action_locked(
        &self,
        user_guard: &ActionStoreGuard<'_>,
        query: &Query,
        id: ActionId,
    ) -> Option<ExecuteAction> {
        self.stored_entry_locked(user_guard, query, id)
            .and_then(|entry| entry.actions.action(id))
    }

    /// Persists a non-canceled prompt answer; a persistence failure is
    /// logged and swallowed, the decision for the current launch stands.
    fn record_response(
        &self,
        guard: &mut ActionStoreGuard<'_>,
        app: &AppDescriptor,
        query: &Query,
        action: ExecuteAction,
        remember_for_codebase: bool,
        id: ActionId,
    ) {
        if action == ExecuteAction::Cancel {
            return;
        }
        if let Err(err) =
            Self::update_in_guard(guard, app, query, action, remember_for_codebase, id)
        {
            warn!(codebase = %app.code_base, %err, "failed to persist trust decision");
        }
    }

    fn update_in_guard(
        guard: &mut ActionStoreGuard<'_>,
        app: &AppDescriptor,
        query: &Query,
        action: ExecuteAction,
        remember_for_codebase: bool,
        id: ActionId,
    ) -> Result<(), StoreError> {
        let code_base_pattern = UrlRegex::quote(&query.code_base);
        let (document_base_pattern, archives) = if remember_for_codebase {
            // Match anything under the documentbase's parent directory,
            // with any archive set.
            (
                UrlRegex::quote_and_star(&urls::strip_file(&app.document_base)),
                None,
            )
        } else {
            // Match only this exact application.
            (
                UrlRegex::quote(&query.document_base),
                Some(query.archives.clone()),
            )
        };

        let updated = guard.update_matching(
            &query.document_base,
            &query.code_base,
            &query.archives,
            Some(id),
            |entry| {
                entry.actions.set_action(id, action);
                entry.timestamp = Utc::now();
                entry.document_base = document_base_pattern.clone();
                entry.code_base = code_base_pattern.clone();
                entry.archives = archives.clone();
            },
        )?;
        if !updated {
            guard.add(AppletActionEntry::new(
                ActionSet::from_action(id, action),
                Utc::now(),
                document_base_pattern,
                code_base_pattern,
                archives,
            ))?;
        }
        Ok(())
    }
}
