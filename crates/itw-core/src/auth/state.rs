//! Authenticator state machine.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{debug, warn};
use zeroize::Zeroizing;

/// A username/password pair owned by the cache.
///
/// The password is wiped when the pair is dropped, so replacing a cached
/// credential destroys the superseded secret instead of leaving it for
/// the allocator.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: Zeroizing<String>,
}

impl Credentials {
    /// Creates a credential pair.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Zeroizing::new(password.into()),
        }
    }

    /// The username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl PartialEq for Credentials {
    fn eq(&self, other: &Self) -> bool {
        self.username == other.username && *self.password == *other.password
    }
}

impl Eq for Credentials {}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Whether a prompt is the first for its host or a retry after a
/// rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAttempt {
    /// No credentials were cached for the host.
    FirstTime,
    /// Cached credentials were rejected by the server.
    Repeated,
}

/// One authentication probe, as seen by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthRequest<'a> {
    /// Host requesting authentication; the cache key.
    pub host: &'a str,
    /// Port of the requesting host.
    pub port: u16,
    /// Authentication scheme announced by the server.
    pub scheme: &'a str,
    /// Realm (server-provided prompt string).
    pub realm: &'a str,
    /// Full URL of the resource being fetched; distinguishes retries for
    /// one resource from fetches of further resources on the same host.
    pub url: &'a str,
    /// Whether a proxy, rather than the origin server, is asking.
    pub is_proxy: bool,
}

/// Blocking credential prompt collaborator.
///
/// Returning `None` means the user dismissed the dialog; the
/// authenticator latches that and stops asking. Headless environments
/// must return `None` immediately.
pub trait AuthPrompt: Send + Sync {
    /// Asks the user for credentials.
    fn prompt_credentials(
        &self,
        request: &AuthRequest<'_>,
        previous_username: Option<&str>,
        attempt: AuthAttempt,
    ) -> Option<Credentials>;
}

/// Request-scoped attempt tracking, owned by the calling worker thread.
///
/// Carries what this thread last asked for and what it last tried, so
/// the authenticator can tell "new resource, same host" apart from "same
/// resource again, the server rejected what I gave it".
#[derive(Debug, Clone, Default)]
pub struct ThreadAuthContext {
    last_url: Option<String>,
    last_credentials: Option<Credentials>,
}

impl ThreadAuthContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Default)]
struct AuthState {
    host_credentials: HashMap<String, Credentials>,
    canceled_by_user: bool,
    attempts_remaining: u32,
}

impl AuthState {
    /// Caches credentials for a host. Replacing an existing pair drops
    /// it, which wipes the superseded password.
    fn put(&mut self, host: &str, credentials: Credentials) {
        self.host_credentials.insert(host.to_owned(), credentials);
    }
}

/// Per-host credential cache with bounded retry-before-reprompt.
pub struct Authenticator {
    prompt: Box<dyn AuthPrompt>,
    attempts_before_reprompt: u32,
    state: Mutex<AuthState>,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("attempts_before_reprompt", &self.attempts_before_reprompt)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    /// Creates an authenticator.
    ///
    /// `attempts_before_reprompt` comes from deployment configuration
    /// (`auth.attempts_before_reprompt`): how many times rejected
    /// credentials are re-offered before the user is asked again.
    #[must_use]
    pub fn new(prompt: Box<dyn AuthPrompt>, attempts_before_reprompt: u32) -> Self {
        Self {
            prompt,
            attempts_before_reprompt,
            state: Mutex::new(AuthState {
                attempts_remaining: attempts_before_reprompt,
                ..AuthState::default()
            }),
        }
    }

    /// Resolves credentials for one authentication probe.
    ///
    /// Returns `None` when the user has canceled (now or earlier) or the
    /// authenticator state is unusable; callers treat `None` as "no
    /// credentials available", never as an error.
    ///
    /// The entire sequence runs under the authenticator's mutex so
    /// concurrent fetches from the same host produce one prompt.
    pub fn password_authentication(
        &self,
        ctx: &mut ThreadAuthContext,
        request: &AuthRequest<'_>,
    ) -> Option<Credentials> {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(_) => {
                warn!(host = request.host, "authenticator state poisoned, refusing to prompt");
                return None;
            }
        };
        debug!(host = request.host, is_proxy = request.is_proxy, "password authentication requested");

        if state.canceled_by_user {
            debug!(host = request.host, "authentication canceled by user earlier, not prompting");
            return None;
        }

        let response = match state.host_credentials.get(request.host).cloned() {
            None => {
                debug!(host = request.host, "no cached credentials, showing first-time prompt");
                let response =
                    self.prompt
                        .prompt_credentials(request, None, AuthAttempt::FirstTime);
                match &response {
                    None => state.canceled_by_user = true,
                    Some(credentials) => {
                        state.put(request.host, credentials.clone());
                        ctx.last_credentials = Some(credentials.clone());
                    }
                }
                response
            }
            Some(host_credentials) => {
                if ctx.last_url.as_deref() == Some(request.url) {
                    if ctx.last_credentials.as_ref() == Some(&host_credentials) {
                        // This thread already tried exactly these
                        // credentials against exactly this URL and is
                        // back: the server rejected them.
                        if state.attempts_remaining > 0 {
                            state.attempts_remaining -= 1;
                            debug!(
                                host = request.host,
                                remaining = state.attempts_remaining,
                                "re-offering rejected credentials before re-prompting"
                            );
                            Some(host_credentials)
                        } else {
                            debug!(host = request.host, "credentials rejected, showing repeated prompt");
                            let response = self.prompt.prompt_credentials(
                                request,
                                Some(host_credentials.username()),
                                AuthAttempt::Repeated,
                            );
                            match &response {
                                None => state.canceled_by_user = true,
                                Some(credentials) => {
                                    state.put(request.host, credentials.clone());
                                    ctx.last_credentials = Some(credentials.clone());
                                }
                            }
                            state.attempts_remaining = self.attempts_before_reprompt;
                            response
                        }
                    } else {
                        // Same URL, but another thread refreshed the
                        // cache since we last tried: offer the newer
                        // pair before bothering the user.
                        ctx.last_credentials = Some(host_credentials.clone());
                        Some(host_credentials)
                    }
                } else {
                    // Different resource on a known host: reuse silently.
                    Some(host_credentials)
                }
            }
        };

        ctx.last_url = Some(request.url.to_owned());
        response
    }
}
