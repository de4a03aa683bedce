//! Authenticator state-machine tests: first-time prompting, silent
//! reuse, bounded retry-before-reprompt, and the cancel latch.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::state::{
    AuthAttempt, AuthPrompt, AuthRequest, Authenticator, Credentials, ThreadAuthContext,
};

struct ScriptedAuthPrompt {
    responses: Mutex<VecDeque<Option<Credentials>>>,
    calls: AtomicUsize,
    last_attempt: Mutex<Option<AuthAttempt>>,
}

impl ScriptedAuthPrompt {
    fn new(responses: Vec<Option<Credentials>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
            last_attempt: Mutex::new(None),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_attempt(&self) -> Option<AuthAttempt> {
        *self.last_attempt.lock().expect("attempt lock")
    }
}

impl AuthPrompt for Arc<ScriptedAuthPrompt> {
    fn prompt_credentials(
        &self,
        _request: &AuthRequest<'_>,
        _previous_username: Option<&str>,
        attempt: AuthAttempt,
    ) -> Option<Credentials> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_attempt.lock().expect("attempt lock") = Some(attempt);
        self.responses
            .lock()
            .expect("script lock")
            .pop_front()
            .expect("auth prompt invoked more times than the test scripted")
    }
}

fn request(url: &str) -> AuthRequest<'_> {
    AuthRequest {
        host: "files.example.com",
        port: 80,
        scheme: "basic",
        realm: "restricted",
        url,
        is_proxy: false,
    }
}

fn creds(username: &str, password: &str) -> Credentials {
    Credentials::new(username, password)
}

#[test]
fn first_call_prompts_and_caches() {
    let prompt = ScriptedAuthPrompt::new(vec![Some(creds("alice", "s3cret"))]);
    let auth = Authenticator::new(Box::new(Arc::clone(&prompt)), 2);
    let mut ctx = ThreadAuthContext::new();

    let got = auth
        .password_authentication(&mut ctx, &request("http://files.example.com/a.jar"))
        .expect("first prompt must yield credentials");
    assert_eq!(got.username(), "alice");
    assert_eq!(got.password(), "s3cret");
    assert_eq!(prompt.call_count(), 1);
    assert_eq!(prompt.last_attempt(), Some(AuthAttempt::FirstTime));
}

#[test]
fn other_resources_on_the_same_host_reuse_silently() {
    let prompt = ScriptedAuthPrompt::new(vec![Some(creds("alice", "s3cret"))]);
    let auth = Authenticator::new(Box::new(Arc::clone(&prompt)), 2);
    let mut ctx = ThreadAuthContext::new();

    auth.password_authentication(&mut ctx, &request("http://files.example.com/a.jar"))
        .expect("first prompt");
    let got = auth
        .password_authentication(&mut ctx, &request("http://files.example.com/b.jar"))
        .expect("cached credentials for another resource");
    assert_eq!(got.username(), "alice");
    assert_eq!(prompt.call_count(), 1);
}

#[test]
fn rejected_credentials_reprompt_after_the_attempt_budget() {
    let prompt = ScriptedAuthPrompt::new(vec![
        Some(creds("alice", "wrong")),
        Some(creds("alice", "right")),
    ]);
    let auth = Authenticator::new(Box::new(Arc::clone(&prompt)), 2);
    let mut ctx = ThreadAuthContext::new();
    let url = "http://files.example.com/a.jar";

    // First probe prompts.
    auth.password_authentication(&mut ctx, &request(url))
        .expect("first prompt");
    // The server keeps rejecting: the same pair is re-offered while the
    // attempt budget lasts.
    for _ in 0..2 {
        let again = auth
            .password_authentication(&mut ctx, &request(url))
            .expect("re-offered credentials");
        assert_eq!(again.password(), "wrong");
        assert_eq!(prompt.call_count(), 1);
    }
    // Budget exhausted: the repeated-attempt prompt runs.
    let refreshed = auth
        .password_authentication(&mut ctx, &request(url))
        .expect("repeated prompt must yield credentials");
    assert_eq!(refreshed.password(), "right");
    assert_eq!(prompt.call_count(), 2);
    assert_eq!(prompt.last_attempt(), Some(AuthAttempt::Repeated));
}

#[test]
fn attempt_budget_resets_after_a_reprompt() {
    let prompt = ScriptedAuthPrompt::new(vec![
        Some(creds("alice", "wrong")),
        Some(creds("alice", "still-wrong")),
        Some(creds("alice", "right")),
    ]);
    let auth = Authenticator::new(Box::new(Arc::clone(&prompt)), 1);
    let mut ctx = ThreadAuthContext::new();
    let url = "http://files.example.com/a.jar";

    auth.password_authentication(&mut ctx, &request(url))
        .expect("first prompt");
    // One silent re-offer, then the first reprompt.
    auth.password_authentication(&mut ctx, &request(url))
        .expect("silent re-offer");
    auth.password_authentication(&mut ctx, &request(url))
        .expect("first reprompt");
    assert_eq!(prompt.call_count(), 2);
    // The budget was reset: one more silent re-offer before the second
    // reprompt.
    auth.password_authentication(&mut ctx, &request(url))
        .expect("silent re-offer after reset");
    assert_eq!(prompt.call_count(), 2);
    let final_creds = auth
        .password_authentication(&mut ctx, &request(url))
        .expect("second reprompt");
    assert_eq!(final_creds.password(), "right");
    assert_eq!(prompt.call_count(), 3);
}

#[test]
fn cancel_latches_and_suppresses_all_future_prompts() {
    let prompt = ScriptedAuthPrompt::new(vec![None]);
    let auth = Authenticator::new(Box::new(Arc::clone(&prompt)), 2);
    let mut ctx = ThreadAuthContext::new();

    assert!(auth
        .password_authentication(&mut ctx, &request("http://files.example.com/a.jar"))
        .is_none());
    // Later calls return immediately without prompting, for any URL.
    assert!(auth
        .password_authentication(&mut ctx, &request("http://files.example.com/b.jar"))
        .is_none());
    assert!(auth
        .password_authentication(&mut ctx, &request("http://files.example.com/a.jar"))
        .is_none());
    assert_eq!(prompt.call_count(), 1);
}

#[test]
fn refreshed_cache_is_offered_before_reprompting() {
    // Thread A fails with the old pair; meanwhile thread B refreshed the
    // cache. A must get B's pair instead of a dialog.
    let prompt = ScriptedAuthPrompt::new(vec![Some(creds("alice", "old"))]);
    let auth = Authenticator::new(Box::new(Arc::clone(&prompt)), 0);
    let url = "http://files.example.com/a.jar";

    let mut ctx_a = ThreadAuthContext::new();
    auth.password_authentication(&mut ctx_a, &request(url))
        .expect("first prompt");

    // Another worker's context never tried this URL; it reuses the cache
    // silently (state B) and then retries the same URL with the same
    // pair, driving a reprompt of its own... scripted separately below.
    let mut ctx_b = ThreadAuthContext::new();
    let got = auth
        .password_authentication(&mut ctx_b, &request(url))
        .expect("cache hit for a fresh context");
    assert_eq!(got.password(), "old");
    assert_eq!(prompt.call_count(), 1);

    // B retries the same URL without having tried the cached pair yet:
    // it is handed the cached pair, still with no dialog.
    let got = auth
        .password_authentication(&mut ctx_b, &request(url))
        .expect("cached pair offered before any reprompt");
    assert_eq!(got.password(), "old");
    assert_eq!(prompt.call_count(), 1);
}

#[test]
fn equal_credentials_compare_equal_and_redact_debug() {
    let a = creds("alice", "s3cret");
    let b = creds("alice", "s3cret");
    let c = creds("alice", "other");
    assert_eq!(a, b);
    assert_ne!(a, c);
    let rendered = format!("{a:?}");
    assert!(rendered.contains("alice"));
    assert!(!rendered.contains("s3cret"));
}
