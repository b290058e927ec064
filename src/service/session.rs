use crate::common::Result;
use crate::service::protocol::User;
use crate::storage::{StoredSession, TokenStore};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Screens the client can be sent to by the session layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Login,
    LoginFailed,
    Profile,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::LoginFailed => "/login?error=auth_failed",
            Route::Profile => "/profile",
        }
    }
}

/// Receives navigation requests from the session layer.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

/// Navigator that only logs; used where no presenter is attached.
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, route: Route) {
        tracing::info!("Navigating to {}", route.path());
    }
}

struct SessionState {
    token: Option<String>,
    user: Option<User>,
    generation: u64,
}

/// Process-wide bearer token holder.
///
/// Each token assignment opens a new generation. Requests remember the
/// generation they were sent under, and only a 401 for the current
/// generation clears the token and navigates to login, so a burst of
/// concurrent 401s navigates once.
pub struct SessionContext {
    state: Mutex<SessionState>,
    store: Option<TokenStore>,
    navigator: Arc<dyn Navigator>,
}

impl SessionContext {
    pub fn new(navigator: Arc<dyn Navigator>) -> Self {
        Self {
            state: Mutex::new(SessionState {
                token: None,
                user: None,
                generation: 0,
            }),
            store: None,
            navigator,
        }
    }

    /// Session backed by a token file; any stored token is loaded.
    pub fn with_store(store: TokenStore, navigator: Arc<dyn Navigator>) -> Result<Self> {
        let stored = store.load()?;
        let session = Self {
            state: Mutex::new(SessionState {
                token: stored.as_ref().map(|s| s.token.clone()),
                user: stored.and_then(|s| s.user),
                generation: 0,
            }),
            store: Some(store),
            navigator,
        };
        Ok(session)
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn token(&self) -> Option<String> {
        self.state().token.clone()
    }

    /// Current token together with the generation it belongs to.
    pub fn snapshot(&self) -> (Option<String>, u64) {
        let state = self.state();
        (state.token.clone(), state.generation)
    }

    pub fn generation(&self) -> u64 {
        self.state().generation
    }

    pub fn has_token(&self) -> bool {
        self.state().token.is_some()
    }

    pub fn cached_user(&self) -> Option<User> {
        self.state().user.clone()
    }

    pub fn set_token(&self, token: String, user: Option<User>) -> Result<()> {
        tracing::debug!("Storing session token {}", token_preview(&token));
        {
            let mut state = self.state();
            state.token = Some(token.clone());
            state.user = user.clone();
            state.generation += 1;
        }
        if let Some(store) = &self.store {
            store.save(&StoredSession::new(token, user))?;
        }
        Ok(())
    }

    pub fn set_user(&self, user: Option<User>) -> Result<()> {
        let token = {
            let mut state = self.state();
            state.user = user.clone();
            state.token.clone()
        };
        if let (Some(store), Some(token)) = (&self.store, token) {
            store.save(&StoredSession::new(token, user))?;
        }
        Ok(())
    }

    /// Drops the token without navigating (logout, failed session check).
    pub fn clear(&self) {
        {
            let mut state = self.state();
            state.token = None;
            state.user = None;
            state.generation += 1;
        }
        self.remove_persisted();
    }

    /// Handles a 401 observed by a request sent under `observed_generation`.
    ///
    /// Returns `true` when this call cleared the session and navigated.
    pub fn invalidate(&self, observed_generation: u64) -> bool {
        {
            let mut state = self.state();
            if state.generation != observed_generation {
                tracing::debug!(
                    "Ignoring 401 from generation {} (current {})",
                    observed_generation,
                    state.generation
                );
                return false;
            }
            state.token = None;
            state.user = None;
            state.generation += 1;
        }

        tracing::warn!("Unauthorized access detected, clearing token");
        self.remove_persisted();
        self.navigator.navigate(Route::Login);
        true
    }

    pub fn navigate(&self, route: Route) {
        self.navigator.navigate(route);
    }

    fn remove_persisted(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.clear() {
                tracing::warn!("Failed to remove stored session: {}", e);
            }
        }
    }
}

/// First characters of a token, safe for logs.
pub fn token_preview(token: &str) -> String {
    let prefix: String = token.chars().take(20).collect();
    format!("{}...", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingNavigator {
        logins: AtomicUsize,
    }

    impl Navigator for CountingNavigator {
        fn navigate(&self, route: Route) {
            if route == Route::Login {
                self.logins.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn repeated_invalidation_navigates_once() {
        let nav = Arc::new(CountingNavigator::default());
        let session = SessionContext::new(nav.clone());
        session.set_token("abc".into(), None).unwrap();
        let generation = session.generation();

        assert!(session.invalidate(generation));
        assert!(!session.invalidate(generation));
        assert!(!session.invalidate(generation));

        assert_eq!(nav.logins.load(Ordering::SeqCst), 1);
        assert!(!session.has_token());
    }

    #[test]
    fn stale_401_does_not_kill_new_login() {
        let nav = Arc::new(CountingNavigator::default());
        let session = SessionContext::new(nav.clone());
        session.set_token("old".into(), None).unwrap();
        let old_generation = session.generation();
        session.set_token("new".into(), None).unwrap();

        assert!(!session.invalidate(old_generation));
        assert_eq!(session.token().as_deref(), Some("new"));
        assert_eq!(nav.logins.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn token_preview_truncates() {
        let preview = token_preview("eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.payload");
        assert_eq!(preview, "eyJhbGciOiJIUzI1NiIs...");
    }
}
