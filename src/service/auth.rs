use crate::common::{Config, VerifyError, Result};
use crate::service::client::ApiClient;
use crate::service::protocol::{ExchangeCodeRequest, ExchangeCodeResponse, User};
use crate::service::session::{Route, token_preview};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use std::sync::atomic::{AtomicBool, Ordering};
use url::Url;

/// Current user and login/logout operations on top of the shared session.
#[derive(Clone)]
pub struct AuthSession {
    client: ApiClient,
}

impl AuthSession {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn current_user(&self) -> Option<User> {
        self.client.session().cached_user()
    }

    pub fn is_logged_in(&self) -> bool {
        self.client.session().has_token()
    }

    /// Validates a stored token at startup and refreshes the user.
    ///
    /// Without a stored token this is a no-op returning `None`. Any failure
    /// clears the local session.
    pub async fn check_session(&self) -> Result<Option<User>> {
        let session = self.client.session();
        if !session.has_token() {
            return Ok(None);
        }

        match self.client.get_json::<User>("/auth/me").await {
            Ok(user) => {
                session.set_user(Some(user.clone()))?;
                Ok(Some(user))
            }
            Err(e) => {
                tracing::error!("Auth check failed: {}", e);
                session.clear();
                Ok(None)
            }
        }
    }

    pub async fn login(&self, token: String, user: User) -> Result<()> {
        tracing::info!("Starting login process for {}", user.email);
        let session = self.client.session();
        session.clear();

        if let Err(e) = session.set_token(token.clone(), Some(user)) {
            session.clear();
            return Err(e);
        }
        tracing::debug!("Token stored: {}", token_preview(&token));

        match self.client.get_json::<User>("/auth/me").await {
            Ok(user) => {
                tracing::debug!("Auth verification successful for {}", user.id);
                session.set_user(Some(user))?;
            }
            // The 401 already cleared the session and routed to login.
            Err(e) if e.is_session_expired() => return Err(e),
            Err(e) => tracing::warn!("Auth verification failed: {}", e),
        }
        Ok(())
    }

    pub fn logout(&self) {
        tracing::info!("Logging out");
        self.client.session().clear();
    }

    /// Deletes the account server-side, then drops the local session.
    pub async fn delete_account(&self) -> Result<()> {
        self.client.delete("/delete-account").await?;
        tracing::info!("Account deleted");
        self.logout();
        Ok(())
    }
}

/// What the callback screen should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    LoggedIn(User),
    /// The exchange already ran for this handler; nothing was sent.
    AlreadyAttempted,
    /// The new token was rejected right away; the session layer has
    /// already routed to login.
    SessionExpired,
    MissingCode,
    Failed(String),
}

impl CallbackOutcome {
    pub fn route(&self) -> Option<Route> {
        match self {
            CallbackOutcome::LoggedIn(_) => Some(Route::Profile),
            CallbackOutcome::MissingCode => Some(Route::Login),
            CallbackOutcome::Failed(_) => Some(Route::LoginFailed),
            CallbackOutcome::AlreadyAttempted | CallbackOutcome::SessionExpired => None,
        }
    }
}

/// OAuth redirect handler. Exchanges the authorization code at most once,
/// however many times it is triggered.
pub struct OAuthCallback {
    attempted: AtomicBool,
}

impl Default for OAuthCallback {
    fn default() -> Self {
        Self::new()
    }
}

impl OAuthCallback {
    pub fn new() -> Self {
        Self { attempted: AtomicBool::new(false) }
    }

    pub fn was_attempted(&self) -> bool {
        self.attempted.load(Ordering::SeqCst)
    }

    /// Extracts `code` from a full callback URL or a bare query string.
    pub fn code_from_url(callback: &str) -> Option<String> {
        let parsed = Url::parse(callback)
            .or_else(|_| Url::parse(&format!("http://callback/?{}", callback.trim_start_matches('?'))))
            .ok()?;
        parsed
            .query_pairs()
            .find(|(key, _)| key == "code")
            .map(|(_, value)| value.into_owned())
            .filter(|code| !code.is_empty())
    }

    pub async fn handle(&self, code: Option<&str>, auth: &AuthSession) -> CallbackOutcome {
        if self.attempted.swap(true, Ordering::SeqCst) {
            tracing::debug!("Code exchange already attempted, ignoring");
            return CallbackOutcome::AlreadyAttempted;
        }

        let outcome = match code.filter(|c| !c.is_empty()) {
            None => {
                tracing::error!("No code found in callback URL");
                CallbackOutcome::MissingCode
            }
            Some(code) => match Self::exchange(code, auth).await {
                Ok(user) => {
                    tracing::info!("Login successful, token received");
                    CallbackOutcome::LoggedIn(user)
                }
                Err(VerifyError::SessionExpired) => {
                    tracing::error!("Token rejected during login verification");
                    CallbackOutcome::SessionExpired
                }
                Err(e) => {
                    if let VerifyError::Server { status: 400, .. } = e {
                        tracing::error!("Invalid or expired code");
                    }
                    tracing::error!("Auth callback error: {}", e);
                    CallbackOutcome::Failed(e.user_message("Authentication failed"))
                }
            },
        };

        if let Some(route) = outcome.route() {
            auth.client().session().navigate(route);
        }
        outcome
    }

    async fn exchange(code: &str, auth: &AuthSession) -> Result<User> {
        let response: ExchangeCodeResponse = auth
            .client()
            .post_json_anonymous("/auth/exchange-code", &ExchangeCodeRequest { code: code.to_string() })
            .await?;

        let (token, user) = match (response.token, response.user) {
            (Some(token), Some(user)) if !token.is_empty() => (token, user),
            _ => return Err(VerifyError::InvalidResponse("Invalid response data".into())),
        };

        auth.login(token, user.clone()).await?;
        Ok(auth.current_user().unwrap_or(user))
    }
}

/// Random value for the OAuth `state` parameter.
pub fn generate_state() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Identity-provider authorization URL the user opens to log in.
pub fn authorization_url(config: &Config, state: &str) -> Result<String> {
    if config.oauth.client_id.is_empty() {
        return Err(VerifyError::Validation("oauth.client_id is not configured".into()));
    }
    let mut url = Url::parse(&config.oauth.authorize_url)
        .map_err(|e| VerifyError::Other(anyhow::anyhow!("Invalid authorize URL: {}", e)))?;
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", &config.oauth.client_id)
        .append_pair("redirect_uri", &config.oauth.redirect_uri)
        .append_pair("state", state)
        .append_pair("scope", &config.oauth.scope);
    Ok(url.into())
}
