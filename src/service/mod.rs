pub mod auth;
pub mod client;
pub mod protocol;
pub mod session;

pub use auth::{AuthSession, OAuthCallback, CallbackOutcome, authorization_url, generate_state};
pub use client::ApiClient;
pub use session::{SessionContext, Navigator, LogNavigator, Route};
