use crate::common::{Config, VerifyError, Result};
use crate::service::protocol::ErrorBody;
use crate::service::session::{SessionContext, token_preview};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Whether a request carries the session's bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Auth {
    Bearer,
    Anonymous,
}

/// JSON/multipart client for the verification API.
///
/// Every request except the code exchange carries the bearer token. Any 401
/// invalidates the shared session and yields [`VerifyError::SessionExpired`].
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<SessionContext>,
}

impl ApiClient {
    pub fn new(config: &Config, session: Arc<SessionContext>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api.timeout_seconds))
            .user_agent(concat!("idverify/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_http(http, &config.api.base_url, session))
    }

    pub fn with_http(http: reqwest::Client, base_url: &str, session: Arc<SessionContext>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        }
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(Method::GET, path, Auth::Bearer, |r| r).await?;
        Self::decode(response).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(Method::POST, path, Auth::Bearer, |r| r.json(body)).await?;
        Self::decode(response).await
    }

    /// POST without the bearer token (OAuth code exchange).
    pub async fn post_json_anonymous<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(Method::POST, path, Auth::Anonymous, |r| r.json(body)).await?;
        Self::decode(response).await
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(Method::PUT, path, Auth::Bearer, |r| r.json(body)).await?;
        Self::decode(response).await
    }

    /// PUT with no body whose response content is ignored.
    pub async fn put_empty(&self, path: &str) -> Result<()> {
        self.send(Method::PUT, path, Auth::Bearer, |r| r).await?;
        Ok(())
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send(Method::DELETE, path, Auth::Bearer, |r| r).await?;
        Ok(())
    }

    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        field: &str,
        file_name: &str,
        mime: &str,
        bytes: Vec<u8>,
    ) -> Result<T> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime)?;
        let form = reqwest::multipart::Form::new().part(field.to_string(), part);
        let response = self
            .send(Method::POST, path, Auth::Bearer, move |r| r.multipart(form))
            .await?;
        Self::decode(response).await
    }

    async fn send<F>(&self, method: Method, path: &str, auth: Auth, build: F) -> Result<reqwest::Response>
    where
        F: FnOnce(RequestBuilder) -> RequestBuilder,
    {
        let (token, generation) = self.session.snapshot();
        let mut request = self.http.request(method.clone(), self.url(path));
        if auth == Auth::Bearer {
            if let Some(token) = token.as_deref() {
                tracing::trace!("Adding token to request: Bearer {}", token_preview(token));
                request = request.bearer_auth(token);
            }
        }
        let request = build(request);

        tracing::debug!("{} {}", method, path);
        let response = request.send().await.map_err(|e| {
            tracing::error!("Request {} {} failed: {}", method, path, e);
            VerifyError::Http(e)
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED {
            self.session.invalidate(generation);
            return Err(VerifyError::SessionExpired);
        }

        let body = response.bytes().await.unwrap_or_default();
        let message = serde_json::from_slice::<ErrorBody>(&body)
            .ok()
            .and_then(ErrorBody::into_message);
        tracing::error!("API Error: {} {} -> {} {:?}", method, path, status.as_u16(), message);
        Err(VerifyError::Server {
            status: status.as_u16(),
            message,
        })
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let body = response.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return decode_empty();
        }
        serde_json::from_slice(&body).map_err(|e| VerifyError::InvalidResponse(e.to_string()))
    }
}

/// Some endpoints answer 2xx with no body. That reads as `null` for unit,
/// `Option` and `Value` targets, and as `{}` for structs with defaults.
fn decode_empty<T: DeserializeOwned>() -> Result<T> {
    serde_json::from_slice(b"null")
        .or_else(|_| serde_json::from_slice(b"{}"))
        .map_err(|e| VerifyError::InvalidResponse(format!("empty response body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::protocol::Ack;
    use serde::Deserialize;

    #[derive(Deserialize, Debug)]
    struct Required {
        #[allow(dead_code)]
        id: String,
    }

    #[test]
    fn empty_body_decodes_to_defaults() {
        let ack: Ack = decode_empty().unwrap();
        assert!(!ack.success);
        assert!(ack.server_message().is_none());

        assert_eq!(decode_empty::<serde_json::Value>().unwrap(), serde_json::Value::Null);
        assert_eq!(decode_empty::<Option<Ack>>().unwrap().map(|a| a.success), None);
        decode_empty::<()>().unwrap();
    }

    #[test]
    fn empty_body_with_required_fields_is_invalid() {
        assert!(matches!(
            decode_empty::<Required>(),
            Err(VerifyError::InvalidResponse(_))
        ));
    }
}
