use crate::common::{VerifyError, Result};
use crate::service::client::ApiClient;
use crate::service::protocol::{Conflict, ResolveAction, ResolveConflictRequest, ResolveConflictResponse};

pub const RESOLVE_PATH: &str = "/verify/profile-picture/resolve-conflict";

/// A tentative upload held by the server until it is committed or cancelled.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingUpload {
    pub temp_path: String,
    pub conflicts: Vec<Conflict>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolverState {
    Idle,
    AwaitingResolution(PendingUpload),
    Committed { url: String },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolveOutcome {
    Committed { url: String },
    /// `acknowledged` is false when the server-side cancel failed.
    Cancelled { acknowledged: bool },
}

/// Drives one tentative upload from conflict to commit or cancel.
pub struct ConflictResolver {
    client: ApiClient,
    state: ResolverState,
}

impl ConflictResolver {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            state: ResolverState::Idle,
        }
    }

    pub fn state(&self) -> &ResolverState {
        &self.state
    }

    pub fn pending(&self) -> Option<&PendingUpload> {
        match &self.state {
            ResolverState::AwaitingResolution(pending) => Some(pending),
            _ => None,
        }
    }

    pub fn is_awaiting(&self) -> bool {
        self.pending().is_some()
    }

    /// Enters AwaitingResolution. Only one tentative upload may be open.
    pub fn begin(&mut self, pending: PendingUpload) -> Result<()> {
        if let Some(current) = self.pending() {
            return Err(VerifyError::InvalidState(format!(
                "upload {} is still awaiting resolution",
                current.temp_path
            )));
        }
        tracing::info!(
            "Upload {} awaiting resolution ({} similar picture(s))",
            pending.temp_path,
            pending.conflicts.len()
        );
        self.state = ResolverState::AwaitingResolution(pending);
        Ok(())
    }

    pub async fn resolve(&mut self, action: ResolveAction) -> Result<ResolveOutcome> {
        let temp_path = match self.pending() {
            Some(pending) => pending.temp_path.clone(),
            None => {
                return Err(VerifyError::InvalidState("no upload is awaiting resolution".into()))
            }
        };

        match action {
            ResolveAction::Proceed => {
                // A failed commit leaves the upload open so the user can retry.
                let url = commit(&self.client, &temp_path).await?;
                self.state = ResolverState::Committed { url: url.clone() };
                Ok(ResolveOutcome::Committed { url })
            }
            ResolveAction::Cancel => {
                let acknowledged = cancel_best_effort(&self.client, &temp_path).await;
                self.state = ResolverState::Cancelled;
                Ok(ResolveOutcome::Cancelled { acknowledged })
            }
        }
    }

    pub async fn proceed(&mut self) -> Result<ResolveOutcome> {
        self.resolve(ResolveAction::Proceed).await
    }

    /// Closing the conflict dialog; always tells the server to cancel.
    pub async fn close(&mut self) -> Result<ResolveOutcome> {
        self.resolve(ResolveAction::Cancel).await
    }
}

impl Drop for ConflictResolver {
    fn drop(&mut self) {
        if let Some(pending) = self.pending() {
            tracing::warn!(
                "Abandoning tentative upload {} without resolving it",
                pending.temp_path
            );
        }
    }
}

async fn commit(client: &ApiClient, temp_path: &str) -> Result<String> {
    let response: ResolveConflictResponse = client
        .post_json(
            RESOLVE_PATH,
            &ResolveConflictRequest {
                temp_path: temp_path.to_string(),
                action: ResolveAction::Proceed,
            },
        )
        .await?;

    match response.profile_picture {
        Some(picture) => {
            tracing::info!("Tentative upload {} committed", temp_path);
            Ok(picture.url)
        }
        None => Err(VerifyError::InvalidResponse(
            response
                .message
                .unwrap_or_else(|| "resolve response carried no picture".into()),
        )),
    }
}

async fn cancel_best_effort(client: &ApiClient, temp_path: &str) -> bool {
    let request = ResolveConflictRequest {
        temp_path: temp_path.to_string(),
        action: ResolveAction::Cancel,
    };
    match client.post_json::<_, serde_json::Value>(RESOLVE_PATH, &request).await {
        Ok(_) => {
            tracing::info!("Tentative upload {} cancelled", temp_path);
            true
        }
        Err(e) => {
            tracing::error!("Error canceling upload {}: {}", temp_path, e);
            false
        }
    }
}

/// Resolves a tentative upload known only by its temp path, e.g. one left
/// behind by an interrupted session.
pub async fn resolve_temp_path(
    client: &ApiClient,
    temp_path: &str,
    action: ResolveAction,
) -> Result<ResolveOutcome> {
    match action {
        ResolveAction::Proceed => Ok(ResolveOutcome::Committed {
            url: commit(client, temp_path).await?,
        }),
        ResolveAction::Cancel => Ok(ResolveOutcome::Cancelled {
            acknowledged: cancel_best_effort(client, temp_path).await,
        }),
    }
}
