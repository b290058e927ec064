use crate::common::{VerifyError, Result};
use crate::core::selection::{validate_national_id, LocalFile};
use crate::service::client::ApiClient;
use crate::service::protocol::Ack;

const NATIONAL_ID_PATH: &str = "/verify/national-id";

/// National ID document submission.
pub struct IdUploader {
    client: ApiClient,
    selected: Option<LocalFile>,
}

impl IdUploader {
    pub fn new(client: ApiClient) -> Self {
        Self { client, selected: None }
    }

    pub fn selected(&self) -> Option<&LocalFile> {
        self.selected.as_ref()
    }

    pub fn select_file(&mut self, file: LocalFile) -> Result<()> {
        validate_national_id(&file)?;
        self.selected = Some(file);
        Ok(())
    }

    /// Returns the server's confirmation message.
    pub async fn submit(&mut self) -> Result<String> {
        let file = self
            .selected
            .clone()
            .ok_or_else(|| VerifyError::Validation("Please select a file to upload".into()))?;

        tracing::info!("Uploading national ID {}", file.name);
        let ack: Ack = self
            .client
            .post_multipart(NATIONAL_ID_PATH, "nationalId", &file.name, &file.mime, file.bytes)
            .await?;

        if !ack.success {
            return Err(VerifyError::Server {
                status: 200,
                message: Some(
                    ack.server_message()
                        .unwrap_or_else(|| "ID verification failed".to_string()),
                ),
            });
        }

        self.selected = None;
        Ok(ack
            .message
            .unwrap_or_else(|| "ID verified successfully!".to_string()))
    }
}
