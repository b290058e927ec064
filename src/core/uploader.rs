use crate::common::{VerifyError, Result};
use crate::core::conflict::{ConflictResolver, PendingUpload, ResolveOutcome};
use crate::core::detector::{detect_in_background, DetectorSlot, FaceBox};
use crate::core::selection::{LocalFile, SelectedPicture};
use crate::service::client::ApiClient;
use crate::service::protocol::{Conflict, PictureUploadResponse, ResolveAction};

pub const UPLOAD_PATH: &str = "/verify/profile-picture";
const UPLOAD_FIELD: &str = "profilePicture";
const UPLOAD_FALLBACK: &str = "Error uploading profile picture";

#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    /// No similar pictures: the upload is the new profile picture.
    Committed { url: String },
    /// Similar pictures found; nothing is committed until resolved.
    AwaitingResolution { conflicts: Vec<Conflict> },
}

/// Profile picture flow: select, detect a face locally, upload, and settle
/// any duplicate-face conflicts.
pub struct PictureUploader {
    client: ApiClient,
    detector: DetectorSlot,
    resolver: ConflictResolver,
    thumbnail_size: u32,
    selected: Option<SelectedPicture>,
    current_picture: Option<String>,
}

impl PictureUploader {
    pub fn new(client: ApiClient, detector: DetectorSlot, thumbnail_size: u32) -> Self {
        let current_picture = client
            .session()
            .cached_user()
            .and_then(|user| user.profile_picture)
            .map(|picture| picture.url);
        Self {
            resolver: ConflictResolver::new(client.clone()),
            client,
            detector,
            thumbnail_size,
            selected: None,
            current_picture,
        }
    }

    pub fn current_picture(&self) -> Option<&str> {
        self.current_picture.as_deref()
    }

    pub fn selected(&self) -> Option<&SelectedPicture> {
        self.selected.as_ref()
    }

    pub fn pending(&self) -> Option<&PendingUpload> {
        self.resolver.pending()
    }

    pub fn detector(&self) -> &DetectorSlot {
        &self.detector
    }

    /// Validates and decodes `file`. On rejection nothing changes.
    pub fn select_file(&mut self, file: LocalFile) -> Result<&SelectedPicture> {
        if let Some(pending) = self.resolver.pending() {
            return Err(VerifyError::InvalidState(format!(
                "resolve the pending upload {} first",
                pending.temp_path
            )));
        }
        let picture = SelectedPicture::load(file, self.thumbnail_size)?;
        tracing::debug!(
            "Selected {} ({} bytes, {}x{})",
            picture.file.name,
            picture.file.size(),
            picture.image.width(),
            picture.image.height()
        );
        Ok(self.selected.insert(picture))
    }

    /// Runs the local face gate over the selected picture.
    pub async fn detect_face(&mut self) -> Result<Vec<FaceBox>> {
        let image = match &self.selected {
            Some(picture) => picture.image.clone(),
            None => return Err(VerifyError::Validation("Please select an image first".into())),
        };

        let detector = self.detector.current()?;
        let faces = detect_in_background(detector, image).await?;

        if let Some(picture) = self.selected.as_mut() {
            picture.faces = Some(faces.clone());
        }

        if faces.is_empty() {
            tracing::info!("No face found in selected picture");
            return Err(VerifyError::NoFaceDetected);
        }
        Ok(faces)
    }

    /// Submits the selected picture. The face gate runs first if it has not
    /// passed yet; the request is never sent without a detected face.
    pub async fn upload(&mut self) -> Result<UploadOutcome> {
        if let Some(pending) = self.resolver.pending() {
            return Err(VerifyError::InvalidState(format!(
                "upload {} is still awaiting resolution",
                pending.temp_path
            )));
        }

        let needs_detection = match &self.selected {
            None => return Err(VerifyError::Validation("Please select an image to upload".into())),
            Some(picture) => !picture.face_verified(),
        };
        if needs_detection {
            self.detect_face().await?;
        }

        let file = match &self.selected {
            Some(picture) => picture.file.clone(),
            None => return Err(VerifyError::Validation("Please select an image to upload".into())),
        };

        tracing::info!("Uploading profile picture {}", file.name);
        let response: PictureUploadResponse = self
            .client
            .post_multipart(UPLOAD_PATH, UPLOAD_FIELD, &file.name, &file.mime, file.bytes)
            .await?;

        if !response.conflicts.is_empty() {
            let temp_path = response.temp_path.filter(|p| !p.is_empty()).ok_or_else(|| {
                VerifyError::InvalidResponse("conflicts returned without a temp path".into())
            })?;
            let conflicts = response.conflicts;
            self.resolver.begin(PendingUpload {
                temp_path,
                conflicts: conflicts.clone(),
            })?;
            return Ok(UploadOutcome::AwaitingResolution { conflicts });
        }

        match response.profile_picture {
            Some(picture) => {
                tracing::info!("Profile picture uploaded successfully");
                self.current_picture = Some(picture.url.clone());
                self.selected = None;
                Ok(UploadOutcome::Committed { url: picture.url })
            }
            None => Err(VerifyError::Server {
                status: 200,
                message: Some(
                    response
                        .error
                        .or(response.message)
                        .unwrap_or_else(|| UPLOAD_FALLBACK.to_string()),
                ),
            }),
        }
    }

    /// Commits or cancels the pending upload.
    ///
    /// A successful proceed makes the committed picture current. A cancel
    /// always clears local state, even if the server call failed. A failed
    /// proceed leaves everything as it was.
    pub async fn resolve(&mut self, action: ResolveAction) -> Result<ResolveOutcome> {
        let outcome = self.resolver.resolve(action).await?;
        if let ResolveOutcome::Committed { url } = &outcome {
            self.current_picture = Some(url.clone());
        }
        self.selected = None;
        Ok(outcome)
    }

    /// Like `resolve`, but for callers that will not retry: if the action
    /// fails the pending upload is cancelled before the error is returned,
    /// so no temp file is left on the server.
    pub async fn resolve_or_discard(&mut self, action: ResolveAction) -> Result<ResolveOutcome> {
        match self.resolve(action).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::warn!("Resolving pending upload failed, discarding it: {}", e);
                self.discard().await;
                Err(e)
            }
        }
    }

    /// Navigation away: cancels any pending upload and drops the selection.
    pub async fn discard(&mut self) {
        if self.resolver.is_awaiting() {
            if let Err(e) = self.resolver.close().await {
                tracing::warn!("Failed to cancel pending upload: {}", e);
            }
        }
        self.selected = None;
    }
}
