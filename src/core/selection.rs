use crate::common::{VerifyError, Result};
use crate::core::detector::FaceBox;
use image::DynamicImage;
use std::path::Path;

/// Upper bound for any uploaded file: 5 MiB.
pub const MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

pub const PICTURE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp"];
pub const NATIONAL_ID_TYPES: &[&str] = &["image/jpeg", "image/png", "application/pdf"];

/// A file chosen by the user, with the MIME type it was declared as.
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl LocalFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes,
        }
    }

    /// Reads a file from disk, declaring its type from the extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self::new(name, mime_from_extension(path), bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

pub fn mime_from_extension(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

pub fn validate_picture(file: &LocalFile) -> Result<()> {
    if !PICTURE_TYPES.contains(&file.mime.as_str()) {
        return Err(VerifyError::Validation(
            "Please select a valid image file (JPG, PNG, or WEBP)".into(),
        ));
    }
    if file.size() > MAX_UPLOAD_BYTES {
        return Err(VerifyError::Validation("Image size should be less than 5MB".into()));
    }
    Ok(())
}

pub fn validate_national_id(file: &LocalFile) -> Result<()> {
    if file.size() > MAX_UPLOAD_BYTES {
        return Err(VerifyError::Validation("File size must be less than 5MB".into()));
    }
    if !NATIONAL_ID_TYPES.contains(&file.mime.as_str()) {
        return Err(VerifyError::Validation(
            "Please select a JPG, PNG or PDF file".into(),
        ));
    }
    Ok(())
}

/// A validated, decoded picture ready for detection and upload.
#[derive(Debug, Clone)]
pub struct SelectedPicture {
    pub file: LocalFile,
    pub image: DynamicImage,
    pub preview: DynamicImage,
    /// Faces found by the local gate; `None` until detection ran.
    pub faces: Option<Vec<FaceBox>>,
}

impl SelectedPicture {
    pub fn load(file: LocalFile, thumbnail_size: u32) -> Result<Self> {
        validate_picture(&file)?;
        let image = image::load_from_memory(&file.bytes)
            .map_err(|e| VerifyError::Validation(format!("Could not read image: {}", e)))?;
        let preview = image.thumbnail(thumbnail_size, thumbnail_size);
        Ok(Self {
            file,
            image,
            preview,
            faces: None,
        })
    }

    pub fn face_verified(&self) -> bool {
        self.faces.as_ref().is_some_and(|faces| !faces.is_empty())
    }
}
