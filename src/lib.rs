// Core modules
pub mod core;
pub mod storage;
pub mod service;
pub mod cli;
pub mod common;

// Re-export commonly used types
pub use crate::common::{Config, DevMode, VerifyError, FieldError, Result};
pub use crate::core::{
    DetectorSlot, FaceBox, FaceDetection, FaceDetector, IdUploader, LocalFile, NotificationCenter,
    PictureUploader, UploadOutcome, VerificationStatus,
};
pub use crate::service::{protocol, ApiClient, AuthSession, SessionContext, Navigator, Route};
pub use crate::storage::TokenStore;
