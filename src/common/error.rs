use thiserror::Error;

/// A single failed field check from profile validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("{0}")]
    Validation(String),

    #[error("Invalid profile: {}", join_fields(.0))]
    InvalidProfile(Vec<FieldError>),

    #[error("Face detector unavailable: {0}")]
    DetectorUnavailable(String),

    #[error("No face detected")]
    NoFaceDetected,

    #[error("Server error ({status}): {}", .message.as_deref().unwrap_or("no message"))]
    Server { status: u16, message: Option<String> },

    #[error("Session expired, please log in again")]
    SessionExpired,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("An action is already in progress for notification {0}")]
    ActionInFlight(String),

    #[error("Unknown notification: {0}")]
    UnknownNotification(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::OrtError),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl VerifyError {
    /// Message to show the user: the server's own text when it sent one,
    /// local validation text as-is, otherwise `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            VerifyError::Server { message: Some(message), .. } => message.clone(),
            VerifyError::Validation(message) => message.clone(),
            VerifyError::InvalidProfile(_)
            | VerifyError::DetectorUnavailable(_)
            | VerifyError::NoFaceDetected
            | VerifyError::SessionExpired
            | VerifyError::InvalidState(_)
            | VerifyError::ActionInFlight(_) => self.to_string(),
            _ => fallback.to_string(),
        }
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, VerifyError::SessionExpired)
    }
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, VerifyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_message_wins_over_fallback() {
        let err = VerifyError::Server {
            status: 400,
            message: Some("Duplicate account".into()),
        };
        assert_eq!(err.user_message("Error uploading"), "Duplicate account");
    }

    #[test]
    fn fallback_used_without_server_message() {
        let err = VerifyError::Server { status: 500, message: None };
        assert_eq!(err.user_message("Error uploading"), "Error uploading");
        let err = VerifyError::InvalidResponse("bad json".into());
        assert_eq!(err.user_message("Error uploading"), "Error uploading");
    }

    #[test]
    fn profile_errors_are_listed() {
        let err = VerifyError::InvalidProfile(vec![
            FieldError::new("name", "Name is required"),
            FieldError::new("email", "Invalid email"),
        ]);
        assert_eq!(
            err.to_string(),
            "Invalid profile: name: Name is required; email: Invalid email"
        );
    }
}
