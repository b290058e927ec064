//! JSON shapes exchanged with the verification API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Auth

#[derive(Serialize, Debug, Clone)]
pub struct ExchangeCodeRequest {
    pub code: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ExchangeCodeResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id", alias = "id", default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub national_id: Option<NationalIdRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<PictureRef>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NationalIdRecord {
    #[serde(default)]
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PictureRef {
    pub url: String,
}

// Profile

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub education: Vec<Education>,
    #[serde(default)]
    pub work_experience: Vec<WorkExperience>,
    #[serde(default, skip_serializing)]
    pub national_id: Option<NationalIdRecord>,
    #[serde(default, skip_serializing)]
    pub profile_picture: Option<PictureRef>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Education {
    #[serde(default)]
    pub institution: String,
    #[serde(default)]
    pub degree: String,
    #[serde(default)]
    pub field_of_study: String,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkExperience {
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

// Verification uploads

/// Generic `{ success, message }` acknowledgement.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct Ack {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Ack {
    pub fn server_message(&self) -> Option<String> {
        self.message.clone().or_else(|| self.error.clone())
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct PictureUploadResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<PictureRef>,
    #[serde(default)]
    pub conflicts: Vec<Conflict>,
    #[serde(default)]
    pub temp_path: Option<String>,
}

/// An existing picture the server considers similar to the upload.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub profile_picture: String,
    #[serde(deserialize_with = "similarity_percent")]
    pub similarity: u8,
}

fn similarity_percent<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    Ok(raw.round().clamp(0.0, 100.0) as u8)
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResolveAction {
    Proceed,
    Cancel,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ResolveConflictRequest {
    pub temp_path: String,
    pub action: ResolveAction,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResolveConflictResponse {
    #[serde(default)]
    pub profile_picture: Option<PictureRef>,
    #[serde(default)]
    pub message: Option<String>,
}

// Verification status

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(default)]
    pub linked_in_verified: bool,
    #[serde(default)]
    pub id_verified: bool,
    #[serde(default)]
    pub picture_verified: bool,
    #[serde(default)]
    pub details: Option<VerificationDetails>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationDetails {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub national_id: Option<NationalIdRecord>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

// Notifications

#[derive(Deserialize, Debug, Clone, Default)]
pub struct NotificationList {
    #[serde(default)]
    pub notifications: Vec<Notification>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct UnreadCount {
    #[serde(default)]
    pub count: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum NotificationKind {
    #[serde(rename = "PROFILE_PICTURE_SIMILARITY")]
    SimilarityFlag,
    #[serde(rename = "PROFILE_PICTURE_APPROVED")]
    Approved,
    #[serde(rename = "PROFILE_PICTURE_REJECTED")]
    Rejected,
    #[serde(other)]
    Generic,
}

impl NotificationKind {
    pub fn title(&self) -> &'static str {
        match self {
            NotificationKind::SimilarityFlag => "Profile Picture Request",
            NotificationKind::Approved => "Profile Picture Approved",
            NotificationKind::Rejected => "Profile Picture Rejected",
            NotificationKind::Generic => "Notification",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReadStatus {
    Read,
    Unread,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(default)]
    pub message: String,
    #[serde(default = "default_status")]
    pub status: ReadStatus,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_status() -> ReadStatus {
    ReadStatus::Unread
}

impl Notification {
    /// Approve/reject is offered only for unresolved similarity flags.
    pub fn is_actionable(&self) -> bool {
        self.kind == NotificationKind::SimilarityFlag && !self.resolved
    }

    pub fn is_unread(&self) -> bool {
        self.status == ReadStatus::Unread
    }

    pub fn similarity(&self) -> Option<u64> {
        self.data
            .as_ref()
            .and_then(|data| data.get("similarity"))
            .and_then(|value| value.as_f64())
            .map(|value| value.round().clamp(0.0, 100.0) as u64)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DecisionAction {
    Approve,
    Reject,
}

impl DecisionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionAction::Approve => "approve",
            DecisionAction::Reject => "reject",
        }
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    pub notification_id: String,
    pub action: DecisionAction,
}

/// Body of a non-2xx response; the server uses either key.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorBody {
    pub fn into_message(self) -> Option<String> {
        self.message
            .filter(|m| !m.is_empty())
            .or(self.error.filter(|e| !e.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_notification_type_is_generic() {
        let n: Notification = serde_json::from_value(json!({
            "_id": "n1",
            "type": "SYSTEM_MAINTENANCE",
            "message": "Downtime tonight",
            "status": "read"
        }))
        .unwrap();
        assert_eq!(n.kind, NotificationKind::Generic);
        assert_eq!(n.kind.title(), "Notification");
        assert!(!n.is_actionable());
        assert!(!n.is_unread());
    }

    #[test]
    fn similarity_flag_is_actionable_until_resolved() {
        let mut n: Notification = serde_json::from_value(json!({
            "_id": "n2",
            "type": "PROFILE_PICTURE_SIMILARITY",
            "message": "Someone uploaded a similar picture",
            "status": "unread",
            "data": { "similarity": 87 }
        }))
        .unwrap();
        assert!(n.is_actionable());
        assert_eq!(n.similarity(), Some(87));
        n.resolved = true;
        assert!(!n.is_actionable());
    }

    #[test]
    fn conflict_similarity_is_clamped() {
        let conflicts: Vec<Conflict> = serde_json::from_value(json!([
            { "profilePicture": "https://cdn/a.jpg", "similarity": 92.4 },
            { "profilePicture": "https://cdn/b.jpg", "similarity": 140 }
        ]))
        .unwrap();
        assert_eq!(conflicts[0].similarity, 92);
        assert_eq!(conflicts[1].similarity, 100);
    }

    #[test]
    fn error_body_prefers_message_then_error() {
        let body: ErrorBody = serde_json::from_value(json!({ "error": "Bad file" })).unwrap();
        assert_eq!(body.into_message().as_deref(), Some("Bad file"));
        let body: ErrorBody =
            serde_json::from_value(json!({ "message": "Nope", "error": "Bad file" })).unwrap();
        assert_eq!(body.into_message().as_deref(), Some("Nope"));
    }

    #[test]
    fn resolve_request_uses_camel_case() {
        let req = ResolveConflictRequest {
            temp_path: "tmp/abc.jpg".into(),
            action: ResolveAction::Cancel,
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({ "tempPath": "tmp/abc.jpg", "action": "cancel" })
        );
    }
}
