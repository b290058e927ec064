use crate::common::Result;
use crate::service::client::ApiClient;
use crate::service::protocol::{StatusResponse, VerificationDetails};

pub const STEP_LABELS: [&str; 4] = [
    "LinkedIn Authentication",
    "National ID Verification",
    "Profile Picture Verification",
    "Verification Complete",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VerificationFlags {
    pub linked_in_verified: bool,
    pub id_verified: bool,
    pub picture_verified: bool,
}

impl VerificationFlags {
    /// Linear progress: each step counts only if every earlier one is done.
    pub fn step_index(&self) -> usize {
        match (self.linked_in_verified, self.id_verified, self.picture_verified) {
            (true, true, true) => 3,
            (true, true, false) => 2,
            (true, false, _) => 1,
            (false, _, _) => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerificationStatus {
    pub flags: VerificationFlags,
    pub details: Option<VerificationDetails>,
}

impl VerificationStatus {
    pub fn step_index(&self) -> usize {
        self.flags.step_index()
    }

    pub fn step_label(&self) -> &'static str {
        STEP_LABELS[self.step_index()]
    }

    pub fn is_complete(&self) -> bool {
        self.step_index() == STEP_LABELS.len() - 1
    }
}

impl From<StatusResponse> for VerificationStatus {
    fn from(response: StatusResponse) -> Self {
        Self {
            flags: VerificationFlags {
                linked_in_verified: response.linked_in_verified,
                id_verified: response.id_verified,
                picture_verified: response.picture_verified,
            },
            details: response.details,
        }
    }
}

pub async fn fetch_status(client: &ApiClient) -> Result<VerificationStatus> {
    let response: StatusResponse = client.get_json("/verification/status").await?;
    let status = VerificationStatus::from(response);
    tracing::debug!("Verification step {} ({})", status.step_index(), status.step_label());
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(linked_in: bool, id: bool, picture: bool) -> VerificationFlags {
        VerificationFlags {
            linked_in_verified: linked_in,
            id_verified: id,
            picture_verified: picture,
        }
    }

    #[test]
    fn step_index_follows_priority_order() {
        assert_eq!(flags(true, true, true).step_index(), 3);
        assert_eq!(flags(true, true, false).step_index(), 2);
        assert_eq!(flags(true, false, false).step_index(), 1);
        assert_eq!(flags(false, false, false).step_index(), 0);
    }

    #[test]
    fn out_of_order_progress_collapses_to_prefix() {
        assert_eq!(flags(true, false, true).step_index(), 1);
        assert_eq!(flags(false, true, true).step_index(), 0);
    }

    #[test]
    fn label_and_completion() {
        let status = VerificationStatus {
            flags: flags(true, true, true),
            details: None,
        };
        assert_eq!(status.step_label(), "Verification Complete");
        assert!(status.is_complete());
    }
}
