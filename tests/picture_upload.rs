mod common;

use common::{one_face, png_bytes, signed_in_client, FakeDetector};
use idverify::core::{DetectorSlot, LocalFile, PictureUploader, ResolveOutcome, UploadOutcome};
use idverify::protocol::ResolveAction;
use idverify::VerifyError;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const UPLOAD: &str = "/verify/profile-picture";
const RESOLVE: &str = "/verify/profile-picture/resolve-conflict";

fn uploader(server: &MockServer, detector: DetectorSlot) -> PictureUploader {
    let (client, _) = signed_in_client(server, Some("http://cdn/old.jpg"));
    PictureUploader::new(client, detector, 200)
}

fn face_slot() -> DetectorSlot {
    DetectorSlot::ready(Arc::new(one_face()))
}

fn photo() -> LocalFile {
    LocalFile::new("me.png", "image/png", png_bytes(64, 64))
}

async fn mount_conflict_upload(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(UPLOAD))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "conflicts": [
                { "profilePicture": "http://cdn/other.jpg", "similarity": 87.6 }
            ],
            "tempPath": "uploads/tmp/abc.png"
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn rejects_wrong_type_without_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(UPLOAD))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut uploader = uploader(&server, face_slot());
    let gif = LocalFile::new("anim.gif", "image/gif", vec![0u8; 100]);

    match uploader.select_file(gif) {
        Err(VerifyError::Validation(message)) => {
            assert_eq!(message, "Please select a valid image file (JPG, PNG, or WEBP)")
        }
        other => panic!("unexpected: {:?}", other.map(|_| ())),
    }
    assert!(uploader.selected().is_none());
    assert!(uploader.upload().await.is_err());
}

#[tokio::test]
async fn rejects_oversized_file() {
    let server = MockServer::start().await;
    let mut uploader = uploader(&server, face_slot());
    let huge = LocalFile::new("big.png", "image/png", vec![0u8; 5 * 1024 * 1024 + 1]);

    match uploader.select_file(huge) {
        Err(VerifyError::Validation(message)) => assert_eq!(message, "Image size should be less than 5MB"),
        other => panic!("unexpected: {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn no_face_blocks_upload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(UPLOAD))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut uploader = uploader(&server, DetectorSlot::ready(Arc::new(FakeDetector(vec![]))));
    uploader.select_file(photo()).unwrap();

    assert!(matches!(uploader.upload().await, Err(VerifyError::NoFaceDetected)));
    assert_eq!(uploader.current_picture(), Some("http://cdn/old.jpg"));
}

#[tokio::test]
async fn unavailable_detector_blocks_upload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(UPLOAD))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut uploader = uploader(&server, DetectorSlot::failed("model missing"));
    uploader.select_file(photo()).unwrap();

    assert!(matches!(
        uploader.upload().await,
        Err(VerifyError::DetectorUnavailable(_))
    ));
}

#[tokio::test]
async fn clean_upload_commits_immediately() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(UPLOAD))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "profilePicture": { "url": "http://cdn/new.jpg" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut uploader = uploader(&server, face_slot());
    uploader.select_file(photo()).unwrap();

    let outcome = uploader.upload().await.unwrap();
    assert_eq!(outcome, UploadOutcome::Committed { url: "http://cdn/new.jpg".into() });
    assert_eq!(uploader.current_picture(), Some("http://cdn/new.jpg"));
    assert!(uploader.selected().is_none());
}

#[tokio::test]
async fn conflicts_wait_for_resolution() {
    let server = MockServer::start().await;
    mount_conflict_upload(&server).await;

    let mut uploader = uploader(&server, face_slot());
    uploader.select_file(photo()).unwrap();

    match uploader.upload().await.unwrap() {
        UploadOutcome::AwaitingResolution { conflicts } => {
            assert_eq!(conflicts.len(), 1);
            assert_eq!(conflicts[0].similarity, 88);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(uploader.current_picture(), Some("http://cdn/old.jpg"));
    assert_eq!(uploader.pending().unwrap().temp_path, "uploads/tmp/abc.png");

    // Nothing new can start until the pending upload is settled.
    assert!(matches!(uploader.select_file(photo()), Err(VerifyError::InvalidState(_))));
    assert!(matches!(uploader.upload().await, Err(VerifyError::InvalidState(_))));
}

#[tokio::test]
async fn proceed_commits_pending_upload() {
    let server = MockServer::start().await;
    mount_conflict_upload(&server).await;
    Mock::given(method("POST"))
        .and(path(RESOLVE))
        .and(body_partial_json(json!({ "tempPath": "uploads/tmp/abc.png", "action": "proceed" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "Profile picture updated",
            "profilePicture": { "url": "http://cdn/committed.jpg" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut uploader = uploader(&server, face_slot());
    uploader.select_file(photo()).unwrap();
    uploader.upload().await.unwrap();

    let outcome = uploader.resolve(ResolveAction::Proceed).await.unwrap();
    assert_eq!(outcome, ResolveOutcome::Committed { url: "http://cdn/committed.jpg".into() });
    assert_eq!(uploader.current_picture(), Some("http://cdn/committed.jpg"));
    assert!(uploader.pending().is_none());
    assert!(uploader.selected().is_none());
}

#[tokio::test]
async fn failed_proceed_stays_pending() {
    let server = MockServer::start().await;
    mount_conflict_upload(&server).await;
    Mock::given(method("POST"))
        .and(path(RESOLVE))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "message": "Storage offline" })))
        .expect(1)
        .mount(&server)
        .await;

    let mut uploader = uploader(&server, face_slot());
    uploader.select_file(photo()).unwrap();
    uploader.upload().await.unwrap();

    let err = uploader.resolve(ResolveAction::Proceed).await.unwrap_err();
    assert_eq!(err.user_message("Error resolving conflict"), "Storage offline");
    assert!(uploader.pending().is_some());
    assert_eq!(uploader.current_picture(), Some("http://cdn/old.jpg"));
}

#[tokio::test]
async fn cancel_clears_state_even_when_server_fails() {
    let server = MockServer::start().await;
    mount_conflict_upload(&server).await;
    Mock::given(method("POST"))
        .and(path(RESOLVE))
        .and(body_partial_json(json!({ "action": "cancel" })))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let mut uploader = uploader(&server, face_slot());
    uploader.select_file(photo()).unwrap();
    uploader.upload().await.unwrap();

    let outcome = uploader.resolve(ResolveAction::Cancel).await.unwrap();
    assert_eq!(outcome, ResolveOutcome::Cancelled { acknowledged: false });
    assert!(uploader.pending().is_none());
    assert!(uploader.selected().is_none());
    assert_eq!(uploader.current_picture(), Some("http://cdn/old.jpg"));
}

#[tokio::test]
async fn discard_cancels_pending_upload() {
    let server = MockServer::start().await;
    mount_conflict_upload(&server).await;
    Mock::given(method("POST"))
        .and(path(RESOLVE))
        .and(body_partial_json(json!({ "action": "cancel" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "Upload canceled" })))
        .expect(1)
        .mount(&server)
        .await;

    let mut uploader = uploader(&server, face_slot());
    uploader.select_file(photo()).unwrap();
    uploader.upload().await.unwrap();

    uploader.discard().await;
    assert!(uploader.pending().is_none());
}

#[tokio::test]
async fn failed_proceed_without_retry_cancels_temp_upload() {
    let server = MockServer::start().await;
    mount_conflict_upload(&server).await;
    Mock::given(method("POST"))
        .and(path(RESOLVE))
        .and(body_partial_json(json!({ "action": "proceed" })))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "message": "Storage offline" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(RESOLVE))
        .and(body_partial_json(json!({ "tempPath": "uploads/tmp/abc.png", "action": "cancel" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "Upload canceled" })))
        .expect(1)
        .mount(&server)
        .await;

    let mut uploader = uploader(&server, face_slot());
    uploader.select_file(photo()).unwrap();
    uploader.upload().await.unwrap();

    let err = uploader.resolve_or_discard(ResolveAction::Proceed).await.unwrap_err();
    assert_eq!(err.user_message("Error confirming profile picture"), "Storage offline");
    assert!(uploader.pending().is_none());
    assert!(uploader.selected().is_none());
    assert_eq!(uploader.current_picture(), Some("http://cdn/old.jpg"));
}
