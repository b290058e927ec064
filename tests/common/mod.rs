#![allow(dead_code)]

use idverify::protocol::{PictureRef, User};
use idverify::{ApiClient, FaceBox, FaceDetection, Navigator, Route, SessionContext};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use wiremock::MockServer;

/// Records every navigation request.
#[derive(Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<Route>>,
}

impl RecordingNavigator {
    pub fn routes(&self) -> Vec<Route> {
        self.routes.lock().unwrap().clone()
    }

    pub fn count(&self, route: Route) -> usize {
        self.routes().into_iter().filter(|r| *r == route).count()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: Route) {
        self.routes.lock().unwrap().push(route);
    }
}

/// Detector returning a fixed answer.
pub struct FakeDetector(pub Vec<FaceBox>);

impl FaceDetection for FakeDetector {
    fn detect(&self, _image: &DynamicImage) -> idverify::Result<Vec<FaceBox>> {
        Ok(self.0.clone())
    }
}

pub fn one_face() -> FakeDetector {
    FakeDetector(vec![FaceBox { x1: 10.0, y1: 10.0, x2: 50.0, y2: 60.0, confidence: 0.92 }])
}

pub fn test_user(picture: Option<&str>) -> User {
    User {
        id: "u1".into(),
        name: "Test User".into(),
        email: "test@example.com".into(),
        national_id: None,
        profile_picture: picture.map(|url| PictureRef { url: url.to_string() }),
    }
}

/// Client against `server` with no session token.
pub fn anonymous_client(server: &MockServer) -> (ApiClient, Arc<RecordingNavigator>) {
    let navigator = Arc::new(RecordingNavigator::default());
    let session = Arc::new(SessionContext::new(navigator.clone()));
    (ApiClient::with_http(reqwest::Client::new(), &server.uri(), session), navigator)
}

/// Client against `server` signed in as [`test_user`].
pub fn signed_in_client(server: &MockServer, picture: Option<&str>) -> (ApiClient, Arc<RecordingNavigator>) {
    let (client, navigator) = anonymous_client(server);
    client
        .session()
        .set_token("test-token".into(), Some(test_user(picture)))
        .unwrap();
    (client, navigator)
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([120, 90, 60])));
    let mut buf = Vec::new();
    image.write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png).unwrap();
    buf
}
