pub mod conflict;
pub mod detector;
pub mod identity;
pub mod notifications;
pub mod profile;
pub mod selection;
pub mod status;
pub mod uploader;

pub use conflict::{ConflictResolver, PendingUpload, ResolveOutcome, ResolverState, resolve_temp_path};
pub use detector::{FaceDetector, FaceDetection, FaceBox, DetectorSlot, DetectorState};
pub use identity::IdUploader;
pub use notifications::NotificationCenter;
pub use selection::{LocalFile, SelectedPicture, MAX_UPLOAD_BYTES};
pub use status::{VerificationFlags, VerificationStatus, fetch_status};
pub use uploader::{PictureUploader, UploadOutcome};
