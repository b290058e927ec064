use crate::common::{VerifyError, Result, Config};
use ort::{Environment, Session, SessionBuilder, Value, GraphOptimizationLevel};
use std::path::Path;
use std::sync::Arc;
use image::{DynamicImage, Rgb, RgbImage, imageops::FilterType};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use ndarray::{Array4, CowArray};
use tokio::sync::watch;

const NMS_IOU_THRESHOLD: f32 = 0.45;
const MAX_FACES: usize = 5;
const MIN_BOX_SIDE: f32 = 10.0;

#[derive(Debug, Clone, PartialEq)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

impl FaceBox {
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}

/// Anything that can find faces in a decoded image.
pub trait FaceDetection: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceBox>>;
}

/// YOLO-style ONNX face detector.
pub struct FaceDetector {
    session: Session,
    _environment: Arc<Environment>,
    input_width: u32,
    input_height: u32,
    confidence: f32,
}

impl FaceDetector {
    /// Loads the model; a relative `models.detector_path` is resolved against `models_base`.
    pub fn new(config: &Config, models_base: &Path) -> Result<Self> {
        let mut model_path = config.models.detector_path.clone();
        if model_path.is_relative() {
            model_path = models_base.join(&model_path);
        }

        if !model_path.exists() {
            return Err(VerifyError::Model(
                format!("Detector model not found at: {:?}", model_path)
            ));
        }

        let environment = Arc::new(
            Environment::builder()
                .with_name("face_detector")
                .build()
                .map_err(|e| VerifyError::Model(format!("Failed to create environment: {}", e)))?
        );

        let opt_level = match config.detector.optimization_level {
            0 => GraphOptimizationLevel::Disable,
            1 => GraphOptimizationLevel::Level1,
            2 => GraphOptimizationLevel::Level2,
            _ => GraphOptimizationLevel::Level3,
        };
        let session = SessionBuilder::new(&environment)?
            .with_optimization_level(opt_level)?
            .with_model_from_file(&model_path)?;

        tracing::info!("Face detector loaded from {:?}", model_path);

        Ok(Self {
            session,
            _environment: environment,
            input_width: config.detector.input_width,
            input_height: config.detector.input_height,
            confidence: config.detector.detection_confidence,
        })
    }

    fn image_to_array(&self, img: &DynamicImage) -> Array4<f32> {
        let rgb = img.to_rgb8();
        let width = rgb.width() as usize;
        let height = rgb.height() as usize;
        let mut array = Array4::<f32>::zeros((1, 3, height, width));

        let norm_factor = 1.0 / 255.0;
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            array[[0, 0, y, x]] = pixel[0] as f32 * norm_factor;
            array[[0, 1, y, x]] = pixel[1] as f32 * norm_factor;
            array[[0, 2, y, x]] = pixel[2] as f32 * norm_factor;
        }

        array
    }
}

impl FaceDetection for FaceDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceBox>> {
        let orig_width = image.width() as f32;
        let orig_height = image.height() as f32;

        let img_array = if image.width() == self.input_width && image.height() == self.input_height {
            self.image_to_array(image)
        } else {
            let resized = image.resize_exact(self.input_width, self.input_height, FilterType::Triangle);
            self.image_to_array(&resized)
        };

        let cow_array = CowArray::from(img_array.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;
        let outputs = self.session.run(vec![input_tensor])?;

        let first = outputs
            .first()
            .ok_or_else(|| VerifyError::Model("Detector produced no outputs".into()))?;
        let extracted = first.try_extract::<f32>()?;
        let output = extracted.view().to_owned();
        let shape = output.shape().to_vec();
        let data: Vec<f32> = output.iter().copied().collect();

        let mut faces = decode_predictions(
            &data,
            &shape,
            self.input_width as f32,
            self.input_height as f32,
            self.confidence,
        );

        // Back to original image coordinates
        let scale_x = orig_width / self.input_width as f32;
        let scale_y = orig_height / self.input_height as f32;
        for face in &mut faces {
            face.x1 *= scale_x;
            face.x2 *= scale_x;
            face.y1 *= scale_y;
            face.y2 *= scale_y;
        }

        tracing::debug!("Detected {} face(s)", faces.len());
        Ok(faces)
    }
}

/// Turns raw YOLO output into boxes in model input coordinates.
///
/// Accepts `[1, N, 5+]`, the transposed `[1, 5+, N]`, and `[N, 5+]`.
/// Boxes are NMS-filtered, thresholded at `confidence`, sorted best first
/// and capped at five.
pub fn decode_predictions(
    output: &[f32],
    shape: &[usize],
    input_width: f32,
    input_height: f32,
    confidence: f32,
) -> Vec<FaceBox> {
    let (num_predictions, prediction_length, is_transposed) = match shape.len() {
        n if n >= 3 => {
            if shape[2] > shape[1] && shape[1] <= 10 {
                (shape[2], shape[1], true)
            } else {
                (shape[1], shape[2], false)
            }
        }
        2 => (shape[0], shape[1], false),
        _ => {
            tracing::warn!("Unexpected output shape: {:?}", shape);
            return Vec::new();
        }
    };

    if prediction_length < 4 || output.len() < num_predictions * prediction_length {
        tracing::warn!("Detector output too short for shape {:?}", shape);
        return Vec::new();
    }

    let at = |i: usize, field: usize| -> f32 {
        if field >= prediction_length {
            return 0.0;
        }
        if is_transposed {
            output[field * num_predictions + i]
        } else {
            output[i * prediction_length + field]
        }
    };

    let mut faces = Vec::new();
    for i in 0..num_predictions {
        let (cx, cy, w, h, score) = (at(i, 0), at(i, 1), at(i, 2), at(i, 3), at(i, 4));
        if score <= 0.001 {
            continue;
        }

        // Normalised coordinates are scaled up to input pixels
        let normalised = cx <= 1.0 && cy <= 1.0 && w <= 1.0 && h <= 1.0;
        let (sx, sy) = if normalised { (input_width, input_height) } else { (1.0, 1.0) };
        let (cx, cy, w, h) = (cx * sx, cy * sy, w * sx, h * sy);

        let x1 = (cx - w / 2.0).max(0.0);
        let y1 = (cy - h / 2.0).max(0.0);
        let x2 = (cx + w / 2.0).min(input_width);
        let y2 = (cy + h / 2.0).min(input_height);

        if x2 - x1 > MIN_BOX_SIDE && y2 - y1 > MIN_BOX_SIDE {
            faces.push(FaceBox { x1, y1, x2, y2, confidence: score });
        }
    }

    let mut faces = apply_nms(faces, NMS_IOU_THRESHOLD);
    faces.retain(|face| face.confidence >= confidence);
    faces.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    faces.truncate(MAX_FACES);
    faces
}

pub fn apply_nms(mut boxes: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<FaceBox> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|kept| calculate_iou(kept, &candidate) < iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

pub fn calculate_iou(box1: &FaceBox, box2: &FaceBox) -> f32 {
    let x1 = box1.x1.max(box2.x1);
    let y1 = box1.y1.max(box2.y1);
    let x2 = box1.x2.min(box2.x2);
    let y2 = box1.y2.min(box2.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = box1.width() * box1.height() + box2.width() * box2.height() - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Copy of `image` with each detected face outlined, for debug captures.
pub fn annotate(image: &DynamicImage, faces: &[FaceBox]) -> RgbImage {
    let mut canvas = image.to_rgb8();
    for face in faces {
        let width = face.width().max(1.0) as u32;
        let height = face.height().max(1.0) as u32;
        let rect = Rect::at(face.x1 as i32, face.y1 as i32).of_size(width, height);
        draw_hollow_rect_mut(&mut canvas, rect, Rgb([0u8, 255u8, 0u8]));
    }
    canvas
}

/// Lifecycle of the detector, which loads in the background.
#[derive(Clone)]
pub enum DetectorState {
    Loading,
    Ready(Arc<dyn FaceDetection>),
    Failed(String),
}

impl std::fmt::Debug for DetectorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectorState::Loading => write!(f, "Loading"),
            DetectorState::Ready(_) => write!(f, "Ready"),
            DetectorState::Failed(reason) => write!(f, "Failed({})", reason),
        }
    }
}

/// Shared handle to a detector that may still be initialising.
#[derive(Clone)]
pub struct DetectorSlot {
    rx: watch::Receiver<DetectorState>,
}

impl DetectorSlot {
    /// Starts loading the ONNX model on the blocking pool. A load failure is
    /// logged and kept as [`DetectorState::Failed`]; it never panics.
    pub fn spawn_load(config: Config, models_base: std::path::PathBuf) -> Self {
        let (tx, rx) = watch::channel(DetectorState::Loading);
        tokio::task::spawn_blocking(move || {
            let state = match FaceDetector::new(&config, &models_base) {
                Ok(detector) => DetectorState::Ready(Arc::new(detector)),
                Err(e) => {
                    tracing::warn!("Face detection model failed to load: {}", e);
                    DetectorState::Failed(e.to_string())
                }
            };
            let _ = tx.send(state);
        });
        Self { rx }
    }

    pub fn ready(detector: Arc<dyn FaceDetection>) -> Self {
        Self::fixed(DetectorState::Ready(detector))
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::fixed(DetectorState::Failed(reason.into()))
    }

    fn fixed(state: DetectorState) -> Self {
        let (_tx, rx) = watch::channel(state);
        Self { rx }
    }

    pub fn state(&self) -> DetectorState {
        self.rx.borrow().clone()
    }

    /// The loaded detector, or `DetectorUnavailable` while loading or after a failure.
    pub fn current(&self) -> Result<Arc<dyn FaceDetection>> {
        match self.state() {
            DetectorState::Ready(detector) => Ok(detector),
            DetectorState::Loading => Err(VerifyError::DetectorUnavailable(
                "face detection model is still loading".into(),
            )),
            DetectorState::Failed(reason) => Err(VerifyError::DetectorUnavailable(reason)),
        }
    }

    /// Waits until loading finished one way or the other.
    pub async fn wait_ready(&self) -> DetectorState {
        let mut rx = self.rx.clone();
        loop {
            if !matches!(*rx.borrow(), DetectorState::Loading) {
                return rx.borrow().clone();
            }
            if rx.changed().await.is_err() {
                let state = rx.borrow().clone();
                return match state {
                    DetectorState::Loading => {
                        DetectorState::Failed("detector initialisation aborted".into())
                    }
                    other => other,
                };
            }
        }
    }
}

/// Runs `detector` on the blocking pool.
pub async fn detect_in_background(
    detector: Arc<dyn FaceDetection>,
    image: DynamicImage,
) -> Result<Vec<FaceBox>> {
    tokio::task::spawn_blocking(move || detector.detect(&image))
        .await
        .map_err(|e| VerifyError::Model(format!("Face detection task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> FaceBox {
        FaceBox { x1, y1, x2, y2, confidence }
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = face(0.0, 0.0, 10.0, 10.0, 0.9);
        let b = face(20.0, 20.0, 30.0, 30.0, 0.9);
        assert!((calculate_iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(calculate_iou(&a, &b), 0.0);
    }

    #[test]
    fn nms_keeps_best_of_overlapping() {
        let boxes = vec![
            face(0.0, 0.0, 100.0, 100.0, 0.6),
            face(2.0, 2.0, 102.0, 102.0, 0.9),
            face(300.0, 300.0, 400.0, 400.0, 0.7),
        ];
        let kept = apply_nms(boxes, 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.7);
    }

    #[test]
    fn decodes_standard_layout() {
        // Two predictions of [cx, cy, w, h, score]
        let output = vec![
            320.0, 320.0, 100.0, 120.0, 0.92, //
            50.0, 50.0, 4.0, 4.0, 0.99, // too small
        ];
        let faces = decode_predictions(&output, &[1, 2, 5], 640.0, 640.0, 0.5);
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0], face(270.0, 260.0, 370.0, 380.0, 0.92));
    }

    #[test]
    fn decodes_transposed_layout_with_own_stride() {
        // Six predictions laid out field-major: [5, 6]
        let output = vec![
            100.0, 400.0, 0.0, 0.0, 0.0, 0.0, // cx
            100.0, 400.0, 0.0, 0.0, 0.0, 0.0, // cy
            80.0, 80.0, 0.0, 0.0, 0.0, 0.0, // w
            80.0, 80.0, 0.0, 0.0, 0.0, 0.0, // h
            0.8, 0.3, 0.0, 0.0, 0.0, 0.0, // score
        ];
        let faces = decode_predictions(&output, &[1, 5, 6], 640.0, 640.0, 0.5);
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].confidence, 0.8);
        assert_eq!(faces[0].x1, 60.0);
    }

    #[test]
    fn normalised_boxes_scale_per_axis() {
        let output = vec![0.5, 0.5, 0.25, 0.5, 0.9];
        let faces = decode_predictions(&output, &[1, 5], 640.0, 320.0, 0.5);
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0], face(240.0, 80.0, 400.0, 240.0, 0.9));
    }

    #[test]
    fn unexpected_shape_yields_nothing() {
        assert!(decode_predictions(&[1.0, 2.0], &[2], 640.0, 640.0, 0.5).is_empty());
        assert!(decode_predictions(&[1.0; 4], &[1, 2, 5], 640.0, 640.0, 0.5).is_empty());
    }

    #[test]
    fn failed_slot_reports_unavailable() {
        let slot = DetectorSlot::failed("model missing");
        match slot.current() {
            Err(VerifyError::DetectorUnavailable(reason)) => assert_eq!(reason, "model missing"),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn spawn_load_with_missing_model_fails_softly() {
        let mut config = Config::default();
        config.models.detector_path = "does/not/exist.onnx".into();
        let slot = DetectorSlot::spawn_load(config, std::env::temp_dir());
        match slot.wait_ready().await {
            DetectorState::Failed(reason) => assert!(reason.contains("not found")),
            other => panic!("unexpected state: {:?}", other),
        }
    }

    #[test]
    fn annotate_draws_box_outline() {
        let image = DynamicImage::new_rgb8(50, 50);
        let canvas = annotate(&image, &[face(10.0, 10.0, 30.0, 30.0, 0.9)]);
        assert_eq!(canvas.get_pixel(10, 10), &Rgb([0, 255, 0]));
        assert_eq!(canvas.get_pixel(20, 20), &Rgb([0, 0, 0]));
    }
}
