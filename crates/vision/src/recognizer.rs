//! Face classification boundary.
//!
//! Detection and recognition models live outside this process. A
//! [`FaceRecognizer`] returns every face it found with the best-matching
//! enrolled label and its distance; [`FaceClassifier`] turns that into a
//! single [`Classification`] for the tick.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use smartcam_core::Classification;

use crate::error::VisionError;
use crate::frame::Frame;

/// Axis-aligned face bounding box in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Region {
    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }
}

/// One detected face with its closest enrolled identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceMatch {
    #[serde(flatten)]
    pub region: Region,
    /// Closest enrolled label, if the model produced one.
    #[serde(default)]
    pub label: Option<String>,
    /// Match distance; lower is better.
    pub distance: f64,
}

/// External face detection + recognition capability.
#[async_trait]
pub trait FaceRecognizer: Send + Sync {
    /// All faces found in `frame`. An empty vec means no face.
    async fn recognize(&self, frame: &Frame) -> Result<Vec<FaceMatch>, VisionError>;

    /// Human-readable backend name for logs.
    fn name(&self) -> &str;
}

// ── HTTP backend ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    faces: Vec<FaceMatch>,
}

/// Sends raw frames to a recognition service over HTTP.
///
/// The request body is the raw grayscale buffer with the dimensions in
/// `X-Frame-Width` / `X-Frame-Height`. The service answers with
/// `{"faces": [{"x", "y", "w", "h", "label", "distance"}]}`.
#[derive(Debug)]
pub struct HttpRecognizer {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpRecognizer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, VisionError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }
}

#[async_trait]
impl FaceRecognizer for HttpRecognizer {
    async fn recognize(&self, frame: &Frame) -> Result<Vec<FaceMatch>, VisionError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .header("X-Frame-Width", frame.width())
            .header("X-Frame-Height", frame.height())
            .body(frame.pixels().to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(VisionError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: RecognizeResponse = response.json().await?;
        Ok(parsed.faces)
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Recognizer used when no service is configured: never sees a face.
#[derive(Debug, Default)]
pub struct DisabledRecognizer;

#[async_trait]
impl FaceRecognizer for DisabledRecognizer {
    async fn recognize(&self, _frame: &Frame) -> Result<Vec<FaceMatch>, VisionError> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

// ── Classification policy ─────────────────────────────────────

/// Applies the per-tick classification policy on top of a recognizer.
///
/// Only the largest face is evaluated. It is reported as its label when the
/// distance is below `unknown_distance`, otherwise as "unknown". Recognizer
/// failures and timeouts degrade to "none".
pub struct FaceClassifier {
    recognizer: Arc<dyn FaceRecognizer>,
    unknown_distance: f64,
    timeout: Duration,
}

impl FaceClassifier {
    pub fn new(recognizer: Arc<dyn FaceRecognizer>, unknown_distance: f64, timeout: Duration) -> Self {
        Self {
            recognizer,
            unknown_distance,
            timeout,
        }
    }

    pub async fn classify(&self, frame: &Frame) -> Classification {
        if frame.pixels().is_empty() {
            return Classification::none();
        }

        let faces = match tokio::time::timeout(self.timeout, self.recognizer.recognize(frame)).await {
            Ok(Ok(faces)) => faces,
            Ok(Err(e)) => {
                tracing::warn!(
                    recognizer = self.recognizer.name(),
                    error = %e,
                    "face recognition failed, treating as no face"
                );
                return Classification::none();
            }
            Err(_) => {
                tracing::warn!(
                    recognizer = self.recognizer.name(),
                    timeout = ?self.timeout,
                    "face recognition timed out, treating as no face"
                );
                return Classification::none();
            }
        };

        match largest_face(&faces) {
            Some(face) => self.label_face(face),
            None => Classification::none(),
        }
    }

    fn label_face(&self, face: &FaceMatch) -> Classification {
        match &face.label {
            Some(label) if face.distance < self.unknown_distance => {
                Classification::known(label.clone(), face.distance)
            }
            _ => Classification::unknown(face.distance),
        }
    }
}

/// Largest face by area; the first one wins ties. Degenerate (zero-area)
/// regions are ignored.
pub fn largest_face(faces: &[FaceMatch]) -> Option<&FaceMatch> {
    faces
        .iter()
        .filter(|f| f.region.area() > 0)
        .fold(None, |best: Option<&FaceMatch>, f| match best {
            Some(b) if b.region.area() >= f.region.area() => Some(b),
            _ => Some(f),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartcam_core::Identity;

    struct StubRecognizer {
        result: Result<Vec<FaceMatch>, u16>,
        delay: Duration,
    }

    #[async_trait]
    impl FaceRecognizer for StubRecognizer {
        async fn recognize(&self, _frame: &Frame) -> Result<Vec<FaceMatch>, VisionError> {
            tokio::time::sleep(self.delay).await;
            self.result.clone().map_err(|status| VisionError::Service {
                status,
                body: "stub".to_string(),
            })
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    fn face(w: u32, h: u32, label: Option<&str>, distance: f64) -> FaceMatch {
        FaceMatch {
            region: Region { x: 0, y: 0, w, h },
            label: label.map(str::to_string),
            distance,
        }
    }

    fn classifier(result: Result<Vec<FaceMatch>, u16>) -> FaceClassifier {
        let stub = StubRecognizer {
            result,
            delay: Duration::ZERO,
        };
        FaceClassifier::new(Arc::new(stub), 70.0, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn close_match_is_known() {
        let c = classifier(Ok(vec![face(100, 100, Some("alice"), 42.0)]));
        let result = c.classify(&Frame::filled(4, 4, 0)).await;
        assert_eq!(result.identity, Identity::Known("alice".into()));
        assert_eq!(result.confidence, 42.0);
    }

    #[tokio::test]
    async fn distance_at_threshold_is_unknown() {
        let c = classifier(Ok(vec![face(100, 100, Some("alice"), 70.0)]));
        let result = c.classify(&Frame::filled(4, 4, 0)).await;
        assert_eq!(result.identity, Identity::Unknown);
        assert_eq!(result.confidence, 70.0);
    }

    #[tokio::test]
    async fn only_largest_face_counts() {
        let c = classifier(Ok(vec![
            face(80, 80, Some("alice"), 30.0),
            face(120, 120, Some("bob"), 95.0),
        ]));
        let result = c.classify(&Frame::filled(4, 4, 0)).await;
        assert_eq!(result.identity, Identity::Unknown);
    }

    #[tokio::test]
    async fn no_faces_is_none() {
        let c = classifier(Ok(vec![]));
        assert_eq!(c.classify(&Frame::filled(4, 4, 0)).await, Classification::none());
    }

    #[tokio::test]
    async fn service_error_degrades_to_none() {
        let c = classifier(Err(503));
        assert_eq!(c.classify(&Frame::filled(4, 4, 0)).await, Classification::none());
    }

    #[tokio::test]
    async fn slow_recognizer_times_out_to_none() {
        let stub = StubRecognizer {
            result: Ok(vec![face(100, 100, None, 10.0)]),
            delay: Duration::from_millis(200),
        };
        let c = FaceClassifier::new(Arc::new(stub), 70.0, Duration::from_millis(20));
        assert_eq!(c.classify(&Frame::filled(4, 4, 0)).await, Classification::none());
    }

    #[tokio::test]
    async fn empty_frame_is_none() {
        let c = classifier(Ok(vec![face(100, 100, Some("alice"), 1.0)]));
        let frame = Frame::new(0, 0, Vec::new()).unwrap();
        assert_eq!(c.classify(&frame).await, Classification::none());
    }

    #[test]
    fn largest_face_skips_zero_area_and_keeps_first_on_tie() {
        let faces = vec![
            face(0, 500, Some("ghost"), 1.0),
            face(50, 50, Some("first"), 1.0),
            face(50, 50, Some("second"), 1.0),
        ];
        assert_eq!(largest_face(&faces).unwrap().label.as_deref(), Some("first"));
    }

    #[test]
    fn face_match_parses_flat_json() {
        let json = r#"{"x": 10, "y": 20, "w": 90, "h": 100, "label": "carol", "distance": 55.5}"#;
        let parsed: FaceMatch = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.region.area(), 9_000);
        assert_eq!(parsed.label.as_deref(), Some("carol"));
    }
}
