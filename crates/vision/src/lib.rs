//! Frame acquisition, motion gating and face classification.

pub mod error;
pub mod frame;
pub mod motion;
pub mod recognizer;
pub mod snapshot;

pub use error::VisionError;
pub use frame::{Frame, FrameSource, RawFrameReader};
pub use motion::MotionGate;
pub use recognizer::{DisabledRecognizer, FaceClassifier, FaceMatch, FaceRecognizer, HttpRecognizer, Region};
pub use snapshot::save_snapshot;
