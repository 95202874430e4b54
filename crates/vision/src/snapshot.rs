//! JPEG snapshots of frames with an unknown face.

use std::path::{Path, PathBuf};

use chrono::Local;

use crate::error::VisionError;
use crate::frame::Frame;

/// Write `frame` as `<dir>/<prefix>_YYYYMMDD_HHMMSS_ffffff.jpg`.
///
/// The directory is created on demand. Returns the written path.
pub fn save_snapshot(frame: &Frame, dir: impl AsRef<Path>, prefix: &str) -> Result<PathBuf, VisionError> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    let name = format!("{prefix}_{}.jpg", Local::now().format("%Y%m%d_%H%M%S_%6f"));
    let path = dir.join(name);

    let image = image::GrayImage::from_raw(frame.width(), frame.height(), frame.pixels().to_vec()).ok_or(
        VisionError::FrameSize {
            expected: frame.width() as usize * frame.height() as usize,
            actual: frame.pixels().len(),
        },
    )?;
    image.save(&path)?;

    tracing::debug!(path = %path.display(), "snapshot saved");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_decodable_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let mut frame = Frame::filled(32, 24, 40);
        for p in frame.pixels_mut().iter_mut().step_by(3) {
            *p = 220;
        }

        let path = save_snapshot(&frame, dir.path().join("snapshots"), "unknown").unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("unknown_"));
        assert!(name.ends_with(".jpg"));

        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }
}
