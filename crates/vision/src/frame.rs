//! Grayscale frames and the raw-stream frame source.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::VisionError;

/// A single 8-bit grayscale frame, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Frame {
    /// Wrap a pixel buffer. The buffer length must be `width * height`.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, VisionError> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(VisionError::FrameSize {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self { width, height, pixels })
    }

    /// A frame with every pixel set to `value`.
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            width,
            height,
            pixels: vec![value; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }
}

/// Produces frames for the tick loop.
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` once the stream has ended.
    async fn next_frame(&mut self) -> Result<Option<Frame>, VisionError>;
}

/// Reads fixed-size raw grayscale frames from a byte stream.
///
/// Pairs with e.g. `ffmpeg -f v4l2 -i /dev/video0 -f rawvideo -pix_fmt gray -`.
/// Every read is bounded by `timeout` so a stalled camera cannot hang the loop.
pub struct RawFrameReader<R> {
    reader: R,
    width: u32,
    height: u32,
    timeout: Duration,
}

impl<R: AsyncRead + Unpin + Send> RawFrameReader<R> {
    pub fn new(reader: R, width: u32, height: u32, timeout: Duration) -> Self {
        Self {
            reader,
            width,
            height,
            timeout,
        }
    }

    async fn read_frame(&mut self) -> Result<Option<Frame>, VisionError> {
        let len = self.width as usize * self.height as usize;
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            let n = self.reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                if filled > 0 {
                    tracing::warn!(bytes = filled, expected = len, "discarding truncated final frame");
                }
                return Ok(None);
            }
            filled += n;
        }
        Frame::new(self.width, self.height, buf).map(Some)
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> FrameSource for RawFrameReader<R> {
    async fn next_frame(&mut self) -> Result<Option<Frame>, VisionError> {
        match tokio::time::timeout(self.timeout, self.read_frame()).await {
            Ok(result) => result,
            Err(_) => Err(VisionError::FrameTimeout(self.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_wrong_length() {
        let err = Frame::new(4, 4, vec![0; 15]).unwrap_err();
        assert!(matches!(err, VisionError::FrameSize { expected: 16, actual: 15 }));
    }

    #[tokio::test]
    async fn reads_consecutive_frames_then_eof() {
        let mut data = vec![10u8; 6];
        data.extend(vec![20u8; 6]);
        let mut reader = RawFrameReader::new(&data[..], 3, 2, Duration::from_secs(1));

        let first = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(first.pixels(), &[10; 6]);
        let second = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(second.pixels(), &[20; 6]);
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn truncated_tail_ends_stream() {
        let data = vec![1u8; 8];
        let mut reader = RawFrameReader::new(&data[..], 3, 2, Duration::from_secs(1));
        assert!(reader.next_frame().await.unwrap().is_some());
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stalled_stream_times_out() {
        let (_tx, rx) = tokio::io::duplex(64);
        let mut reader = RawFrameReader::new(rx, 2, 2, Duration::from_millis(20));
        let err = reader.next_frame().await.unwrap_err();
        assert!(matches!(err, VisionError::FrameTimeout(_)));
    }
}
