//! Captured frames and pixel format conversion.

use std::io::Cursor;

/// A captured grayscale camera frame.
#[derive(Clone)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u32,
}

impl Frame {
    /// Encode the frame as PNG.
    pub fn to_png(&self) -> Result<Vec<u8>, FrameError> {
        let img = image::GrayImage::from_raw(self.width, self.height, self.data.clone()).ok_or(
            FrameError::InvalidLength {
                expected: (self.width * self.height) as usize,
                actual: self.data.len(),
            },
        )?;
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png)
            .map_err(|e| FrameError::Encode(e.to_string()))?;
        Ok(out.into_inner())
    }

    /// True when more than 95% of pixels are in the darkest eighth (lens covered, lights off).
    pub fn is_dark(&self) -> bool {
        if self.data.is_empty() {
            return true;
        }
        let dark = self.data.iter().filter(|&&p| p < 32).count();
        dark as f32 / self.data.len() as f32 > 0.95
    }
}

/// Extract the Y channel of packed YUYV 4:2:2 ([Y0, U, Y1, V] per two pixels).
pub fn yuyv_to_grayscale(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }
    Ok(yuyv[..expected].iter().step_by(2).copied().collect())
}

/// Downscale 16-bit little-endian grayscale to 8 bits.
pub fn y16_to_grayscale(y16: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if y16.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: y16.len(),
        });
    }
    // High byte of each little-endian pair.
    Ok(y16[..expected].chunks_exact(2).map(|px| px[1]).collect())
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("png encoding failed: {0}")]
    Encode(String),
}
