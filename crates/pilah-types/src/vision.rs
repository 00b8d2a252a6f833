use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{PilahError, Result};

/// Bytes per pixel of every raster in the cycle (RGBA8).
pub const RGBA_CHANNELS: usize = 4;

/// Which physical camera a stream request prefers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Front camera, the one looking at the user.
    User,
    /// Rear camera on handheld devices.
    #[default]
    Environment,
}

impl FacingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            FacingMode::User => "user",
            FacingMode::Environment => "environment",
        }
    }
}

/// Frame read from a live camera stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// Raw RGBA pixel buffer, row major.
    pub data: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

impl VideoFrame {
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        check_buffer(width, height, &data)?;
        Ok(Self {
            width,
            height,
            data,
            captured_at: Utc::now(),
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Single raster frozen from live video at capture time.
///
/// The dimensions always equal the video's native dimensions at the moment of
/// the freeze; only a classifier's own preprocessing may resize it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StillFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    /// Whether the horizontal mirror transform was applied during the draw.
    pub mirrored: bool,
    pub captured_at: DateTime<Utc>,
}

impl StillFrame {
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>, mirrored: bool) -> Result<Self> {
        check_buffer(width, height, &data)?;
        Ok(Self {
            width,
            height,
            data,
            mirrored,
            captured_at: Utc::now(),
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// RGBA value at `(x, y)`, `None` outside the raster.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * RGBA_CHANNELS;
        let px = self.data.get(idx..idx + RGBA_CHANNELS)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

fn check_buffer(width: u32, height: u32, data: &[u8]) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(PilahError::FrameNotReady(format!(
            "frame has no dimensions ({width}x{height})"
        )));
    }
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(RGBA_CHANNELS))
        .ok_or_else(|| PilahError::EncodeFailure("frame dimensions overflow".into()))?;
    if data.len() != expected {
        return Err(PilahError::EncodeFailure(format!(
            "expected {expected} RGBA bytes for {width}x{height}, received {}",
            data.len()
        )));
    }
    Ok(())
}
