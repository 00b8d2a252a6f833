//! Still-frame pipeline: freezing live video and preparing it for classifiers.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::Utc;
use image::{imageops, ImageBuffer, Rgba, RgbaImage};
use pilah_types::{
    vision::{StillFrame, VideoFrame},
    PilahError, Result,
};
use tracing::debug;

mod encode;
mod tensor;

pub use encode::{decode_data_url, encode_jpeg, to_data_url, JPEG_DATA_URL_PREFIX};
pub use tensor::{preprocess, InputTensor};

/// Freeze a live video frame into a [`StillFrame`].
///
/// With `mirror` the frame is flipped horizontally for the draw only; the
/// transform does not carry over to later draws.
pub fn freeze_frame(frame: &VideoFrame, mirror: bool) -> Result<StillFrame> {
    let surface = rgba_surface(frame.width, frame.height, frame.data.clone())?;
    let drawn = if mirror {
        imageops::flip_horizontal(&surface)
    } else {
        surface
    };
    debug!(
        "Froze {}x{} frame (mirror: {})",
        frame.width, frame.height, mirror
    );
    StillFrame::from_rgba(frame.width, frame.height, drawn.into_raw(), mirror)
}

/// Write the still as a timestamped PNG under `dir`.
pub fn persist_capture(still: &StillFrame, dir: impl AsRef<Path>) -> Result<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)
        .map_err(|err| vision_error(format!("failed to create capture dir {:?}: {err}", dir)))?;
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S_%3f");
    let path = dir.join(format!("still_{}.png", timestamp));
    let buffer = still_surface(still)?;
    buffer
        .save(&path)
        .map_err(|err| vision_error(format!("failed to save still: {err}")))?;
    Ok(path)
}

pub(crate) fn still_surface(still: &StillFrame) -> Result<RgbaImage> {
    rgba_surface(still.width, still.height, still.data.clone())
}

fn rgba_surface(width: u32, height: u32, data: Vec<u8>) -> Result<RgbaImage> {
    ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, data)
        .ok_or_else(|| vision_error(format!("pixel buffer does not match {width}x{height}")))
}

pub fn vision_error(message: impl Into<String>) -> PilahError {
    PilahError::EncodeFailure(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn striped_frame(width: u32, height: u32) -> VideoFrame {
        let mut data = Vec::new();
        for _y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as u8 * 10, 0, 0, 255]);
            }
        }
        VideoFrame::from_rgba(width, height, data).expect("frame")
    }

    #[test]
    fn freeze_keeps_native_dimensions() {
        let frame = striped_frame(5, 3);
        let still = freeze_frame(&frame, false).expect("freeze");
        assert_eq!(still.dimensions(), frame.dimensions());
        assert_eq!(still.data, frame.data);
        assert!(!still.mirrored);
    }

    #[test]
    fn mirror_flips_columns() {
        let frame = striped_frame(4, 2);
        let still = freeze_frame(&frame, true).expect("freeze");
        assert_eq!(still.dimensions(), (4, 2));
        assert!(still.mirrored);
        assert_eq!(still.pixel(0, 0).map(|p| p[0]), Some(30));
        assert_eq!(still.pixel(3, 1).map(|p| p[0]), Some(0));
    }

    #[test]
    fn persist_capture_writes_png() {
        let dir = tempfile::tempdir().expect("temp dir");
        let still = freeze_frame(&striped_frame(3, 3), false).expect("freeze");
        let path = persist_capture(&still, dir.path().join("captures")).expect("persist");
        assert!(path.exists());
        let reloaded = image::open(&path).expect("reload").to_rgba8();
        assert_eq!(reloaded.dimensions(), (3, 3));
    }
}
