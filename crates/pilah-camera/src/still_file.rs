use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use pilah_types::{
    vision::{FacingMode, VideoFrame},
    PilahError, Result,
};
use tracing::info;

use crate::{camera_error, CameraMetrics, CameraSource, CameraStream};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Camera that serves images from disk as its live frame.
///
/// A file path always yields that file; a directory yields its images in name
/// order, advancing one image per `open`.
pub struct StillFileCamera {
    path: PathBuf,
    cursor: Arc<Mutex<usize>>,
    metrics: Arc<Mutex<CameraMetrics>>,
}

impl StillFileCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cursor: Arc::new(Mutex::new(0)),
            metrics: Arc::new(Mutex::new(CameraMetrics::default())),
        }
    }

    fn next_image(&self) -> Result<PathBuf> {
        let candidates = list_images(&self.path)?;
        let mut cursor = self
            .cursor
            .lock()
            .map_err(|_| camera_error("failed to lock still cursor"))?;
        let chosen = candidates[*cursor % candidates.len()].clone();
        *cursor = cursor.wrapping_add(1);
        Ok(chosen)
    }

    fn record_open(&self, facing: FacingMode, denied: bool) {
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.open_requests += 1;
            metrics.last_facing = Some(facing);
            if denied {
                metrics.denied_requests += 1;
            }
        }
    }
}

fn list_images(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let entries = fs::read_dir(path)
        .map_err(|err| camera_error(format!("cannot read still source {:?}: {err}", path)))?;
    let mut images: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    images.sort();
    if images.is_empty() {
        return Err(camera_error(format!("no images found in {:?}", path)));
    }
    Ok(images)
}

fn decode_still(path: &Path) -> Result<VideoFrame> {
    let img = image::open(path)
        .map_err(|err| camera_error(format!("failed to decode {:?}: {err}", path)))?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    VideoFrame::from_rgba(width, height, rgba.into_raw())
}

#[async_trait]
impl CameraSource for StillFileCamera {
    async fn open(&self, facing: FacingMode) -> Result<Box<dyn CameraStream>> {
        let image_path = match self.next_image() {
            Ok(path) => path,
            Err(err) => {
                self.record_open(facing, true);
                return Err(err);
            }
        };
        let decode_path = image_path.clone();
        let decoded = tokio::task::spawn_blocking(move || decode_still(&decode_path))
            .await
            .map_err(|err| camera_error(format!("still decode task failed: {err}")))?;
        let frame = match decoded {
            Ok(frame) => frame,
            Err(err) => {
                self.record_open(facing, true);
                return Err(err);
            }
        };
        self.record_open(facing, false);
        info!(
            "Still camera serving {:?} ({}x{})",
            image_path, frame.width, frame.height
        );
        Ok(Box::new(StillStream {
            frame,
            live: true,
            metrics: Arc::clone(&self.metrics),
        }))
    }

    fn metrics(&self) -> CameraMetrics {
        self.metrics.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

struct StillStream {
    frame: VideoFrame,
    live: bool,
    metrics: Arc<Mutex<CameraMetrics>>,
}

impl CameraStream for StillStream {
    fn dimensions(&self) -> Option<(u32, u32)> {
        self.live.then(|| self.frame.dimensions())
    }

    fn read_frame(&self) -> Result<VideoFrame> {
        if !self.live {
            return Err(PilahError::FrameNotReady("camera stream is stopped".into()));
        }
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.frames_read += 1;
        }
        let mut frame = self.frame.clone();
        frame.captured_at = chrono::Utc::now();
        Ok(frame)
    }

    fn stop_all_tracks(&mut self) -> usize {
        if !self.live {
            return 0;
        }
        self.live = false;
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.track_stops += 1;
        }
        1
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

impl Drop for StillStream {
    fn drop(&mut self) {
        self.stop_all_tracks();
    }
}
