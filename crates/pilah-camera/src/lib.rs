//! Camera collaborator abstraction layer.

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use pilah_types::{
    config::{CameraConfig, CameraSourceKind},
    vision::{FacingMode, VideoFrame, RGBA_CHANNELS},
    PilahError, Result,
};
use tracing::{debug, info};

mod still_file;

pub use still_file::StillFileCamera;

/// Aggregated camera usage counters.
#[derive(Debug, Default, Clone)]
pub struct CameraMetrics {
    pub open_requests: u64,
    pub denied_requests: u64,
    pub frames_read: u64,
    /// Individual track stop calls issued across all streams.
    pub track_stops: u64,
    pub last_facing: Option<FacingMode>,
}

#[async_trait]
pub trait CameraSource: Send + Sync {
    /// Request a live stream, preferring the camera named by `facing`.
    async fn open(&self, facing: FacingMode) -> Result<Box<dyn CameraStream>>;
    fn metrics(&self) -> CameraMetrics;
}

/// Live stream handed out by a [`CameraSource`].
///
/// Implementations stop any still-live tracks when dropped so the device is
/// never left reserved.
pub trait CameraStream: Send + Sync {
    /// Native frame size once enough data is buffered, `None` before that.
    fn dimensions(&self) -> Option<(u32, u32)>;
    fn read_frame(&self) -> Result<VideoFrame>;
    /// Stop every live track and return how many were stopped.
    fn stop_all_tracks(&mut self) -> usize;
    fn is_live(&self) -> bool;
}

#[derive(Debug, Clone)]
struct SyntheticSettings {
    width: u32,
    height: u32,
    warmup: Duration,
    deny: bool,
    tracks: usize,
}

/// Camera producing a gradient test pattern, used for demos and tests.
#[derive(Clone)]
pub struct SyntheticCamera {
    settings: Arc<Mutex<SyntheticSettings>>,
    metrics: Arc<Mutex<CameraMetrics>>,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            settings: Arc::new(Mutex::new(SyntheticSettings {
                width,
                height,
                warmup: Duration::ZERO,
                deny: false,
                tracks: 1,
            })),
            metrics: Arc::new(Mutex::new(CameraMetrics::default())),
        }
    }

    pub fn from_config(config: &CameraConfig) -> Self {
        let camera = Self::new(config.width, config.height);
        camera.set_warmup(Duration::from_millis(config.warmup_ms));
        camera
    }

    /// Make subsequent `open` calls fail as if permission was refused.
    pub fn set_denied(&self, deny: bool) {
        if let Ok(mut settings) = self.settings.lock() {
            settings.deny = deny;
        }
    }

    /// How long a fresh stream reports "not buffered" after it is opened.
    pub fn set_warmup(&self, warmup: Duration) {
        if let Ok(mut settings) = self.settings.lock() {
            settings.warmup = warmup;
        }
    }

    pub fn set_track_count(&self, tracks: usize) {
        if let Ok(mut settings) = self.settings.lock() {
            settings.tracks = tracks.max(1);
        }
    }

    fn settings(&self) -> Result<SyntheticSettings> {
        self.settings
            .lock()
            .map(|s| s.clone())
            .map_err(|_| camera_error("failed to lock camera settings"))
    }
}

#[async_trait]
impl CameraSource for SyntheticCamera {
    async fn open(&self, facing: FacingMode) -> Result<Box<dyn CameraStream>> {
        let settings = self.settings()?;
        {
            let mut metrics = self
                .metrics
                .lock()
                .map_err(|_| camera_error("failed to lock camera metrics"))?;
            metrics.open_requests += 1;
            metrics.last_facing = Some(facing);
            if settings.deny {
                metrics.denied_requests += 1;
                return Err(camera_error("permission to use the camera was denied"));
            }
        }
        info!(
            "Opening synthetic camera {}x{} facing {}",
            settings.width,
            settings.height,
            facing.as_str()
        );
        Ok(Box::new(SyntheticStream {
            width: settings.width,
            height: settings.height,
            buffered_at: Instant::now() + settings.warmup,
            tracks: vec![true; settings.tracks],
            metrics: Arc::clone(&self.metrics),
        }))
    }

    fn metrics(&self) -> CameraMetrics {
        self.metrics.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

struct SyntheticStream {
    width: u32,
    height: u32,
    buffered_at: Instant,
    tracks: Vec<bool>,
    metrics: Arc<Mutex<CameraMetrics>>,
}

impl SyntheticStream {
    fn pattern(&self) -> Vec<u8> {
        let (w, h) = (self.width.max(1), self.height.max(1));
        let mut data = Vec::with_capacity(w as usize * h as usize * RGBA_CHANNELS);
        for y in 0..h {
            for x in 0..w {
                data.push((x * 255 / w) as u8);
                data.push((y * 255 / h) as u8);
                data.push(128);
                data.push(255);
            }
        }
        data
    }
}

impl CameraStream for SyntheticStream {
    fn dimensions(&self) -> Option<(u32, u32)> {
        if !self.is_live() {
            return None;
        }
        if Instant::now() < self.buffered_at {
            None
        } else {
            Some((self.width, self.height))
        }
    }

    fn read_frame(&self) -> Result<VideoFrame> {
        if !self.is_live() {
            return Err(PilahError::FrameNotReady("camera stream is stopped".into()));
        }
        let frame = VideoFrame::from_rgba(self.width, self.height, self.pattern())?;
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.frames_read += 1;
        }
        Ok(frame)
    }

    fn stop_all_tracks(&mut self) -> usize {
        let mut stopped = 0;
        for track in self.tracks.iter_mut().filter(|live| **live) {
            *track = false;
            stopped += 1;
        }
        if stopped > 0 {
            debug!("Stopped {} synthetic camera track(s)", stopped);
            if let Ok(mut metrics) = self.metrics.lock() {
                metrics.track_stops += stopped as u64;
            }
        }
        stopped
    }

    fn is_live(&self) -> bool {
        self.tracks.iter().any(|live| *live)
    }
}

impl Drop for SyntheticStream {
    fn drop(&mut self) {
        self.stop_all_tracks();
    }
}

/// Build the camera selected by configuration.
pub fn camera_from_config(config: &CameraConfig) -> Result<Box<dyn CameraSource>> {
    match config.source {
        CameraSourceKind::Synthetic => Ok(Box::new(SyntheticCamera::from_config(config))),
        CameraSourceKind::Still => {
            let path = config
                .still_path
                .as_ref()
                .ok_or_else(|| PilahError::Configuration("camera.still_path is not set".into()))?;
            Ok(Box::new(StillFileCamera::new(path)))
        }
    }
}

#[async_trait]
impl<T: CameraSource + ?Sized> CameraSource for Box<T> {
    async fn open(&self, facing: FacingMode) -> Result<Box<dyn CameraStream>> {
        (**self).open(facing).await
    }

    fn metrics(&self) -> CameraMetrics {
        (**self).metrics()
    }
}

/// Generate an error aligned with camera semantics.
pub fn camera_error(message: impl Into<String>) -> PilahError {
    PilahError::CameraAccessDenied(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn synthetic_stream_reports_dimensions_after_warmup() {
        let camera = SyntheticCamera::new(8, 4);
        camera.set_warmup(Duration::from_millis(40));
        let stream = camera.open(FacingMode::Environment).await.expect("open");
        assert_eq!(stream.dimensions(), None);
        assert_eq!(stream.dimensions(), None);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(stream.dimensions(), Some((8, 4)));

        let frame = stream.read_frame().expect("frame");
        assert_eq!(frame.dimensions(), (8, 4));
        assert_eq!(frame.data.len(), 8 * 4 * 4);
        assert_eq!(camera.metrics().frames_read, 1);
        assert_eq!(camera.metrics().last_facing, Some(FacingMode::Environment));
    }

    #[tokio::test]
    async fn denied_camera_fails_to_open() {
        let camera = SyntheticCamera::new(4, 4);
        camera.set_denied(true);
        let err = camera.open(FacingMode::User).await.err().expect("denied");
        assert!(matches!(err, PilahError::CameraAccessDenied(_)));
        let metrics = camera.metrics();
        assert_eq!(metrics.open_requests, 1);
        assert_eq!(metrics.denied_requests, 1);
    }

    #[tokio::test]
    async fn stopping_tracks_releases_every_track_once() {
        let camera = SyntheticCamera::new(4, 4);
        camera.set_track_count(2);
        let mut stream = camera.open(FacingMode::Environment).await.expect("open");
        assert!(stream.is_live());
        assert_eq!(stream.stop_all_tracks(), 2);
        assert_eq!(stream.stop_all_tracks(), 0);
        assert!(!stream.is_live());
        assert!(stream.read_frame().is_err());
        assert_eq!(stream.dimensions(), None);
        drop(stream);
        assert_eq!(camera.metrics().track_stops, 2);
    }

    #[tokio::test]
    async fn dropping_a_live_stream_stops_it() {
        let camera = SyntheticCamera::new(4, 4);
        let stream = camera.open(FacingMode::Environment).await.expect("open");
        drop(stream);
        assert_eq!(camera.metrics().track_stops, 1);
    }
}
