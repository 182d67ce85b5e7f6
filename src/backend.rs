// src/backend.rs
//
// OpenCV-backed capabilities: video file source and sink plus the native
// single-object trackers. Only compiled with the `opencv` cargo feature;
// the rest of the crate never touches OpenCV types.

use anyhow::Result;
use image::RgbImage;
use opencv::{
    core::{Mat, Ptr, Rect as CvRect, Size},
    imgproc,
    prelude::*,
    tracking::{TrackerCSRT, TrackerCSRT_Params, TrackerKCF, TrackerKCF_Params},
    videoio::{self, VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst, VideoWriter},
};
use tracing::info;

use crate::capabilities::{Frame, TrackerBackend, TrackerKind, VideoSink, VideoSource, VisualTracker};
use crate::error::{Error, TrackInitError};
use crate::geometry::BBox;

/// Pack an RgbImage into a BGR Mat, the layout OpenCV consumers expect.
fn bgr_mat_from_rgb(image: &RgbImage) -> Result<Mat> {
    let rgb = Mat::from_slice(image.as_raw())?;
    let rgb = rgb.reshape(3, image.height() as i32)?;
    let mut bgr = Mat::default();
    imgproc::cvt_color(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR, 0)?;
    Ok(bgr)
}

// ============================================================================
// FILE SOURCE
// ============================================================================

pub struct VideoFileSource {
    cap: VideoCapture,
    fps: f64,
    total_frames: Option<u64>,
    width: u32,
    height: u32,
    cursor: u64,
}

impl VideoFileSource {
    pub fn open(path: &str) -> Result<Self, Error> {
        let open_err = |reason: String| Error::SourceOpen {
            path: path.to_string(),
            reason,
        };

        let cap = VideoCapture::from_file(path, videoio::CAP_ANY)
            .map_err(|e| open_err(e.to_string()))?;
        if !cap.is_opened().map_err(|e| open_err(e.to_string()))? {
            return Err(open_err("capture did not open".into()));
        }

        let fps = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FPS)
            .map_err(|e| open_err(e.to_string()))?;
        let fps = if fps > 0.0 { fps } else { 30.0 };
        let total = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_COUNT)
            .map_err(|e| open_err(e.to_string()))? as i64;
        let width = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_WIDTH)
            .map_err(|e| open_err(e.to_string()))? as u32;
        let height = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_HEIGHT)
            .map_err(|e| open_err(e.to_string()))? as u32;

        info!(
            "Opened {}: {}x{} @ {:.1} fps, {} frames",
            path, width, height, fps, total
        );
        Ok(Self {
            cap,
            fps,
            total_frames: (total > 0).then_some(total as u64),
            width,
            height,
            cursor: 0,
        })
    }
}

impl VideoSource for VideoFileSource {
    fn frame_count(&self) -> Option<u64> {
        self.total_frames
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn read(&mut self) -> Option<Frame> {
        let mut bgr = Mat::default();
        if !VideoCaptureTrait::read(&mut self.cap, &mut bgr).ok()? || bgr.empty() {
            return None;
        }
        let mut rgb = Mat::default();
        imgproc::cvt_color(&bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0).ok()?;
        let data = rgb.data_bytes().ok()?.to_vec();
        let image = RgbImage::from_raw(rgb.cols() as u32, rgb.rows() as u32, data)?;

        let index = self.cursor;
        self.cursor += 1;
        Some(Frame {
            index,
            timestamp_ms: index as f64 * 1000.0 / self.fps,
            image,
        })
    }
}

// ============================================================================
// FILE SINK
// ============================================================================

pub struct VideoFileSink {
    writer: VideoWriter,
}

impl VideoFileSink {
    /// `fps` should already account for frame skipping so playback speed
    /// matches the source.
    pub fn create(path: &str, fps: f64, width: u32, height: u32) -> Result<Self> {
        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
        let writer = VideoWriter::new(
            path,
            fourcc,
            fps,
            Size::new(width as i32, height as i32),
            true,
        )?;
        if !writer.is_opened()? {
            anyhow::bail!("Failed to open video writer for {}", path);
        }
        info!("Output video: {}", path);
        Ok(Self { writer })
    }
}

impl VideoSink for VideoFileSink {
    fn write(&mut self, image: &RgbImage) -> Result<()> {
        let bgr = bgr_mat_from_rgb(image)?;
        self.writer.write(&bgr)?;
        Ok(())
    }
}

// ============================================================================
// NATIVE TRACKERS
// ============================================================================

/// Maps the configured variant onto OpenCV's single-object trackers.
pub struct OpenCvBackend {
    kind: TrackerKind,
}

impl OpenCvBackend {
    pub fn new(kind: TrackerKind) -> Result<Self> {
        if kind == TrackerKind::Mosse {
            anyhow::bail!(
                "MOSSE lives in OpenCV's legacy tracking module, which is not bound here; use kcf or csrt"
            );
        }
        info!("Native tracker backend: {}", kind.as_str());
        Ok(Self { kind })
    }
}

enum NativeTracker {
    Kcf(Ptr<TrackerKCF>),
    Csrt(Ptr<TrackerCSRT>),
}

pub struct OpenCvTracker {
    native: NativeTracker,
}

fn seed_rect(seed: BBox, frame: &Frame) -> Result<CvRect, TrackInitError> {
    let Some((x, y, w, h)) = seed.to_pixel_rect(frame.width(), frame.height()) else {
        return Err(TrackInitError::new("seed box empty after clamping"));
    };
    Ok(CvRect::new(x, y, w as i32, h as i32))
}

impl TrackerBackend for OpenCvBackend {
    type Tracker = OpenCvTracker;

    fn init(&self, frame: &Frame, seed: BBox) -> Result<OpenCvTracker, TrackInitError> {
        let rect = seed_rect(seed, frame)?;
        let mat =
            bgr_mat_from_rgb(&frame.image).map_err(|e| TrackInitError::new(e.to_string()))?;

        let native = match self.kind {
            TrackerKind::Kcf => {
                let params = TrackerKCF_Params::default()
                    .map_err(|e| TrackInitError::new(e.to_string()))?;
                let mut tracker =
                    TrackerKCF::create(params).map_err(|e| TrackInitError::new(e.to_string()))?;
                tracker
                    .init(&mat, rect)
                    .map_err(|e| TrackInitError::new(e.to_string()))?;
                NativeTracker::Kcf(tracker)
            }
            TrackerKind::Csrt => {
                let params = TrackerCSRT_Params::default()
                    .map_err(|e| TrackInitError::new(e.to_string()))?;
                let mut tracker =
                    TrackerCSRT::create(&params).map_err(|e| TrackInitError::new(e.to_string()))?;
                tracker
                    .init(&mat, rect)
                    .map_err(|e| TrackInitError::new(e.to_string()))?;
                NativeTracker::Csrt(tracker)
            }
            TrackerKind::Mosse => {
                return Err(TrackInitError::new("MOSSE backend is not available"));
            }
        };

        Ok(OpenCvTracker { native })
    }
}

impl VisualTracker for OpenCvTracker {
    fn update(&mut self, frame: &Frame) -> Option<BBox> {
        let mat = bgr_mat_from_rgb(&frame.image).ok()?;
        let mut rect = CvRect::default();
        let found = match &mut self.native {
            NativeTracker::Kcf(tracker) => tracker.update(&mat, &mut rect).ok()?,
            NativeTracker::Csrt(tracker) => tracker.update(&mat, &mut rect).ok()?,
        };
        if !found || rect.width <= 0 || rect.height <= 0 {
            return None;
        }
        Some(BBox::new(
            rect.x as f32,
            rect.y as f32,
            (rect.x + rect.width) as f32,
            (rect.y + rect.height) as f32,
        ))
    }
}
