// src/synthetic.rs
//
// Deterministic in-process capabilities: a synthetic clip with one moving
// subject, scriptable detector and tracker stand-ins, and simple sinks.
// The test suite runs entirely on these and the binary's demo mode wires
// the blob detector/tracker pair through the full pipeline.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

use crate::capabilities::{
    Detection, Detector, Frame, TrackerBackend, VideoSink, VideoSource, VisualTracker,
};
use crate::error::TrackInitError;
use crate::geometry::BBox;

// ============================================================================
// FRAME SOURCE
// ============================================================================

/// Synthetic clip: one bright rectangle translating over a dark background
/// at 4 px per frame. Consecutive ground-truth boxes overlap at IoU ~0.85,
/// comfortably above any sane association threshold.
pub struct MovingBoxSource {
    frames: u64,
    cursor: u64,
    width: u32,
    height: u32,
    fps: f64,
}

impl MovingBoxSource {
    pub fn new(frames: u64, width: u32, height: u32) -> Self {
        Self {
            frames,
            cursor: 0,
            width,
            height,
            fps: 30.0,
        }
    }

    /// Ground-truth subject box at a frame index.
    pub fn subject_at(index: u64) -> BBox {
        let x = 20.0 + index as f32 * 4.0;
        BBox::new(x, 40.0, x + 48.0, 136.0)
    }

    fn render_frame(&self, index: u64) -> Frame {
        let mut image = RgbImage::from_pixel(self.width, self.height, Rgb([16, 16, 16]));
        if let Some((x, y, w, h)) = Self::subject_at(index).to_pixel_rect(self.width, self.height) {
            draw_filled_rect_mut(
                &mut image,
                Rect::at(x, y).of_size(w, h),
                Rgb([240, 240, 240]),
            );
        }
        Frame {
            index,
            timestamp_ms: index as f64 * 1000.0 / self.fps,
            image,
        }
    }
}

impl VideoSource for MovingBoxSource {
    fn frame_count(&self) -> Option<u64> {
        Some(self.frames)
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn read(&mut self) -> Option<Frame> {
        if self.cursor >= self.frames {
            return None;
        }
        let frame = self.render_frame(self.cursor);
        self.cursor += 1;
        Some(frame)
    }
}

// ============================================================================
// CALL LOG
// ============================================================================

/// Frame indices at which a capability fired. Cloneable so a test keeps a
/// handle after the pipeline takes ownership of the capability itself.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<u64>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, index: u64) {
        self.0.lock().unwrap().push(index);
    }

    pub fn snapshot(&self) -> Vec<u64> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// DETECTORS
// ============================================================================

/// Detector driven by a closure from frame index to detections.
pub struct ScriptedDetector {
    script: Box<dyn FnMut(u64) -> Vec<Detection> + Send>,
    calls: CallLog,
}

impl ScriptedDetector {
    pub fn new(script: impl FnMut(u64) -> Vec<Detection> + Send + 'static) -> Self {
        Self {
            script: Box::new(script),
            calls: CallLog::new(),
        }
    }

    /// Hands out one detection on frame 0 and silence afterwards.
    pub fn first_frame_only(bbox: BBox, confidence: f32) -> Self {
        Self::new(move |index| {
            if index == 0 {
                vec![Detection { bbox, confidence }]
            } else {
                Vec::new()
            }
        })
    }

    pub fn calls(&self) -> CallLog {
        self.calls.clone()
    }
}

impl Detector for ScriptedDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        self.calls.record(frame.index);
        Ok((self.script)(frame.index))
    }
}

/// Always errors, exercising the fatal detector path.
pub struct FailingDetector;

impl Detector for FailingDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        anyhow::bail!("detector backend unavailable")
    }
}

/// Finds the single bright subject in synthetic frames by thresholding.
/// Gives the demo a detector that genuinely looks at pixels.
pub struct BlobDetector {
    pub threshold: u8,
}

impl Default for BlobDetector {
    fn default() -> Self {
        Self { threshold: 200 }
    }
}

impl Detector for BlobDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        Ok(find_blob(&frame.image, self.threshold, None)
            .map(|bbox| {
                vec![Detection {
                    bbox,
                    confidence: 0.9,
                }]
            })
            .unwrap_or_default())
    }
}

/// Bounding box of all pixels at or above the threshold, optionally limited
/// to a search window.
fn find_blob(image: &RgbImage, threshold: u8, window: Option<BBox>) -> Option<BBox> {
    let (x0, y0, x1, y1) = match window {
        Some(w) => {
            let c = w.clamp_to(image.width(), image.height());
            if !c.is_valid() {
                return None;
            }
            (c.x1 as u32, c.y1 as u32, c.x2.ceil() as u32, c.y2.ceil() as u32)
        }
        None => (0, 0, image.width(), image.height()),
    };

    let mut found: Option<(u32, u32, u32, u32)> = None;
    for y in y0..y1.min(image.height()) {
        for x in x0..x1.min(image.width()) {
            let Rgb([r, g, b]) = *image.get_pixel(x, y);
            if r >= threshold && g >= threshold && b >= threshold {
                found = Some(match found {
                    None => (x, y, x, y),
                    Some((min_x, min_y, max_x, max_y)) => {
                        (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
                    }
                });
            }
        }
    }
    found.map(|(min_x, min_y, max_x, max_y)| {
        BBox::new(
            min_x as f32,
            min_y as f32,
            (max_x + 1) as f32,
            (max_y + 1) as f32,
        )
    })
}

// ============================================================================
// VISUAL TRACKERS
// ============================================================================

#[derive(Clone)]
enum Script {
    /// Hold the seed box forever.
    Hold,
    /// Fail every update.
    Fail,
    /// Follow an analytic path by frame index; `None` is a failure.
    Follow(Arc<dyn Fn(u64) -> Option<BBox> + Send + Sync>),
}

/// Backend producing scripted tracker instances.
pub struct ScriptedBackend {
    script: Script,
    reject_seeds: bool,
    inits: CallLog,
}

impl ScriptedBackend {
    /// Trackers that hold their seed box forever.
    pub fn hold() -> Self {
        Self {
            script: Script::Hold,
            reject_seeds: false,
            inits: CallLog::new(),
        }
    }

    /// Trackers that fail every update.
    pub fn failing() -> Self {
        Self {
            script: Script::Fail,
            reject_seeds: false,
            inits: CallLog::new(),
        }
    }

    /// Trackers that report an analytic path by frame index.
    pub fn follow(path: impl Fn(u64) -> Option<BBox> + Send + Sync + 'static) -> Self {
        Self {
            script: Script::Follow(Arc::new(path)),
            reject_seeds: false,
            inits: CallLog::new(),
        }
    }

    /// A backend that refuses every seed, for rejection paths.
    pub fn rejecting() -> Self {
        Self {
            script: Script::Hold,
            reject_seeds: true,
            inits: CallLog::new(),
        }
    }

    pub fn inits(&self) -> CallLog {
        self.inits.clone()
    }
}

impl TrackerBackend for ScriptedBackend {
    type Tracker = ScriptedTracker;

    fn init(&self, frame: &Frame, seed: BBox) -> Result<ScriptedTracker, TrackInitError> {
        if self.reject_seeds {
            return Err(TrackInitError::new("scripted backend rejects all seeds"));
        }
        if !seed.is_valid() {
            return Err(TrackInitError::new("seed box has no area"));
        }
        self.inits.record(frame.index);
        Ok(ScriptedTracker {
            script: self.script.clone(),
            seed,
        })
    }
}

pub struct ScriptedTracker {
    script: Script,
    seed: BBox,
}

impl VisualTracker for ScriptedTracker {
    fn update(&mut self, frame: &Frame) -> Option<BBox> {
        match &self.script {
            Script::Hold => Some(self.seed),
            Script::Fail => None,
            Script::Follow(path) => path(frame.index),
        }
    }
}

/// Brightness tracker over synthetic frames: re-finds the blob inside a
/// window around its previous box, the way a real single-object tracker
/// stays local to its last position.
pub struct BlobBackend {
    pub threshold: u8,
}

impl Default for BlobBackend {
    fn default() -> Self {
        Self { threshold: 200 }
    }
}

impl TrackerBackend for BlobBackend {
    type Tracker = BlobTracker;

    fn init(&self, _frame: &Frame, seed: BBox) -> Result<BlobTracker, TrackInitError> {
        if !seed.is_valid() {
            return Err(TrackInitError::new("seed box has no area"));
        }
        Ok(BlobTracker {
            last: seed,
            threshold: self.threshold,
        })
    }
}

pub struct BlobTracker {
    last: BBox,
    threshold: u8,
}

impl VisualTracker for BlobTracker {
    fn update(&mut self, frame: &Frame) -> Option<BBox> {
        // Search window: last box inflated by half its size on every side
        let margin_x = self.last.width() * 0.5;
        let margin_y = self.last.height() * 0.5;
        let window = BBox::new(
            self.last.x1 - margin_x,
            self.last.y1 - margin_y,
            self.last.x2 + margin_x,
            self.last.y2 + margin_y,
        );
        let found = find_blob(&frame.image, self.threshold, Some(window))?;
        self.last = found;
        Some(found)
    }
}

// ============================================================================
// SINKS
// ============================================================================

/// Swallows every frame.
#[derive(Debug, Default)]
pub struct NullSink;

impl VideoSink for NullSink {
    fn write(&mut self, _image: &RgbImage) -> Result<()> {
        Ok(())
    }
}

/// Buffers every written frame for assertions.
#[derive(Default)]
pub struct CollectSink {
    pub frames: Vec<RgbImage>,
}

impl VideoSink for CollectSink {
    fn write(&mut self, image: &RgbImage) -> Result<()> {
        self.frames.push(image.clone());
        Ok(())
    }
}

/// Accepts a fixed number of writes, then fails.
pub struct FailingSink {
    accept: u64,
    written: u64,
}

impl FailingSink {
    pub fn new(accept: u64) -> Self {
        Self { accept, written: 0 }
    }
}

impl VideoSink for FailingSink {
    fn write(&mut self, _image: &RgbImage) -> Result<()> {
        if self.written >= self.accept {
            anyhow::bail!("sink storage full after {} frames", self.written);
        }
        self.written += 1;
        Ok(())
    }
}

/// Numbered PNG files in a directory; the demo's default-build output.
pub struct PngSequenceSink {
    dir: PathBuf,
    index: u64,
}

impl PngSequenceSink {
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
        Ok(Self { dir, index: 0 })
    }
}

impl VideoSink for PngSequenceSink {
    fn write(&mut self, image: &RgbImage) -> Result<()> {
        let path = self.dir.join(format!("frame_{:05}.png", self.index));
        image
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        self.index += 1;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::iou;

    #[test]
    fn test_source_yields_exactly_n_frames() {
        let mut source = MovingBoxSource::new(5, 320, 240);
        assert_eq!(source.frame_count(), Some(5));
        for expected in 0..5 {
            let frame = source.read().unwrap();
            assert_eq!(frame.index, expected);
            assert_eq!(frame.image.dimensions(), (320, 240));
        }
        assert!(source.read().is_none());
        assert!(source.read().is_none());
    }

    #[test]
    fn test_consecutive_subjects_overlap_well() {
        for i in 0..30 {
            let score = iou(&MovingBoxSource::subject_at(i), &MovingBoxSource::subject_at(i + 1));
            assert!(score > 0.8, "frame {} -> {}: iou {}", i, i + 1, score);
        }
    }

    #[test]
    fn test_blob_detector_finds_subject() {
        let mut source = MovingBoxSource::new(3, 640, 360);
        let frame = source.read().unwrap();
        let mut detector = BlobDetector::default();
        let detections = detector.detect(&frame).unwrap();
        assert_eq!(detections.len(), 1);
        let score = iou(&detections[0].bbox, &MovingBoxSource::subject_at(0));
        assert!(score > 0.9, "detected {:?}, iou {}", detections[0].bbox, score);
    }

    #[test]
    fn test_blob_tracker_follows_subject() {
        let mut source = MovingBoxSource::new(6, 640, 360);
        let first = source.read().unwrap();
        let backend = BlobBackend::default();
        let mut tracker = backend
            .init(&first, MovingBoxSource::subject_at(0))
            .unwrap();

        for i in 1..6 {
            let frame = source.read().unwrap();
            let bbox = tracker.update(&frame).unwrap();
            let score = iou(&bbox, &MovingBoxSource::subject_at(i));
            assert!(score > 0.9, "frame {}: iou {}", i, score);
        }
    }

    #[test]
    fn test_blob_tracker_fails_when_subject_leaves_window() {
        let source = MovingBoxSource::new(2, 640, 360);
        let frame = source.render_frame(0);
        let backend = BlobBackend::default();
        // Seeded far from the actual subject
        let mut tracker = backend
            .init(&frame, BBox::new(500.0, 250.0, 560.0, 330.0))
            .unwrap();
        assert!(tracker.update(&frame).is_none());
    }

    #[test]
    fn test_scripted_backend_rejects() {
        let source = MovingBoxSource::new(1, 320, 240);
        let frame = source.render_frame(0);
        let backend = ScriptedBackend::rejecting();
        assert!(backend.init(&frame, BBox::new(0.0, 0.0, 10.0, 10.0)).is_err());
        assert!(backend.inits().is_empty());
    }

    #[test]
    fn test_failing_sink_fails_on_schedule() {
        let mut sink = FailingSink::new(2);
        let image = RgbImage::new(8, 8);
        assert!(sink.write(&image).is_ok());
        assert!(sink.write(&image).is_ok());
        assert!(sink.write(&image).is_err());
    }
}
