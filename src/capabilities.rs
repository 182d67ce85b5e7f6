// src/capabilities.rs
//
// Capability seams between the fusion core and its heavyweight
// collaborators. The engine only ever talks to these traits; real backends
// (neural detectors, OpenCV trackers, container codecs) live behind them
// and the `synthetic` module supplies deterministic stand-ins for tests
// and the demo.

use anyhow::Result;
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::TrackInitError;
use crate::geometry::BBox;

/// One decoded video frame. `index` is the 0-based position in the source
/// stream; `timestamp_ms` is derived from the source frame rate.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub timestamp_ms: f64,
    pub image: RgbImage,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// A subject box proposed by the detector for a single frame.
#[derive(Debug, Clone, Copy)]
pub struct Detection {
    pub bbox: BBox,
    pub confidence: f32,
}

/// Heavyweight subject detector. Implementations hand back boxes already
/// class-filtered and de-duplicated; the associator does no suppression of
/// its own. Logically stateless across frames, `&mut self` only because
/// inference sessions tend to need it.
pub trait Detector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

/// One live single-object tracker instance, owned by exactly one track.
pub trait VisualTracker {
    /// Advance onto the next frame. `None` means the tracker lost the
    /// subject this frame; the owning track's loss counter absorbs it.
    fn update(&mut self, frame: &Frame) -> Option<BBox>;
}

/// Factory for visual trackers. Seeding can fail when the backend rejects
/// the region, degenerate after clamping or fully outside the frame.
///
/// The concrete tracker type is an associated type rather than a boxed
/// trait object so that auto traits carry through: a pipeline over a
/// backend whose trackers are `Send` is itself `Send` and can move onto a
/// worker thread whole.
pub trait TrackerBackend {
    type Tracker: VisualTracker;

    fn init(&self, frame: &Frame, seed: BBox) -> Result<Self::Tracker, TrackInitError>;
}

/// Closed set of native visual-tracker variants selectable from
/// configuration. CSRT is slowest and most accurate, MOSSE fastest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackerKind {
    Kcf,
    #[default]
    Csrt,
    Mosse,
}

impl TrackerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackerKind::Kcf => "kcf",
            TrackerKind::Csrt => "csrt",
            TrackerKind::Mosse => "mosse",
        }
    }
}

/// Sequential frame reader over a finite stream.
pub trait VideoSource {
    /// Total frames when the container reports one.
    fn frame_count(&self) -> Option<u64>;

    fn fps(&self) -> f64;

    /// (width, height) in pixels.
    fn dimensions(&self) -> (u32, u32);

    /// Next frame, or `None` at end of stream. Mid-stream decode failures
    /// surface as end of stream too.
    fn read(&mut self) -> Option<Frame>;
}

/// Annotated-frame writer. Rate and dimensions are fixed when the sink is
/// opened; `write` is called once per processed frame, in order.
pub trait VideoSink {
    fn write(&mut self, image: &RgbImage) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_kind_parses_lowercase() {
        let kind: TrackerKind = serde_yaml::from_str("kcf").unwrap();
        assert_eq!(kind, TrackerKind::Kcf);
        let kind: TrackerKind = serde_yaml::from_str("mosse").unwrap();
        assert_eq!(kind, TrackerKind::Mosse);
        assert!(serde_yaml::from_str::<TrackerKind>("medianflow").is_err());
    }

    #[test]
    fn test_tracker_kind_default_is_csrt() {
        assert_eq!(TrackerKind::default(), TrackerKind::Csrt);
        assert_eq!(TrackerKind::default().as_str(), "csrt");
    }
}
