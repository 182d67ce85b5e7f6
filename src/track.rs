// src/track.rs
//
// Track lifecycle. A track is one stable identity carrying its own visual
// tracker instance: confidence snaps to 1.0 on every detector confirmation
// and decays while the track coasts on the tracker alone, and a run of
// tracker failures deactivates it.

use std::fmt;

use tracing::warn;

use crate::capabilities::{Frame, TrackerBackend, VisualTracker};
use crate::error::TrackInitError;
use crate::geometry::BBox;

/// Confidence lost per tracker-only frame.
pub const CONFIDENCE_DECAY: f32 = 0.02;
/// Confidence never decays below this floor.
pub const CONFIDENCE_FLOOR: f32 = 0.3;
/// Consecutive tracker failures tolerated before a track is deactivated.
pub const MAX_LOST_FRAMES: u32 = 10;

/// Where a reported box came from on a given frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Detector,
    Tracker,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Detector => "detector",
            Provenance::Tracker => "tracker",
        }
    }
}

/// One tracked subject. Identities are issued once and never reused; after
/// deactivation the track is dropped by the associator in the same step.
///
/// Generic over the visual-tracker instance it embeds, so a track is
/// `Send` exactly when its tracker is.
pub struct Track<T: VisualTracker> {
    pub id: u32,
    pub bbox: BBox,
    pub confidence: f32,
    /// Frames advanced on the visual tracker since the last confirmation.
    pub frames_since_detection: u32,
    /// Consecutive tracker failures; any success resets it.
    pub lost_frames: u32,
    pub active: bool,
    tracker: T,
}

impl<T: VisualTracker> fmt::Debug for Track<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("id", &self.id)
            .field("bbox", &self.bbox)
            .field("confidence", &self.confidence)
            .field("frames_since_detection", &self.frames_since_detection)
            .field("lost_frames", &self.lost_frames)
            .field("active", &self.active)
            .finish()
    }
}

impl<T: VisualTracker> Track<T> {
    /// Seed a new track on a confirmed detection. The backend must accept
    /// the region; on rejection no track exists and the caller drops the
    /// detection for this frame.
    pub(crate) fn create<B>(
        id: u32,
        bbox: BBox,
        frame: &Frame,
        backend: &B,
    ) -> Result<Self, TrackInitError>
    where
        B: TrackerBackend<Tracker = T>,
    {
        let tracker = backend.init(frame, bbox)?;
        Ok(Self {
            id,
            bbox,
            confidence: 1.0,
            frames_since_detection: 0,
            lost_frames: 0,
            active: true,
            tracker,
        })
    }

    /// Detection-confirmed update: adopt the detector box, restore full
    /// confidence and re-seed the visual tracker on the fresh region. The
    /// old tracker instance is dropped. A failed re-seed keeps the previous
    /// instance and counts as one tracker loss.
    pub(crate) fn confirm<B>(&mut self, bbox: BBox, frame: &Frame, backend: &B)
    where
        B: TrackerBackend<Tracker = T>,
    {
        self.bbox = bbox;
        self.confidence = 1.0;
        self.frames_since_detection = 0;
        self.lost_frames = 0;
        match backend.init(frame, bbox) {
            Ok(tracker) => self.tracker = tracker,
            Err(err) => {
                warn!("Track {} re-seed failed, keeping stale tracker: {}", self.id, err);
                self.lost_frames = 1;
            }
        }
    }

    /// Advance one frame on the visual tracker alone. Returns whether the
    /// track produced a usable box this frame.
    pub(crate) fn advance(&mut self, frame: &Frame) -> bool {
        match self.tracker.update(frame) {
            Some(bbox) if bbox.is_valid() => {
                self.bbox = bbox;
                self.frames_since_detection += 1;
                self.confidence = (1.0 - self.frames_since_detection as f32 * CONFIDENCE_DECAY)
                    .max(CONFIDENCE_FLOOR);
                self.lost_frames = 0;
                true
            }
            _ => {
                self.lost_frames += 1;
                if self.lost_frames > MAX_LOST_FRAMES {
                    self.active = false;
                }
                false
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::ScriptedBackend;
    use image::RgbImage;

    fn frame(index: u64) -> Frame {
        Frame {
            index,
            timestamp_ms: index as f64 * 33.3,
            image: RgbImage::new(320, 240),
        }
    }

    fn seed() -> BBox {
        BBox::new(50.0, 40.0, 110.0, 160.0)
    }

    #[test]
    fn test_create_starts_at_full_confidence() {
        let backend = ScriptedBackend::hold();
        let track = Track::create(1, seed(), &frame(0), &backend).unwrap();
        assert_eq!(track.id, 1);
        assert_eq!(track.bbox, seed());
        assert_eq!(track.confidence, 1.0);
        assert_eq!(track.frames_since_detection, 0);
        assert_eq!(track.lost_frames, 0);
        assert!(track.active);
        assert_eq!(backend.inits().len(), 1);
    }

    #[test]
    fn test_create_rejected_seed() {
        let backend = ScriptedBackend::rejecting();
        assert!(Track::create(1, seed(), &frame(0), &backend).is_err());
    }

    #[test]
    fn test_advance_decays_confidence() {
        let backend = ScriptedBackend::hold();
        let mut track = Track::create(1, seed(), &frame(0), &backend).unwrap();
        for n in 1..=5u32 {
            assert!(track.advance(&frame(n as u64)));
            let expected = 1.0 - n as f32 * CONFIDENCE_DECAY;
            assert!(
                (track.confidence - expected).abs() < 1e-5,
                "after {} advances: {}",
                n,
                track.confidence
            );
        }
        assert_eq!(track.frames_since_detection, 5);
        assert_eq!(track.lost_frames, 0);
    }

    #[test]
    fn test_confidence_never_below_floor() {
        let backend = ScriptedBackend::hold();
        let mut track = Track::create(1, seed(), &frame(0), &backend).unwrap();
        for n in 1..=60u64 {
            track.advance(&frame(n));
        }
        assert!((track.confidence - CONFIDENCE_FLOOR).abs() < 1e-5);
        assert!(track.active);
    }

    #[test]
    fn test_failures_deactivate_after_tolerance() {
        let backend = ScriptedBackend::failing();
        let mut track = Track::create(1, seed(), &frame(0), &backend).unwrap();
        for n in 1..=MAX_LOST_FRAMES as u64 {
            assert!(!track.advance(&frame(n)));
            assert!(track.active, "deactivated too early at loss {}", n);
        }
        // Failure number 11 crosses the threshold
        assert!(!track.advance(&frame(11)));
        assert!(!track.active);
        assert_eq!(track.lost_frames, MAX_LOST_FRAMES + 1);
    }

    #[test]
    fn test_success_resets_loss_counter() {
        let backend = ScriptedBackend::follow(|index| {
            if index % 2 == 0 {
                Some(BBox::new(50.0, 40.0, 110.0, 160.0))
            } else {
                None
            }
        });
        let mut track = Track::create(1, seed(), &frame(0), &backend).unwrap();
        // Alternating failure and success never accumulates enough losses
        for n in 1..=40u64 {
            track.advance(&frame(n));
            assert!(track.lost_frames <= 1);
        }
        assert!(track.active);
    }

    #[test]
    fn test_confirm_restores_confidence_and_reseeds() {
        let backend = ScriptedBackend::hold();
        let mut track = Track::create(1, seed(), &frame(0), &backend).unwrap();
        for n in 1..=8u64 {
            track.advance(&frame(n));
        }
        assert!(track.confidence < 1.0);

        let confirmed = BBox::new(60.0, 44.0, 120.0, 164.0);
        track.confirm(confirmed, &frame(9), &backend);
        assert_eq!(track.bbox, confirmed);
        assert_eq!(track.confidence, 1.0);
        assert_eq!(track.frames_since_detection, 0);
        assert_eq!(track.lost_frames, 0);
        // One init for create, one for the re-seed
        assert_eq!(backend.inits().len(), 2);
    }

    #[test]
    fn test_confirm_with_failed_reseed_keeps_old_tracker() {
        let backend = ScriptedBackend::hold();
        let mut track = Track::create(1, seed(), &frame(0), &backend).unwrap();

        let rejecting = ScriptedBackend::rejecting();
        let confirmed = BBox::new(80.0, 50.0, 140.0, 170.0);
        track.confirm(confirmed, &frame(1), &rejecting);

        // Detector box and confidence are adopted, the failed re-seed
        // registers as one loss, and the old tracker still advances.
        assert_eq!(track.bbox, confirmed);
        assert_eq!(track.confidence, 1.0);
        assert_eq!(track.lost_frames, 1);
        assert!(track.advance(&frame(2)));
        assert_eq!(track.lost_frames, 0);
    }

    #[test]
    fn test_invalid_tracker_box_counts_as_loss() {
        let backend = ScriptedBackend::follow(|_| Some(BBox::new(30.0, 30.0, 30.0, 90.0)));
        let mut track = Track::create(1, seed(), &frame(0), &backend).unwrap();
        assert!(!track.advance(&frame(1)));
        assert_eq!(track.lost_frames, 1);
        // Box stays at the last good position
        assert_eq!(track.bbox, seed());
    }
}
