// src/associator.rs
//
// Detection-tracking fusion core. Full detector passes run on a sparse
// cadence to anchor identities; between passes every track coasts on its
// own lightweight visual tracker. Association is greedy best-IoU in
// detection input order, which is plenty for the handful of subjects a
// frame carries; optimal assignment is deliberately not attempted.

use tracing::{debug, info, warn};

use crate::capabilities::{Detection, Detector, Frame, TrackerBackend};
use crate::config::TrackingConfig;
use crate::error::Error;
use crate::geometry::{iou, BBox};
use crate::track::{Provenance, Track};

// ============================================================================
// OUTPUT ROWS
// ============================================================================

/// One reported track for one frame: an owned snapshot safe to hand to
/// renderers and callbacks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedBox {
    pub id: u32,
    pub bbox: BBox,
    pub confidence: f32,
    pub provenance: Provenance,
}

// ============================================================================
// ASSOCIATOR
// ============================================================================

/// Fuses a heavyweight detector with per-track visual trackers, keeping one
/// stable id per subject across frames.
pub struct PersonTracker<D: Detector, B: TrackerBackend> {
    config: TrackingConfig,
    detector: D,
    backend: B,
    /// Live tracks in ascending id order.
    tracks: Vec<Track<B::Tracker>>,
    next_id: u32,
    frame_count: u64,
}

impl<D: Detector, B: TrackerBackend> PersonTracker<D, B> {
    pub fn new(config: TrackingConfig, detector: D, backend: B) -> Self {
        Self {
            config,
            detector,
            backend,
            tracks: Vec::with_capacity(16),
            next_id: 1,
            frame_count: 0,
        }
    }

    /// Process one frame and report every surviving track once. The
    /// detector runs on the first frame, on the redetect cadence, and
    /// whenever no tracks are alive; all other frames advance purely on
    /// the visual trackers.
    pub fn process_frame(&mut self, frame: &Frame) -> Result<Vec<TrackedBox>, Error> {
        self.frame_count += 1;

        let need_detector = self.frame_count == 1
            || self.frame_count % u64::from(self.config.redetect_interval) == 0
            || self.tracks.is_empty();

        let rows = if need_detector {
            self.detector_pass(frame)?
        } else {
            self.tracker_pass(frame)
        };

        // Deactivated tracks never outlive the step that killed them.
        self.tracks.retain(|t| {
            if !t.active {
                debug!("🗑️ Track {} dropped after {} lost frames", t.id, t.lost_frames);
            }
            t.active
        });

        Ok(rows)
    }

    /// Full pass: detect, associate against live tracks, spawn tracks for
    /// unmatched detections, advance whatever the detector did not confirm.
    fn detector_pass(&mut self, frame: &Frame) -> Result<Vec<TrackedBox>, Error> {
        let raw = self.detector.detect(frame).map_err(|cause| Error::DetectorCall {
            frame: frame.index,
            cause,
        })?;

        // Reject unusable boxes before association
        let detections: Vec<Detection> = raw
            .into_iter()
            .filter_map(|det| {
                let clamped = det.bbox.clamp_to(frame.width(), frame.height());
                if clamped.is_valid() {
                    Some(Detection {
                        bbox: clamped,
                        ..det
                    })
                } else {
                    debug!("Discarding degenerate detection {:?}", det.bbox);
                    None
                }
            })
            .collect();
        debug!(
            "Detector pass on frame {}: {} detections, {} live tracks",
            frame.index,
            detections.len(),
            self.tracks.len()
        );

        if detections.is_empty() {
            // Found nobody. Never wipe live tracks on an empty redetect;
            // fall back to the tracker path and let loss counters decide.
            return Ok(self.tracker_pass(frame));
        }

        // Report order is fixed: confirmed rows then created rows, each in
        // detection order, then coasting tracks in ascending-id order.
        let mut rows = Vec::with_capacity(detections.len() + self.tracks.len());
        let mut created_rows: Vec<TrackedBox> = Vec::new();
        let mut matched = vec![false; self.tracks.len()];
        let mut spawned: Vec<Track<B::Tracker>> = Vec::new();

        for det in &detections {
            // Highest IoU wins. Only a strictly better score displaces the
            // current best, so ties go to the earliest (lowest-id) track.
            let mut best: Option<(usize, f32)> = None;
            for (ti, track) in self.tracks.iter().enumerate() {
                if matched[ti] {
                    continue;
                }
                let score = iou(&det.bbox, &track.bbox);
                if score > self.config.iou_threshold && best.map_or(true, |(_, s)| score > s) {
                    best = Some((ti, score));
                }
            }

            match best {
                Some((ti, score)) => {
                    matched[ti] = true;
                    let track = &mut self.tracks[ti];
                    track.confirm(det.bbox, frame, &self.backend);
                    debug!("Track {} confirmed by detection (iou {:.2})", track.id, score);
                    rows.push(TrackedBox {
                        id: track.id,
                        bbox: det.bbox,
                        confidence: det.confidence,
                        provenance: Provenance::Detector,
                    });
                }
                None => match Track::create(self.next_id, det.bbox, frame, &self.backend) {
                    Ok(track) => {
                        info!(
                            "🆕 Track {} created at [{:.0}, {:.0}, {:.0}, {:.0}]",
                            track.id, det.bbox.x1, det.bbox.y1, det.bbox.x2, det.bbox.y2
                        );
                        created_rows.push(TrackedBox {
                            id: track.id,
                            bbox: det.bbox,
                            confidence: det.confidence,
                            provenance: Provenance::Detector,
                        });
                        spawned.push(track);
                        self.next_id += 1;
                    }
                    Err(err) => {
                        warn!("Dropping detection at {:?}: {}", det.bbox, err);
                    }
                },
            }
        }
        rows.append(&mut created_rows);

        // Tracks the detector did not confirm coast on their own trackers.
        // Freshly spawned tracks sit out; they were already reported from
        // their detection and join the pool afterwards.
        for (ti, track) in self.tracks.iter_mut().enumerate() {
            if matched[ti] {
                continue;
            }
            if track.advance(frame) {
                rows.push(TrackedBox {
                    id: track.id,
                    bbox: track.bbox,
                    confidence: track.confidence,
                    provenance: Provenance::Tracker,
                });
            }
        }
        self.tracks.extend(spawned);

        Ok(rows)
    }

    /// Cheap pass: advance every track on its visual tracker, no detector.
    fn tracker_pass(&mut self, frame: &Frame) -> Vec<TrackedBox> {
        let mut rows = Vec::with_capacity(self.tracks.len());
        for track in &mut self.tracks {
            if track.active && track.advance(frame) {
                rows.push(TrackedBox {
                    id: track.id,
                    bbox: track.bbox,
                    confidence: track.confidence,
                    provenance: Provenance::Tracker,
                });
            }
        }
        rows
    }

    /// Drop all session state. Identity numbering and the frame counter
    /// restart; the next frame forces a detector pass.
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.next_id = 1;
        self.frame_count = 0;
    }

    pub fn tracks(&self) -> &[Track<B::Tracker>] {
        &self.tracks
    }

    pub fn active_track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Highest identity issued this session, dead tracks included.
    pub fn identities_issued(&self) -> u32 {
        self.next_id - 1
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }
}

// ============================================================================
// TESTS
// ============================================================================
