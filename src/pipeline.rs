// src/pipeline.rs
//
// Frame-driving loop around the associator: source reads, frame skipping,
// annotation, sink writes, run statistics and cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::info;

use crate::associator::PersonTracker;
use crate::capabilities::{Detector, Frame, TrackerBackend, VideoSink, VideoSource};
use crate::config::Config;
use crate::error::Error;
use crate::render;
use crate::track::Provenance;

// ============================================================================
// STATISTICS
// ============================================================================

/// Counters for one `process` run. Cloned snapshots go out with every
/// progress report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    /// Frames handed to the associator; skipped frames are not counted.
    pub total_frames: u64,
    /// Processed frames that carried at least one detector-confirmed row.
    pub detector_frames: u64,
    /// Processed frames advanced purely by visual trackers.
    pub tracker_frames: u64,
    /// Highest identity issued during the run.
    pub total_persons: u32,
    /// Processed frames divided by elapsed wall time.
    pub avg_fps: f64,
}

/// Progress report delivered after every processed frame.
#[derive(Debug, Clone)]
pub struct Progress {
    /// Frames consumed from the source, skipped ones included.
    pub frames_read: u64,
    /// Source frame count when the container reports one.
    pub total_frames: Option<u64>,
    pub stats: RunStats,
}

// ============================================================================
// CANCELLATION
// ============================================================================

/// Cross-thread stop latch. `stop` may fire from any thread at any time;
/// the loop honors it at the next frame boundary. Each `process` call
/// re-arms the latch.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn rearm(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// HOOKS
// ============================================================================

/// Optional per-frame callbacks. Both receive snapshots only; the single
/// way back into the pipeline is a `StopFlag`.
#[derive(Default)]
pub struct PipelineHooks<'a> {
    pub on_progress: Option<Box<dyn FnMut(&Progress) + 'a>>,
    /// Receives the annotated frame, e.g. for a live preview.
    pub on_preview: Option<Box<dyn FnMut(&Frame) + 'a>>,
}

impl<'a> PipelineHooks<'a> {
    pub fn none() -> Self {
        Self::default()
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Owns an associator and drives it over a video source: read, skip,
/// track, annotate, write, report.
pub struct VideoPipeline<D: Detector, B: TrackerBackend> {
    tracker: PersonTracker<D, B>,
    skip_frames: u32,
    stop: StopFlag,
}

impl<D: Detector, B: TrackerBackend> VideoPipeline<D, B> {
    pub fn new(config: Config, detector: D, backend: B) -> Self {
        let Config { tracking, pipeline } = config;
        Self {
            tracker: PersonTracker::new(tracking, detector, backend),
            skip_frames: pipeline.skip_frames,
            stop: StopFlag::new(),
        }
    }

    /// Latch handle for cancelling the current run from another thread.
    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn tracker(&self) -> &PersonTracker<D, B> {
        &self.tracker
    }

    /// Run until the source ends, the stop latch trips (a successful short
    /// run) or a fatal error aborts. Session state and statistics restart
    /// on every call.
    pub fn process(
        &mut self,
        source: &mut dyn VideoSource,
        mut sink: Option<&mut dyn VideoSink>,
        hooks: &mut PipelineHooks<'_>,
    ) -> Result<RunStats, Error> {
        self.tracker.reset();
        self.stop.rearm();

        let mut stats = RunStats::default();
        let started = Instant::now();
        let step = u64::from(self.skip_frames) + 1;
        let source_total = source.frame_count();
        let (width, height) = source.dimensions();
        info!(
            "Processing {}x{} @ {:.1} fps, skip {} (effective {:.1} fps)",
            width,
            height,
            source.fps(),
            self.skip_frames,
            source.fps() / step as f64
        );

        let mut frames_read: u64 = 0;
        loop {
            if self.stop.is_stopped() {
                info!("Stop requested after {} processed frames", stats.total_frames);
                break;
            }
            let Some(frame) = source.read() else {
                break;
            };
            frames_read += 1;
            if (frames_read - 1) % step != 0 {
                continue;
            }

            let rows = self.tracker.process_frame(&frame)?;

            stats.total_frames += 1;
            let saw_detector = rows.iter().any(|r| r.provenance == Provenance::Detector);
            let saw_tracker = rows.iter().any(|r| r.provenance == Provenance::Tracker);
            if saw_detector {
                stats.detector_frames += 1;
            } else if saw_tracker {
                stats.tracker_frames += 1;
            }
            stats.total_persons = self.tracker.identities_issued();
            let elapsed = started.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                stats.avg_fps = stats.total_frames as f64 / elapsed;
            }

            let annotated = render::annotate(&frame, &rows, &stats);
            if let Some(sink) = sink.as_mut() {
                sink.write(&annotated.image).map_err(|cause| Error::SinkWrite {
                    frame: frame.index,
                    cause,
                })?;
            }
            if let Some(on_progress) = hooks.on_progress.as_mut() {
                on_progress(&Progress {
                    frames_read,
                    total_frames: source_total,
                    stats: stats.clone(),
                });
            }
            if let Some(on_preview) = hooks.on_preview.as_mut() {
                on_preview(&annotated);
            }
        }

        info!(
            "Run finished: {} frames, {} identities, {:.1} avg fps",
            stats.total_frames, stats.total_persons, stats.avg_fps
        );
        Ok(stats)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::Detection;
    use crate::synthetic::{
        CollectSink, FailingDetector, FailingSink, MovingBoxSource, NullSink, ScriptedBackend,
        ScriptedDetector,
    };

    fn config(redetect_interval: u32, skip_frames: u32) -> Config {
        let mut config = Config::default();
        config.tracking.redetect_interval = redetect_interval;
        config.pipeline.skip_frames = skip_frames;
        config
    }

    /// Detector that reports the synthetic subject on every call, and a
    /// backend whose trackers follow it perfectly.
    fn subject_pipeline(config: Config) -> VideoPipeline<ScriptedDetector, ScriptedBackend> {
        let detector = ScriptedDetector::new(|index| {
            vec![Detection {
                bbox: MovingBoxSource::subject_at(index),
                confidence: 0.9,
            }]
        });
        let backend = ScriptedBackend::follow(|index| Some(MovingBoxSource::subject_at(index)));
        VideoPipeline::new(config, detector, backend)
    }

    #[test]
    fn test_end_to_end_single_subject() {
        // One detection on the first frame, then the visual tracker alone
        // carries the identity for the rest of the clip.
        let detector = ScriptedDetector::first_frame_only(MovingBoxSource::subject_at(0), 0.95);
        let backend = ScriptedBackend::follow(|index| Some(MovingBoxSource::subject_at(index)));
        let mut pipeline = VideoPipeline::new(config(30, 0), detector, backend);

        let mut source = MovingBoxSource::new(10, 640, 360);
        let stats = pipeline
            .process(&mut source, None, &mut PipelineHooks::none())
            .unwrap();

        assert_eq!(stats.total_frames, 10);
        assert_eq!(stats.total_persons, 1);
        assert_eq!(stats.detector_frames, 1);
        assert_eq!(stats.tracker_frames, 9);
        assert_eq!(pipeline.tracker().active_track_count(), 1);
    }

    #[test]
    fn test_stats_split_on_cadence() {
        let mut pipeline = subject_pipeline(config(5, 0));
        let mut source = MovingBoxSource::new(10, 640, 360);
        let stats = pipeline
            .process(&mut source, None, &mut PipelineHooks::none())
            .unwrap();

        // Detector rows on processed frames 1, 5 and 10
        assert_eq!(stats.total_frames, 10);
        assert_eq!(stats.detector_frames, 3);
        assert_eq!(stats.tracker_frames, 7);
        assert_eq!(stats.total_persons, 1);
    }

    #[test]
    fn test_skip_frames_processes_every_other() {
        let mut pipeline = subject_pipeline(config(30, 1));
        let mut source = MovingBoxSource::new(10, 640, 360);
        let mut sink = CollectSink::default();
        let mut last_read = 0;
        let mut hooks = PipelineHooks {
            on_progress: Some(Box::new(|p: &Progress| {
                last_read = p.frames_read;
            })),
            on_preview: None,
        };

        let stats = pipeline
            .process(&mut source, Some(&mut sink), &mut hooks)
            .unwrap();
        drop(hooks);

        assert_eq!(stats.total_frames, 5);
        assert_eq!(sink.frames.len(), 5);
        // The loop still consumed the full stream
        assert_eq!(last_read, 9);
    }

    #[test]
    fn test_cancellation_stops_midway() {
        let mut pipeline = subject_pipeline(config(30, 0));
        let flag = pipeline.stop_flag();
        let mut source = MovingBoxSource::new(20, 640, 360);
        let mut sink = CollectSink::default();

        let mut hooks = PipelineHooks {
            on_progress: Some(Box::new(move |p: &Progress| {
                if p.stats.total_frames == 5 {
                    flag.stop();
                }
            })),
            on_preview: None,
        };
        let stats = pipeline
            .process(&mut source, Some(&mut sink), &mut hooks)
            .unwrap();

        // A cancelled run is still a successful run
        assert_eq!(stats.total_frames, 5);
        assert_eq!(sink.frames.len(), 5);
        assert!(pipeline.stop_flag().is_stopped());
    }

    #[test]
    fn test_pipeline_moves_to_worker_thread() {
        // The whole pipeline migrates to the worker; only the stop latch
        // handle stays behind. Compiles only while the pipeline stays
        // `Send` over `Send` capabilities.
        let mut pipeline = subject_pipeline(config(30, 0));
        let flag = pipeline.stop_flag();

        let worker = std::thread::spawn(move || {
            let mut source = MovingBoxSource::new(10, 640, 360);
            pipeline
                .process(&mut source, None, &mut PipelineHooks::none())
                .unwrap()
        });
        let stats = worker.join().unwrap();

        assert_eq!(stats.total_frames, 10);
        assert_eq!(stats.total_persons, 1);
        assert!(!flag.is_stopped());
    }

    #[test]
    fn test_process_rearms_stop_latch() {
        let mut pipeline = subject_pipeline(config(30, 0));
        pipeline.stop();
        assert!(pipeline.stop_flag().is_stopped());

        let mut source = MovingBoxSource::new(5, 640, 360);
        let stats = pipeline
            .process(&mut source, None, &mut PipelineHooks::none())
            .unwrap();
        assert_eq!(stats.total_frames, 5, "stale stop must not abort a fresh run");
    }

    #[test]
    fn test_process_restarts_session() {
        let mut pipeline = subject_pipeline(config(30, 0));

        let mut first = MovingBoxSource::new(5, 640, 360);
        pipeline
            .process(&mut first, None, &mut PipelineHooks::none())
            .unwrap();

        let mut second = MovingBoxSource::new(5, 640, 360);
        let stats = pipeline
            .process(&mut second, None, &mut PipelineHooks::none())
            .unwrap();

        // Identity numbering restarted instead of continuing at 2
        assert_eq!(stats.total_persons, 1);
        assert_eq!(pipeline.tracker().identities_issued(), 1);
    }

    #[test]
    fn test_progress_reports_totals() {
        let mut pipeline = subject_pipeline(config(30, 0));
        let mut source = MovingBoxSource::new(8, 640, 360);
        let mut reports: Vec<(u64, Option<u64>)> = Vec::new();
        let mut hooks = PipelineHooks {
            on_progress: Some(Box::new(|p: &Progress| {
                reports.push((p.frames_read, p.total_frames));
            })),
            on_preview: None,
        };

        pipeline.process(&mut source, None, &mut hooks).unwrap();
        drop(hooks);

        assert_eq!(reports.len(), 8);
        assert_eq!(reports.first(), Some(&(1, Some(8))));
        assert_eq!(reports.last(), Some(&(8, Some(8))));
    }

    #[test]
    fn test_preview_receives_annotated_frames() {
        let mut pipeline = subject_pipeline(config(30, 0));
        let mut source = MovingBoxSource::new(4, 640, 360);
        let mut previews = 0;
        let mut hooks = PipelineHooks {
            on_progress: None,
            on_preview: Some(Box::new(|frame: &Frame| {
                assert_eq!(frame.image.dimensions(), (640, 360));
                previews += 1;
            })),
        };

        pipeline.process(&mut source, None, &mut hooks).unwrap();
        drop(hooks);
        assert_eq!(previews, 4);
    }

    #[test]
    fn test_sink_failure_is_fatal() {
        let mut pipeline = subject_pipeline(config(30, 0));
        let mut source = MovingBoxSource::new(10, 640, 360);
        let mut sink = FailingSink::new(3);
        let err = pipeline
            .process(&mut source, Some(&mut sink), &mut PipelineHooks::none())
            .unwrap_err();
        assert!(matches!(err, Error::SinkWrite { frame: 3, .. }));
    }

    #[test]
    fn test_detector_failure_is_fatal() {
        let mut pipeline = VideoPipeline::new(config(30, 0), FailingDetector, ScriptedBackend::hold());
        let mut source = MovingBoxSource::new(10, 640, 360);
        let mut sink = NullSink;
        let err = pipeline
            .process(&mut source, Some(&mut sink), &mut PipelineHooks::none())
            .unwrap_err();
        assert!(matches!(err, Error::DetectorCall { frame: 0, .. }));
    }

    #[test]
    fn test_empty_source_yields_zero_stats() {
        let mut pipeline = subject_pipeline(config(30, 0));
        let mut source = MovingBoxSource::new(0, 640, 360);
        let stats = pipeline
            .process(&mut source, None, &mut PipelineHooks::none())
            .unwrap();
        assert_eq!(stats.total_frames, 0);
        assert_eq!(stats.total_persons, 0);
        assert_eq!(stats.detector_frames, 0);
    }

    #[test]
    fn test_stats_serialize_to_json() {
        let stats = RunStats {
            total_frames: 90,
            detector_frames: 4,
            tracker_frames: 86,
            total_persons: 2,
            avg_fps: 31.5,
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"total_frames\":90"));
        assert!(json.contains("\"total_persons\":2"));
    }
}
