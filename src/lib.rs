// src/lib.rs
//
// fusetrack fuses a heavyweight subject detector with lightweight
// per-object visual trackers. The detector runs on a sparse cadence to
// anchor and re-anchor identities; between passes every track coasts on
// its own cheap tracker, bounding per-frame compute while ids stay stable.
// Everything expensive sits behind the capability traits in
// `capabilities`; `synthetic` carries deterministic stand-ins and the
// `opencv` feature adds real file I/O and native trackers.

pub mod associator;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod geometry;
pub mod pipeline;
pub mod render;
pub mod synthetic;
pub mod track;

#[cfg(feature = "opencv")]
pub mod backend;

pub use associator::{PersonTracker, TrackedBox};
pub use capabilities::{
    Detection, Detector, Frame, TrackerBackend, TrackerKind, VideoSink, VideoSource, VisualTracker,
};
pub use config::{Config, PipelineConfig, TrackingConfig};
pub use error::{Error, TrackInitError};
pub use geometry::{iou, BBox};
pub use pipeline::{PipelineHooks, Progress, RunStats, StopFlag, VideoPipeline};
pub use track::{Provenance, Track};
