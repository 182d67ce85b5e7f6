// src/error.rs

/// Fatal failures surfaced by the pipeline and the associator. Anything not
/// listed here is absorbed by the tracking loop (lost trackers, rejected
/// seeds, empty detection sets).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The video source could not be opened at all.
    #[error("cannot open video source {path}: {reason}")]
    SourceOpen { path: String, reason: String },

    /// The detector capability itself failed. Distinct from a successful
    /// call that found nobody, which is a normal result.
    #[error("detector call failed on frame {frame}: {cause}")]
    DetectorCall { frame: u64, cause: anyhow::Error },

    /// An annotated frame could not be written to the sink.
    #[error("sink write failed on frame {frame}: {cause}")]
    SinkWrite { frame: u64, cause: anyhow::Error },

    /// Configuration rejected before any processing started.
    #[error("invalid configuration: {reason}")]
    Config { reason: String },
}

/// A tracker backend refused to seed on a region. Non-fatal: the owning
/// detection is dropped for the frame and the run continues.
#[derive(Debug, Clone, thiserror::Error)]
#[error("tracker seed rejected: {reason}")]
pub struct TrackInitError {
    pub reason: String,
}

impl TrackInitError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
