//! Error taxonomy for the produce-a-file pipeline.
//!
//! Every failure a request can hit maps onto one variant here, so the HTTP
//! layer only has to translate variants into statuses. Length-probe failures
//! are deliberately absent: the probe degrades to "length unknown" and is
//! only logged.

use thiserror::Error;

use crate::remux::MuxError;

#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The caller-supplied locator is not a recognizable video identifier.
    #[error("invalid source identifier: {0}")]
    InvalidIdentifier(String),

    /// The catalog subprocess failed to run or returned an unparseable
    /// payload.
    #[error("fetching rendition catalog failed: {0}")]
    CatalogFetch(String),

    /// No rendition in the catalog carries a video track.
    #[error("no suitable video rendition available")]
    NoSuitableVideo,

    /// The chosen video rendition has no embedded audio and the catalog
    /// offers no audio-only rendition to merge in. Delivering a silent file
    /// instead is never acceptable.
    #[error("video rendition has no audio and no separate audio rendition exists")]
    NoSuitableAudio,

    /// Opening the byte stream for a rendition's locator failed.
    #[error("opening source stream failed")]
    StreamOpen(#[source] reqwest::Error),

    /// The external muxer rejected the combine step.
    #[error("remux failed")]
    Merge(#[from] MuxError),

    /// Scratch-file persistence or other local I/O failed mid-pipeline.
    #[error("i/o failure")]
    Io(#[from] std::io::Error),
}
