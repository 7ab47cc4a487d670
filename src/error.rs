//! Error types for the `playhead` crate.
//!
//! This module defines [`PlayheadError`], the unified error type returned by
//! all fallible operations in the crate. Errors carry enough context to
//! diagnose the problem (paths, codec names, upstream error messages)
//! without additional logging at the call site.
//!
//! Note that several runtime conditions are deliberately *not* errors:
//! decode starvation, timeline discontinuities and truncated media are
//! recovered internally (see [`Clip`](crate::Clip)) and surface as duration
//! shrinkage or an automatic seek rather than a `Result::Err`.

use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use thiserror::Error;

/// The unified error type for all `playhead` operations.
///
/// Every public method that can fail returns `Result<T, PlayheadError>`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PlayheadError {
    /// The media container could not be opened or its headers parsed.
    #[error("Failed to open media at {path}: {reason}")]
    Open {
        /// Path or URL that was passed to [`crate::Demuxer::open`].
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// No decoder matching the stream's codec parameters was found.
    #[error("No decoder found for codec {codec}")]
    CodecNotFound {
        /// Name of the codec as reported by the container.
        codec: String,
    },

    /// The codec rejected its parameters or thread/hardware configuration.
    #[error("Failed to open codec session: {0}")]
    Codec(String),

    /// The container holds neither a video nor an audio stream.
    #[error("No playable (video or audio) streams found")]
    NoStreams,

    /// A seek request was rejected by the container.
    #[error("Seek failed: {0}")]
    Seek(String),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    /// An I/O error occurred while reading the source.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// The clip has already been closed.
    #[error("Clip is closed")]
    Closed,
}

impl From<FfmpegError> for PlayheadError {
    fn from(error: FfmpegError) -> Self {
        PlayheadError::Ffmpeg(error.to_string())
    }
}
