//! GPU-upload boundary.
//!
//! The pipeline decodes into CPU or GPU surface frames but never converts
//! or displays them; that belongs to whatever renderer sits downstream.
//! [`UploadSink`] is the seam: it declares which pixel formats it can take
//! natively (steering `get_format` negotiation), learns about output mode
//! changes, and receives every decoded video frame.

use ffmpeg_next::{format::Pixel, frame};

use crate::mode::VideoMode;

/// Consumer of decoded video frames.
///
/// Implementations are called from the decode thread while the opening
/// thread may hold its own handle, hence `Send + Sync`. They must be cheap:
/// `push_frame` runs on the playback critical path. Frames handed to
/// `push_frame` are only valid for the duration of the call; a sink that
/// needs the pixels afterwards must copy (or clone the underlying
/// reference-counted buffer) before returning.
pub trait UploadSink: Send + Sync {
    /// Pixel formats the sink consumes without conversion, in preference
    /// order. Used to steer decoder output-format negotiation. An empty
    /// slice means the sink takes whatever the codec produces.
    fn supported_formats(&self) -> &[Pixel];

    /// The set of output modes the current stream can produce. Called once
    /// per detected mode change, and with an empty slice when the video
    /// signal is lost (stream ended, decoder torn down).
    fn set_mode_compatibility(&self, modes: &[VideoMode]);

    /// Take delivery of a decoded video frame.
    fn push_frame(&self, frame: &frame::Video);
}

/// An [`UploadSink`] that discards everything.
///
/// Useful for headless operation (audio-only playback, timeline scrubbing
/// without display) and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl UploadSink for NullSink {
    fn supported_formats(&self) -> &[Pixel] {
        &[]
    }

    fn set_mode_compatibility(&self, _modes: &[VideoMode]) {}

    fn push_frame(&self, _frame: &frame::Video) {}
}
