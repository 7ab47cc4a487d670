//! Presentation-clock arithmetic.
//!
//! All pipeline timestamps are compared on a single clock whose unit is the
//! microsecond (`AV_TIME_BASE`). Streams carry their own time bases, so
//! every comparison goes through [`to_clock`] first.

use ffmpeg_next::Rational;
use ffmpeg_sys_next::av_rescale_q;

/// Time base of the presentation clock: one tick per microsecond
/// (`AV_TIME_BASE`).
pub const CLOCK_TIME_BASE: Rational = Rational(1, 1_000_000);

/// Frame rate assumed when a stream does not report a usable one.
pub const FALLBACK_FRAME_RATE: Rational = Rational(25, 1);

/// Rescale a timestamp from a stream time base onto the microsecond clock.
pub fn to_clock(timestamp: i64, time_base: Rational) -> i64 {
    unsafe { av_rescale_q(timestamp, time_base.into(), CLOCK_TIME_BASE.into()) }
}

/// The clock timestamp up to which a decoded frame remains current.
///
/// A frame with presentation timestamp `pts` and duration `duration` (both
/// in `time_base` units) covers the half-open interval ending one tick
/// before the next frame starts; using `pts + duration - 1` makes a target
/// that lands exactly on a frame boundary resolve to the frame *already*
/// decoded instead of forcing one more decode step. Zero and negative
/// durations collapse to the frame's own timestamp.
pub fn reach_timestamp(pts: i64, duration: i64, time_base: Rational) -> i64 {
    to_clock(pts + (duration - 1).max(0), time_base)
}

/// Duration of one frame in clock units, for the given frame rate.
///
/// Streams without a usable rate (audio-only containers, broken headers)
/// fall back to [`FALLBACK_FRAME_RATE`].
pub fn frame_period(rate: Rational) -> i64 {
    let rate = if rate.0 > 0 && rate.1 > 0 {
        rate
    } else {
        FALLBACK_FRAME_RATE
    };

    // One frame expressed in 1/rate units, rescaled onto the clock.
    unsafe { av_rescale_q(1, Rational(rate.1, rate.0).into(), CLOCK_TIME_BASE.into()) }
}

/// Discontinuity heuristic for the decode loop.
///
/// `delta` is `target − decoded` in clock units. Any backward jump needs a
/// seek; a forward jump is cheaper to decode through unless it spans more
/// than `threshold_frames` frame periods.
pub fn should_seek(delta: i64, frame_period: i64, threshold_frames: u32) -> bool {
    delta < 0 || delta > frame_period.saturating_mul(i64::from(threshold_frames))
}
