//! Clock arithmetic: rescaling, reach timestamps, seek heuristic.

use ffmpeg_next::Rational;
use playhead::timing::{frame_period, reach_timestamp, should_seek, to_clock};

#[test]
fn to_clock_rescales_stream_timestamps() {
    // 25 ticks of a 1/25 s time base is exactly one second.
    assert_eq!(to_clock(25, Rational(1, 25)), 1_000_000);
    assert_eq!(to_clock(0, Rational(1, 25)), 0);
    // 90 kHz time base, common in MPEG containers.
    assert_eq!(to_clock(90_000, Rational(1, 90_000)), 1_000_000);
}

#[test]
fn reach_extends_to_one_tick_before_the_next_frame() {
    let time_base = Rational(1, 1000);
    // pts 10 ms, duration 40 ms: current until 49 ms inclusive.
    assert_eq!(reach_timestamp(10, 40, time_base), 49_000);
}

#[test]
fn reach_with_unknown_duration_is_the_pts_itself() {
    let time_base = Rational(1, 1000);
    assert_eq!(reach_timestamp(10, 0, time_base), 10_000);
    assert_eq!(reach_timestamp(10, -1, time_base), 10_000);
}

#[test]
fn reach_favors_the_already_decoded_frame_on_boundaries() {
    let time_base = Rational(1, 25);
    // Frame at tick 0 with duration 1 reaches one microsecond short of
    // tick 1, so a target exactly on the next frame boundary still needs
    // one more decode step while the boundary itself does not re-decode.
    let reach = reach_timestamp(0, 1, time_base);
    assert!(reach < to_clock(1, time_base));
    assert!(reach >= 0);
}

#[test]
fn frame_period_from_common_rates() {
    assert_eq!(frame_period(Rational(25, 1)), 40_000);
    assert_eq!(frame_period(Rational(50, 1)), 20_000);
    // 30000/1001 (NTSC): one frame is ~33.37 ms.
    let ntsc = frame_period(Rational(30_000, 1001));
    assert!((33_366..=33_367).contains(&ntsc));
}

#[test]
fn frame_period_falls_back_on_unusable_rates() {
    let fallback = frame_period(Rational(25, 1));
    assert_eq!(frame_period(Rational(0, 1)), fallback);
    assert_eq!(frame_period(Rational(0, 0)), fallback);
    assert_eq!(frame_period(Rational(-30, 1)), fallback);
}

#[test]
fn backward_jumps_always_seek() {
    assert!(should_seek(-1, 40_000, 16));
    assert!(should_seek(-1_000_000, 40_000, 16));
}

#[test]
fn small_forward_jumps_decode_through() {
    let period = 40_000;
    assert!(!should_seek(0, period, 16));
    assert!(!should_seek(period, period, 16));
    assert!(!should_seek(16 * period, period, 16));
}

#[test]
fn large_forward_jumps_seek() {
    let period = 40_000;
    assert!(should_seek(16 * period + 1, period, 16));
    assert!(should_seek(100 * period, period, 16));
}

#[test]
fn threshold_is_configurable() {
    let period = 40_000;
    assert!(should_seek(3 * period, period, 2));
    assert!(!should_seek(3 * period, period, 4));
}
