//! VideoMode derivation and change detection on synthetic frames.

use ffmpeg_next::{Rational, format::Pixel, frame, util::color};
use ffmpeg_sys_next::{AVColorRange, AVColorSpace, AVRational};
use playhead::{Chromaticities, ModeNegotiator};

fn yuv_frame(width: u32, height: u32) -> frame::Video {
    frame::Video::new(Pixel::YUV420P, width, height)
}

#[test]
fn underspecified_yuv_gets_broadcast_defaults() {
    let mut negotiator = ModeNegotiator::new(Rational(25, 1));
    let frame = yuv_frame(64, 48);

    let mode = negotiator.observe(&frame).expect("first frame sets a mode");

    assert_eq!(mode.frame_rate, Rational(25, 1));
    assert_eq!(mode.resolution, (64, 48));
    assert_eq!(mode.pixel_aspect_ratio, Rational(1, 1));
    assert_eq!(mode.primaries, color::Primaries::BT709);
    assert_eq!(mode.model, color::Space::BT709);
    assert_eq!(mode.transfer, color::TransferCharacteristic::BT709);
    assert_eq!(mode.range, color::Range::MPEG);
    assert_eq!(mode.pixel_format, Pixel::YUV420P);
    assert_eq!(mode.subsampling.horizontal, 2);
    assert_eq!(mode.subsampling.vertical, 2);
    assert_eq!(mode.chromaticities, Chromaticities::bt709());
}

#[test]
fn rgb_defaults_to_full_range() {
    let mut negotiator = ModeNegotiator::new(Rational(30, 1));
    let frame = frame::Video::new(Pixel::RGB24, 32, 32);

    let mode = negotiator.observe(&frame).expect("first frame sets a mode");

    assert_eq!(mode.model, color::Space::RGB);
    assert_eq!(mode.range, color::Range::JPEG);
    assert_eq!(mode.subsampling.horizontal, 1);
    assert_eq!(mode.subsampling.vertical, 1);
}

#[test]
fn explicit_frame_attributes_are_kept() {
    let mut negotiator = ModeNegotiator::new(Rational(25, 1));
    let mut frame = yuv_frame(64, 48);

    unsafe {
        let raw = frame.as_mut_ptr();
        (*raw).colorspace = AVColorSpace::AVCOL_SPC_BT2020_NCL;
        (*raw).color_range = AVColorRange::AVCOL_RANGE_JPEG;
        (*raw).sample_aspect_ratio = AVRational { num: 4, den: 3 };
    }

    let mode = negotiator.observe(&frame).expect("first frame sets a mode");

    assert_eq!(mode.model, color::Space::BT2020NCL);
    assert_eq!(mode.range, color::Range::JPEG);
    assert_eq!(mode.pixel_aspect_ratio, Rational(4, 3));
}

#[test]
fn unchanged_frames_do_not_renegotiate() {
    let mut negotiator = ModeNegotiator::new(Rational(25, 1));
    let frame = yuv_frame(64, 48);

    assert!(negotiator.observe(&frame).is_some());
    assert!(negotiator.observe(&frame).is_none());
    assert!(negotiator.observe(&frame).is_none());

    // A same-format sibling frame does not renegotiate either.
    let sibling = yuv_frame(64, 48);
    assert!(negotiator.observe(&sibling).is_none());
}

#[test]
fn resolution_change_renegotiates() {
    let mut negotiator = ModeNegotiator::new(Rational(25, 1));

    assert!(negotiator.observe(&yuv_frame(64, 48)).is_some());
    let mode = negotiator
        .observe(&yuv_frame(128, 96))
        .expect("resolution change renegotiates");
    assert_eq!(mode.resolution, (128, 96));
}

#[test]
fn range_change_renegotiates() {
    let mut negotiator = ModeNegotiator::new(Rational(25, 1));
    assert!(negotiator.observe(&yuv_frame(64, 48)).is_some());

    let mut frame = yuv_frame(64, 48);
    unsafe {
        (*frame.as_mut_ptr()).color_range = AVColorRange::AVCOL_RANGE_JPEG;
    }

    let mode = negotiator
        .observe(&frame)
        .expect("range change renegotiates");
    assert_eq!(mode.range, color::Range::JPEG);
}

#[test]
fn signal_loss_forgets_the_mode() {
    let mut negotiator = ModeNegotiator::new(Rational(25, 1));
    let frame = yuv_frame(64, 48);

    assert!(negotiator.observe(&frame).is_some());
    assert!(negotiator.signal_lost());
    // Nothing to forget the second time.
    assert!(!negotiator.signal_lost());

    // The same frame negotiates again after a loss.
    assert!(negotiator.observe(&frame).is_some());
}

#[test]
fn bt709_chromaticity_constants() {
    let chromaticities = Chromaticities::bt709();
    assert_eq!(chromaticities.red, (0.640, 0.330));
    assert_eq!(chromaticities.green, (0.300, 0.600));
    assert_eq!(chromaticities.blue, (0.150, 0.060));
    assert_eq!(chromaticities.white, (0.3127, 0.3290));
    assert_eq!(chromaticities.white_luminance, 100.0);
    assert_eq!(Chromaticities::default(), chromaticities);
}
