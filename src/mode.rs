//! Output video-mode negotiation.
//!
//! Containers routinely under-describe their video: missing aspect ratios,
//! "unspecified" colorimetry, no range information. [`VideoMode`] is the
//! fully-specified description of what a decoded frame actually contains,
//! derived from the frame itself with broadcast-sensible defaults (BT.709,
//! narrow range for YCbCr, full range for RGB) filling every gap.
//!
//! [`ModeNegotiator`] watches the decoded frame stream and re-derives the
//! mode only when one of the mode-relevant frame attributes changes, so the
//! upload sink is notified exactly once per format change rather than once
//! per frame.

use std::mem::size_of;

use ffmpeg_next::{
    Rational,
    format::Pixel,
    frame,
    util::color,
    util::frame::side_data,
};
use ffmpeg_sys_next::{AV_PIX_FMT_FLAG_RGB, AVRational};
#[repr(C)]
struct AVMasteringDisplayMetadata {
    display_primaries: [[AVRational; 2]; 3],
    white_point: [AVRational; 2],
    min_luminance: AVRational,
    max_luminance: AVRational,
    has_primaries: std::ffi::c_int,
    has_luminance: std::ffi::c_int,
}

/// CIE 1931 xy coordinates of the display primaries and white point,
/// plus the white luminance in cd/m².
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chromaticities {
    /// Red primary (x, y).
    pub red: (f64, f64),
    /// Green primary (x, y).
    pub green: (f64, f64),
    /// Blue primary (x, y).
    pub blue: (f64, f64),
    /// White point (x, y).
    pub white: (f64, f64),
    /// White luminance in cd/m².
    pub white_luminance: f64,
}

impl Chromaticities {
    /// ITU-R BT.709 primaries with a D65 white point at 100 cd/m².
    pub const fn bt709() -> Self {
        Self {
            red: (0.640, 0.330),
            green: (0.300, 0.600),
            blue: (0.150, 0.060),
            white: (0.3127, 0.3290),
            white_luminance: 100.0,
        }
    }
}

impl Default for Chromaticities {
    fn default() -> Self {
        Self::bt709()
    }
}

/// Chroma plane subsampling divisors, e.g. `(2, 2)` for 4:2:0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChromaSubsampling {
    /// Horizontal divisor.
    pub horizontal: u32,
    /// Vertical divisor.
    pub vertical: u32,
}

/// A fully-specified description of decoded video output.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMode {
    /// Frame rate of the stream the mode was derived from.
    pub frame_rate: Rational,
    /// Picture size in pixels.
    pub resolution: (u32, u32),
    /// Pixel (sample) aspect ratio; `1:1` when the container does not say.
    pub pixel_aspect_ratio: Rational,
    /// Color primaries; BT.709 when unspecified.
    pub primaries: color::Primaries,
    /// Color model (YCbCr matrix or RGB); derived from the pixel format
    /// when unspecified.
    pub model: color::Space,
    /// Transfer function; BT.709 when unspecified.
    pub transfer: color::TransferCharacteristic,
    /// Quantization range; narrow for YCbCr, full for RGB when unspecified.
    pub range: color::Range,
    /// Chroma subsampling of the pixel format.
    pub subsampling: ChromaSubsampling,
    /// Decoded pixel format.
    pub pixel_format: Pixel,
    /// Display chromaticities, overridden by mastering-display metadata
    /// when the stream carries it.
    pub chromaticities: Chromaticities,
}

/// The frame attributes that participate in mode change detection.
#[derive(Clone, PartialEq)]
struct FrameSignature {
    resolution: (u32, u32),
    sample_aspect_ratio: Rational,
    primaries: color::Primaries,
    space: color::Space,
    transfer: color::TransferCharacteristic,
    range: color::Range,
    format: Pixel,
}

impl FrameSignature {
    fn of(frame: &frame::Video) -> Self {
        let sample_aspect_ratio =
            Rational::from(unsafe { (*frame.as_ptr()).sample_aspect_ratio });

        Self {
            resolution: (frame.width(), frame.height()),
            sample_aspect_ratio,
            primaries: frame.color_primaries(),
            space: frame.color_space(),
            transfer: frame.color_transfer_characteristic(),
            range: frame.color_range(),
            format: frame.format(),
        }
    }
}

/// Pixel format properties that feed mode derivation.
struct FormatTraits {
    rgb: bool,
    subsampling: ChromaSubsampling,
}

fn format_traits(format: Pixel) -> FormatTraits {
    let descriptor = unsafe { ffmpeg_sys_next::av_pix_fmt_desc_get(format.into()) };
    if descriptor.is_null() {
        return FormatTraits {
            rgb: false,
            subsampling: ChromaSubsampling {
                horizontal: 1,
                vertical: 1,
            },
        };
    }

    unsafe {
        FormatTraits {
            rgb: (*descriptor).flags & AV_PIX_FMT_FLAG_RGB as u64 != 0,
            subsampling: ChromaSubsampling {
                horizontal: 1 << (*descriptor).log2_chroma_w,
                vertical: 1 << (*descriptor).log2_chroma_h,
            },
        }
    }
}

fn q2d(q: AVRational) -> f64 {
    if q.den == 0 {
        0.0
    } else {
        f64::from(q.num) / f64::from(q.den)
    }
}

/// Read mastering-display chromaticities from frame side data, starting
/// from BT.709 defaults for any field the metadata does not carry.
fn mastering_display_chromaticities(frame: &frame::Video) -> Chromaticities {
    let mut chromaticities = Chromaticities::bt709();

    for entry in frame.side_data(side_data::Type::MasteringDisplayMetadata) {
        if entry.kind() != side_data::Type::MasteringDisplayMetadata {
            continue;
        }

        let bytes = entry.data();
        if bytes.len() < size_of::<AVMasteringDisplayMetadata>() {
            continue;
        }

        // Side data payloads of this kind are the struct itself.
        let metadata = unsafe { &*(bytes.as_ptr() as *const AVMasteringDisplayMetadata) };

        if metadata.has_primaries != 0 {
            chromaticities.red = (
                q2d(metadata.display_primaries[0][0]),
                q2d(metadata.display_primaries[0][1]),
            );
            chromaticities.green = (
                q2d(metadata.display_primaries[1][0]),
                q2d(metadata.display_primaries[1][1]),
            );
            chromaticities.blue = (
                q2d(metadata.display_primaries[2][0]),
                q2d(metadata.display_primaries[2][1]),
            );
            chromaticities.white = (q2d(metadata.white_point[0]), q2d(metadata.white_point[1]));
        }

        if metadata.has_luminance != 0 {
            chromaticities.white_luminance = q2d(metadata.max_luminance);
        }
    }

    chromaticities
}

/// Derives [`VideoMode`]s from decoded frames, emitting one only when a
/// mode-relevant attribute actually changed.
pub struct ModeNegotiator {
    frame_rate: Rational,
    last: Option<FrameSignature>,
}

impl ModeNegotiator {
    /// Create a negotiator that stamps `frame_rate` onto every mode it
    /// derives.
    pub fn new(frame_rate: Rational) -> Self {
        Self {
            frame_rate,
            last: None,
        }
    }

    /// Inspect a decoded frame; returns the newly derived mode when one of
    /// the mode-relevant attributes changed since the last frame, `None`
    /// otherwise.
    pub fn observe(&mut self, frame: &frame::Video) -> Option<VideoMode> {
        let signature = FrameSignature::of(frame);
        if self.last.as_ref() == Some(&signature) {
            return None;
        }

        let mode = derive_mode(self.frame_rate, frame, &signature);
        self.last = Some(signature);
        Some(mode)
    }

    /// Forget the last observed frame, e.g. after the stream ended or a
    /// decoder was torn down. Returns `true` if a mode had been active, in
    /// which case the sink should be told compatibility is now empty.
    pub fn signal_lost(&mut self) -> bool {
        self.last.take().is_some()
    }
}

fn derive_mode(frame_rate: Rational, frame: &frame::Video, signature: &FrameSignature) -> VideoMode {
    let traits = format_traits(signature.format);

    let pixel_aspect_ratio = {
        let sar = signature.sample_aspect_ratio;
        if sar.0 > 0 && sar.1 > 0 {
            sar
        } else {
            Rational(1, 1)
        }
    };

    let primaries = match signature.primaries {
        color::Primaries::Unspecified => color::Primaries::BT709,
        other => other,
    };

    let model = match signature.space {
        color::Space::Unspecified => {
            if traits.rgb {
                color::Space::RGB
            } else {
                color::Space::BT709
            }
        }
        other => other,
    };

    let transfer = match signature.transfer {
        color::TransferCharacteristic::Unspecified => color::TransferCharacteristic::BT709,
        other => other,
    };

    let range = match signature.range {
        color::Range::Unspecified => {
            if traits.rgb {
                color::Range::JPEG
            } else {
                color::Range::MPEG
            }
        }
        other => other,
    };

    VideoMode {
        frame_rate,
        resolution: signature.resolution,
        pixel_aspect_ratio,
        primaries,
        model,
        transfer,
        range,
        subsampling: traits.subsampling,
        pixel_format: signature.format,
        chromaticities: mastering_display_chromaticities(frame),
    }
}
