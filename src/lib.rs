//! # playhead
//!
//! Real-time media clip playback pipeline — demultiplex, decode, and pace
//! media streams against an externally driven presentation clock, powered
//! by FFmpeg via the [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next)
//! crate.
//!
//! `playhead` does not render anything. It turns a container (file or URL)
//! into decoded, timestamped frames and keeps them synchronized with a
//! clock that *you* advance; what happens to the pixels is up to the
//! [`UploadSink`] you plug in.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use playhead::{Clip, ClipOptions, NullSink};
//!
//! let mut clip = Clip::open("input.mp4", ClipOptions::new(), Arc::new(NullSink)).unwrap();
//!
//! clip.play();
//! while clip.position() < clip.duration() {
//!     // Advance by one frame of presentation time and decode up to it.
//!     clip.advance(clip.frame_period());
//!     clip.sync().unwrap();
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`Demuxer`] splits the container into per-stream packet [`Port`]s,
//!   turning end-of-stream into per-stream flush markers.
//! - [`StreamDecoder`] runs one codec session per stream behind a single
//!   pull-driven decode-step surface, feeding itself through a reentrant
//!   callback that runs the demuxer.
//! - [`BufferPool`] recycles packets and frames so the steady-state decode
//!   loop never allocates.
//! - [`ModeNegotiator`] derives a fully specified [`VideoMode`] (colorimetry
//!   defaults, HDR mastering metadata) whenever the decoded format changes.
//! - [`Clip`] owns the dedicated decode thread: move the target with
//!   [`seek`](Clip::seek)/[`advance`](Clip::advance), then
//!   [`sync`](Clip::sync) to make every active stream catch up. Truncated
//!   media shrinks the duration instead of erroring.
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system.

pub mod clip;
pub mod decoder;
pub mod demuxer;
pub mod error;
pub mod ffmpeg;
pub mod hw;
pub mod mode;
pub mod pool;
pub mod port;
pub mod stream;
pub mod timing;
pub mod uploader;

pub use clip::{Clip, ClipOptions};
pub use decoder::{DecodedFrame, DecoderOptions, PacketQueue, StreamDecoder, ThreadingKind};
pub use demuxer::{Demuxer, PacketRef, SeekFlags};
pub use error::PlayheadError;
pub use ffmpeg::{FfmpegLogLevel, get_ffmpeg_log_level, set_ffmpeg_log_level};
pub use hw::{HardwareDeviceType, available_devices, codec_devices};
pub use mode::{Chromaticities, ChromaSubsampling, ModeNegotiator, VideoMode};
pub use pool::{BufferPool, PoolRef, Recycle};
pub use port::Port;
pub use stream::StreamInfo;
pub use uploader::{NullSink, UploadSink};
