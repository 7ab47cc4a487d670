//! Elementary stream descriptors.
//!
//! A [`StreamInfo`] is an immutable snapshot of one elementary stream taken
//! when the container is opened: its kind, time base, codec, geometry or
//! sample rate, frame rates, and timeline extent. Stream time bases never
//! change for the life of an open demuxer, so the snapshot stays valid.

use std::fmt::{Debug, Formatter, Result as FmtResult};

use ffmpeg_next::{Rational, codec, format::stream::Stream, media::Type};

/// An immutable description of one elementary stream in a container.
pub struct StreamInfo {
    index: usize,
    kind: Type,
    time_base: Rational,
    codec_id: codec::Id,
    width: u32,
    height: u32,
    sample_rate: u32,
    channels: u32,
    real_frame_rate: Rational,
    avg_frame_rate: Rational,
    duration: i64,
    start_time: i64,
    parameters: codec::Parameters,
}

impl StreamInfo {
    /// Snapshot a container stream.
    pub(crate) fn from_stream(stream: &Stream<'_>) -> Self {
        let parameters = stream.parameters().clone();
        let (width, height, sample_rate, channels) = unsafe {
            let par = parameters.as_ptr();
            (
                (*par).width.max(0) as u32,
                (*par).height.max(0) as u32,
                (*par).sample_rate.max(0) as u32,
                (*par).ch_layout.nb_channels.max(0) as u32,
            )
        };

        Self {
            index: stream.index(),
            kind: parameters.medium(),
            time_base: stream.time_base(),
            codec_id: parameters.id(),
            width,
            height,
            sample_rate,
            channels,
            real_frame_rate: stream.rate(),
            avg_frame_rate: stream.avg_frame_rate(),
            duration: stream.duration(),
            start_time: stream.start_time(),
            parameters,
        }
    }

    /// Index of the stream within its container.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Media kind (video, audio, subtitle, data, attachment).
    pub fn kind(&self) -> Type {
        self.kind
    }

    /// Time base all of this stream's timestamps are expressed in.
    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    /// Codec identifier.
    pub fn codec_id(&self) -> codec::Id {
        self.codec_id
    }

    /// Codec name as reported by FFmpeg.
    pub fn codec_name(&self) -> &'static str {
        self.codec_id.name()
    }

    /// Coded picture size, `(0, 0)` for non-video streams.
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Sample rate in Hz, `0` for non-audio streams.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count, `0` for non-audio streams.
    pub fn channels(&self) -> u32 {
        self.channels
    }

    /// The base frame rate of the stream (`r_frame_rate`): the lowest rate
    /// at which all of its timestamps can be represented accurately.
    pub fn real_frame_rate(&self) -> Rational {
        self.real_frame_rate
    }

    /// Average frame rate over the whole stream. May be `0/0` when the
    /// container does not know it.
    pub fn avg_frame_rate(&self) -> Rational {
        self.avg_frame_rate
    }

    /// Stream duration in [`time_base`](StreamInfo::time_base) units.
    pub fn duration(&self) -> i64 {
        self.duration
    }

    /// Presentation timestamp of the first frame, in
    /// [`time_base`](StreamInfo::time_base) units.
    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    /// Codec parameters used to open a decoder session for this stream.
    pub fn parameters(&self) -> &codec::Parameters {
        &self.parameters
    }
}

impl Debug for StreamInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("StreamInfo")
            .field("index", &self.index)
            .field("kind", &self.kind)
            .field("codec", &self.codec_name())
            .field("time_base", &self.time_base)
            .field("resolution", &(self.width, self.height))
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("real_frame_rate", &self.real_frame_rate)
            .field("duration", &self.duration)
            .finish_non_exhaustive()
    }
}
