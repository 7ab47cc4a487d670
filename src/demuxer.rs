//! Container demultiplexing.
//!
//! [`Demuxer`] wraps an FFmpeg input context and splits it into elementary
//! streams: one [`Port`] of pooled packets per stream. It reads exactly one
//! packet per [`read`](Demuxer::read) call so the decode loop stays in
//! control of pacing, and it turns end-of-stream into per-stream flush
//! markers (empty packets) delivered round-robin so every decoder gets told
//! to drain.

use std::path::{Path, PathBuf};

use ffmpeg_next::{Packet, format, media::Type};
use ffmpeg_sys_next::{AVSEEK_FLAG_ANY, AVSEEK_FLAG_BACKWARD};
use log::{debug, trace, warn};

use crate::{
    error::PlayheadError,
    pool::{BufferPool, PoolRef},
    port::Port,
    stream::StreamInfo,
};

/// A pooled compressed packet as routed by the demuxer.
pub type PacketRef = PoolRef<Packet>;

/// How a [`Demuxer::seek`] request snaps to the stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeekFlags {
    /// Snap to the nearest point at or before the target, so decoding
    /// forward from the landing point always crosses the target.
    pub backward: bool,
    /// Allow landing on non-key frames. Fast, but decoders will produce
    /// garbage until the next key frame.
    pub any_frame: bool,
}

impl SeekFlags {
    fn to_av_flags(self) -> i32 {
        let mut flags = 0;
        if self.backward {
            flags |= AVSEEK_FLAG_BACKWARD as i32;
        }
        if self.any_frame {
            flags |= AVSEEK_FLAG_ANY as i32;
        }
        flags
    }
}

/// Demultiplexes one container into per-stream packet ports.
pub struct Demuxer {
    input: format::context::Input,
    path: PathBuf,
    streams: Vec<StreamInfo>,
    ports: Vec<Port<PacketRef>>,
    pool: BufferPool<Packet>,
    last_stream_index: Option<usize>,
}

impl Demuxer {
    /// Open a container and snapshot its streams.
    ///
    /// `path` may be a local file path or any URL the FFmpeg build's
    /// protocol handlers accept.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PlayheadError> {
        crate::ffmpeg::ensure_initialized()?;

        let path = path.as_ref();
        let input = format::input(&path).map_err(|error| PlayheadError::Open {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })?;

        let streams: Vec<StreamInfo> = input
            .streams()
            .map(|stream| StreamInfo::from_stream(&stream))
            .collect();
        let ports = streams.iter().map(|_| Port::new()).collect();

        debug!(
            "Opened {} with {} stream(s)",
            path.display(),
            streams.len()
        );

        Ok(Self {
            input,
            path: path.to_path_buf(),
            streams,
            ports,
            pool: BufferPool::packets(),
            last_stream_index: None,
        })
    }

    /// Path the demuxer was opened with.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Descriptors of every elementary stream in the container.
    pub fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    /// Index of FFmpeg's preferred stream of the given kind, if the
    /// container has one. Absence is not an error.
    pub fn find_best_stream(&self, kind: Type) -> Option<usize> {
        self.input.streams().best(kind).map(|stream| stream.index())
    }

    /// Output port carrying packets of stream `index`.
    pub fn port(&self, index: usize) -> Option<Port<PacketRef>> {
        self.ports.get(index).cloned()
    }

    /// Index of the stream the last [`read`](Demuxer::read) produced a
    /// packet (or flush marker) for. `None` before the first read and
    /// after a read error.
    pub fn last_stream_index(&self) -> Option<usize> {
        self.last_stream_index
    }

    /// Read the next packet from the container and route it.
    ///
    /// On success the packet lands on its stream's port and
    /// [`last_stream_index`](Demuxer::last_stream_index) records the
    /// stream. At end of stream an *empty* packet is delivered instead,
    /// rotating through the streams one per call so each decoder receives
    /// its flush marker. Any other read error clears the last index and
    /// delivers nothing; persistent errors surface to the caller as
    /// starvation, never as a panic.
    pub fn read(&mut self) {
        let mut packet = self.pool.acquire();

        match packet.read(&mut self.input) {
            Ok(()) => {
                let index = packet.stream();
                self.last_stream_index = Some(index);
                if let Some(port) = self.ports.get(index) {
                    port.push(packet);
                } else {
                    trace!("Dropping packet for unknown stream {index}");
                }
            }
            Err(ffmpeg_next::Error::Eof) => {
                if self.ports.is_empty() {
                    self.last_stream_index = None;
                    return;
                }

                // Deliver the flush marker to one stream per call,
                // cycling so every decoder eventually drains.
                let next = self
                    .last_stream_index
                    .map_or(0, |index| (index + 1) % self.ports.len());
                self.last_stream_index = Some(next);
                self.ports[next].push(packet);
            }
            Err(error) => {
                self.last_stream_index = None;
                warn!("Failed to read packet from {}: {error}", self.path.display());
            }
        }
    }

    /// Seek the whole container to `timestamp` (microseconds on the
    /// presentation clock). FFmpeg clamps targets outside the stream
    /// extent; this does not flush decoder state.
    pub fn seek(&mut self, timestamp: i64, flags: SeekFlags) -> Result<(), PlayheadError> {
        let result = unsafe {
            ffmpeg_sys_next::av_seek_frame(
                self.input.as_mut_ptr(),
                -1,
                timestamp,
                flags.to_av_flags(),
            )
        };

        if result < 0 {
            Err(PlayheadError::Seek(format!(
                "av_seek_frame to {timestamp} failed (result={result})"
            )))
        } else {
            trace!("Seeked {} to {timestamp} us", self.path.display());
            Ok(())
        }
    }

    /// Drop the demuxer's internal buffering. Does not touch decoder
    /// state or packets already routed to ports.
    pub fn flush(&mut self) {
        unsafe {
            ffmpeg_sys_next::avformat_flush(self.input.as_mut_ptr());
        }
    }

    /// Container duration in microseconds, `0` when unknown.
    pub fn duration(&self) -> i64 {
        self.input.duration().max(0)
    }
}
