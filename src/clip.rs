//! Clip playback: the timeline controller.
//!
//! A [`Clip`] ties the whole pipeline together: it opens a container, picks
//! the best video and audio streams, builds one decoder per stream, and
//! spawns a dedicated decode thread. The consumer moves a *target* position
//! along the presentation clock (`play`/`seek`/`advance`) and calls
//! [`sync`](Clip::sync) to make decoded output catch up with it.
//!
//! The decode thread decodes every active stream until its frames *reach*
//! the target, publishes the minimum reached timestamp across streams, and
//! parks until the next request. Discontinuities (backward jumps, large
//! forward jumps) are absorbed with a container seek plus decoder flush.
//! Truncated or corrupt media never errors: when decoding cannot reach the
//! target, the advertised duration shrinks to what was actually decodable
//! and playback ends cleanly there.

use std::{
    path::Path,
    sync::Arc,
    thread::{self, JoinHandle},
};

use ffmpeg_next::{Rational, frame, media::Type};
use log::{debug, trace, warn};
use parking_lot::{Condvar, Mutex};

use crate::{
    decoder::{DecodedFrame, DecoderOptions, PacketQueue, StreamDecoder},
    demuxer::{Demuxer, PacketRef, SeekFlags},
    error::PlayheadError,
    mode::{ModeNegotiator, VideoMode},
    pool::PoolRef,
    port::Port,
    timing,
    uploader::UploadSink,
};

/// Configuration for [`Clip::open`].
#[derive(Debug, Clone)]
pub struct ClipOptions {
    hardware: bool,
    thread_count: usize,
    seek_threshold: u32,
}

impl Default for ClipOptions {
    fn default() -> Self {
        Self {
            hardware: true,
            thread_count: 0,
            seek_threshold: 16,
        }
    }
}

impl ClipOptions {
    /// Defaults: hardware acceleration on (with software fallback), one
    /// codec thread per core, seek threshold of 16 frame periods.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt hardware-accelerated video decoding.
    pub fn with_hardware_acceleration(mut self, enabled: bool) -> Self {
        self.hardware = enabled;
        self
    }

    /// Number of codec worker threads per decoder; `0` picks one per core.
    pub fn with_threads(mut self, count: usize) -> Self {
        self.thread_count = count;
        self
    }

    /// Forward jumps larger than this many frame periods are handled with
    /// a seek instead of decoding through the gap.
    pub fn with_seek_threshold(mut self, frame_periods: u32) -> Self {
        self.seek_threshold = frame_periods;
        self
    }
}

/// Shared state of the consumer / decode-thread handshake.
struct TimelineState {
    /// Clock position decoding should reach, in microseconds.
    target: i64,
    /// Minimum reached timestamp across active streams; `None` until the
    /// first frame after open or flush.
    decoded: Option<i64>,
    /// Advertised clip duration; only ever shrinks.
    duration: i64,
    /// Whether the current request has been fully processed.
    complete: bool,
    /// Tells the decode thread to exit.
    exit: bool,
}

struct SharedTimeline {
    state: Mutex<TimelineState>,
    start: Condvar,
    done: Condvar,
}

/// Destination for one stream's demuxed packets.
struct Route {
    index: usize,
    port: Port<PacketRef>,
    queue: PacketQueue,
}

/// One stream being actively decoded.
struct ActiveStream<F: DecodedFrame> {
    decoder: StreamDecoder<F>,
    /// Most recent decoded frame, kept alive until replaced.
    latest: Port<PoolRef<F>>,
    time_base: Rational,
    /// Clock timestamp up to which this stream's output is current.
    reach: Option<i64>,
}

/// Everything the decode thread owns.
///
/// Internally wired with `Rc`/`RefCell` handles (ports, queues); those
/// never leave this struct, and the struct as a whole lives on exactly one
/// thread at a time, so moving it into the decode thread is sound.
struct PipelineCore {
    // Declared before `demuxer` so codec sessions are torn down first.
    video: Option<ActiveStream<frame::Video>>,
    audio: Option<ActiveStream<frame::Audio>>,
    routes: Vec<Route>,
    demuxer: Demuxer,
    negotiator: Option<ModeNegotiator>,
    sink: Arc<dyn UploadSink>,
    modes: Arc<Mutex<Vec<VideoMode>>>,
    frame_period: i64,
    seek_threshold: u32,
}

unsafe impl Send for PipelineCore {}

/// Run the demuxer one step and move the produced packet (if any) to the
/// decoder that owns its stream. Returns `false` when the demuxer failed
/// to produce, so a starved decoder gives up instead of spinning.
fn route_step(demuxer: &mut Demuxer, routes: &[Route]) -> bool {
    demuxer.read();

    let Some(last) = demuxer.last_stream_index() else {
        return false;
    };

    if let Some(route) = routes.iter().find(|route| route.index == last) {
        if let Some(packet) = route.port.pull() {
            route.queue.push(packet);
        }
    }

    true
}

/// Decode one stream until its reach timestamp meets `target` or it stops
/// producing frames for this step. Returns whether the target was reached;
/// `false` means the stream dried up (end of media, truncation, starvation)
/// before getting there.
fn drain_stream<F: DecodedFrame>(
    stream: &mut ActiveStream<F>,
    demuxer: &mut Demuxer,
    routes: &[Route],
    target: i64,
    mut on_frame: impl FnMut(&F),
) -> bool {
    while stream.reach.is_none_or(|reach| reach < target) {
        let Some(frame) = stream.decoder.decode(|| route_step(demuxer, routes)) else {
            break;
        };

        let (pts, duration) = unsafe {
            let raw = frame.as_ptr();
            ((*raw).best_effort_timestamp, (*raw).duration)
        };
        // Frames without any usable timestamp sort at the clip start; the
        // loop still terminates because the decoder eventually drains.
        let pts = if pts == ffmpeg_sys_next::AV_NOPTS_VALUE {
            0
        } else {
            pts
        };

        stream.reach = Some(timing::reach_timestamp(pts, duration, stream.time_base));
        on_frame(&frame);
        stream.latest.push(frame);
    }

    stream.reach.is_some_and(|reach| reach >= target)
}

impl PipelineCore {
    /// Seek the container to `target` and reset all decode state.
    ///
    /// Backward-biased only: landing on a keyframe at or before the target
    /// keeps every frame decoded from the landing point reconstructable,
    /// so nothing corrupt ever reaches the sink.
    fn seek_and_flush(&mut self, target: i64) {
        let flags = SeekFlags {
            backward: true,
            any_frame: false,
        };
        if let Err(error) = self.demuxer.seek(target, flags) {
            warn!("Discontinuity seek failed, decoding through: {error}");
        }
        self.demuxer.flush();

        for route in &self.routes {
            route.port.reset();
            route.queue.clear();
        }
        if let Some(video) = &mut self.video {
            video.decoder.flush();
            video.latest.reset();
            video.reach = None;
        }
        if let Some(audio) = &mut self.audio {
            audio.decoder.flush();
            audio.latest.reset();
            audio.reach = None;
        }
    }

    /// Decode all active streams up to `target`; returns the minimum
    /// reached timestamp, `None` while no stream has decoded anything.
    fn decode_until(&mut self, target: i64) -> Option<i64> {
        let Self {
            video,
            audio,
            routes,
            demuxer,
            negotiator,
            sink,
            modes,
            ..
        } = self;

        let mut video_reached = true;
        if let Some(stream) = video {
            video_reached = drain_stream(stream, demuxer, routes, target, |frame| {
                if let Some(negotiator) = negotiator.as_mut() {
                    if let Some(mode) = negotiator.observe(frame) {
                        debug!("Video mode changed: {mode:?}");
                        let compatibility = vec![mode];
                        sink.set_mode_compatibility(&compatibility);
                        *modes.lock() = compatibility;
                    }
                }
                sink.push_frame(frame);
            });
        }

        if let Some(stream) = audio {
            drain_stream(stream, demuxer, routes, target, |_frame| {});
        }

        // A video stream that stopped producing before the target has gone
        // invalid; the sink learns immediately, not at teardown.
        if !video_reached {
            self.signal_lost();
        }

        let mut minimum: Option<i64> = None;
        for reach in [
            self.video.as_ref().map(|stream| stream.reach),
            self.audio.as_ref().map(|stream| stream.reach),
        ]
        .into_iter()
        .flatten()
        {
            // A stream that decoded nothing since the last flush pins the
            // published timestamp to "unknown".
            let reach = reach.unwrap_or(-1);
            minimum = Some(minimum.map_or(reach, |current| current.min(reach)));
        }

        minimum.filter(|&timestamp| timestamp >= 0)
    }

    /// Tell the sink the video signal is gone.
    fn signal_lost(&mut self) {
        if let Some(negotiator) = self.negotiator.as_mut() {
            if negotiator.signal_lost() {
                self.sink.set_mode_compatibility(&[]);
                self.modes.lock().clear();
            }
        }
    }
}

/// Body of the dedicated decode thread.
///
/// Holds the timeline lock except while parked, mirroring the consumer
/// side which only touches the state between requests. Codec sessions and
/// the demuxer are torn down here, after the exit signal, so the consumer's
/// join-then-drop ordering is upheld by construction.
fn decode_loop(mut core: PipelineCore, shared: Arc<SharedTimeline>) {
    let mut state = shared.state.lock();

    loop {
        while state.complete && !state.exit {
            shared.start.wait(&mut state);
        }
        if state.exit {
            break;
        }

        let target = state.target;
        let delta = target - state.decoded.unwrap_or(-1);
        if timing::should_seek(delta, core.frame_period, core.seek_threshold) {
            trace!("Discontinuity of {delta} us, seeking to {target}");
            core.seek_and_flush(target);
            state.decoded = None;
        }

        state.decoded = core.decode_until(target);
        state.complete = true;
        shared.done.notify_all();
    }

    drop(state);
    core.signal_lost();
}

/// An open media clip driven against an external presentation clock.
///
/// All positions are in microseconds. The clip does not advance itself:
/// the consumer moves the target with [`seek`](Clip::seek) /
/// [`advance`](Clip::advance) and calls [`sync`](Clip::sync) whenever it
/// wants decoded output to catch up.
pub struct Clip {
    shared: Arc<SharedTimeline>,
    thread: Option<JoinHandle<()>>,
    modes: Arc<Mutex<Vec<VideoMode>>>,
    frame_period: i64,
    position: i64,
    playing: bool,
}

impl Clip {
    /// Open a clip and spawn its decode thread.
    ///
    /// Picks the container's best video and best audio stream; either may
    /// be absent, both absent is an error. Decoded video frames flow into
    /// `sink`.
    pub fn open(
        path: impl AsRef<Path>,
        options: ClipOptions,
        sink: Arc<dyn UploadSink>,
    ) -> Result<Self, PlayheadError> {
        let demuxer = Demuxer::open(path)?;

        let video_index = demuxer.find_best_stream(Type::Video);
        let audio_index = demuxer.find_best_stream(Type::Audio);
        if video_index.is_none() && audio_index.is_none() {
            return Err(PlayheadError::NoStreams);
        }

        let video_options = DecoderOptions::new()
            .with_threads(options.thread_count)
            .with_hardware_acceleration(options.hardware)
            .with_uploadable_formats(sink.supported_formats().to_vec());
        let audio_options = DecoderOptions::new().with_threads(options.thread_count);

        let mut routes = Vec::new();
        let video = video_index
            .map(|index| activate(&demuxer, index, &video_options, &mut routes))
            .transpose()?;
        let audio = audio_index
            .map(|index| activate(&demuxer, index, &audio_options, &mut routes))
            .transpose()?;

        let frame_rate = video_index
            .map(|index| demuxer.streams()[index].real_frame_rate())
            .filter(|rate| rate.0 > 0 && rate.1 > 0)
            .unwrap_or(timing::FALLBACK_FRAME_RATE);
        let frame_period = timing::frame_period(frame_rate);
        let duration = demuxer.duration();

        debug!(
            "Clip {} open: video={video_index:?} audio={audio_index:?} duration={duration} us",
            demuxer.path().display()
        );

        let modes = Arc::new(Mutex::new(Vec::new()));
        let core = PipelineCore {
            video,
            audio,
            routes,
            demuxer,
            negotiator: video_index.map(|_| ModeNegotiator::new(frame_rate)),
            sink,
            modes: Arc::clone(&modes),
            frame_period,
            seek_threshold: options.seek_threshold,
        };

        let shared = Arc::new(SharedTimeline {
            state: Mutex::new(TimelineState {
                target: 0,
                decoded: None,
                duration,
                complete: true,
                exit: false,
            }),
            start: Condvar::new(),
            done: Condvar::new(),
        });

        let thread = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("playhead-decode".into())
                .spawn(move || decode_loop(core, shared))?
        };

        Ok(Self {
            shared,
            thread: Some(thread),
            modes,
            frame_period,
            position: 0,
            playing: false,
        })
    }

    /// Start advancing on [`advance`](Clip::advance) calls.
    pub fn play(&mut self) {
        self.playing = true;
    }

    /// Stop advancing; the target stays where it is.
    pub fn pause(&mut self) {
        self.playing = false;
    }

    /// Whether the clip is currently playing.
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Move the target to an absolute clock position, clamped to the clip
    /// extent. Takes effect on the next [`sync`](Clip::sync).
    pub fn seek(&mut self, position: i64) {
        self.position = position.clamp(0, self.duration());
    }

    /// Advance the target by `delta` microseconds of elapsed presentation
    /// time. Does nothing while paused.
    pub fn advance(&mut self, delta: i64) {
        if self.playing {
            self.seek(self.position.saturating_add(delta));
        }
    }

    /// Decode until output reaches the current target position.
    ///
    /// Blocks while the decode thread works. When the media turns out to
    /// be shorter than advertised (truncation, corruption past a point),
    /// the duration shrinks to what was reached and the position is
    /// clamped; this never fails. Returns [`PlayheadError::Closed`] after
    /// [`close`](Clip::close).
    pub fn sync(&mut self) -> Result<(), PlayheadError> {
        if self.thread.is_none() {
            return Err(PlayheadError::Closed);
        }

        let shared = Arc::clone(&self.shared);
        let mut state = shared.state.lock();
        state.target = self.position;
        state.complete = false;
        shared.start.notify_one();

        while !state.complete && !state.exit {
            shared.done.wait(&mut state);
        }

        let decoded = state.decoded.unwrap_or(-1);
        if decoded < state.target {
            let reached = decoded.max(0);
            if reached < state.duration {
                debug!(
                    "Decoding stopped at {reached} us before target {} us, clamping duration",
                    state.target
                );
                state.duration = reached;
            }
            self.position = self.position.min(state.duration);
        }

        Ok(())
    }

    /// Current target position in microseconds.
    pub fn position(&self) -> i64 {
        self.position
    }

    /// Clip duration in microseconds. Shrinks (never grows) when decoding
    /// discovers the media ends early.
    pub fn duration(&self) -> i64 {
        self.shared.state.lock().duration
    }

    /// Duration of one video frame in microseconds (from the stream's
    /// frame rate, with a 25 fps fallback).
    pub fn frame_period(&self) -> i64 {
        self.frame_period
    }

    /// The output modes currently offered to the upload sink; empty before
    /// the first decoded video frame and after signal loss.
    pub fn mode_compatibility(&self) -> Vec<VideoMode> {
        self.modes.lock().clone()
    }

    /// Stop the decode thread and release all codec and container
    /// resources. Idempotent; also runs on drop.
    pub fn close(&mut self) {
        let Some(handle) = self.thread.take() else {
            return;
        };

        {
            let mut state = self.shared.state.lock();
            state.exit = true;
        }
        self.shared.start.notify_all();
        self.shared.done.notify_all();

        if handle.join().is_err() {
            warn!("Decode thread panicked during shutdown");
        }
    }
}

impl Drop for Clip {
    fn drop(&mut self) {
        self.close();
    }
}

fn activate<F: DecodedFrame>(
    demuxer: &Demuxer,
    index: usize,
    options: &DecoderOptions,
    routes: &mut Vec<Route>,
) -> Result<ActiveStream<F>, PlayheadError> {
    let info = &demuxer.streams()[index];
    let decoder = StreamDecoder::open(info, options)?;

    // The port always exists: indexes come from the same demuxer.
    let port = demuxer
        .port(index)
        .ok_or_else(|| PlayheadError::Ffmpeg(format!("No demuxer port for stream {index}")))?;

    routes.push(Route {
        index,
        port,
        queue: decoder.queue(),
    });

    Ok(ActiveStream {
        decoder,
        latest: Port::new(),
        time_base: info.time_base(),
        reach: None,
    })
}
