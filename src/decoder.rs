//! Per-stream decode sessions.
//!
//! A [`StreamDecoder`] owns one FFmpeg codec session and decodes one stream
//! into pooled frames. It is generic over the frame kind
//! ([`frame::Video`](ffmpeg_next::frame::Video) /
//! [`frame::Audio`](ffmpeg_next::frame::Audio)) so video and audio go
//! through one decode-step surface.
//!
//! Decoding is *pull driven*: [`StreamDecoder::decode`] asks the codec for
//! a frame and, whenever the codec wants more input, invokes a caller
//! supplied `feed` callback until the decoder's [`PacketQueue`] is
//! non-empty. The callback typically runs the demuxer, which routes packets
//! to *all* decoder queues, so feeding one stream may stock the others.

use std::{cell::RefCell, collections::VecDeque, ffi::c_void, rc::Rc};

use ffmpeg_next::{
    Error as FfmpegError, codec, decoder::Opened, error::EAGAIN, format::Pixel, frame,
    util::frame::Frame,
};
use ffmpeg_sys_next::{AVCodecContext, AVPixelFormat, FF_THREAD_FRAME, FF_THREAD_SLICE};
use log::{debug, trace};

use crate::{
    demuxer::PacketRef,
    error::PlayheadError,
    hw::{self, HardwareDeviceType},
    pool::{BufferPool, PoolRef, Recycle},
    stream::StreamInfo,
};

/// Frame kinds a [`StreamDecoder`] can produce.
pub trait DecodedFrame: Recycle + std::ops::DerefMut<Target = Frame> {
    /// Allocate an empty frame of this kind.
    fn empty() -> Self;
}

impl DecodedFrame for frame::Video {
    fn empty() -> Self {
        frame::Video::empty()
    }
}

impl DecodedFrame for frame::Audio {
    fn empty() -> Self {
        frame::Audio::empty()
    }
}

/// FIFO of compressed packets awaiting one decoder.
///
/// Cloning yields another handle to the same queue; the pipeline router
/// holds one and the decoder holds another. Confined to the decode thread.
pub struct PacketQueue {
    inner: Rc<RefCell<VecDeque<PacketRef>>>,
}

impl Clone for PacketQueue {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl Default for PacketQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    /// Append a packet at the back.
    pub fn push(&self, packet: PacketRef) {
        self.inner.borrow_mut().push_back(packet);
    }

    /// Whether the queue holds no packets.
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }

    /// Number of queued packets.
    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    /// Drop all queued packets back into their pool.
    pub fn clear(&self) {
        self.inner.borrow_mut().clear();
    }

    fn pop(&self) -> Option<PacketRef> {
        self.inner.borrow_mut().pop_front()
    }
}

/// How the codec session parallelizes decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadingKind {
    /// Decode whole frames in parallel. Higher throughput, adds latency.
    #[default]
    Frame,
    /// Decode slices of one frame in parallel.
    Slice,
}

impl ThreadingKind {
    fn to_av_flags(self) -> i32 {
        match self {
            ThreadingKind::Frame => FF_THREAD_FRAME as i32,
            ThreadingKind::Slice => FF_THREAD_SLICE as i32,
        }
    }
}

/// Configuration for opening a [`StreamDecoder`].
#[derive(Debug, Clone, Default)]
pub struct DecoderOptions {
    thread_count: usize,
    thread_type: ThreadingKind,
    hardware: bool,
    uploadable: Vec<Pixel>,
}

impl DecoderOptions {
    /// Default options: automatic thread count, frame threading, software
    /// decoding, no output-format steering.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of codec worker threads; `0` picks one per CPU core.
    pub fn with_threads(mut self, count: usize) -> Self {
        self.thread_count = count;
        self
    }

    /// Select frame or slice threading.
    pub fn with_thread_type(mut self, kind: ThreadingKind) -> Self {
        self.thread_type = kind;
        self
    }

    /// Attempt hardware-accelerated decoding, falling back to software
    /// when no suitable device exists.
    pub fn with_hardware_acceleration(mut self, enabled: bool) -> Self {
        self.hardware = enabled;
        self
    }

    /// Pixel formats the downstream sink takes natively, in preference
    /// order. Steers the codec's output-format negotiation.
    pub fn with_uploadable_formats(mut self, formats: Vec<Pixel>) -> Self {
        self.uploadable = formats;
        self
    }
}

/// Pixel-format preferences consulted from the codec's `get_format`
/// callback. Boxed so its address stays stable for the life of the session.
struct NegotiationState {
    uploadable: Vec<AVPixelFormat>,
    device: Option<HardwareDeviceType>,
}

/// Codec `get_format` callback: pick the output pixel format from the
/// codec's suggestions.
///
/// Preference order: an uploadable GPU surface format belonging to the
/// device the session opened, then any uploadable software format, then
/// the codec's own first suggestion.
unsafe extern "C" fn negotiate_pixel_format(
    context: *mut AVCodecContext,
    formats: *const AVPixelFormat,
) -> AVPixelFormat {
    unsafe {
        if formats.is_null() {
            return AVPixelFormat::AV_PIX_FMT_NONE;
        }

        let state = (*context).opaque as *const NegotiationState;
        if state.is_null() {
            return *formats;
        }
        let state = &*state;

        if let Some(device) = state.device {
            let mut cursor = formats;
            while *cursor != AVPixelFormat::AV_PIX_FMT_NONE {
                let format = *cursor;
                if state.uploadable.contains(&format)
                    && hw::device_type_for_format(format) == Some(device)
                {
                    return format;
                }
                cursor = cursor.add(1);
            }
        }

        let mut cursor = formats;
        while *cursor != AVPixelFormat::AV_PIX_FMT_NONE {
            let format = *cursor;
            if state.uploadable.contains(&format) && !hw::is_hardware_format(format) {
                return format;
            }
            cursor = cursor.add(1);
        }

        *formats
    }
}

/// One open codec session decoding one elementary stream.
pub struct StreamDecoder<F: DecodedFrame> {
    session: Opened,
    // Dropped after `session`: the codec context points into this box
    // through its opaque pointer until the session is freed.
    _negotiation: Option<Box<NegotiationState>>,
    queue: PacketQueue,
    pool: BufferPool<F>,
    hardware_device: Option<HardwareDeviceType>,
}

impl<F: DecodedFrame> StreamDecoder<F> {
    /// Open a decode session for the given stream.
    ///
    /// Fails when no decoder matches the stream's codec or the codec
    /// rejects its parameters; hardware setup failures fall back to
    /// software instead of failing.
    pub fn open(info: &StreamInfo, options: &DecoderOptions) -> Result<Self, PlayheadError> {
        let codec_id = info.codec_id();
        let codec =
            ffmpeg_next::decoder::find(codec_id).ok_or_else(|| PlayheadError::CodecNotFound {
                codec: codec_id.name().to_string(),
            })?;

        let mut context = codec::context::Context::from_parameters(info.parameters().clone())?;
        let context_ptr = unsafe { context.as_mut_ptr() };

        unsafe {
            (*context_ptr).thread_count = options.thread_count as i32;
            (*context_ptr).thread_type = options.thread_type.to_av_flags();
            (*context_ptr).pkt_timebase = info.time_base().into();
        }

        let mut hardware_device = None;
        if options.hardware {
            // Walk the codec's device types in its own preference order;
            // the first one that yields a context wins.
            for candidate in hw::codec_devices(codec_id) {
                match hw::create_device_context(candidate) {
                    Ok(device_context) => {
                        unsafe {
                            (*context_ptr).hw_device_ctx =
                                ffmpeg_sys_next::av_buffer_ref(device_context);
                            let mut reference = device_context;
                            ffmpeg_sys_next::av_buffer_unref(&mut reference);
                        }
                        hardware_device = Some(candidate);
                        debug!("Decoding {} through {candidate:?}", codec_id.name());
                        break;
                    }
                    Err(error) => {
                        debug!(
                            "Hardware setup ({candidate:?}) for {} failed: {error}",
                            codec_id.name()
                        );
                    }
                }
            }
            if hardware_device.is_none() {
                debug!("No usable hardware device for {}, using software", codec_id.name());
            }
        }

        let negotiation = if options.uploadable.is_empty() {
            None
        } else {
            let state = Box::new(NegotiationState {
                uploadable: options
                    .uploadable
                    .iter()
                    .map(|format| AVPixelFormat::from(*format))
                    .collect(),
                device: hardware_device,
            });
            unsafe {
                (*context_ptr).opaque = &*state as *const NegotiationState as *mut c_void;
                (*context_ptr).get_format = Some(negotiate_pixel_format);
            }
            Some(state)
        };

        let session = context
            .decoder()
            .open_as(codec)
            .map_err(|error| PlayheadError::Codec(error.to_string()))?;

        Ok(Self {
            session,
            _negotiation: negotiation,
            queue: PacketQueue::new(),
            pool: BufferPool::new(F::empty),
            hardware_device,
        })
    }

    /// Another handle to this decoder's input queue, for the packet
    /// router.
    pub fn queue(&self) -> PacketQueue {
        self.queue.clone()
    }

    /// The hardware device the session decodes through, if any.
    pub fn hardware_device(&self) -> Option<HardwareDeviceType> {
        self.hardware_device
    }

    /// Decode one frame.
    ///
    /// Whenever the codec needs more input, `feed` is invoked until the
    /// packet queue is non-empty; `feed` returning `false` means no more
    /// input can be produced and the step gives up. Returns `None` when
    /// the stream is exhausted for this step (starved, drained, or the
    /// codec reported an error); the session stays usable either way.
    pub fn decode(&mut self, mut feed: impl FnMut() -> bool) -> Option<PoolRef<F>> {
        let mut frame = self.pool.acquire();

        loop {
            match self.session.receive_frame(&mut *frame) {
                Ok(()) => return Some(frame),
                Err(FfmpegError::Other { errno }) if errno == EAGAIN => {
                    while self.queue.is_empty() {
                        if !feed() {
                            return None;
                        }
                    }

                    let consumed = {
                        let queued = self.queue.inner.borrow();
                        let Some(packet) = queued.front() else {
                            return None;
                        };
                        // A busy codec keeps the packet queued for the
                        // next attempt; consumed or rejected packets are
                        // dropped either way.
                        !matches!(
                            self.session.send_packet(&**packet),
                            Err(FfmpegError::Other { errno }) if errno == EAGAIN
                        )
                    };

                    if consumed {
                        self.queue.pop();
                    }
                }
                Err(FfmpegError::Eof) => return None,
                Err(error) => {
                    trace!("Decode step failed: {error}");
                    return None;
                }
            }
        }
    }

    /// Drop all queued packets and reset codec state, e.g. after a seek.
    pub fn flush(&mut self) {
        self.queue.clear();
        self.session.flush();
    }
}
