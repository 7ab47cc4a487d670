//! Reusable packet/frame buffer pool.
//!
//! The steady-state decode loop must not allocate per packet or per frame.
//! [`BufferPool`] keeps a free list of previously released buffers;
//! [`BufferPool::acquire`] pops one (or allocates through the pool's factory
//! when the list is empty) and hands it out as a [`PoolRef`] guard. Dropping
//! the guard returns the buffer to the free list.
//!
//! Buffers are *unreferenced* on acquire via the [`Recycle`] trait, so a
//! fresh handle never carries residual data from a prior user. There are no
//! error conditions: allocation failure inside FFmpeg aborts, matching the
//! fatal resource-exhaustion policy of the pipeline.
//!
//! The free list is guarded by a [`parking_lot::Mutex`] because decoded
//! frames may be dropped from the consumer thread while the decode thread
//! keeps acquiring; in steady state the lock is uncontended.

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    ops::{Deref, DerefMut},
    sync::Arc,
};

use ffmpeg_next::{Packet, frame, packet::Mut};
use parking_lot::Mutex;

/// Clears a buffer so it can be handed out again as if freshly allocated.
pub trait Recycle {
    /// Drop any payload/references held by the buffer, keeping the
    /// allocation itself around for reuse.
    fn recycle(&mut self);
}

impl Recycle for Packet {
    fn recycle(&mut self) {
        unsafe {
            ffmpeg_sys_next::av_packet_unref(self.as_mut_ptr());
        }
    }
}

impl Recycle for frame::Video {
    fn recycle(&mut self) {
        unsafe {
            ffmpeg_sys_next::av_frame_unref(self.as_mut_ptr());
        }
    }
}

impl Recycle for frame::Audio {
    fn recycle(&mut self) {
        unsafe {
            ffmpeg_sys_next::av_frame_unref(self.as_mut_ptr());
        }
    }
}

struct Shared<T> {
    free: Mutex<Vec<T>>,
    factory: fn() -> T,
}

/// A pool of reusable buffers of type `T`.
///
/// Cloning the pool yields another handle to the same free list.
pub struct BufferPool<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for BufferPool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Recycle> BufferPool<T> {
    /// Create an empty pool that allocates new buffers with `factory`.
    pub fn new(factory: fn() -> T) -> Self {
        Self {
            shared: Arc::new(Shared {
                free: Mutex::new(Vec::new()),
                factory,
            }),
        }
    }

    /// Hand out a cleared buffer, reusing a released one when available.
    pub fn acquire(&self) -> PoolRef<T> {
        let mut value = self
            .shared
            .free
            .lock()
            .pop()
            .unwrap_or_else(|| (self.shared.factory)());
        value.recycle();

        PoolRef {
            value: Some(value),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Number of buffers currently sitting in the free list.
    pub fn free_count(&self) -> usize {
        self.shared.free.lock().len()
    }
}

impl BufferPool<Packet> {
    /// Convenience constructor for a compressed-packet pool.
    pub fn packets() -> Self {
        Self::new(Packet::empty)
    }
}

impl BufferPool<frame::Video> {
    /// Convenience constructor for a decoded-video-frame pool.
    pub fn video_frames() -> Self {
        Self::new(frame::Video::empty)
    }
}

impl BufferPool<frame::Audio> {
    /// Convenience constructor for a decoded-audio-frame pool.
    pub fn audio_frames() -> Self {
        Self::new(frame::Audio::empty)
    }
}

impl<T> Debug for BufferPool<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("BufferPool")
            .field("free", &self.shared.free.lock().len())
            .finish()
    }
}

/// An owning handle to a pooled buffer.
///
/// Dereferences to the underlying buffer; dropping the handle returns the
/// buffer to its pool's free list.
pub struct PoolRef<T> {
    value: Option<T>,
    shared: Arc<Shared<T>>,
}

impl<T> Deref for PoolRef<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Invariant: `value` is only taken in Drop.
        self.value.as_ref().unwrap()
    }
}

impl<T> DerefMut for PoolRef<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_mut().unwrap()
    }
}

impl<T> Drop for PoolRef<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.shared.free.lock().push(value);
        }
    }
}

impl<T: Debug> Debug for PoolRef<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_tuple("PoolRef").field(&self.value).finish()
    }
}
