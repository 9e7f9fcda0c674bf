//! Frame ownership types.
//!
//! A [`CapturedFrame`] owns a release callback that fires exactly once, on
//! whichever drop of whichever container (Pacer, Frame Store, or the
//! immediate direct-mode handoff) happens to be last. The payload itself is
//! never copied by this crate: it is either a slice of CPU memory already
//! owned by the caller, or an opaque token pointing at a shared texture or
//! shared-memory region the producer still owns.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

/// Discriminates how a [`CapturedFrame`]'s pixel payload is stored.
///
/// This crate never inspects pixel data; the tag exists purely so the
/// release callback and any diagnostic logging can describe the frame
/// without downcasting.
#[derive(Debug, Clone)]
pub enum FrameStorage {
    /// Payload is a block of CPU-addressable memory this frame owns.
    Cpu(Arc<[u8]>),
    /// Payload lives in a shared texture; `token` is an opaque, adapter-defined handle.
    Texture { token: u64 },
    /// Payload lives in shared memory; `token` is an opaque, adapter-defined handle.
    SharedMemory { token: u64 },
}

/// A callback invoked exactly once when the last owner of a [`CapturedFrame`]
/// drops it. Must not block and must not re-entrantly touch the pipeline.
pub type ReleaseCallback = Box<dyn FnOnce() + Send + 'static>;

struct Inner {
    storage: FrameStorage,
    width: u32,
    height: u32,
    stride: u32,
    capture_instant: Instant,
    capture_wall_time: SystemTime,
    release: std::sync::Mutex<Option<ReleaseCallback>>,
    released: AtomicBool,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Guard against a future refactor that could clone Inner and invoke
        // Drop twice; the flag keeps "exactly once" true regardless.
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(cb) = self.release.lock().unwrap().take() {
            // A panicking release callback must not poison the pipeline or
            // this frame's drop glue; swallow it with a log line per the
            // failure semantics for release callbacks.
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(cb));
            if result.is_err() {
                tracing::warn!("frame release callback panicked; frame treated as released");
            }
        }
    }
}

/// A reference-counted handle to a rendered pixel surface.
///
/// Cloning a `CapturedFrame` shares ownership; the release callback fires
/// when the last clone is dropped, never before and never twice.
#[derive(Clone)]
pub struct CapturedFrame {
    inner: Arc<Inner>,
}

impl CapturedFrame {
    /// Construct a new frame. `release` is invoked exactly once, when the
    /// last clone of this frame is dropped.
    pub fn new(
        storage: FrameStorage,
        width: u32,
        height: u32,
        stride: u32,
        capture_instant: Instant,
        capture_wall_time: SystemTime,
        release: Option<ReleaseCallback>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                storage,
                width,
                height,
                stride,
                capture_instant,
                capture_wall_time,
                release: std::sync::Mutex::new(release),
                released: AtomicBool::new(false),
            }),
        }
    }

    pub fn storage(&self) -> &FrameStorage {
        &self.inner.storage
    }

    pub fn width(&self) -> u32 {
        self.inner.width
    }

    pub fn height(&self) -> u32 {
        self.inner.height
    }

    pub fn stride(&self) -> u32 {
        self.inner.stride
    }

    /// Monotonic capture timestamp, used for ordering and staleness checks.
    pub fn capture_instant(&self) -> Instant {
        self.inner.capture_instant
    }

    /// Wall-clock capture timestamp, for diagnostics only.
    pub fn capture_wall_time(&self) -> SystemTime {
        self.inner.capture_wall_time
    }

    /// Number of live handles referencing the same underlying frame.
    pub fn reference_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl fmt::Debug for CapturedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedFrame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("stride", &self.stride())
            .field("capture_instant", &self.capture_instant())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn test_frame(released: Arc<AtomicUsize>) -> CapturedFrame {
        CapturedFrame::new(
            FrameStorage::Cpu(Arc::from(vec![0u8; 4].into_boxed_slice())),
            1,
            1,
            4,
            Instant::now(),
            SystemTime::now(),
            Some(Box::new(move || {
                released.fetch_add(1, Ordering::SeqCst);
            })),
        )
    }

    #[test]
    fn test_release_fires_once_on_last_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        let frame = test_frame(count.clone());
        let clone = frame.clone();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        drop(frame);
        assert_eq!(count.load(Ordering::SeqCst), 0, "clone still alive");
        drop(clone);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_not_called_twice_even_with_panicking_callback() {
        let frame = CapturedFrame::new(
            FrameStorage::Texture { token: 7 },
            1920,
            1080,
            7680,
            Instant::now(),
            SystemTime::now(),
            Some(Box::new(|| panic!("boom"))),
        );
        drop(frame);
        // reaching here means the panic was caught and swallowed
    }

    #[test]
    fn test_reference_count_reflects_clones() {
        let count = Arc::new(AtomicUsize::new(0));
        let frame = test_frame(count);
        assert_eq!(frame.reference_count(), 1);
        let clone = frame.clone();
        assert_eq!(frame.reference_count(), 2);
        drop(clone);
        assert_eq!(frame.reference_count(), 1);
    }
}
