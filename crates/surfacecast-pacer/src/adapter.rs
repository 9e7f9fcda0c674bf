//! Narrow seams to the surrounding embedding: the producer (the off-screen
//! renderer) and the transport (the outbound video sink).
//!
//! Neither trait is implemented by this crate — the renderer and the
//! network sender are explicitly out of scope. These traits exist so the
//! core can be built, tested, and reasoned about without either of them.

use crate::frame::CapturedFrame;

/// A closure the Pump runs on the producer's designated UI-control thread.
///
/// The producer's rule that control calls happen on one thread maps to this
/// caller-supplied dispatch function: the Pump never spawns its own
/// producer-control thread, it calls `dispatch_ui`, which is expected to hop
/// threads as the embedding requires.
pub type UiThunk = Box<dyn FnOnce() + Send + 'static>;

/// The producer adapter: how the Pump drives the off-screen renderer.
///
/// `pause_capture`/`resume_capture` are optional; implementations that do
/// not support pausing capture should make them no-ops rather than error.
pub trait ProducerAdapter: Send + Sync + 'static {
    /// Run `thunk` on the producer's UI-control thread.
    fn dispatch_ui(&self, thunk: UiThunk);

    /// Request one render. Must only be called from within a `dispatch_ui`
    /// thunk.
    fn invalidate(&self);

    /// Ask the producer to stop producing frames. No-op if unsupported.
    fn pause_capture(&self) {}

    /// Ask the producer to resume producing frames. No-op if unsupported.
    fn resume_capture(&self) {}
}

/// The transport adapter: how the pipeline hands a frame off to the
/// network.
///
/// `send_video` is best-effort: it must not retain `frame` beyond the call,
/// and a returned error is treated as local and non-fatal by the core.
pub trait TransportAdapter: Send + Sync + 'static {
    /// Transmit one frame at the pipeline's configured rate.
    fn send_video(&self, frame: &CapturedFrame, rate_num: i64, rate_den: i64) -> Result<(), String>;
}

#[cfg(test)]
pub(crate) mod test_doubles {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    pub struct RecordingProducer {
        pub invalidate_count: AtomicUsize,
        pub pause_count: AtomicUsize,
        pub resume_count: AtomicUsize,
    }

    impl ProducerAdapter for RecordingProducer {
        fn dispatch_ui(&self, thunk: UiThunk) {
            // single-threaded test double: run inline, as if already on the
            // producer's UI-control thread.
            thunk();
        }

        fn invalidate(&self) {
            self.invalidate_count.fetch_add(1, Ordering::SeqCst);
        }

        fn pause_capture(&self) {
            self.pause_count.fetch_add(1, Ordering::SeqCst);
        }

        fn resume_capture(&self) {
            self.resume_count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Clone, Default)]
    pub struct RecordingTransport {
        pub sent: Arc<Mutex<Vec<(i64, i64)>>>,
        pub fail_next: Arc<AtomicUsize>,
    }

    impl TransportAdapter for RecordingTransport {
        fn send_video(
            &self,
            _frame: &CapturedFrame,
            rate_num: i64,
            rate_den: i64,
        ) -> Result<(), String> {
            if self.fail_next.load(Ordering::SeqCst) > 0 {
                self.fail_next.fetch_sub(1, Ordering::SeqCst);
                return Err("simulated send failure".to_string());
            }
            self.sent.lock().push((rate_num, rate_den));
            Ok(())
        }
    }
}
