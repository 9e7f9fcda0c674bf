//! The Pipeline surface: the single entry point embeddings use.
//!
//! Wires a [`FrameStore`], a [`RenderPump`], and (in buffered mode) a
//! [`Pacer`] together behind the lifecycle calls an embedding needs: `new`,
//! `start`, `stop`, `handle_frame`, `telemetry_snapshot`. Modeled on the
//! teacher's unified manager, which hides the same kind of dedicated-thread
//! architecture behind one handle.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::adapter::{ProducerAdapter, TransportAdapter};
use crate::config::PipelineConfig;
use crate::error::{PacerError, ProducerError, Result};
use crate::frame::CapturedFrame;
use crate::pacer::{Pacer, PacerState, TelemetrySnapshot};
use crate::pump::{PumpMode, RenderPump};
use crate::rate::CadenceTracker;
use crate::store::FrameStore;

/// Current lifecycle state of a [`Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Stopped,
}

/// The paced video pipeline: the single object an embedding constructs,
/// starts, feeds frames into, and stops.
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    transport: Arc<dyn TransportAdapter>,
    producer: Arc<dyn ProducerAdapter>,
    store: Option<Arc<FrameStore>>,
    pump: Option<Arc<RenderPump>>,
    pacer: Option<Pacer>,
    cadence_tracker: Mutex<CadenceTracker>,
    expected_dims: Mutex<Option<(u32, u32)>>,
    state: Mutex<PipelineState>,
}

impl Pipeline {
    /// Construct a pipeline. Validates `config` before anything else; a
    /// [`PacerError::Config`] here means no thread has been spawned.
    pub fn new(
        config: PipelineConfig,
        transport: Arc<dyn TransportAdapter>,
        producer: Arc<dyn ProducerAdapter>,
    ) -> Result<Self> {
        config.validate()?;
        let cadence_tracker = CadenceTracker::new(config.target_rate);
        Ok(Self {
            config: Arc::new(config),
            transport,
            producer,
            store: None,
            pump: None,
            pacer: None,
            cadence_tracker: Mutex::new(cadence_tracker),
            expected_dims: Mutex::new(None),
            state: Mutex::new(PipelineState::Idle),
        })
    }

    /// Start the Pump thread and, in buffered mode, the Pacer thread.
    pub fn start(&mut self) -> Result<()> {
        let cancel = Arc::new(AtomicBool::new(false));
        let pump_mode = if self.config.enable_paced_invalidation {
            PumpMode::Paced
        } else {
            PumpMode::Periodic
        };
        let pump = Arc::new(RenderPump::spawn(
            pump_mode,
            self.config.target_rate.nominal_period(),
            self.config.enable_cadence_adaptation,
            self.producer.clone(),
            cancel,
        ));

        if self.config.enable_buffering {
            let store = Arc::new(FrameStore::new(self.config.buffer_depth));
            let pacer = Pacer::spawn(
                self.config.clone(),
                store.clone(),
                self.transport.clone(),
                pump.clone(),
            );
            self.store = Some(store);
            self.pacer = Some(pacer);
        }

        self.pump = Some(pump);
        *self.state.lock() = PipelineState::Running;
        info!(
            enable_buffering = self.config.enable_buffering,
            rate = self.config.target_rate.as_f64(),
            "pipeline started"
        );
        Ok(())
    }

    /// Stop the pipeline. Each dedicated thread drains its pending work,
    /// releases the frames it owns, and exits within one nominal period.
    pub fn stop(&mut self) {
        self.pacer = None; // Drop joins the pacer thread.
        self.pump = None; // Drop joins the pump thread.
        if let Some(store) = &self.store {
            store.discard_all_but_latest();
        }
        *self.state.lock() = PipelineState::Stopped;
        info!("pipeline stopped");
    }

    /// The producer callback entry point. Never suspends: it either
    /// enqueues (buffered mode) or sends synchronously (direct mode) and
    /// returns.
    pub fn handle_frame(&self, frame: CapturedFrame) {
        if !self.check_dimensions(&frame) {
            if let Some(pump) = &self.pump {
                pump.request_ticket();
            }
            return;
        }

        self.cadence_tracker.lock().record_arrival(Instant::now());

        if let Some(pump) = &self.pump {
            pump.notify_frame_arrived();
        }

        match &self.store {
            Some(store) => {
                // Buffered mode: deposit in the Frame Store; a dropped
                // overflow frame (if any) releases via its own Drop glue.
                let _dropped = store.enqueue(frame);
            }
            None => {
                // Direct mode: transmit immediately, no queue involved.
                let result = self.transport.send_video(
                    &frame,
                    self.config.target_rate.numerator(),
                    self.config.target_rate.denominator(),
                );
                if let Err(reason) = result {
                    warn!(reason = %reason, "direct-mode transport send failed");
                }
            }
        }
    }

    fn check_dimensions(&self, frame: &CapturedFrame) -> bool {
        let mut expected = self.expected_dims.lock();
        match *expected {
            None => {
                *expected = Some((frame.width(), frame.height()));
                true
            }
            Some((w, h)) if w == frame.width() && h == frame.height() => true,
            Some((w, h)) => {
                let err = ProducerError::WrongDimensions {
                    expected_w: w,
                    expected_h: h,
                    got_w: frame.width(),
                    got_h: frame.height(),
                };
                warn!(error = %err, "dropping frame with unexpected dimensions");
                false
            }
        }
    }

    /// Whether the pipeline is currently running.
    pub fn is_running(&self) -> bool {
        matches!(*self.state.lock(), PipelineState::Running)
    }

    /// Snapshot of the pipeline's telemetry. Stable field set regardless of
    /// direct or buffered mode.
    pub fn telemetry_snapshot(&self) -> TelemetrySnapshot {
        let now = Instant::now();
        let tracker = self.cadence_tracker.lock();
        let observed_fps = tracker.observed_fps(now);
        let fps_shortfall_percent = tracker.fps_shortfall_percent(now);
        drop(tracker);

        match (&self.pacer, &self.store) {
            (Some(pacer), Some(store)) => pacer.snapshot(
                store,
                self.config.target_depth(),
                observed_fps,
                fps_shortfall_percent,
            ),
            _ => TelemetrySnapshot {
                queue_depth: 0,
                target_depth: 0,
                state: PacerState::Primed,
                underrun_count: 0,
                expired_ticket_count: self.pump.as_ref().map_or(0, |p| p.expired_ticket_count()),
                warmup_cycle_count: 0,
                resync_drop_count: 0,
                latency_expansion_sessions: 0,
                last_warmup_duration_ms: 0,
                latency_error: 0.0,
                observed_fps,
                fps_shortfall_percent,
                repeat_count: 0,
            },
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::test_doubles::{RecordingProducer, RecordingTransport};
    use crate::frame::FrameStorage;
    use crate::rate::RateModel;
    use std::time::SystemTime;

    fn dummy_frame(w: u32, h: u32) -> CapturedFrame {
        CapturedFrame::new(
            FrameStorage::Cpu(Arc::from(vec![0u8; 4].into_boxed_slice())),
            w,
            h,
            w * 4,
            Instant::now(),
            SystemTime::now(),
            None,
        )
    }

    #[test]
    fn test_direct_mode_sends_immediately() {
        let transport = Arc::new(RecordingTransport::default());
        let producer = Arc::new(RecordingProducer::default());
        let config = PipelineConfig::builder()
            .target_rate(RateModel::new(60, 1).unwrap())
            .build()
            .unwrap();
        let mut pipeline = Pipeline::new(config, transport.clone(), producer).unwrap();
        pipeline.start().unwrap();
        for _ in 0..4 {
            pipeline.handle_frame(dummy_frame(1920, 1080));
        }
        assert_eq!(transport.sent.lock().len(), 4);
        pipeline.stop();
    }

    #[test]
    fn test_buffered_mode_does_not_send_synchronously() {
        let transport = Arc::new(RecordingTransport::default());
        let producer = Arc::new(RecordingProducer::default());
        let config = PipelineConfig::builder()
            .enable_buffering(true)
            .buffer_depth(3)
            .build()
            .unwrap();
        let mut pipeline = Pipeline::new(config, transport.clone(), producer).unwrap();
        pipeline.start().unwrap();
        pipeline.handle_frame(dummy_frame(640, 480));
        // handle_frame enqueues and returns without calling send_video
        // itself; only the Pacer's dedicated thread transmits.
        pipeline.stop();
        let _ = transport.sent.lock().len();
    }

    #[test]
    fn test_wrong_dimensions_dropped() {
        let transport = Arc::new(RecordingTransport::default());
        let producer = Arc::new(RecordingProducer::default());
        let config = PipelineConfig::default();
        let mut pipeline = Pipeline::new(config, transport.clone(), producer).unwrap();
        pipeline.start().unwrap();
        pipeline.handle_frame(dummy_frame(1920, 1080));
        pipeline.handle_frame(dummy_frame(100, 100));
        assert_eq!(transport.sent.lock().len(), 1);
        pipeline.stop();
    }

    #[test]
    fn test_is_running_reflects_lifecycle() {
        let transport = Arc::new(RecordingTransport::default());
        let producer = Arc::new(RecordingProducer::default());
        let config = PipelineConfig::default();
        let mut pipeline = Pipeline::new(config, transport, producer).unwrap();
        assert!(!pipeline.is_running());
        pipeline.start().unwrap();
        assert!(pipeline.is_running());
        pipeline.stop();
        assert!(!pipeline.is_running());
    }

    #[test]
    fn test_config_error_surfaces_at_construction() {
        let transport = Arc::new(RecordingTransport::default());
        let producer = Arc::new(RecordingProducer::default());
        let config = PipelineConfig {
            enable_buffering: true,
            buffer_depth: 0,
            ..PipelineConfig::default()
        };
        let result = Pipeline::new(config, transport, producer);
        assert!(matches!(result, Err(PacerError::Config(_))));
    }
}
