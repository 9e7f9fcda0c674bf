//! The Pacer: a dedicated periodic send loop.
//!
//! Runs on a high-resolution timer at the Rate Model's nominal period. Each
//! tick observes the Frame Store's depth, updates a latency integrator,
//! picks an action from the state table in the module docs below, and
//! (in buffered mode) hands exactly one frame to the transport — fresh or
//! repeated, never zero, never two.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::adapter::TransportAdapter;
use crate::config::{PipelineConfig, UnderrunStrategy};
use crate::frame::CapturedFrame;
use crate::pump::RenderPump;
use crate::store::FrameStore;

/// Discriminated Pacer state, matching the spec's state-transition table
/// exactly: `Warmup` on start/after underrun, `Primed` for normal draining,
/// `LatencyExpansion` as a drain-preserving sub-state of `Primed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacerState {
    Warmup,
    Primed,
    LatencyExpansion,
}

/// Lock-free telemetry counters, sampled independently of the pacing mutex.
#[derive(Default)]
struct Counters {
    underrun_count: AtomicU64,
    expired_ticket_count: AtomicU64,
    warmup_cycle_count: AtomicU64,
    resync_drop_count: AtomicU64,
    repeat_count: AtomicU64,
    send_failures: AtomicU64,
    capture_gate_pauses: AtomicU64,
    latency_expansion_sessions: AtomicU64,
    last_warmup_duration_ms: AtomicU64,
    // latency_error stored as fixed-point (x1000) since atomics don't carry f64.
    latency_error_fixed: AtomicI64,
}

/// A point-in-time readout of the Pacer's telemetry, per the stable
/// contract in the pipeline surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySnapshot {
    pub queue_depth: usize,
    pub target_depth: u32,
    pub state: PacerState,
    pub underrun_count: u64,
    pub expired_ticket_count: u64,
    pub warmup_cycle_count: u64,
    pub resync_drop_count: u64,
    pub latency_expansion_sessions: u64,
    pub last_warmup_duration_ms: u64,
    pub latency_error: f64,
    pub observed_fps: f64,
    pub fps_shortfall_percent: f64,
    pub repeat_count: u64,
}

struct PacerShared {
    state: Mutex<PacerState>,
    last_sent: Mutex<Option<CapturedFrame>>,
    counters: Counters,
    gate_engaged: std::sync::atomic::AtomicBool,
    over_threshold_ticks: AtomicU64,
    warmup_entered_at: Mutex<Instant>,
}

/// Handle to the Pacer's dedicated thread. Only constructed when
/// `enable_buffering` is set; direct mode has no periodic loop.
pub struct Pacer {
    shared: Arc<PacerShared>,
    cancel: Arc<std::sync::atomic::AtomicBool>,
    join_handle: Option<JoinHandle<()>>,
}

impl Pacer {
    pub fn spawn(
        config: Arc<PipelineConfig>,
        store: Arc<FrameStore>,
        transport: Arc<dyn TransportAdapter>,
        pump: Arc<RenderPump>,
    ) -> Self {
        let shared = Arc::new(PacerShared {
            state: Mutex::new(PacerState::Warmup),
            last_sent: Mutex::new(None),
            counters: Counters::default(),
            gate_engaged: std::sync::atomic::AtomicBool::new(false),
            over_threshold_ticks: AtomicU64::new(0),
            warmup_entered_at: Mutex::new(Instant::now()),
        });
        let cancel = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let thread_shared = shared.clone();
        let thread_cancel = cancel.clone();
        let join_handle = std::thread::Builder::new()
            .name("surfacecast-pacer".into())
            .spawn(move || run_pacer_loop(config, store, transport, pump, thread_shared, thread_cancel))
            .expect("failed to spawn pacer thread");

        Self {
            shared,
            cancel,
            join_handle: Some(join_handle),
        }
    }

    pub fn state(&self) -> PacerState {
        *self.shared.state.lock()
    }

    pub fn shutdown(&mut self) {
        self.cancel.store(true, Ordering::Release);
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn snapshot(&self, store: &FrameStore, target_depth: u32, observed_fps: f64, fps_shortfall_percent: f64) -> TelemetrySnapshot {
        TelemetrySnapshot {
            queue_depth: store.count(),
            target_depth,
            state: self.state(),
            underrun_count: self.shared.counters.underrun_count.load(Ordering::Relaxed),
            expired_ticket_count: self
                .shared
                .counters
                .expired_ticket_count
                .load(Ordering::Relaxed),
            warmup_cycle_count: self
                .shared
                .counters
                .warmup_cycle_count
                .load(Ordering::Relaxed),
            resync_drop_count: self
                .shared
                .counters
                .resync_drop_count
                .load(Ordering::Relaxed),
            latency_expansion_sessions: self
                .shared
                .counters
                .latency_expansion_sessions
                .load(Ordering::Relaxed),
            last_warmup_duration_ms: self
                .shared
                .counters
                .last_warmup_duration_ms
                .load(Ordering::Relaxed),
            latency_error: self.shared.counters.latency_error_fixed.load(Ordering::Relaxed) as f64
                / 1000.0,
            observed_fps,
            fps_shortfall_percent,
            repeat_count: self.shared.counters.repeat_count.load(Ordering::Relaxed),
        }
    }
}

impl Drop for Pacer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_pacer_loop(
    config: Arc<PipelineConfig>,
    store: Arc<FrameStore>,
    transport: Arc<dyn TransportAdapter>,
    pump: Arc<RenderPump>,
    shared: Arc<PacerShared>,
    cancel: Arc<std::sync::atomic::AtomicBool>,
) {
    let period = config.target_rate.nominal_period();
    let target_depth = config.buffer_depth;
    let integrator_cap = (target_depth as i64).max(1) * 4;
    let mut next_deadline = Instant::now() + period;

    loop {
        if cancel.load(Ordering::Acquire) {
            break;
        }

        let now = Instant::now();
        if now < next_deadline {
            std::thread::sleep((next_deadline - now).min(Duration::from_millis(50)));
            continue;
        }

        // Timer drift of >= 2 periods: skip missed ticks rather than bursting.
        let drift = now.duration_since(next_deadline);
        if drift >= period * 2 {
            warn!(?drift, "pacer timer drift exceeded two periods; skipping missed ticks");
            next_deadline = now;
        }

        tick(&config, &store, &transport, &pump, &shared, target_depth, integrator_cap, period);
        next_deadline += period;
    }

    debug!("pacer thread exiting");
}

#[allow(clippy::too_many_arguments)]
fn tick(
    config: &PipelineConfig,
    store: &FrameStore,
    transport: &Arc<dyn TransportAdapter>,
    pump: &Arc<RenderPump>,
    shared: &Arc<PacerShared>,
    target_depth: u32,
    integrator_cap: i64,
    period: Duration,
) {
    // 1. Observe current queue depth.
    let queue_depth = store.count() as i64;

    // 2. Update latency integrator, clamped to +/- integrator_cap.
    let delta_fixed = (queue_depth - target_depth as i64) * 1000;
    let new_error = {
        let prev = shared.counters.latency_error_fixed.load(Ordering::Relaxed);
        let updated = (prev + delta_fixed).clamp(-integrator_cap * 1000, integrator_cap * 1000);
        shared
            .counters
            .latency_error_fixed
            .store(updated, Ordering::Relaxed);
        updated
    };
    let latency_error = new_error as f64 / 1000.0;

    // 3. Select action by state/depth case.
    let state = *shared.state.lock();
    let high_watermark = target_depth as i64 + 1;
    let low_watermark_fixed = target_depth as i64 * 2 - 1; // target_depth - 0.5, doubled

    match state {
        PacerState::Warmup => {
            if queue_depth >= target_depth as i64 && latency_error >= 0.0 {
                transition_to_primed(shared);
            } else {
                repeat_last_sent(transport, shared, config);
            }
        }
        PacerState::Primed | PacerState::LatencyExpansion => {
            if queue_depth > high_watermark && latency_error > 1.0 {
                resync_drop(store, shared, integrator_cap);
                emit_oldest_fresh(store, transport, shared, config);
            } else if queue_depth * 2 > low_watermark_fixed {
                emit_oldest_fresh(store, transport, shared, config);
                if state == PacerState::LatencyExpansion && queue_depth >= target_depth as i64 {
                    *shared.state.lock() = PacerState::Primed;
                }
            } else {
                enter_underrun(store, transport, shared, config, state);
            }
        }
    }

    // 5. Post-send: request another ticket if paced invalidation is on and
    // none is outstanding.
    if config.enable_paced_invalidation {
        pump.request_ticket();
    }

    // 6. Feed this tick's timing error back to the Pump for cadence
    // adaptation. A shallow queue (negative latency_error) means the Pump
    // is running late and should pull its next ticket dispatch earlier; a
    // full queue (positive) means it is early and should back off.
    if config.enable_cadence_adaptation {
        let offset_ms = (-latency_error * period.as_millis() as f64).round() as i64;
        pump.cadence_feedback(offset_ms);
    }

    // 7. Backpressure gate.
    backpressure_gate(store, pump, shared, config, target_depth);
}

fn transition_to_primed(shared: &Arc<PacerShared>) {
    let entered_at = *shared.warmup_entered_at.lock();
    let duration_ms = entered_at.elapsed().as_millis() as u64;
    shared
        .counters
        .last_warmup_duration_ms
        .store(duration_ms, Ordering::Relaxed);
    shared
        .counters
        .warmup_cycle_count
        .fetch_add(1, Ordering::Relaxed);
    *shared.state.lock() = PacerState::Primed;
    debug!(duration_ms, "pacer exiting warmup, entering primed");
}

fn repeat_last_sent(transport: &Arc<dyn TransportAdapter>, shared: &Arc<PacerShared>, config: &PipelineConfig) {
    let last_sent = shared.last_sent.lock().clone();
    if let Some(frame) = last_sent {
        send(transport, &frame, shared, config);
    }
    // If no last_sent exists yet (very first tick of the pipeline's
    // lifetime), the tick is silent, matching the spec's warmup contract.
    shared.counters.repeat_count.fetch_add(1, Ordering::Relaxed);
}

fn emit_oldest_fresh(
    store: &FrameStore,
    transport: &Arc<dyn TransportAdapter>,
    shared: &Arc<PacerShared>,
    config: &PipelineConfig,
) {
    match store.dequeue_oldest() {
        Some(stored) => {
            send(transport, &stored.frame, shared, config);
            *shared.last_sent.lock() = Some(stored.frame);
        }
        None => {
            // Queue emptied out from under us between the depth check and
            // the dequeue; fall back to a repeat so the tick is never silent.
            repeat_last_sent(transport, shared, config);
        }
    }
}

fn resync_drop(store: &FrameStore, shared: &Arc<PacerShared>, integrator_cap: i64) {
    loop {
        let error = shared.counters.latency_error_fixed.load(Ordering::Relaxed) as f64 / 1000.0;
        if error <= 1.0 {
            break;
        }
        if !store.try_discard_oldest_stale() {
            break;
        }
        shared
            .counters
            .resync_drop_count
            .fetch_add(1, Ordering::Relaxed);
        let target_adjust = -1000;
        let updated = (shared
            .counters
            .latency_error_fixed
            .fetch_add(target_adjust, Ordering::Relaxed)
            + target_adjust)
            .clamp(-integrator_cap * 1000, integrator_cap * 1000);
        shared
            .counters
            .latency_error_fixed
            .store(updated, Ordering::Relaxed);
    }
}

fn enter_underrun(
    store: &FrameStore,
    transport: &Arc<dyn TransportAdapter>,
    shared: &Arc<PacerShared>,
    config: &PipelineConfig,
    previous_state: PacerState,
) {
    if previous_state != PacerState::LatencyExpansion || matches!(config.underrun_strategy(), UnderrunStrategy::Strict)
    {
        shared
            .counters
            .underrun_count
            .fetch_add(1, Ordering::Relaxed);
    }

    match config.underrun_strategy() {
        UnderrunStrategy::Strict => {
            store.discard_all_but_latest();
            shared.counters.latency_error_fixed.store(0, Ordering::Relaxed);
            *shared.warmup_entered_at.lock() = Instant::now();
            *shared.state.lock() = PacerState::Warmup;
            repeat_last_sent(transport, shared, config);
        }
        UnderrunStrategy::LatencyExpansion => {
            if store.count() > 0 {
                if previous_state != PacerState::LatencyExpansion {
                    shared
                        .counters
                        .latency_expansion_sessions
                        .fetch_add(1, Ordering::Relaxed);
                }
                *shared.state.lock() = PacerState::LatencyExpansion;
                emit_oldest_fresh(store, transport, shared, config);
            } else {
                shared.counters.latency_error_fixed.store(0, Ordering::Relaxed);
                *shared.warmup_entered_at.lock() = Instant::now();
                *shared.state.lock() = PacerState::Warmup;
                repeat_last_sent(transport, shared, config);
            }
        }
    }
}

fn send(transport: &Arc<dyn TransportAdapter>, frame: &CapturedFrame, shared: &Arc<PacerShared>, config: &PipelineConfig) {
    let result = transport.send_video(
        frame,
        config.target_rate.numerator(),
        config.target_rate.denominator(),
    );
    if let Err(reason) = result {
        shared.counters.send_failures.fetch_add(1, Ordering::Relaxed);
        warn!(reason = %reason, "transport send failed; will retry next tick");
    }
    trace!("frame sent to transport");
}

fn backpressure_gate(
    store: &FrameStore,
    pump: &Arc<RenderPump>,
    shared: &Arc<PacerShared>,
    config: &PipelineConfig,
    target_depth: u32,
) {
    if !config.enable_capture_backpressure {
        return;
    }
    let threshold = target_depth as i64 + config.backpressure_slack as i64;
    let depth = store.count() as i64;
    let engaged = shared.gate_engaged.load(Ordering::Acquire);

    if depth >= threshold {
        let ticks = shared.over_threshold_ticks.fetch_add(1, Ordering::Relaxed) + 1;
        if !engaged && ticks >= config.gate_engage_ticks as u64 {
            shared.gate_engaged.store(true, Ordering::Release);
            pump.pause();
            debug!(depth, threshold, "capture backpressure gate engaged");
        }
    } else {
        shared.over_threshold_ticks.store(0, Ordering::Relaxed);
        if engaged && depth <= target_depth as i64 {
            shared.gate_engaged.store(false, Ordering::Release);
            pump.resume();
            debug!(depth, "capture backpressure gate released");
        }
    }
}
