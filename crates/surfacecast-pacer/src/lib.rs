//! # surfacecast-pacer
//!
//! A paced video pipeline core: takes frames from an off-screen renderer at
//! whatever irregular cadence it produces them, and hands a steady,
//! single-frame-per-tick stream to a transport at a configured target rate.
//!
//! This crate does not render anything and does not touch the network. It
//! owns exactly three concerns: a bounded ordered frame queue (the Frame
//! Store), a demand-driven or free-running render trigger (the Render
//! Pump), and a periodic send loop with latency tracking and underrun
//! recovery (the Pacer). The renderer and the network sender are supplied
//! by the embedding through the [`ProducerAdapter`] and [`TransportAdapter`]
//! traits.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use surfacecast_pacer::{Pipeline, PipelineConfig};
//! use std::sync::Arc;
//!
//! let config = PipelineConfig::builder()
//!     .enable_buffering(true)
//!     .buffer_depth(3)
//!     .enable_paced_invalidation(true)
//!     .build()?;
//!
//! let mut pipeline = Pipeline::new(config, my_transport, my_producer)?;
//! pipeline.start()?;
//!
//! // The renderer's frame-ready callback calls this with each frame:
//! // pipeline.handle_frame(frame);
//!
//! let telemetry = pipeline.telemetry_snapshot();
//! pipeline.stop();
//! ```
//!
//! # Configuration
//!
//! ```rust
//! use surfacecast_pacer::{PipelineConfig, RateModel};
//!
//! let config = PipelineConfig::builder()
//!     .enable_buffering(true)
//!     .buffer_depth(4)
//!     .target_rate(RateModel::new(60000, 1001).unwrap())
//!     .allow_latency_expansion(true)
//!     .build()
//!     .unwrap();
//! ```
//!
//! # Error Handling
//!
//! Errors are split by locality and fatality via [`PacerError`]:
//!
//! ```rust
//! use surfacecast_pacer::{classify_error, ErrorType, PacerError, ConfigError};
//!
//! let err = PacerError::Config(ConfigError::ZeroDepth(0));
//! match classify_error(&err) {
//!     ErrorType::Configuration => eprintln!("fix config and rebuild: {err}"),
//!     ErrorType::Transient => eprintln!("logged and retried: {err}"),
//!     ErrorType::Fatal => eprintln!("pipeline torn down: {err}"),
//! }
//! ```
//!
//! # Architecture
//!
//! The Pump and the Pacer each run on their own dedicated `std::thread`,
//! not as async tasks — the design is synchronous and blocking by nature,
//! the same way a producer's UI-control thread can't be handed to a runtime
//! either. Every cross-thread interaction goes through a bounded channel or
//! a small, short-held `parking_lot` mutex.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  Producer (off-screen renderer, owned by the embedding)    │
//! │   dispatch_ui(thunk) ◄──────────────┐                      │
//! │   invalidate() ──────────┐          │                      │
//! └───────────────────────── │ ─────────│──────────────────────┘
//!                             │ renders  │ control thunks
//!                             ▼          │
//! ┌────────────────────────────────────────────────────────────┐
//! │         Render Pump (dedicated std::thread)                 │
//! │   Periodic clock  or  Paced ticket demand                   │
//! │   watchdog: extra invalidate after 1s of silence             │
//! └───────────────────────────┬──────────────────────────────────┘
//!                             │ handle_frame(frame)
//!                             ▼
//! ┌────────────────────────────────────────────────────────────┐
//! │              Frame Store (bounded ordered queue)             │
//! └───────────────────────────┬──────────────────────────────────┘
//!                             │ drained at the nominal period
//!                             ▼
//! ┌────────────────────────────────────────────────────────────┐
//! │           Pacer (dedicated std::thread)                      │
//! │   Warmup / Primed / LatencyExpansion state machine            │
//! │   latency integrator, resync drops, underrun recovery         │
//! └───────────────────────────┬──────────────────────────────────┘
//!                             │ send_video(frame, rate)
//!                             ▼
//! ┌────────────────────────────────────────────────────────────┐
//! │  Transport (network sender, owned by the embedding)          │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! In direct mode (`enable_buffering = false`) there is no Frame Store and
//! no Pacer thread: `handle_frame` calls `send_video` synchronously and
//! returns.
//!
//! # Cargo Features
//!
//! ```toml
//! [dependencies]
//! surfacecast-pacer = "0.1"
//! ```
//!
//! This crate currently has no optional feature flags; the whole pacing
//! core is always compiled in.

// =============================================================================
// CORE MODULES
// =============================================================================

pub mod adapter;
pub mod config;
pub mod error;
pub mod frame;
pub mod pacer;
pub mod pipeline;
pub mod pump;
pub mod rate;
pub mod store;
pub mod ticket;

// =============================================================================
// RE-EXPORTS - PRIMARY API
// =============================================================================

pub use adapter::{ProducerAdapter, TransportAdapter, UiThunk};
pub use config::{PipelineConfig, PipelineConfigBuilder, UnderrunStrategy};
pub use error::{
    classify_error, ConfigError, ErrorType, FatalError, PacerError, ProducerError,
    RecoveryAction, Result, TimerError, TransportError,
};
pub use frame::{CapturedFrame, FrameStorage, ReleaseCallback};
pub use pacer::{PacerState, TelemetrySnapshot};
pub use pipeline::{Pipeline, PipelineState};
pub use rate::{CadenceTracker, RateModel};
pub use ticket::InvalidationTicket;

// =============================================================================
// RE-EXPORTS - ADVANCED API
// =============================================================================

pub use pump::{PumpMode, RenderPump};
pub use store::{FrameStore, StoredFrame};

// =============================================================================
// CRATE-LEVEL ITEMS
// =============================================================================

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Recommended `buffer_depth` for a given target frame rate.
///
/// Higher rates produce frames closer together in wall-clock time, so a
/// shallower queue already represents a comparable latency budget; lower
/// rates get a little more headroom to absorb jitter.
#[must_use]
pub fn recommended_buffer_depth(rate: RateModel) -> u32 {
    let fps = rate.as_f64();
    match fps as u32 {
        0..=30 => 2,
        31..=60 => 3,
        61..=120 => 4,
        _ => 5,
    }
}
