//! # surfacecast
//!
//! A paced, backpressure-aware video frame pipeline for offscreen renderers.
//!
//! This crate provides a unified interface to the surfacecast libraries:
//!
//! - **[`pacer`]** - the paced video pipeline: a bounded frame store, a
//!   rational rate model, a render pump, and a pacer that ticks frames out
//!   to a transport at a steady cadence even when the producer is bursty.
//!
//! # Features
//!
//! ```toml
//! # Use everything (default)
//! surfacecast = "0.1"
//!
//! # Explicit
//! surfacecast = { version = "0.1", default-features = false, features = ["pacer"] }
//! ```
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `pacer` | Yes | The paced video pipeline |
//! | `full`  | No  | All features from all sub-crates |
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use surfacecast::pacer::{Pipeline, PipelineConfig, RateModel};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let rate = RateModel::parse("29.97")?;
//!     let config = PipelineConfig::builder().target_rate(rate).build()?;
//!     let mut pipeline = Pipeline::new(config, my_transport, my_producer)?;
//!     pipeline.start()?;
//!     // ... producer calls pipeline.handle_frame(frame) as frames render ...
//!     pipeline.stop();
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                        surfacecast                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │                      surfacecast-pacer                      │
//! │                                                               │
//! │   FrameStore   RateModel   RenderPump   Pacer   Pipeline     │
//! └──────────┬────────────────────┬──────────────────┬──────────┘
//!            │                    │                   │
//!            ▼                    ▼                   ▼
//!   ProducerAdapter (caller)          TransportAdapter (caller)
//! ```
//!
//! # Related Crates
//!
//! - [`surfacecast-pacer`](https://crates.io/crates/surfacecast-pacer) - the pipeline alone

#![cfg_attr(docsrs, feature(doc_cfg))]

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// RE-EXPORTS
// =============================================================================

/// The paced video pipeline: frame store, rate model, render pump, and pacer.
///
/// See [`surfacecast_pacer`] documentation for details.
#[cfg(feature = "pacer")]
#[cfg_attr(docsrs, doc(cfg(feature = "pacer")))]
pub use surfacecast_pacer as pacer;

// =============================================================================
// PRELUDE - Common types for convenience
// =============================================================================

/// Prelude module with commonly used types.
///
/// ```rust
/// use surfacecast::prelude::*;
/// ```
pub mod prelude {
    #[cfg(feature = "pacer")]
    pub use surfacecast_pacer::{
        PacerError, Pipeline, PipelineConfig, ProducerAdapter, RateModel, TransportAdapter,
    };
}
