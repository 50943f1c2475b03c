//! `monopod-runtime` – Real-time control execution
//!
//! Drives a [`Monopod`][monopod_sdk::Monopod] from a fixed-period thread and
//! wires up process telemetry.
//!
//! # Modules
//!
//! - [`control_loop`] – [`ControlLoop`][control_loop::ControlLoop]:
//!   read → compute → write → check-limits ticks paced by a
//!   [`Spinner`][control_loop::Spinner], with a stop flag shared across
//!   threads.  [`PdTrackingController`][control_loop::PdTrackingController]
//!   tracks a [`SineTrajectory`][control_loop::SineTrajectory] on every
//!   controllable joint.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: global
//!   `tracing` subscriber with optional OTLP span export.

pub mod control_loop;
pub mod telemetry;

pub use control_loop::{
    ControlLoop, ControlLoopConfig, ControlLoopHandle, Controller, LoopStats, PdTrackingController,
    SineTrajectory, Spinner,
};
pub use telemetry::{TelemetryGuard, init_tracing};
