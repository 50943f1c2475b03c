//! `monopod-sdk` – Robot-level API
//!
//! Assembles the joint modules of `monopod-hal` into the monopod robot for a
//! given task mode and exposes them by canonical joint index.
//!
//! # Modules
//!
//! - [`monopod`] – [`Monopod`][monopod::Monopod]: joint registry with
//!   fail-fast, all-or-nothing batch access to measurements, torque targets,
//!   limits and controller settings.
//! - [`leg`] – [`Leg`][leg::Leg]: hip/knee encoder-index homing.
//! - [`supervisor`] – [`LimitSupervisor`][supervisor::LimitSupervisor]:
//!   advisory monitor reporting limit violations and stalled sensor streams.
//! - [`config`] – [`MonopodConfig`][config::MonopodConfig]: TOML mode and
//!   per-joint settings, with `MONOPOD_*` environment overrides.

pub mod config;
pub mod leg;
pub mod monopod;
pub mod supervisor;

pub use config::{ConfigError, JointConfig, MonopodConfig};
pub use leg::Leg;
pub use monopod::Monopod;
pub use supervisor::{LimitSupervisor, SafetyReport};
