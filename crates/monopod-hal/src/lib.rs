//! `monopod-hal` – Joint hardware abstraction
//!
//! Turns raw, time-indexed board samples into calibrated joint quantities and
//! guards them with per-joint safety limits.
//!
//! # Modules
//!
//! - [`time_series`] – [`MeasurementHistory`][time_series::MeasurementHistory]:
//!   the time-indexed sample history consumed by every joint, and
//!   [`TimeSeries`][time_series::TimeSeries], its fixed-capacity ring buffer.
//! - [`board`] – [`ControlBoard`][board::ControlBoard]: a shared bus board,
//!   with [`Encoder`][board::Encoder] and [`Motor`][board::Motor] port handles.
//! - [`limits`] – [`LimitTable`][limits::LimitTable]: mutex-guarded
//!   measurement-kind → limit mapping.
//! - [`encoder_joint_module`] – [`EncoderJointModule`][encoder_joint_module::EncoderJointModule]:
//!   calibrated getters and the limit check of a sensed joint.
//! - [`motor_joint_module`] – [`MotorJointModule`][motor_joint_module::MotorJointModule]:
//!   an encoder joint with a torque command slot, max torque and PID gains.
//! - [`pid`] – [`PidController`][pid::PidController] used by control loops.
//! - [`sim`] – [`SimBoard`][sim::SimBoard]: in-process board for headless tests.

pub mod atomic;
pub mod board;
pub mod encoder_joint_module;
pub mod limits;
pub mod motor_joint_module;
pub mod pid;
pub mod sim;
pub mod time_series;

pub use board::{ControlBoard, Encoder, EncoderInterface, Motor, MotorInterface};
pub use encoder_joint_module::EncoderJointModule;
pub use limits::LimitTable;
pub use motor_joint_module::MotorJointModule;
pub use pid::PidController;
pub use sim::SimBoard;
pub use time_series::{MeasurementHistory, TimeIndex, TimeSeries};
