#![warn(missing_debug_implementations, rust_2018_idioms)]

//! # atomictest: a KMS atomic-commit test suite
//!
//! This crate drives a DRM device exclusively through the atomic
//! interface. It discovers the device topology (connectors, crtcs and
//! planes together with their properties), finds a mode every crtc
//! accepts with test-only commits, and runs a set of named scenarios
//! that exercise plane composition: format cycling, yuv overlays,
//! cursor movement and primary-plane teardown.
//!
//! The engine is split along two seams to keep the scenarios testable
//! off hardware:
//!
//! - [`backend::ScanoutBackend`] abstracts buffer allocation, mapping
//!   and framebuffer registration (backed by gbm on real devices).
//! - [`device::AtomicCommitter`] abstracts atomic submission and the
//!   page-flip wait.
//!
//! Everything in between, property snapshots, the staged
//! [`transaction::Transaction`] and the scenario bodies, is plain data
//! and runs unchanged against in-memory doubles.
//!
//! ## Logging
//!
//! The crate logs through [`tracing`]. The binary installs a
//! `tracing_subscriber` filtered by `RUST_LOG`.

pub mod backend;
pub mod context;
pub mod device;
pub mod error;
pub mod format;
pub mod pattern;
pub mod plane;
pub mod properties;
pub mod scenarios;
pub mod topology;
pub mod transaction;

#[cfg(test)]
pub(crate) mod mock;

pub use context::{AtomicContext, Pacing};
pub use error::Error;
pub use scenarios::{run_on_device, run_scenario, Scenario};
pub use topology::Topology;
