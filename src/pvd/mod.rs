//! Periodic Vehicle Data broadcast application.
//!
//! - [`app`]: the per-node scheduler/reception state machine
//! - [`helper`]: installs applications across a node set
//! - [`jitter`]: clock-drift and transmit-delay jitter
//! - [`ranges`]: nested reception-range buckets
//! - [`stats`]: shared delivery counters

pub mod app;
pub mod helper;
pub mod jitter;
pub mod ranges;
pub mod stats;
