//! Simulation plumbing around the PVD application: scenario configuration,
//! node registry and movement gate, broadcast transport, and the runner.

pub mod geometry;
pub mod registry;
pub mod runner;
pub mod scenario;
pub mod transport;
