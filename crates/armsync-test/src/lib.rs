//! ARMSYNC Test Harness - Session simulation and protocol validation
//!
//! This crate provides:
//! - Seeded lossy links with duplication
//! - A deterministic multi-peer session simulator
//! - Scenario runs with convergence and authority checks

pub mod chaos;
pub mod simulator;
pub mod integration;

pub use chaos::*;
pub use simulator::*;
pub use integration::*;
