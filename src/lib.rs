//! Core of a Lightning gossip propagation dashboard.
//!
//! A snapshot of seven JSON resources is loaded and normalized into a
//! [`model::Dataset`]. Everything the panels show is derived from it: the
//! radial peer layout, per-message wavefront replay, cross-panel highlight
//! state and the centralization risk report. [`session::DashboardSession`]
//! ties the pieces together for one dashboard instance.

pub mod config;
pub mod core;
pub mod error;
pub mod features;
pub mod highlight;
pub mod layout;
pub mod leaks;
pub mod loader;
pub mod logging;
pub mod messages;
pub mod model;
pub mod normalize;
pub mod presentation;
pub mod replay;
pub mod replay_driver;
pub mod risk;
pub mod session;
pub mod threats;
pub mod wire;

#[cfg(test)]
mod dashboard_scenarios_tests;
#[cfg(test)]
mod property_gate_tests;
