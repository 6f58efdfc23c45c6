//! HTTP transport for better-images.
//!
//! The binary in `main.rs` wires these pieces together; integration tests
//! build the same router through [`router::build_app_router`].

pub mod config;
pub mod error;
pub mod handlers;
pub mod retention;
pub mod router;
pub mod state;
pub mod telemetry;
