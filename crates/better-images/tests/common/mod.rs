//! Shared test utilities for better-images integration tests.
//!
//! This module provides:
//! - `TestHarness`: a service wired to temp directories and a mock provider
//! - `MockProvider`: a scriptable transformation provider

pub mod harness;
pub mod mock_provider;

pub use harness::{jpeg_bytes, png_bytes, TestHarness};
pub use mock_provider::MockProvider;
