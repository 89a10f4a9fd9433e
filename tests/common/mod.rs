//! Common test utilities for vidgen-dl integration tests

#[allow(dead_code)]
pub mod mock_service;

pub use mock_service::*;
