//! Integration test utilities for the realtime connection manager
//!
//! This crate provides a controllable mock backend (health endpoint plus a
//! websocket route) for end-to-end connect/drop/reconnect tests.

pub mod helpers;

pub use helpers::*;
