//! Integration tests for the devhub gateway
//!
//! These tests exercise the full stack in-process: a real axum server on an
//! ephemeral port, the routing core behind it, and channel-backed plugins
//! on the far side of the connection seam.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p devhub-tests
//! ```
//!
//! # Test Structure
//!
//! - `gateway_api_test.rs` - request dispatch, auth, and admin surface
//! - `events_test.rs` - SSE event channel and subscription routing

// This crate only contains tests, no library code
