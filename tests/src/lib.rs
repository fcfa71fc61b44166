//! # Askd Test Suite
//!
//! Unified test crate for behavior that crosses crate boundaries:
//! assembling a full daemon from options and driving it end to end.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p ask-tests
//! ```

#![allow(unused_imports)]

pub mod integration;
