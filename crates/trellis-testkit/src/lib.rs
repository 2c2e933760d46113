//! # Trellis Testkit
//!
//! Testing utilities for the Trellis permission engine.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a fully wired engine over in-memory storage with a
//!   manually driven scheduler and a capturing audit sink
//! - **Generators**: proptest strategies for nodes, context sets, and names
//!
//! ## Test Fixtures
//!
//! Quickly set up test scenarios:
//!
//! ```rust,ignore
//! use trellis_testkit::fixtures::TestFixture;
//!
//! let fixture = TestFixture::new();
//! fixture.seed_group("admin").await;
//! fixture.grant_group("admin", "server.manage").await;
//! ```
//!
//! ## Property Testing
//!
//! Use the generators with proptest:
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use trellis_testkit::generators::node;
//!
//! proptest! {
//!     #[test]
//!     fn node_roundtrips(node in node()) {
//!         // ...
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{group, init_tracing, track, TestFixture};
