//! # Trellis Store
//!
//! Storage abstraction for the Trellis permission engine.
//!
//! The engine only depends on the [`Storage`] trait; backends implement it.
//! This crate ships the in-memory reference implementation used by tests.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::StoreError;
pub use memory::MemoryStorage;
pub use traits::Storage;
