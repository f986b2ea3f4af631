//! psry Storage Library
//!
//! Object store abstraction used by the upload stage. Objects are stored under the record ID,
//! so a storage key and a record ID are the same string.
//!
//! Backends:
//! - `S3Storage`: any S3-compatible store through `object_store`
//! - `LocalStorage`: a directory on the local filesystem
//! - `MemoryStorage`: process-local map, used by tests and local runs

pub mod factory;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use psry_core::{StorageBackend, Visibility};
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};
