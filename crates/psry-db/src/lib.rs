//! Record store for psry
//!
//! The record store is the only place pipeline state lives between stage invocations. Every
//! adapter implements [`RecordStore`]; stage writes go through [`RecordStore::update`], which
//! applies the stage transition rule atomically with the payload write.

pub mod error;
pub mod memory;
pub mod pool;
pub mod postgres;
pub mod store;

pub use error::{RecordStoreError, RecordStoreResult};
pub use memory::InMemoryRecordStore;
pub use pool::{connect_pool, create_record_store};
pub use postgres::PgRecordStore;
pub use store::{RecordStore, RecordStream, DEFAULT_PAGE_SIZE};
