//! Adapters shipped with the crate. Persistent ones live in `storage-engine`.

pub mod in_memory;
pub mod void;

pub use in_memory::{InMemoryStore, InMemoryStoreFactory, StoreStats};
pub use void::VoidStore;
