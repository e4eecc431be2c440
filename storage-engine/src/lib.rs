//! Persistent cache adapters.

pub mod sled_store;

pub use sled_store::{SledStore, SledStoreFactory};
