//! Declarative remote operations with a pluggable, content-addressed cache.
//!
//! Queries and mutations resolve their results through an ordered chain of
//! [`ports::DataSource`]s. [`cache::cache`] installs a cache data source at the
//! front of a query's chain, keyed by the operation identity, its params and
//! any declared [`cache::Sourced`] values.

pub mod adapters;
pub mod attach;
pub mod cache;
pub mod domain;
pub mod operation;
pub mod ports;
pub mod reactive;

pub use attach::{AttachConfig, attach_operation, attach_operation_with};
pub use cache::{CacheAdapter, CacheOptions, Sourced, cache};
pub use domain::{AdapterConfig, CacheEntry, CacheKey, CachedResult, OperationId};
pub use operation::{Mutation, Query, RemoteOperation};
pub use ports::{CacheStore, DataSource, StoreFactory};
pub use reactive::{Event, Reactive, Store};
