//! Infrastructure adapters: configuration storage and path resolution, plus
//! in-memory implementations of the session store and cache store contracts.

pub mod memory_cache;
pub mod memory_session_store;
pub mod paths;
pub mod storage;

pub use crate::memory_cache::InMemoryCacheStore;
pub use crate::memory_session_store::InMemorySessionStore;
pub use crate::paths::CadePaths;
pub use crate::storage::{ConfigStorage, ConfigStorageError};
