//! Swarmgate Reflection - the broker's semantic memory
//!
//! The sink subscribes to runtime topics on the local bus, normalizes
//! payloads into immutable `ReflectionRecord`s, and appends them to a store.
//! Operator queries ("what happened", "why did it stop", "what preceded
//! failure") are pure functions over the record log with deterministic
//! ordering; none performs inference.

pub mod query;
pub mod sink;
pub mod store;

pub use query::*;
pub use sink::ReflectionSink;
pub use store::{InMemoryReflectionStore, ReflectionStore, StorageReflectionStore};
