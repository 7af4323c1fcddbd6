//! Data query layer: per-intent backend query definitions, the TTL result
//! cache, and the gateway that gates, executes, remaps, and memoizes calls.

pub mod cache;
pub mod gateway;
pub mod query;

pub use cache::{CacheInfo, QueryCache};
pub use gateway::{DataQueryGateway, RestDataBackend};
pub use query::{definition_for, QueryDefinition};
