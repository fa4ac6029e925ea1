//! Lazily populated, watch-driven local caches of remote resources.
//!
//! [`WatchCacheManager`] keeps one list+watch subscription per resource type
//! and hands out [`CacheReader`]s over its local replica.
//! [`CompositeClient`] reads through the cache and falls back to the direct
//! source for objects the cache does not hold. [`CacheBasedEventHandler`]
//! turns externally observed changes into work items on a
//! [`RateLimitingQueue`].

mod client;
mod config;
mod connector;
mod constants;
mod errors;
mod handler;
mod manager;
mod queue;
mod replica;
mod resource;
mod utils;

pub use client::*;
pub use config::*;
pub use connector::*;
pub use errors::*;
pub use handler::*;
pub use manager::*;
pub use queue::*;
pub use replica::*;
pub use resource::*;
pub(crate) use utils::*;


//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
