//! Subscription registry and the per-type list/watch loops it drives.

mod subscription;
mod watch_cache_manager;

pub use subscription::*;
pub use watch_cache_manager::*;
