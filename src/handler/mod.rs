//! Turns externally observed change notifications into work items.

mod cache_based_event_handler;
mod detector;

pub use cache_based_event_handler::*;
pub use detector::*;
