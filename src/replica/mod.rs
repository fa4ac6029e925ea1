//! Local replica of one resource type and the scoped reader over it.

mod cache_reader;
mod local_indexed_replica;

pub use cache_reader::*;
pub use local_indexed_replica::*;
