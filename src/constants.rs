// -
// Resync jitter

/// Lower bound of the resync period, percent of the base period (inclusive)
pub(crate) const RESYNC_JITTER_MIN_PERCENT: u128 = 90;
/// Upper bound of the resync period, percent of the base period (exclusive)
pub(crate) const RESYNC_JITTER_MAX_PERCENT: u128 = 110;

// -
// In-memory source

/// Events retained so that watches can resume from a recent version
pub(crate) const DEFAULT_SOURCE_HISTORY: usize = 1024;
/// Live event buffer per watcher before it is told to relist
pub(crate) const DEFAULT_SOURCE_EVENT_BUFFER: usize = 1024;
