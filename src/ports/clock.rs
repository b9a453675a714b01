//! Clock port - wall-clock time source in unix seconds.

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    /// Current time as unix seconds.
    fn now_unix_secs(&self) -> i64;
}
