//! Timestamped values.

use serde::{Deserialize, Serialize};

/// Server timestamp in milliseconds.
pub type Timestamp = u64;

/// The last-known value of `T` and the server time it was fetched at.
///
/// Equality is structural: two `Fetched` values are equal only when both the
/// value and the timestamp match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fetched<T> {
    /// The cached value.
    pub value: T,
    /// When the value was obtained from the server.
    pub timestamp: Timestamp,
}

impl<T> Fetched<T> {
    /// Pair a value with its fetch timestamp.
    pub fn new(value: T, timestamp: Timestamp) -> Self {
        Self { value, timestamp }
    }

    /// Transform the value, keeping the timestamp.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        Fetched {
            value: f(self.value),
            timestamp: self.timestamp,
        }
    }

    /// Check whether this value was fetched strictly after `other`.
    pub fn is_newer_than<U>(&self, other: &Fetched<U>) -> bool {
        self.timestamp > other.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_requires_value_and_timestamp() {
        assert_eq!(Fetched::new("a", 1), Fetched::new("a", 1));
        assert_ne!(Fetched::new("a", 1), Fetched::new("a", 2));
        assert_ne!(Fetched::new("a", 1), Fetched::new("b", 1));
    }

    #[test]
    fn map_keeps_timestamp() {
        let fetched = Fetched::new(21u32, 1_700_000_000_000).map(|v| v * 2);
        assert_eq!(fetched, Fetched::new(42u32, 1_700_000_000_000));
    }

    #[test]
    fn newer_is_strict() {
        let older = Fetched::new((), 10);
        let newer = Fetched::new("x", 11);
        assert!(newer.is_newer_than(&older));
        assert!(!older.is_newer_than(&newer));
        assert!(!older.is_newer_than(&Fetched::new(0u8, 10)));
    }
}
