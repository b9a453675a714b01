//! Store key layout for bucket state.

/// Namespace shared by every bucket key.
pub const KEY_PREFIX: &str = "rate_limit:ip";

/// The pair of store keys holding one identifier's bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKeys {
    /// Key holding the remaining token count.
    pub tokens: String,
    /// Key holding the unix-seconds timestamp of the last refill.
    pub last_updated: String,
}

impl BucketKeys {
    /// Derives both keys for an identifier.
    ///
    /// Any string is accepted as a key component.
    pub fn for_identifier(identifier: &str) -> Self {
        let base = format!("{}:{}", KEY_PREFIX, identifier);
        Self {
            tokens: format!("{}:tokens", base),
            last_updated: format!("{}:last_updated", base),
        }
    }
}
