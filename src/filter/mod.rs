//! Filter policies for table meta-blocks.
//!
//! A filter policy turns the set of keys in a region of the table into a
//! compact byte string that can later answer "might this key be present?".
//! The table builder stores the policy name in the meta-index so readers
//! can refuse filters they do not understand.

mod bloom;

pub use bloom::BloomFilterPolicy;

/// Strategy for building and querying per-region key filters.
pub trait FilterPolicy: Send + Sync {
    /// Name of this policy. Appended to `"filter."` to form the
    /// meta-index key, so it must stay stable across versions.
    fn name(&self) -> &'static str;

    /// Builds a filter summarizing `keys`. The returned bytes are stored
    /// verbatim and later passed back to [`key_may_match`](Self::key_may_match).
    fn create_filter(&self, keys: &[&[u8]]) -> Vec<u8>;

    /// Returns `true` if `key` may be in the set `filter` was built from.
    /// False positives are allowed; false negatives are not.
    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool;
}
