//! Topic list canonicalization.
//!
//! Topic lists travel through the coordinator in a canonical form: sorted
//! ascending, no duplicates (the input is expected duplicate-free). The
//! empty list is the canonical "no subscription". Comparing lists and
//! subscription snapshots is plain `==` on the canonical values.

/// Put a topic list into canonical form.
///
/// Canonicalization is idempotent: applying it to an already canonical
/// list returns the same list.
pub fn canonicalize(mut topics: Vec<String>) -> Vec<String> {
    topics.sort_unstable();
    topics
}
