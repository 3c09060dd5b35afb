//! Human-readable rendering of divergent key/value pairs.

use crate::types::KvPair;

/// Renders a divergent pair from one namespace for a consistency report.
///
/// `a` and `b` share a key position: `a` comes from the original store,
/// `b` from the re-imported one.
pub trait StoreDecoder: Send + Sync {
    fn decode(&self, a: &KvPair, b: &KvPair) -> String;
}

impl<F> StoreDecoder for F
where
    F: Fn(&KvPair, &KvPair) -> String + Send + Sync,
{
    fn decode(&self, a: &KvPair, b: &KvPair) -> String {
        self(a, b)
    }
}
