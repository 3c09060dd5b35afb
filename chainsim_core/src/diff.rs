//! Store comparator: key-by-key diff of two namespace snapshots.

use chainsim_env::{KvPair, NamespaceSnapshot};
use std::cmp::Ordering;
use std::iter::Peekable;

/// What to compare in one namespace and which keys to ignore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceComparison {
    /// Namespace (module store) name
    pub namespace: String,

    /// Keys under any of these prefixes are skipped
    pub exclude_prefixes: Vec<Vec<u8>>,

    /// Exact keys removed from both sides before comparing
    pub force_delete: Vec<Vec<u8>>,
}

impl NamespaceComparison {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            exclude_prefixes: Vec::new(),
            force_delete: Vec::new(),
        }
    }

    pub fn with_excluded_prefix(mut self, prefix: impl Into<Vec<u8>>) -> Self {
        self.exclude_prefixes.push(prefix.into());
        self
    }

    pub fn with_force_deleted_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.force_delete.push(key.into());
        self
    }

    /// Diffs `a` against `b` under this comparison's exclusions.
    pub fn compare(&self, a: &NamespaceSnapshot, b: &NamespaceSnapshot) -> KvDiff {
        if self.force_delete.is_empty() {
            return diff_kv_stores(a, b, &self.exclude_prefixes);
        }
        let a = a.without_keys(&self.force_delete);
        let b = b.without_keys(&self.force_delete);
        diff_kv_stores(&a, &b, &self.exclude_prefixes)
    }
}

/// Divergent pairs of a comparison, index-aligned.
///
/// `a[i]` and `b[i]` always share a key; a side missing the key contributes
/// an empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KvDiff {
    pub a: Vec<KvPair>,
    pub b: Vec<KvPair>,
}

impl KvDiff {
    pub fn is_empty(&self) -> bool {
        self.a.is_empty() && self.b.is_empty()
    }

    /// Number of divergent pairs (of side A).
    pub fn len(&self) -> usize {
        self.a.len()
    }

    /// Both sides hold the same number of pairs.
    pub fn is_aligned(&self) -> bool {
        self.a.len() == self.b.len()
    }

    /// Returns the diff with sides swapped.
    pub fn swapped(self) -> Self {
        Self {
            a: self.b,
            b: self.a,
        }
    }
}

fn is_excluded(key: &[u8], prefixes: &[Vec<u8>]) -> bool {
    prefixes.iter().any(|p| key.starts_with(p))
}

/// Compares two stores over the union of their keys, in key order.
///
/// A key is divergent when its value bytes differ, treating a missing key
/// as an empty value. Keys matching any of `exclude_prefixes` are skipped.
pub fn diff_kv_stores(
    a: &NamespaceSnapshot,
    b: &NamespaceSnapshot,
    exclude_prefixes: &[Vec<u8>],
) -> KvDiff {
    let mut diff = KvDiff::default();
    let mut iter_a = a.iter().peekable();
    let mut iter_b = b.iter().peekable();

    while let Some((key, value_a, value_b)) = next_key(&mut iter_a, &mut iter_b) {
        if is_excluded(key, exclude_prefixes) || value_a == value_b {
            continue;
        }
        diff.a.push(KvPair::new(key, value_a));
        diff.b.push(KvPair::new(key, value_b));
    }
    diff
}

/// Advances the merge walk by one key of the union.
fn next_key<'a, I>(
    iter_a: &mut Peekable<I>,
    iter_b: &mut Peekable<I>,
) -> Option<(&'a [u8], &'a [u8], &'a [u8])>
where
    I: Iterator<Item = (&'a [u8], &'a [u8])>,
{
    const EMPTY: &[u8] = &[];
    let order = match (iter_a.peek(), iter_b.peek()) {
        (None, None) => return None,
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (Some((ka, _)), Some((kb, _))) => ka.cmp(kb),
    };
    match order {
        Ordering::Less => iter_a.next().map(|(k, v)| (k, v, EMPTY)),
        Ordering::Greater => iter_b.next().map(|(k, v)| (k, EMPTY, v)),
        Ordering::Equal => {
            let (k, va) = iter_a.next()?;
            let (_, vb) = iter_b.next()?;
            Some((k, va, vb))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn kv(key: &[u8], value: &[u8]) -> KvPair {
        KvPair::new(key, value)
    }

    fn snapshot(pairs: Vec<KvPair>) -> NamespaceSnapshot {
        NamespaceSnapshot::from_pairs("test", pairs)
    }

    #[test]
    fn test_equal_balance_key_has_no_divergence() {
        let key = b"\x02addr1denom";
        let a = snapshot(vec![kv(key, b"100")]);
        let b = snapshot(vec![kv(key, b"100")]);

        let diff = diff_kv_stores(&a, &b, &[]);
        assert!(diff.is_empty());
    }

    #[test]
    fn test_queue_key_only_in_a() {
        let queue_key = b"\x41\x00\x00\x01";
        let a = snapshot(vec![kv(queue_key, b"entry"), kv(b"\x21val", b"v")]);
        let b = snapshot(vec![kv(b"\x21val", b"v")]);

        let excluded = diff_kv_stores(&a, &b, &[vec![0x41]]);
        assert!(excluded.is_empty());

        let included = diff_kv_stores(&a, &b, &[]);
        assert_eq!(included.len(), 1);
        assert!(included.is_aligned());
        assert_eq!(included.a[0], kv(queue_key, b"entry"));
        assert_eq!(included.b[0], kv(queue_key, b""));
    }

    #[test]
    fn test_mismatched_value_reported_on_both_sides() {
        let a = snapshot(vec![kv(b"k1", b"a"), kv(b"k2", b"same")]);
        let b = snapshot(vec![kv(b"k1", b"b"), kv(b"k2", b"same")]);

        let diff = diff_kv_stores(&a, &b, &[]);
        assert_eq!(diff.a, vec![kv(b"k1", b"a")]);
        assert_eq!(diff.b, vec![kv(b"k1", b"b")]);
    }

    #[test]
    fn test_absent_equals_empty_value() {
        let a = snapshot(vec![kv(b"k", b"")]);
        let b = snapshot(vec![]);
        assert!(diff_kv_stores(&a, &b, &[]).is_empty());
    }

    #[test]
    fn test_force_deleted_key_ignored_on_both_sides() {
        let a = snapshot(vec![kv(b"\x08", b"7"), kv(b"\x01code", b"c")]);
        let b = snapshot(vec![kv(b"\x01code", b"c")]);

        let comparison = NamespaceComparison::new("wasm").with_force_deleted_key(vec![0x08]);
        assert!(comparison.compare(&a, &b).is_empty());
        assert_eq!(NamespaceComparison::new("wasm").compare(&a, &b).len(), 1);
    }

    fn arb_store() -> impl Strategy<Value = BTreeMap<Vec<u8>, Vec<u8>>> {
        prop::collection::btree_map(
            prop::collection::vec(0u8..4, 1..4),
            prop::collection::vec(any::<u8>(), 0..3),
            0..16,
        )
    }

    fn to_snapshot(map: &BTreeMap<Vec<u8>, Vec<u8>>) -> NamespaceSnapshot {
        NamespaceSnapshot::from_pairs(
            "prop",
            map.iter().map(|(k, v)| KvPair::new(k.clone(), v.clone())),
        )
    }

    proptest! {
        /// Property: both sides are aligned and swapping inputs swaps outputs.
        #[test]
        fn prop_diff_is_symmetric(a in arb_store(), b in arb_store()) {
            let (a, b) = (to_snapshot(&a), to_snapshot(&b));
            let forward = diff_kv_stores(&a, &b, &[]);
            let backward = diff_kv_stores(&b, &a, &[]);

            prop_assert!(forward.is_aligned());
            for (pa, pb) in forward.a.iter().zip(&forward.b) {
                prop_assert_eq!(&pa.key, &pb.key);
            }
            prop_assert_eq!(forward.swapped(), backward);
        }

        /// Property: a store compared with an identical copy has no divergence.
        #[test]
        fn prop_diff_with_copy_is_empty(a in arb_store()) {
            let snapshot = to_snapshot(&a);
            prop_assert!(diff_kv_stores(&snapshot, &snapshot.clone(), &[]).is_empty());
        }

        /// Property: excluded keys are never reported.
        #[test]
        fn prop_excluded_keys_never_reported(a in arb_store(), b in arb_store(), p in 0u8..4) {
            let prefixes = vec![vec![p]];
            let diff = diff_kv_stores(&to_snapshot(&a), &to_snapshot(&b), &prefixes);
            for pair in diff.a.iter().chain(&diff.b) {
                prop_assert!(!pair.key.starts_with(&[p]));
            }
        }
    }
}
