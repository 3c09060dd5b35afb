//! Divergence reporter: renders comparator output for humans.

use crate::diff::KvDiff;
use chainsim_env::{KvPair, StoreDecoder};
use std::collections::HashMap;
use std::fmt::Write;

/// Namespace → decoder mapping. A namespace without a decoder falls back to
/// the raw byte rendering.
#[derive(Default)]
pub struct DecoderRegistry {
    decoders: HashMap<String, Box<dyn StoreDecoder>>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the decoder for `namespace`.
    pub fn register(&mut self, namespace: impl Into<String>, decoder: impl StoreDecoder + 'static) {
        self.decoders.insert(namespace.into(), Box::new(decoder));
    }

    pub fn with_decoder(mut self, namespace: impl Into<String>, decoder: impl StoreDecoder + 'static) -> Self {
        self.register(namespace, decoder);
        self
    }

    pub fn get(&self, namespace: &str) -> Option<&dyn StoreDecoder> {
        self.decoders.get(namespace).map(|d| d.as_ref())
    }
}

impl std::fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.decoders.keys().collect();
        names.sort();
        f.debug_struct("DecoderRegistry").field("namespaces", &names).finish()
    }
}

/// Renders bytes as a double-quoted, escaped string.
pub fn quote_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push('"');
    for &b in bytes {
        out.extend(std::ascii::escape_default(b).map(char::from));
    }
    out.push('"');
    out
}

fn raw_pair(a: &KvPair, b: &KvPair) -> String {
    format!(
        "store A {} => {}\nstore B {} => {}\n",
        quote_bytes(&a.key),
        quote_bytes(&a.value),
        quote_bytes(&b.key),
        quote_bytes(&b.value),
    )
}

/// Renders the divergent pairs of one namespace.
///
/// Index positions where both values are empty are skipped. An empty result
/// means there is no meaningful divergence.
pub fn simulation_log(namespace: &str, registry: &DecoderRegistry, a: &[KvPair], b: &[KvPair]) -> String {
    let decoder = registry.get(namespace);
    let mut log = String::new();
    for (pa, pb) in a.iter().zip(b) {
        if pa.value.is_empty() && pb.value.is_empty() {
            continue;
        }
        match decoder {
            Some(decoder) => log.push_str(&decoder.decode(pa, pb)),
            None => log.push_str(&raw_pair(pa, pb)),
        }
    }
    log
}

/// Renders a full comparison result, prefixed with the pair count.
pub fn render_diff(namespace: &str, registry: &DecoderRegistry, diff: &KvDiff) -> String {
    let body = simulation_log(namespace, registry, &diff.a, &diff.b);
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} divergent key/value pair(s) in namespace {}",
        diff.len(),
        namespace
    );
    out.push_str(&body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kv(key: &[u8], value: &[u8]) -> KvPair {
        KvPair::new(key, value)
    }

    #[test]
    fn test_raw_fallback_format() {
        let registry = DecoderRegistry::new();
        let log = simulation_log(
            "tax",
            &registry,
            &[kv(b"\x01total", b"10")],
            &[kv(b"\x01total", b"")],
        );
        assert_eq!(
            log,
            "store A \"\\x01total\" => \"10\"\nstore B \"\\x01total\" => \"\"\n"
        );
    }

    #[test]
    fn test_registered_decoder_is_used() {
        let registry = DecoderRegistry::new().with_decoder("bank", |a: &KvPair, b: &KvPair| {
            format!(
                "balance {} vs {}\n",
                String::from_utf8_lossy(&a.value),
                String::from_utf8_lossy(&b.value)
            )
        });

        let log = simulation_log("bank", &registry, &[kv(b"k", b"100")], &[kv(b"k", b"90")]);
        assert_eq!(log, "balance 100 vs 90\n");

        let fallback = simulation_log("gov", &registry, &[kv(b"k", b"1")], &[kv(b"k", b"2")]);
        assert!(fallback.starts_with("store A"));
    }

    #[test]
    fn test_all_empty_values_render_nothing() {
        let registry = DecoderRegistry::new();
        let log = simulation_log("bank", &registry, &[kv(b"a", b""), kv(b"b", b"")], &[kv(b"a", b""), kv(b"b", b"")]);
        assert!(log.is_empty());
    }

    #[test]
    fn test_render_diff_includes_count() {
        let registry = DecoderRegistry::new();
        let diff = KvDiff {
            a: vec![kv(b"k", b"1")],
            b: vec![kv(b"k", b"2")],
        };
        let rendered = render_diff("mint", &registry, &diff);
        assert!(rendered.starts_with("1 divergent key/value pair(s) in namespace mint\n"));
        assert!(rendered.contains("store B \"k\" => \"2\""));
    }
}
