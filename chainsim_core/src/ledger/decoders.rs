//! Per-namespace renderers for divergent ledger records.

use super::keys;
use crate::report::{quote_bytes, DecoderRegistry};
use chainsim_env::KvPair;

/// Renders a stored value: JSON records as-is, anything else as hex.
fn render_value(value: &[u8]) -> String {
    if value.is_empty() {
        return "<absent>".to_string();
    }
    match serde_json::from_slice::<serde_json::Value>(value) {
        Ok(json) => json.to_string(),
        Err(_) => format!("0x{}", hex::encode(value)),
    }
}

/// Human-readable key: the record kind plus its length-prefixed parts.
fn render_key(label: &str, key: &[u8]) -> String {
    match keys::split_parts(key) {
        Some(parts) if !parts.is_empty() && parts.iter().all(|p| std::str::from_utf8(p).is_ok()) => {
            let parts: Vec<String> = parts
                .iter()
                .map(|p| String::from_utf8_lossy(p).into_owned())
                .collect();
            format!("{} [{}]", label, parts.join(", "))
        }
        _ => format!("{} {}", label, quote_bytes(key)),
    }
}

fn render(label: &str, a: &KvPair, b: &KvPair) -> String {
    format!(
        "{}\n  A: {}\n  B: {}\n",
        render_key(label, &a.key),
        render_value(&a.value),
        render_value(&b.value)
    )
}

fn first_byte(key: &[u8]) -> u8 {
    key.first().copied().unwrap_or(0xff)
}

fn decode_acc(a: &KvPair, b: &KvPair) -> String {
    let label = match first_byte(&a.key) {
        0x00 => "next account number",
        keys::acc::ACCOUNT => "account",
        _ => "acc",
    };
    render(label, a, b)
}

fn decode_bank(a: &KvPair, b: &KvPair) -> String {
    let label = match first_byte(&a.key) {
        keys::bank::SUPPLY => "supply",
        keys::bank::BALANCES => "balance",
        keys::bank::DENOM_ADDRESS_INDEX => "denom holder index",
        _ => "bank",
    };
    render(label, a, b)
}

fn decode_staking(a: &KvPair, b: &KvPair) -> String {
    use keys::staking as s;
    let label = match first_byte(&a.key) {
        s::LAST_VALIDATOR_POWER => "last validator power",
        0x12 => "last total power",
        s::VALIDATOR => "validator",
        s::DELEGATION => "delegation",
        s::UNBONDING_DELEGATION => "unbonding delegation",
        s::REDELEGATION => "redelegation",
        0x37 => "unbonding id",
        s::UNBONDING_INDEX => "unbonding index",
        s::UNBONDING_TYPE => "unbonding type",
        s::UNBONDING_QUEUE => "unbonding queue",
        s::REDELEGATION_QUEUE => "redelegation queue",
        s::VALIDATOR_QUEUE => "validator queue",
        s::HISTORICAL_INFO => "historical info",
        0x51 => "staking params",
        0x61 => "validator updates",
        _ => "staking",
    };
    render(label, a, b)
}

fn decode_distribution(a: &KvPair, b: &KvPair) -> String {
    let label = match first_byte(&a.key) {
        0x00 => "fee pool",
        0x01 => "previous proposer",
        keys::distribution::OUTSTANDING_REWARDS => "outstanding rewards",
        0x09 => "distribution params",
        _ => "distribution",
    };
    render(label, a, b)
}

fn decode_mint(a: &KvPair, b: &KvPair) -> String {
    let label = match first_byte(&a.key) {
        0x00 => "minter",
        0x01 => "mint params",
        _ => "mint",
    };
    render(label, a, b)
}

fn decode_gov(a: &KvPair, b: &KvPair) -> String {
    let label = match first_byte(&a.key) {
        keys::gov::PROPOSAL => "proposal",
        keys::gov::ACTIVE_PROPOSAL_QUEUE => "active proposal",
        0x03 => "next proposal id",
        keys::gov::VOTE => "vote",
        0x30 => "gov params",
        _ => "gov",
    };
    format!(
        "{} {}\n  A: {}\n  B: {}\n",
        label,
        quote_bytes(&a.key),
        render_value(&a.value),
        render_value(&b.value)
    )
}

fn decode_params(a: &KvPair, b: &KvPair) -> String {
    format!(
        "param {}\n  A: {}\n  B: {}\n",
        String::from_utf8_lossy(&a.key),
        render_value(&a.value),
        render_value(&b.value)
    )
}

fn decode_tax(a: &KvPair, b: &KvPair) -> String {
    let label = match first_byte(&a.key) {
        0x00 => "tax params",
        keys::tax::TOTAL_COLLECTED => "tax collected",
        _ => "tax",
    };
    render(label, a, b)
}

fn decode_wasm(a: &KvPair, b: &KvPair) -> String {
    use keys::wasm as w;
    let label = match first_byte(&a.key) {
        w::CODE => "code",
        w::CONTRACT => "contract",
        w::CONTRACT_STORE => "contract state",
        w::SEQUENCE => "sequence",
        0x08 => "tx counter",
        _ => "wasm",
    };
    render(label, a, b)
}

/// Decoder registry covering every ledger namespace.
pub fn decoder_registry() -> DecoderRegistry {
    DecoderRegistry::new()
        .with_decoder(keys::ACC, decode_acc)
        .with_decoder(keys::BANK, decode_bank)
        .with_decoder(keys::STAKING, decode_staking)
        .with_decoder(keys::DISTRIBUTION, decode_distribution)
        .with_decoder(keys::MINT, decode_mint)
        .with_decoder(keys::GOV, decode_gov)
        .with_decoder(keys::PARAMS, decode_params)
        .with_decoder(keys::TAX, decode_tax)
        .with_decoder(keys::WASM, decode_wasm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::simulation_log;

    #[test]
    fn test_every_namespace_has_a_decoder() {
        let registry = decoder_registry();
        for namespace in keys::NAMESPACES {
            assert!(registry.get(namespace).is_some(), "{}", namespace);
        }
    }

    #[test]
    fn test_balance_rendering() {
        let key = keys::balance_key("addr1", "denom");
        let a = KvPair::new(key.clone(), b"100".to_vec());
        let b = KvPair::new(key, Vec::new());

        let log = simulation_log(keys::BANK, &decoder_registry(), &[a], &[b]);
        assert_eq!(log, "balance [addr1, denom]\n  A: 100\n  B: <absent>\n");
    }

    #[test]
    fn test_binary_value_rendered_as_hex() {
        let key = keys::denom_index_key("stake", "addr1");
        let a = KvPair::new(key.clone(), vec![0]);
        let b = KvPair::new(key, vec![1]);
        let out = decoder_registry()
            .get(keys::BANK)
            .map(|d| d.decode(&a, &b))
            .unwrap();
        assert!(out.contains("A: 0"));
        assert!(out.starts_with("denom holder index [stake, addr1]"));
    }
}
