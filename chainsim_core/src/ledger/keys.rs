//! Namespaces, key prefixes and key builders of the ledger application.

pub const ACC: &str = "acc";
pub const BANK: &str = "bank";
pub const STAKING: &str = "staking";
pub const DISTRIBUTION: &str = "distribution";
pub const MINT: &str = "mint";
pub const GOV: &str = "gov";
pub const PARAMS: &str = "params";
pub const TAX: &str = "tax";
pub const WASM: &str = "wasm";

/// Every namespace the ledger registers, in commitment order.
pub const NAMESPACES: &[&str] = &[ACC, BANK, STAKING, DISTRIBUTION, MINT, GOV, PARAMS, TAX, WASM];

// ============================================================================
// MODULE ACCOUNTS
// ============================================================================

pub const FEE_COLLECTOR: &str = "module/fee_collector";
pub const BONDED_POOL: &str = "module/bonded_tokens_pool";
pub const NOT_BONDED_POOL: &str = "module/not_bonded_tokens_pool";
pub const DISTRIBUTION_ACCOUNT: &str = "module/distribution";
pub const MINT_ACCOUNT: &str = "module/mint";
pub const GOV_ACCOUNT: &str = "module/gov";
pub const TREASURY: &str = "module/treasury";

pub const MODULE_ACCOUNTS: &[&str] = &[
    FEE_COLLECTOR,
    BONDED_POOL,
    NOT_BONDED_POOL,
    DISTRIBUTION_ACCOUNT,
    MINT_ACCOUNT,
    GOV_ACCOUNT,
    TREASURY,
];

// ============================================================================
// PREFIXES
// ============================================================================

pub mod acc {
    pub const NEXT_ACCOUNT_NUMBER: &[u8] = &[0x00];
    pub const ACCOUNT: u8 = 0x01;
}

pub mod bank {
    pub const SUPPLY: u8 = 0x00;
    pub const BALANCES: u8 = 0x02;
    /// denom → holder reverse index
    pub const DENOM_ADDRESS_INDEX: u8 = 0x03;
}

pub mod staking {
    pub const LAST_VALIDATOR_POWER: u8 = 0x11;
    pub const LAST_TOTAL_POWER: &[u8] = &[0x12];
    pub const VALIDATOR: u8 = 0x21;
    pub const DELEGATION: u8 = 0x31;
    pub const UNBONDING_DELEGATION: u8 = 0x32;
    pub const REDELEGATION: u8 = 0x34;
    pub const UNBONDING_ID: &[u8] = &[0x37];
    pub const UNBONDING_INDEX: u8 = 0x38;
    pub const UNBONDING_TYPE: u8 = 0x39;
    pub const UNBONDING_QUEUE: u8 = 0x41;
    pub const REDELEGATION_QUEUE: u8 = 0x42;
    pub const VALIDATOR_QUEUE: u8 = 0x43;
    pub const HISTORICAL_INFO: u8 = 0x50;
    pub const PARAMS: &[u8] = &[0x51];
    pub const VALIDATOR_UPDATES: &[u8] = &[0x61];
}

pub mod distribution {
    pub const FEE_POOL: &[u8] = &[0x00];
    pub const PREVIOUS_PROPOSER: &[u8] = &[0x01];
    pub const OUTSTANDING_REWARDS: u8 = 0x02;
    pub const PARAMS: &[u8] = &[0x09];
}

pub mod mint {
    pub const MINTER: &[u8] = &[0x00];
    pub const PARAMS: &[u8] = &[0x01];
}

pub mod gov {
    pub const PROPOSAL: u8 = 0x00;
    pub const ACTIVE_PROPOSAL_QUEUE: u8 = 0x01;
    pub const NEXT_PROPOSAL_ID: &[u8] = &[0x03];
    pub const VOTE: u8 = 0x20;
    pub const PARAMS: &[u8] = &[0x30];
}

pub mod tax {
    pub const PARAMS: &[u8] = &[0x00];
    pub const TOTAL_COLLECTED: u8 = 0x01;
}

pub mod wasm {
    pub const CODE: u8 = 0x01;
    pub const CONTRACT: u8 = 0x02;
    pub const CONTRACT_STORE: u8 = 0x03;
    pub const SEQUENCE: u8 = 0x04;
    pub const TX_COUNTER: &[u8] = &[0x08];

    pub const LAST_CODE_ID: &str = "lastCodeId";
    pub const LAST_CONTRACT_ID: &str = "lastContractId";
}

pub const BLOCK_PARAMS: &str = "baseapp/BlockParams";
pub const EVIDENCE_PARAMS: &str = "baseapp/EvidenceParams";
pub const VALIDATOR_PARAMS: &str = "baseapp/ValidatorParams";

// ============================================================================
// KEY BUILDERS
// ============================================================================

/// Appends `bytes` with a one-byte length prefix.
fn push_len_prefixed(key: &mut Vec<u8>, bytes: &[u8]) {
    key.push(bytes.len() as u8);
    key.extend_from_slice(bytes);
}

fn prefixed(prefix: u8, parts: &[&[u8]]) -> Vec<u8> {
    let mut key = vec![prefix];
    for part in parts {
        push_len_prefixed(&mut key, part);
    }
    key
}

/// Splits a key built by [`prefixed`] back into its parts.
pub fn split_parts(key: &[u8]) -> Option<Vec<Vec<u8>>> {
    let mut rest = key.get(1..)?;
    let mut parts = Vec::new();
    while let Some((&len, tail)) = rest.split_first() {
        let len = len as usize;
        if tail.len() < len {
            return None;
        }
        parts.push(tail[..len].to_vec());
        rest = &tail[len..];
    }
    Some(parts)
}

pub fn account_key(address: &str) -> Vec<u8> {
    prefixed(acc::ACCOUNT, &[address.as_bytes()])
}

pub fn supply_key(denom: &str) -> Vec<u8> {
    prefixed(bank::SUPPLY, &[denom.as_bytes()])
}

pub fn balance_key(address: &str, denom: &str) -> Vec<u8> {
    prefixed(bank::BALANCES, &[address.as_bytes(), denom.as_bytes()])
}

pub fn balances_prefix(address: &str) -> Vec<u8> {
    prefixed(bank::BALANCES, &[address.as_bytes()])
}

pub fn denom_index_key(denom: &str, address: &str) -> Vec<u8> {
    prefixed(bank::DENOM_ADDRESS_INDEX, &[denom.as_bytes(), address.as_bytes()])
}

pub fn last_validator_power_key(validator: &str) -> Vec<u8> {
    prefixed(staking::LAST_VALIDATOR_POWER, &[validator.as_bytes()])
}

pub fn validator_key(validator: &str) -> Vec<u8> {
    prefixed(staking::VALIDATOR, &[validator.as_bytes()])
}

pub fn delegation_key(delegator: &str, validator: &str) -> Vec<u8> {
    prefixed(staking::DELEGATION, &[delegator.as_bytes(), validator.as_bytes()])
}

pub fn delegations_prefix(delegator: &str) -> Vec<u8> {
    prefixed(staking::DELEGATION, &[delegator.as_bytes()])
}

pub fn unbonding_delegation_key(delegator: &str, validator: &str) -> Vec<u8> {
    prefixed(staking::UNBONDING_DELEGATION, &[delegator.as_bytes(), validator.as_bytes()])
}

pub fn redelegation_key(delegator: &str, src: &str, dst: &str) -> Vec<u8> {
    prefixed(
        staking::REDELEGATION,
        &[delegator.as_bytes(), src.as_bytes(), dst.as_bytes()],
    )
}

pub fn unbonding_index_key(id: u64) -> Vec<u8> {
    let mut key = vec![staking::UNBONDING_INDEX];
    key.extend_from_slice(&id.to_be_bytes());
    key
}

pub fn unbonding_type_key(id: u64) -> Vec<u8> {
    let mut key = vec![staking::UNBONDING_TYPE];
    key.extend_from_slice(&id.to_be_bytes());
    key
}

/// Time-ordered queue key. Negative times sort before zero.
pub fn queue_key(prefix: u8, time: i64) -> Vec<u8> {
    let mut key = vec![prefix];
    key.extend_from_slice(&((time as u64) ^ (1 << 63)).to_be_bytes());
    key
}

/// Decodes the time of a [`queue_key`].
pub fn queue_key_time(key: &[u8]) -> Option<i64> {
    let bytes: [u8; 8] = key.get(1..9)?.try_into().ok()?;
    Some((u64::from_be_bytes(bytes) ^ (1 << 63)) as i64)
}

pub fn historical_info_key(height: u64) -> Vec<u8> {
    let mut key = vec![staking::HISTORICAL_INFO];
    key.extend_from_slice(&height.to_be_bytes());
    key
}

pub fn outstanding_rewards_key(validator: &str) -> Vec<u8> {
    prefixed(distribution::OUTSTANDING_REWARDS, &[validator.as_bytes()])
}

pub fn proposal_key(id: u64) -> Vec<u8> {
    let mut key = vec![gov::PROPOSAL];
    key.extend_from_slice(&id.to_be_bytes());
    key
}

pub fn active_proposal_key(end_time: i64, id: u64) -> Vec<u8> {
    let mut key = queue_key(gov::ACTIVE_PROPOSAL_QUEUE, end_time);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

pub fn vote_key(proposal_id: u64, voter: &str) -> Vec<u8> {
    let mut key = vec![gov::VOTE];
    key.extend_from_slice(&proposal_id.to_be_bytes());
    key.extend_from_slice(voter.as_bytes());
    key
}

pub fn votes_prefix(proposal_id: u64) -> Vec<u8> {
    let mut key = vec![gov::VOTE];
    key.extend_from_slice(&proposal_id.to_be_bytes());
    key
}

pub fn tax_collected_key(denom: &str) -> Vec<u8> {
    prefixed(tax::TOTAL_COLLECTED, &[denom.as_bytes()])
}

pub fn code_key(code_id: u64) -> Vec<u8> {
    let mut key = vec![wasm::CODE];
    key.extend_from_slice(&code_id.to_be_bytes());
    key
}

pub fn contract_key(address: &str) -> Vec<u8> {
    prefixed(wasm::CONTRACT, &[address.as_bytes()])
}

pub fn contract_store_key(address: &str, state_key: &[u8]) -> Vec<u8> {
    prefixed(wasm::CONTRACT_STORE, &[address.as_bytes(), state_key])
}

pub fn contract_store_prefix(address: &str) -> Vec<u8> {
    prefixed(wasm::CONTRACT_STORE, &[address.as_bytes()])
}

pub fn sequence_key(name: &str) -> Vec<u8> {
    prefixed(wasm::SEQUENCE, &[name.as_bytes()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_keys_sort_by_time() {
        let early = queue_key(staking::UNBONDING_QUEUE, -5);
        let zero = queue_key(staking::UNBONDING_QUEUE, 0);
        let late = queue_key(staking::UNBONDING_QUEUE, 1_700_000_000);

        assert!(early < zero && zero < late);
        assert_eq!(queue_key_time(&late), Some(1_700_000_000));
        assert_eq!(queue_key_time(&early), Some(-5));
    }

    #[test]
    fn test_split_parts_roundtrip() {
        let key = delegation_key("alice", "val1");
        let parts = split_parts(&key).unwrap();
        assert_eq!(parts, vec![b"alice".to_vec(), b"val1".to_vec()]);
        assert!(key.starts_with(&delegations_prefix("alice")));
    }
}
