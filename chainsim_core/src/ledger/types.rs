//! Records stored by the ledger modules.
//!
//! Every record is stored as its JSON encoding; numeric state uses integer
//! fixed-point so that encodings are stable across runs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Basis-point denominator (1 bps = 0.01%).
pub const BPS: u64 = 10_000;

/// Nanoseconds in a 365-day year.
pub const NANOS_PER_YEAR: u128 = 365 * 24 * 3600 * 1_000_000_000;

/// Coin amounts keyed by denom.
pub type Coins = BTreeMap<String, u64>;

// ============================================================================
// ACC / BANK
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: String,
    /// Hex-encoded public key (empty for module accounts)
    pub pub_key: String,
    pub account_number: u64,
    pub sequence: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub address: String,
    pub coins: Coins,
}

// ============================================================================
// STAKING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingParams {
    /// Unbonding and redelegation maturity, seconds
    pub unbonding_time: i64,
    pub max_validators: u32,
    pub max_entries: u32,
    pub historical_entries: u32,
    pub bond_denom: String,
}

impl Default for StakingParams {
    fn default() -> Self {
        Self {
            unbonding_time: 3 * 7 * 24 * 3600,
            max_validators: 100,
            max_entries: 7,
            historical_entries: 100,
            bond_denom: "stake".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub operator: String,
    /// Bonded tokens (shares map 1:1 to tokens)
    pub tokens: u64,
    pub commission_bps: u64,
    pub moniker: String,
}

impl Validator {
    /// Consensus power: one unit per million tokens.
    pub fn power(&self) -> i64 {
        (self.tokens / 1_000_000) as i64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    pub delegator: String,
    pub validator: String,
    pub shares: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbondingEntry {
    pub creation_height: u64,
    pub completion_time: i64,
    pub initial_balance: u64,
    pub balance: u64,
    pub unbonding_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbondingDelegation {
    pub delegator: String,
    pub validator: String,
    pub entries: Vec<UnbondingEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedelegationEntry {
    pub creation_height: u64,
    pub completion_time: i64,
    pub initial_balance: u64,
    pub shares_dst: u64,
    pub unbonding_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redelegation {
    pub delegator: String,
    pub validator_src: String,
    pub validator_dst: String,
    pub entries: Vec<RedelegationEntry>,
}

/// `(delegator, validator)` or `(delegator, src, dst)` pairs due at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub pairs: Vec<Vec<String>>,
}

/// Which record an unbonding id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnbondingType {
    UnbondingDelegation,
    Redelegation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalInfo {
    pub height: u64,
    pub time: i64,
    pub valset: Vec<ValidatorUpdate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorUpdate {
    pub operator: String,
    pub power: i64,
}

// ============================================================================
// DISTRIBUTION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionParams {
    pub community_tax_bps: u64,
}

impl Default for DistributionParams {
    fn default() -> Self {
        Self {
            community_tax_bps: 200,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePool {
    pub community_pool: Coins,
}

// ============================================================================
// MINT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Minter {
    /// Elapsed time accounted for so far, nanoseconds
    pub norm_time_passed: u64,
    pub total_minted: u64,
    /// Time of the last minting block, unix seconds
    pub prev_block_timestamp: i64,
    /// Annual inflation applied to the bonded-denom supply, bps
    pub annual_inflation_bps: u64,
}

impl Default for Minter {
    fn default() -> Self {
        Self {
            norm_time_passed: 0,
            total_minted: 0,
            prev_block_timestamp: 0,
            annual_inflation_bps: 700,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintParams {
    pub mint_denom: String,
    /// Cap on elapsed time minted for in a single block, nanoseconds
    pub max_mintable_nanoseconds: u64,
}

impl Default for MintParams {
    fn default() -> Self {
        Self {
            mint_denom: "stake".to_string(),
            max_mintable_nanoseconds: 60_000_000_000,
        }
    }
}

// ============================================================================
// GOV
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovParams {
    pub min_deposit: u64,
    /// Voting period, seconds
    pub voting_period: i64,
    pub deposit_denom: String,
}

impl Default for GovParams {
    fn default() -> Self {
        Self {
            min_deposit: 10_000_000,
            voting_period: 2 * 24 * 3600,
            deposit_denom: "stake".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalStatus {
    VotingPeriod,
    Passed,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: u64,
    pub proposer: String,
    pub title: String,
    pub deposit: u64,
    pub submit_time: i64,
    pub voting_end_time: i64,
    pub status: ProposalStatus,
    /// Final tally (yes, no, abstain), set when voting ends
    pub final_tally: Option<[u64; 3]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteOption {
    Yes,
    No,
    Abstain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub proposal_id: u64,
    pub voter: String,
    pub option: VoteOption,
}

// ============================================================================
// TAX
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxParams {
    /// Tax charged on sends, bps of the sent amount
    pub tax_rate_bps: u64,
    /// Maximum tax per send, per denom unit
    pub tax_cap: u64,
}

impl Default for TaxParams {
    fn default() -> Self {
        Self {
            tax_rate_bps: 30,
            tax_cap: 1_000_000,
        }
    }
}

impl TaxParams {
    pub fn tax_for(&self, amount: u64) -> u64 {
        let tax = (amount as u128 * self.tax_rate_bps as u128 / BPS as u128) as u64;
        tax.min(self.tax_cap)
    }
}

// ============================================================================
// WASM
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeInfo {
    pub code_id: u64,
    pub creator: String,
    /// blake3 of the code bytes, hex
    pub code_hash: String,
    /// Code bytes, hex
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractInfo {
    pub address: String,
    pub code_id: u64,
    pub creator: String,
    pub label: String,
    pub created_height: u64,
}

/// Contract state entry, exported alongside its contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractModel {
    /// Hex-encoded state key
    pub key: String,
    /// Hex-encoded state value
    pub value: String,
}

/// Per-block contract transaction counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxCounter {
    pub height: u64,
    pub counter: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tax_is_capped() {
        let params = TaxParams {
            tax_rate_bps: 100,
            tax_cap: 50,
        };
        assert_eq!(params.tax_for(1_000), 10);
        assert_eq!(params.tax_for(1_000_000), 50);
        assert_eq!(params.tax_for(0), 0);
    }

    #[test]
    fn test_validator_power() {
        let validator = Validator {
            operator: "v".to_string(),
            tokens: 5_500_000,
            commission_bps: 0,
            moniker: String::new(),
        };
        assert_eq!(validator.power(), 5);
    }
}
