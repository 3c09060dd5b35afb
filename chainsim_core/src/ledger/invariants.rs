//! Cross-module accounting invariants.

use super::keys;
use super::types::{Coins, ProposalStatus};
use super::{AppError, LedgerApp};

/// Registered invariant routes, checked in this order.
pub const INVARIANT_ROUTES: &[&str] = &[
    "bank/total-supply",
    "staking/bonded-tokens",
    "staking/delegator-shares",
    "staking/not-bonded-tokens",
    "distribution/module-balance",
    "gov/deposits",
];

impl LedgerApp {
    /// Checks every invariant against the working state.
    pub fn check_invariants(&self) -> Result<(), AppError> {
        self.check_total_supply()?;
        self.check_bonded_tokens()?;
        self.check_delegator_shares()?;
        self.check_not_bonded_tokens()?;
        self.check_distribution_balance()?;
        self.check_gov_deposits()
    }

    fn broken(route: &str, msg: String) -> AppError {
        AppError::InvariantBroken(format!("{}: {}", route, msg))
    }

    fn check_total_supply(&self) -> Result<(), AppError> {
        let mut sums = Coins::new();
        for balance in self.all_balances()? {
            for (denom, amount) in balance.coins {
                *sums.entry(denom).or_insert(0) += amount;
            }
        }
        let supply = self.total_supply()?;
        if sums != supply {
            return Err(Self::broken(
                INVARIANT_ROUTES[0],
                format!("sum of balances {:?} != supply {:?}", sums, supply),
            ));
        }
        Ok(())
    }

    fn check_bonded_tokens(&self) -> Result<(), AppError> {
        let denom = self.staking_params()?.bond_denom;
        let pool = self.balance(keys::BONDED_POOL, &denom)?;
        let tokens: u64 = self.validators()?.iter().map(|v| v.tokens).sum();
        if pool != tokens {
            return Err(Self::broken(
                INVARIANT_ROUTES[1],
                format!("bonded pool {} != validator tokens {}", pool, tokens),
            ));
        }
        Ok(())
    }

    fn check_delegator_shares(&self) -> Result<(), AppError> {
        let delegations = self.all_delegations()?;
        for validator in self.validators()? {
            let shares: u64 = delegations
                .iter()
                .filter(|d| d.validator == validator.operator)
                .map(|d| d.shares)
                .sum();
            if shares != validator.tokens {
                return Err(Self::broken(
                    INVARIANT_ROUTES[2],
                    format!(
                        "validator {} tokens {} != delegated shares {}",
                        validator.operator, validator.tokens, shares
                    ),
                ));
            }
        }
        Ok(())
    }

    fn check_not_bonded_tokens(&self) -> Result<(), AppError> {
        let denom = self.staking_params()?.bond_denom;
        let pool = self.balance(keys::NOT_BONDED_POOL, &denom)?;
        let pending: u64 = self
            .unbonding_delegations()?
            .iter()
            .flat_map(|u| u.entries.iter())
            .map(|e| e.balance)
            .sum();
        if pool != pending {
            return Err(Self::broken(
                INVARIANT_ROUTES[3],
                format!("not-bonded pool {} != pending unbonding {}", pool, pending),
            ));
        }
        Ok(())
    }

    fn check_distribution_balance(&self) -> Result<(), AppError> {
        let mut expected = self.fee_pool()?.community_pool;
        let denom = self.staking_params()?.bond_denom;
        let rewards: u64 = self.outstanding_rewards()?.iter().map(|(_, r)| r).sum();
        if rewards > 0 {
            *expected.entry(denom).or_insert(0) += rewards;
        }
        expected.retain(|_, amount| *amount > 0);

        let held = self.balances(keys::DISTRIBUTION_ACCOUNT)?;
        if held != expected {
            return Err(Self::broken(
                INVARIANT_ROUTES[4],
                format!("module holds {:?}, owes {:?}", held, expected),
            ));
        }
        Ok(())
    }

    fn check_gov_deposits(&self) -> Result<(), AppError> {
        let denom = self.gov_params()?.deposit_denom;
        let held = self.balance(keys::GOV_ACCOUNT, &denom)?;
        let deposits: u64 = self
            .proposals()?
            .iter()
            .filter(|p| p.status == ProposalStatus::VotingPeriod)
            .map(|p| p.deposit)
            .sum();
        if held != deposits {
            return Err(Self::broken(
                INVARIANT_ROUTES[5],
                format!("gov holds {}, active deposits {}", held, deposits),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::AppError;

    #[test]
    fn test_fixture_satisfies_invariants() {
        let app = started_app();
        app.check_invariants().unwrap();
    }

    #[test]
    fn test_supply_mismatch_detected() {
        let mut app = started_app();
        app.set_supply("ucoin", 1).unwrap();
        let err = app.check_invariants().unwrap_err();
        assert!(matches!(err, AppError::InvariantBroken(ref msg) if msg.starts_with("bank/total-supply")));
    }

    #[test]
    fn test_bonded_pool_mismatch_detected() {
        let mut app = started_app();
        let mut validator = app.validator(VAL1).unwrap().unwrap();
        validator.tokens += 1;
        app.set_validator(&validator).unwrap();
        let err = app.check_invariants().unwrap_err();
        assert!(err.to_string().contains("staking/bonded-tokens"));
    }
}
