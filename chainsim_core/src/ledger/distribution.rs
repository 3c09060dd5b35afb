//! Block provisions, fee distribution and send tax accounting.

use super::keys;
use super::types::{DistributionParams, FeePool, MintParams, Minter, TaxParams, BPS, NANOS_PER_YEAR};
use super::{AppError, LedgerApp};
use tracing::trace;

impl LedgerApp {
    pub fn minter(&self) -> Result<Minter, AppError> {
        self.read(keys::MINT, keys::mint::MINTER)?
            .ok_or_else(|| AppError::not_found("minter"))
    }

    pub fn mint_params(&self) -> Result<MintParams, AppError> {
        self.read(keys::MINT, keys::mint::PARAMS)?
            .ok_or_else(|| AppError::not_found("mint params"))
    }

    pub fn distribution_params(&self) -> Result<DistributionParams, AppError> {
        self.read(keys::DISTRIBUTION, keys::distribution::PARAMS)?
            .ok_or_else(|| AppError::not_found("distribution params"))
    }

    pub fn fee_pool(&self) -> Result<FeePool, AppError> {
        Ok(self
            .read(keys::DISTRIBUTION, keys::distribution::FEE_POOL)?
            .unwrap_or_default())
    }

    pub fn tax_params(&self) -> Result<TaxParams, AppError> {
        self.read(keys::TAX, keys::tax::PARAMS)?
            .ok_or_else(|| AppError::not_found("tax params"))
    }

    pub fn outstanding_rewards(&self) -> Result<Vec<(String, u64)>, AppError> {
        let mut rewards = Vec::new();
        for (key, amount) in self.scan::<u64>(keys::DISTRIBUTION, &[keys::distribution::OUTSTANDING_REWARDS])? {
            if let Some(parts) = keys::split_parts(&key) {
                if let [validator] = parts.as_slice() {
                    rewards.push((String::from_utf8_lossy(validator).into_owned(), amount));
                }
            }
        }
        Ok(rewards)
    }

    pub(crate) fn previous_proposer(&self) -> Result<Option<String>, AppError> {
        self.read(keys::DISTRIBUTION, keys::distribution::PREVIOUS_PROPOSER)
    }

    pub(crate) fn tax_collected(&self) -> Result<Vec<(String, u64)>, AppError> {
        let mut totals = Vec::new();
        for (key, amount) in self.scan::<u64>(keys::TAX, &[keys::tax::TOTAL_COLLECTED])? {
            if let Some(parts) = keys::split_parts(&key) {
                if let [denom] = parts.as_slice() {
                    totals.push((String::from_utf8_lossy(denom).into_owned(), amount));
                }
            }
        }
        Ok(totals)
    }

    pub(crate) fn record_tax(&mut self, denom: &str, amount: u64) -> Result<(), AppError> {
        if amount == 0 {
            return Ok(());
        }
        let key = keys::tax_collected_key(denom);
        let total: u64 = self.read(keys::TAX, &key)?.unwrap_or(0);
        self.write(keys::TAX, key, &(total + amount))
    }

    /// Mints the provision for the time elapsed since the previous block.
    ///
    /// Elapsed time is capped by `max_mintable_nanoseconds`; the first block
    /// only records its timestamp.
    pub(crate) fn mint_block_provision(&mut self) -> Result<(), AppError> {
        let now = self.header()?.time;
        let params = self.mint_params()?;
        let mut minter = self.minter()?;

        if minter.prev_block_timestamp == 0 {
            minter.prev_block_timestamp = now;
            return self.write(keys::MINT, keys::mint::MINTER.to_vec(), &minter);
        }

        let elapsed_secs = (now - minter.prev_block_timestamp).max(0) as u64;
        let elapsed = elapsed_secs
            .saturating_mul(1_000_000_000)
            .min(params.max_mintable_nanoseconds);
        let supply = self.supply(&params.mint_denom)? as u128;
        let provision = (supply * minter.annual_inflation_bps as u128 * elapsed as u128
            / (BPS as u128 * NANOS_PER_YEAR)) as u64;

        self.mint_coins(keys::MINT_ACCOUNT, &params.mint_denom, provision)?;
        self.send_coins(keys::MINT_ACCOUNT, keys::FEE_COLLECTOR, &params.mint_denom, provision)?;

        minter.norm_time_passed = minter.norm_time_passed.saturating_add(elapsed);
        minter.total_minted = minter.total_minted.saturating_add(provision);
        minter.prev_block_timestamp = now;
        trace!(provision, elapsed, "minted block provision");
        self.write(keys::MINT, keys::mint::MINTER.to_vec(), &minter)
    }

    /// Moves collected fees to the distribution account, splitting them
    /// between the community pool and the previous proposer's rewards.
    pub(crate) fn allocate_fees(&mut self) -> Result<(), AppError> {
        let proposer = self.header()?.proposer.clone();
        let params = self.distribution_params()?;
        let previous = self.previous_proposer()?;
        let rewarded = match previous {
            Some(p) => self.validator(&p)?.map(|_| p),
            None => None,
        };

        let mut pool = self.fee_pool()?;
        for (denom, amount) in self.balances(keys::FEE_COLLECTOR)? {
            self.send_coins(keys::FEE_COLLECTOR, keys::DISTRIBUTION_ACCOUNT, &denom, amount)?;
            let community = match &rewarded {
                Some(_) => (amount as u128 * params.community_tax_bps as u128 / BPS as u128) as u64,
                None => amount,
            };
            *pool.community_pool.entry(denom.clone()).or_insert(0) += community;

            if let Some(validator) = &rewarded {
                let key = keys::outstanding_rewards_key(validator);
                let current: u64 = self.read(keys::DISTRIBUTION, &key)?.unwrap_or(0);
                self.write(keys::DISTRIBUTION, key, &(current + amount - community))?;
            }
        }
        self.write(keys::DISTRIBUTION, keys::distribution::FEE_POOL.to_vec(), &pool)?;
        self.write(keys::DISTRIBUTION, keys::distribution::PREVIOUS_PROPOSER.to_vec(), &proposer)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{keys, Operation};

    #[test]
    fn test_minting_is_capped_per_block() {
        let mut app = started_app();
        let supply_before = app.supply("stake").unwrap();

        // 10 minutes elapsed, capped at 60s of provisions
        run_block(&mut app, 1_600, &[]);
        let minted = app.minter().unwrap();
        assert_eq!(minted.norm_time_passed, 60_000_000_000);
        assert_eq!(minted.prev_block_timestamp, 1_600);
        assert_eq!(app.supply("stake").unwrap(), supply_before + minted.total_minted);
    }

    #[test]
    fn test_fees_split_between_community_and_proposer() {
        let mut app = started_app();
        run_block(
            &mut app,
            1_001,
            &[Operation::Send {
                from: ALICE.to_string(),
                to: BOB.to_string(),
                denom: "ucoin".to_string(),
                amount: 10,
                fee: 10_000,
            }],
        );
        run_block(&mut app, 1_002, &[]);

        let pool = app.fee_pool().unwrap();
        let rewards = app.outstanding_rewards().unwrap();
        let community = pool.community_pool.get("stake").copied().unwrap_or(0);
        let rewarded: u64 = rewards.iter().map(|(_, r)| r).sum();
        assert!(rewards.iter().all(|(v, _)| v == VAL1));
        assert!(community >= 200);
        assert_eq!(
            app.balance(keys::DISTRIBUTION_ACCOUNT, "stake").unwrap(),
            community + rewarded
        );
        assert_eq!(app.balance(keys::FEE_COLLECTOR, "stake").unwrap(), 0);
    }
}
