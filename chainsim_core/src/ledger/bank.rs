//! Accounts, balances and supply.

use super::keys::{self, split_parts};
use super::types::{Account, Balance, Coins};
use super::{AppError, LedgerApp};
use std::collections::BTreeMap;

impl LedgerApp {
    pub fn account(&self, address: &str) -> Result<Option<Account>, AppError> {
        self.read(keys::ACC, &keys::account_key(address))
    }

    pub fn accounts(&self) -> Result<Vec<Account>, AppError> {
        Ok(self
            .scan::<Account>(keys::ACC, &[keys::acc::ACCOUNT])?
            .into_iter()
            .map(|(_, account)| account)
            .collect())
    }

    pub(crate) fn set_account(&mut self, account: &Account) -> Result<(), AppError> {
        self.write(keys::ACC, keys::account_key(&account.address), account)
    }

    pub(crate) fn next_account_number(&self) -> Result<u64, AppError> {
        Ok(self
            .read(keys::ACC, keys::acc::NEXT_ACCOUNT_NUMBER)?
            .unwrap_or(0))
    }

    /// Creates an account without a public key if `address` has none.
    pub(crate) fn ensure_account(&mut self, address: &str) -> Result<(), AppError> {
        if self.account(address)?.is_some() {
            return Ok(());
        }
        let number = self.next_account_number()?;
        self.set_account(&Account {
            address: address.to_string(),
            pub_key: String::new(),
            account_number: number,
            sequence: 0,
        })?;
        self.write(keys::ACC, keys::acc::NEXT_ACCOUNT_NUMBER.to_vec(), &(number + 1))
    }

    pub(crate) fn increment_sequence(&mut self, address: &str) -> Result<(), AppError> {
        let mut account = self
            .account(address)?
            .ok_or_else(|| AppError::not_found(format!("account {}", address)))?;
        account.sequence += 1;
        self.set_account(&account)
    }

    // ------------------------------------------------------------------------
    // Balances
    // ------------------------------------------------------------------------

    pub fn balance(&self, address: &str, denom: &str) -> Result<u64, AppError> {
        Ok(self
            .read(keys::BANK, &keys::balance_key(address, denom))?
            .unwrap_or(0))
    }

    pub fn balances(&self, address: &str) -> Result<Coins, AppError> {
        let mut coins = Coins::new();
        for (key, amount) in self.scan::<u64>(keys::BANK, &keys::balances_prefix(address))? {
            if let Some(parts) = split_parts(&key) {
                if let [_, denom] = parts.as_slice() {
                    coins.insert(String::from_utf8_lossy(denom).into_owned(), amount);
                }
            }
        }
        Ok(coins)
    }

    /// Every non-zero balance, grouped by holder.
    pub fn all_balances(&self) -> Result<Vec<Balance>, AppError> {
        let mut grouped: BTreeMap<String, Coins> = BTreeMap::new();
        for (key, amount) in self.scan::<u64>(keys::BANK, &[keys::bank::BALANCES])? {
            let parts = split_parts(&key)
                .ok_or_else(|| AppError::CodecError(format!("malformed balance key {}", hex::encode(&key))))?;
            if let [address, denom] = parts.as_slice() {
                grouped
                    .entry(String::from_utf8_lossy(address).into_owned())
                    .or_default()
                    .insert(String::from_utf8_lossy(denom).into_owned(), amount);
            }
        }
        Ok(grouped
            .into_iter()
            .map(|(address, coins)| Balance { address, coins })
            .collect())
    }

    pub(crate) fn set_balance(&mut self, address: &str, denom: &str, amount: u64) -> Result<(), AppError> {
        let index_key = keys::denom_index_key(denom, address);
        if amount == 0 {
            self.remove(keys::BANK, &keys::balance_key(address, denom))?;
            self.remove(keys::BANK, &index_key)?;
        } else {
            self.write(keys::BANK, keys::balance_key(address, denom), &amount)?;
            self.store_mut().set(keys::BANK, index_key, vec![0])?;
        }
        Ok(())
    }

    fn sub_balance(&mut self, address: &str, denom: &str, amount: u64) -> Result<(), AppError> {
        let available = self.balance(address, denom)?;
        if available < amount {
            return Err(AppError::InsufficientFunds {
                address: address.to_string(),
                denom: denom.to_string(),
                available,
                required: amount,
            });
        }
        self.set_balance(address, denom, available - amount)
    }

    fn add_balance(&mut self, address: &str, denom: &str, amount: u64) -> Result<(), AppError> {
        let current = self.balance(address, denom)?;
        let updated = current
            .checked_add(amount)
            .ok_or_else(|| AppError::invalid(format!("balance overflow for {}", address)))?;
        self.set_balance(address, denom, updated)
    }

    /// Moves `amount` of `denom`, creating the recipient account if needed.
    pub(crate) fn send_coins(&mut self, from: &str, to: &str, denom: &str, amount: u64) -> Result<(), AppError> {
        if amount == 0 {
            return Ok(());
        }
        self.sub_balance(from, denom, amount)?;
        self.ensure_account(to)?;
        self.add_balance(to, denom, amount)
    }

    // ------------------------------------------------------------------------
    // Supply
    // ------------------------------------------------------------------------

    pub fn supply(&self, denom: &str) -> Result<u64, AppError> {
        Ok(self.read(keys::BANK, &keys::supply_key(denom))?.unwrap_or(0))
    }

    pub fn total_supply(&self) -> Result<Coins, AppError> {
        let mut supply = Coins::new();
        for (key, amount) in self.scan::<u64>(keys::BANK, &[keys::bank::SUPPLY])? {
            if let Some(parts) = split_parts(&key) {
                if let [denom] = parts.as_slice() {
                    supply.insert(String::from_utf8_lossy(denom).into_owned(), amount);
                }
            }
        }
        Ok(supply)
    }

    pub(crate) fn set_supply(&mut self, denom: &str, amount: u64) -> Result<(), AppError> {
        if amount == 0 {
            self.remove(keys::BANK, &keys::supply_key(denom))
        } else {
            self.write(keys::BANK, keys::supply_key(denom), &amount)
        }
    }

    pub(crate) fn mint_coins(&mut self, module: &str, denom: &str, amount: u64) -> Result<(), AppError> {
        if amount == 0 {
            return Ok(());
        }
        self.ensure_account(module)?;
        self.add_balance(module, denom, amount)?;
        let supply = self.supply(denom)?;
        self.set_supply(denom, supply.saturating_add(amount))
    }

    pub(crate) fn burn_coins(&mut self, module: &str, denom: &str, amount: u64) -> Result<(), AppError> {
        if amount == 0 {
            return Ok(());
        }
        self.sub_balance(module, denom, amount)?;
        let supply = self.supply(denom)?;
        self.set_supply(denom, supply.saturating_sub(amount))
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// Transfer with a fee to the fee collector and a capped tax to the treasury.
    pub(crate) fn handle_send(&mut self, from: &str, to: &str, denom: &str, amount: u64, fee: u64) -> Result<(), AppError> {
        if amount == 0 {
            return Err(AppError::invalid("send amount must be positive"));
        }
        if from == to {
            return Err(AppError::invalid("sender and recipient are the same"));
        }
        let bond_denom = self.staking_params()?.bond_denom;
        self.send_coins(from, keys::FEE_COLLECTOR, &bond_denom, fee)?;

        let tax = self.tax_params()?.tax_for(amount);
        self.send_coins(from, keys::TREASURY, denom, tax)?;
        self.record_tax(denom, tax)?;

        self.send_coins(from, to, denom, amount)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{keys, Operation};

    #[test]
    fn test_send_charges_fee_and_tax() {
        let mut app = started_app();
        let alice_before = app.balance(ALICE, "ucoin").unwrap();

        run_block(
            &mut app,
            1_006,
            &[Operation::Send {
                from: ALICE.to_string(),
                to: "chainsim1carol".to_string(),
                denom: "ucoin".to_string(),
                amount: 100_000,
                fee: 7,
            }],
        );

        // default tax: 30 bps of 100_000
        assert_eq!(app.balance(keys::TREASURY, "ucoin").unwrap(), 300);
        assert_eq!(app.balance("chainsim1carol", "ucoin").unwrap(), 100_000);
        assert_eq!(app.balance(ALICE, "ucoin").unwrap(), alice_before - 100_300);
        assert_eq!(app.account(ALICE).unwrap().unwrap().sequence, 1);
        assert!(app.account("chainsim1carol").unwrap().is_some());
    }

    #[test]
    fn test_all_balances_groups_by_holder() {
        let app = started_app();
        let balances = app.all_balances().unwrap();
        let alice = balances.iter().find(|b| b.address == ALICE).unwrap();
        assert_eq!(alice.coins.len(), 2);
        assert_eq!(app.balances(ALICE).unwrap(), alice.coins);
    }
}
