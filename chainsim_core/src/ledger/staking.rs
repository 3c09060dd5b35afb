//! Validators, delegations and time-queued unbonding.

use super::keys::{self, queue_key, queue_key_time};
use super::types::{
    Delegation, HistoricalInfo, QueueEntry, Redelegation, RedelegationEntry, StakingParams,
    UnbondingDelegation, UnbondingEntry, UnbondingType, Validator, ValidatorUpdate,
};
use super::{AppError, LedgerApp};
use std::collections::BTreeMap;

impl LedgerApp {
    pub fn staking_params(&self) -> Result<StakingParams, AppError> {
        self.read(keys::STAKING, keys::staking::PARAMS)?
            .ok_or_else(|| AppError::not_found("staking params"))
    }

    pub fn validator(&self, operator: &str) -> Result<Option<Validator>, AppError> {
        self.read(keys::STAKING, &keys::validator_key(operator))
    }

    pub fn validators(&self) -> Result<Vec<Validator>, AppError> {
        Ok(self
            .scan::<Validator>(keys::STAKING, &[keys::staking::VALIDATOR])?
            .into_iter()
            .map(|(_, v)| v)
            .collect())
    }

    pub(crate) fn set_validator(&mut self, validator: &Validator) -> Result<(), AppError> {
        self.write(keys::STAKING, keys::validator_key(&validator.operator), validator)
    }

    pub fn delegation(&self, delegator: &str, validator: &str) -> Result<Option<Delegation>, AppError> {
        self.read(keys::STAKING, &keys::delegation_key(delegator, validator))
    }

    pub fn delegations_of(&self, delegator: &str) -> Result<Vec<Delegation>, AppError> {
        Ok(self
            .scan::<Delegation>(keys::STAKING, &keys::delegations_prefix(delegator))?
            .into_iter()
            .map(|(_, d)| d)
            .collect())
    }

    pub fn all_delegations(&self) -> Result<Vec<Delegation>, AppError> {
        Ok(self
            .scan::<Delegation>(keys::STAKING, &[keys::staking::DELEGATION])?
            .into_iter()
            .map(|(_, d)| d)
            .collect())
    }

    pub(crate) fn set_delegation(&mut self, delegation: &Delegation) -> Result<(), AppError> {
        let key = keys::delegation_key(&delegation.delegator, &delegation.validator);
        if delegation.shares == 0 {
            self.remove(keys::STAKING, &key)
        } else {
            self.write(keys::STAKING, key, delegation)
        }
    }

    pub fn unbonding_delegations(&self) -> Result<Vec<UnbondingDelegation>, AppError> {
        Ok(self
            .scan::<UnbondingDelegation>(keys::STAKING, &[keys::staking::UNBONDING_DELEGATION])?
            .into_iter()
            .map(|(_, u)| u)
            .collect())
    }

    pub fn redelegations(&self) -> Result<Vec<Redelegation>, AppError> {
        Ok(self
            .scan::<Redelegation>(keys::STAKING, &[keys::staking::REDELEGATION])?
            .into_iter()
            .map(|(_, r)| r)
            .collect())
    }

    pub(crate) fn set_unbonding_delegation(&mut self, ubd: &UnbondingDelegation) -> Result<(), AppError> {
        let key = keys::unbonding_delegation_key(&ubd.delegator, &ubd.validator);
        if ubd.entries.is_empty() {
            self.remove(keys::STAKING, &key)
        } else {
            self.write(keys::STAKING, key, ubd)
        }
    }

    pub(crate) fn set_redelegation(&mut self, red: &Redelegation) -> Result<(), AppError> {
        let key = keys::redelegation_key(&red.delegator, &red.validator_src, &red.validator_dst);
        if red.entries.is_empty() {
            self.remove(keys::STAKING, &key)
        } else {
            self.write(keys::STAKING, key, red)
        }
    }

    pub(crate) fn last_validator_powers(&self) -> Result<Vec<(String, i64)>, AppError> {
        let mut powers = Vec::new();
        for (key, power) in self.scan::<i64>(keys::STAKING, &[keys::staking::LAST_VALIDATOR_POWER])? {
            if let Some(parts) = keys::split_parts(&key) {
                if let [operator] = parts.as_slice() {
                    powers.push((String::from_utf8_lossy(operator).into_owned(), power));
                }
            }
        }
        Ok(powers)
    }

    pub(crate) fn last_total_power(&self) -> Result<i64, AppError> {
        Ok(self
            .read(keys::STAKING, keys::staking::LAST_TOTAL_POWER)?
            .unwrap_or(0))
    }

    // ------------------------------------------------------------------------
    // Unbonding ids and queues
    // ------------------------------------------------------------------------

    /// Allocates the next unbonding id and records what it belongs to.
    pub(crate) fn new_unbonding_id(&mut self, kind: UnbondingType, record_key: &[u8]) -> Result<u64, AppError> {
        let last: u64 = self
            .read(keys::STAKING, keys::staking::UNBONDING_ID)?
            .unwrap_or(0);
        let id = last + 1;
        self.write(keys::STAKING, keys::staking::UNBONDING_ID.to_vec(), &id)?;
        self.store_mut()
            .set(keys::STAKING, keys::unbonding_index_key(id), record_key.to_vec())?;
        self.write(keys::STAKING, keys::unbonding_type_key(id), &kind)?;
        Ok(id)
    }

    fn release_unbonding_id(&mut self, id: u64) -> Result<(), AppError> {
        self.remove(keys::STAKING, &keys::unbonding_index_key(id))?;
        self.remove(keys::STAKING, &keys::unbonding_type_key(id))
    }

    pub(crate) fn push_queue(&mut self, prefix: u8, time: i64, pair: Vec<String>) -> Result<(), AppError> {
        let key = queue_key(prefix, time);
        let mut entry: QueueEntry = self.read(keys::STAKING, &key)?.unwrap_or_default();
        if !entry.pairs.contains(&pair) {
            entry.pairs.push(pair);
        }
        self.write(keys::STAKING, key, &entry)
    }

    /// Removes and returns every queue slot due at or before `now`.
    fn pop_due(&mut self, prefix: u8, now: i64) -> Result<Vec<QueueEntry>, AppError> {
        let mut due = Vec::new();
        for (key, entry) in self.scan::<QueueEntry>(keys::STAKING, &[prefix])? {
            match queue_key_time(&key) {
                Some(time) if time <= now => {
                    self.remove(keys::STAKING, &key)?;
                    due.push(entry);
                }
                _ => break,
            }
        }
        Ok(due)
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    pub(crate) fn handle_delegate(&mut self, delegator: &str, operator: &str, amount: u64) -> Result<(), AppError> {
        if amount == 0 {
            return Err(AppError::invalid("delegation amount must be positive"));
        }
        let mut validator = self
            .validator(operator)?
            .ok_or_else(|| AppError::not_found(format!("validator {}", operator)))?;
        let bond_denom = self.staking_params()?.bond_denom;
        self.send_coins(delegator, keys::BONDED_POOL, &bond_denom, amount)?;

        validator.tokens += amount;
        self.set_validator(&validator)?;

        let mut delegation = self.delegation(delegator, operator)?.unwrap_or(Delegation {
            delegator: delegator.to_string(),
            validator: operator.to_string(),
            shares: 0,
        });
        delegation.shares += amount;
        self.set_delegation(&delegation)
    }

    fn unbond(&mut self, delegator: &str, operator: &str, amount: u64) -> Result<Validator, AppError> {
        if amount == 0 {
            return Err(AppError::invalid("amount must be positive"));
        }
        let mut delegation = self
            .delegation(delegator, operator)?
            .ok_or_else(|| AppError::not_found(format!("delegation {} → {}", delegator, operator)))?;
        if delegation.shares < amount {
            return Err(AppError::invalid(format!(
                "insufficient shares: {} < {}",
                delegation.shares, amount
            )));
        }
        let mut validator = self
            .validator(operator)?
            .ok_or_else(|| AppError::not_found(format!("validator {}", operator)))?;

        delegation.shares -= amount;
        self.set_delegation(&delegation)?;
        validator.tokens -= amount;
        self.set_validator(&validator)?;
        Ok(validator)
    }

    pub(crate) fn handle_undelegate(&mut self, delegator: &str, operator: &str, amount: u64) -> Result<(), AppError> {
        let params = self.staking_params()?;
        let header = self.header()?.clone();

        let mut ubd = self
            .read::<UnbondingDelegation>(keys::STAKING, &keys::unbonding_delegation_key(delegator, operator))?
            .unwrap_or(UnbondingDelegation {
                delegator: delegator.to_string(),
                validator: operator.to_string(),
                entries: Vec::new(),
            });
        if ubd.entries.len() >= params.max_entries as usize {
            return Err(AppError::invalid("too many unbonding entries"));
        }

        self.unbond(delegator, operator, amount)?;
        self.send_coins(keys::BONDED_POOL, keys::NOT_BONDED_POOL, &params.bond_denom, amount)?;

        let completion_time = header.time + params.unbonding_time;
        let record_key = keys::unbonding_delegation_key(delegator, operator);
        let id = self.new_unbonding_id(UnbondingType::UnbondingDelegation, &record_key)?;
        ubd.entries.push(UnbondingEntry {
            creation_height: header.height,
            completion_time,
            initial_balance: amount,
            balance: amount,
            unbonding_id: id,
        });
        self.set_unbonding_delegation(&ubd)?;
        self.push_queue(
            keys::staking::UNBONDING_QUEUE,
            completion_time,
            vec![delegator.to_string(), operator.to_string()],
        )
    }

    pub(crate) fn handle_redelegate(
        &mut self,
        delegator: &str,
        src: &str,
        dst: &str,
        amount: u64,
    ) -> Result<(), AppError> {
        if src == dst {
            return Err(AppError::invalid("cannot redelegate to the same validator"));
        }
        let params = self.staking_params()?;
        let header = self.header()?.clone();
        let mut dst_validator = self
            .validator(dst)?
            .ok_or_else(|| AppError::not_found(format!("validator {}", dst)))?;

        let record_key = keys::redelegation_key(delegator, src, dst);
        let mut red = self
            .read::<Redelegation>(keys::STAKING, &record_key)?
            .unwrap_or(Redelegation {
                delegator: delegator.to_string(),
                validator_src: src.to_string(),
                validator_dst: dst.to_string(),
                entries: Vec::new(),
            });
        if red.entries.len() >= params.max_entries as usize {
            return Err(AppError::invalid("too many redelegation entries"));
        }

        self.unbond(delegator, src, amount)?;
        dst_validator.tokens += amount;
        self.set_validator(&dst_validator)?;
        let mut delegation = self.delegation(delegator, dst)?.unwrap_or(Delegation {
            delegator: delegator.to_string(),
            validator: dst.to_string(),
            shares: 0,
        });
        delegation.shares += amount;
        self.set_delegation(&delegation)?;

        let completion_time = header.time + params.unbonding_time;
        let id = self.new_unbonding_id(UnbondingType::Redelegation, &record_key)?;
        red.entries.push(RedelegationEntry {
            creation_height: header.height,
            completion_time,
            initial_balance: amount,
            shares_dst: amount,
            unbonding_id: id,
        });
        self.set_redelegation(&red)?;
        self.push_queue(
            keys::staking::REDELEGATION_QUEUE,
            completion_time,
            vec![delegator.to_string(), src.to_string(), dst.to_string()],
        )
    }

    // ------------------------------------------------------------------------
    // End block
    // ------------------------------------------------------------------------

    /// Pays out matured unbonding entries from the not-bonded pool.
    pub(crate) fn complete_unbondings(&mut self, now: i64) -> Result<(), AppError> {
        let bond_denom = self.staking_params()?.bond_denom;
        for entry in self.pop_due(keys::staking::UNBONDING_QUEUE, now)? {
            for pair in entry.pairs {
                let [delegator, validator] = pair.as_slice() else {
                    continue;
                };
                let key = keys::unbonding_delegation_key(delegator, validator);
                let Some(mut ubd) = self.read::<UnbondingDelegation>(keys::STAKING, &key)? else {
                    continue;
                };
                let (matured, pending): (Vec<_>, Vec<_>) =
                    ubd.entries.into_iter().partition(|e| e.completion_time <= now);
                for e in &matured {
                    self.send_coins(keys::NOT_BONDED_POOL, delegator, &bond_denom, e.balance)?;
                    self.release_unbonding_id(e.unbonding_id)?;
                }
                ubd.entries = pending;
                self.set_unbonding_delegation(&ubd)?;
            }
        }
        Ok(())
    }

    pub(crate) fn complete_redelegations(&mut self, now: i64) -> Result<(), AppError> {
        for entry in self.pop_due(keys::staking::REDELEGATION_QUEUE, now)? {
            for pair in entry.pairs {
                let [delegator, src, dst] = pair.as_slice() else {
                    continue;
                };
                let key = keys::redelegation_key(delegator, src, dst);
                let Some(mut red) = self.read::<Redelegation>(keys::STAKING, &key)? else {
                    continue;
                };
                let (matured, pending): (Vec<_>, Vec<_>) =
                    red.entries.into_iter().partition(|e| e.completion_time <= now);
                for e in &matured {
                    self.release_unbonding_id(e.unbonding_id)?;
                }
                red.entries = pending;
                self.set_redelegation(&red)?;
            }
        }
        Ok(())
    }

    /// Records the bonded validator set at `height`, pruning old entries.
    pub(crate) fn track_historical_info(&mut self, height: u64, time: i64) -> Result<(), AppError> {
        let entries = self.staking_params()?.historical_entries as u64;
        if height > entries {
            self.remove(keys::STAKING, &keys::historical_info_key(height - entries))?;
        }
        if entries == 0 {
            return Ok(());
        }
        let valset = self
            .validators()?
            .into_iter()
            .filter(|v| v.power() > 0)
            .map(|v| ValidatorUpdate {
                power: v.power(),
                operator: v.operator,
            })
            .collect();
        self.write(
            keys::STAKING,
            keys::historical_info_key(height),
            &HistoricalInfo { height, time, valset },
        )
    }

    /// Diffs current validator power against the last recorded power.
    pub(crate) fn apply_validator_updates(&mut self) -> Result<Vec<ValidatorUpdate>, AppError> {
        let max_validators = self.staking_params()?.max_validators as usize;
        let mut last: BTreeMap<String, i64> = self.last_validator_powers()?.into_iter().collect();

        let mut ranked: Vec<Validator> = self.validators()?.into_iter().filter(|v| v.power() > 0).collect();
        ranked.sort_by(|a, b| b.tokens.cmp(&a.tokens).then_with(|| a.operator.cmp(&b.operator)));
        ranked.truncate(max_validators);

        let mut updates = Vec::new();
        let mut total_power = 0i64;
        for validator in &ranked {
            let power = validator.power();
            total_power += power;
            if last.remove(&validator.operator) != Some(power) {
                self.write(
                    keys::STAKING,
                    keys::last_validator_power_key(&validator.operator),
                    &power,
                )?;
                updates.push(ValidatorUpdate {
                    operator: validator.operator.clone(),
                    power,
                });
            }
        }
        for (operator, _) in last {
            self.remove(keys::STAKING, &keys::last_validator_power_key(&operator))?;
            updates.push(ValidatorUpdate { operator, power: 0 });
        }

        self.write(keys::STAKING, keys::staking::LAST_TOTAL_POWER.to_vec(), &total_power)?;
        self.write(keys::STAKING, keys::staking::VALIDATOR_UPDATES.to_vec(), &updates)?;
        Ok(updates)
    }
}
