//! Contract code storage, instantiation and execution.
//!
//! Contracts are modelled as counters: instantiation seeds a `count` entry,
//! execution adds to it.

use super::keys;
use super::types::{CodeInfo, ContractInfo, TxCounter};
use super::{AppError, LedgerApp};

/// State key every contract keeps its counter under.
pub(crate) const COUNT_KEY: &[u8] = b"count";

impl LedgerApp {
    pub fn code(&self, code_id: u64) -> Result<Option<CodeInfo>, AppError> {
        self.read(keys::WASM, &keys::code_key(code_id))
    }

    pub fn codes(&self) -> Result<Vec<CodeInfo>, AppError> {
        Ok(self
            .scan::<CodeInfo>(keys::WASM, &[keys::wasm::CODE])?
            .into_iter()
            .map(|(_, c)| c)
            .collect())
    }

    pub fn contract(&self, address: &str) -> Result<Option<ContractInfo>, AppError> {
        self.read(keys::WASM, &keys::contract_key(address))
    }

    pub fn contracts(&self) -> Result<Vec<ContractInfo>, AppError> {
        Ok(self
            .scan::<ContractInfo>(keys::WASM, &[keys::wasm::CONTRACT])?
            .into_iter()
            .map(|(_, c)| c)
            .collect())
    }

    /// Raw state entries of a contract, keyed by state key.
    pub fn contract_state(&self, address: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>, AppError> {
        let prefix = keys::contract_store_prefix(address);
        Ok(self
            .store
            .prefix_scan(keys::WASM, &prefix)?
            .into_iter()
            .filter_map(|(key, value)| {
                let parts = keys::split_parts(&key)?;
                match parts.as_slice() {
                    [_, state_key] => Some((state_key.clone(), value)),
                    _ => None,
                }
            })
            .collect())
    }

    pub fn contract_count(&self, address: &str) -> Result<Option<u64>, AppError> {
        self.read(keys::WASM, &keys::contract_store_key(address, COUNT_KEY))
    }

    pub(crate) fn sequence(&self, name: &str) -> Result<u64, AppError> {
        Ok(self.read(keys::WASM, &keys::sequence_key(name))?.unwrap_or(0))
    }

    pub(crate) fn set_sequence(&mut self, name: &str, value: u64) -> Result<(), AppError> {
        self.write(keys::WASM, keys::sequence_key(name), &value)
    }

    fn next_sequence(&mut self, name: &str) -> Result<u64, AppError> {
        let next = self.sequence(name)? + 1;
        self.set_sequence(name, next)?;
        Ok(next)
    }

    pub fn tx_counter(&self) -> Result<Option<TxCounter>, AppError> {
        self.read(keys::WASM, keys::wasm::TX_COUNTER)
    }

    pub(crate) fn reset_tx_counter(&mut self) -> Result<(), AppError> {
        let height = self.header()?.height;
        self.write(
            keys::WASM,
            keys::wasm::TX_COUNTER.to_vec(),
            &TxCounter { height, counter: 0 },
        )
    }

    fn bump_tx_counter(&mut self) -> Result<(), AppError> {
        let height = self.header()?.height;
        let mut counter = self
            .tx_counter()?
            .filter(|c| c.height == height)
            .unwrap_or(TxCounter { height, counter: 0 });
        counter.counter += 1;
        self.write(keys::WASM, keys::wasm::TX_COUNTER.to_vec(), &counter)
    }

    /// Deterministic contract address from code id and instance sequence.
    pub fn contract_address(code_id: u64, instance_id: u64) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"contract");
        hasher.update(&code_id.to_be_bytes());
        hasher.update(&instance_id.to_be_bytes());
        format!("wasm1{}", hex::encode(&hasher.finalize().as_bytes()[..20]))
    }

    pub(crate) fn handle_store_code(&mut self, creator: &str, code: &[u8]) -> Result<(), AppError> {
        if code.is_empty() {
            return Err(AppError::invalid("empty contract code"));
        }
        let code_id = self.next_sequence(keys::wasm::LAST_CODE_ID)?;
        self.write(
            keys::WASM,
            keys::code_key(code_id),
            &CodeInfo {
                code_id,
                creator: creator.to_string(),
                code_hash: blake3::hash(code).to_hex().to_string(),
                code: hex::encode(code),
            },
        )
    }

    pub(crate) fn handle_instantiate(
        &mut self,
        creator: &str,
        code_id: u64,
        label: &str,
        init_count: u64,
    ) -> Result<(), AppError> {
        if self.code(code_id)?.is_none() {
            return Err(AppError::not_found(format!("code {}", code_id)));
        }
        let height = self.header()?.height;
        let instance = self.next_sequence(keys::wasm::LAST_CONTRACT_ID)?;
        let address = Self::contract_address(code_id, instance);

        self.write(
            keys::WASM,
            keys::contract_key(&address),
            &ContractInfo {
                address: address.clone(),
                code_id,
                creator: creator.to_string(),
                label: label.to_string(),
                created_height: height,
            },
        )?;
        self.write(keys::WASM, keys::contract_store_key(&address, COUNT_KEY), &init_count)?;
        self.ensure_account(&address)?;
        self.bump_tx_counter()
    }

    pub(crate) fn handle_execute(&mut self, contract: &str, increment: u64) -> Result<(), AppError> {
        let count = self
            .contract_count(contract)?
            .ok_or_else(|| AppError::not_found(format!("contract {}", contract)))?;
        let updated = count
            .checked_add(increment)
            .ok_or_else(|| AppError::invalid("contract counter overflow"))?;
        self.write(keys::WASM, keys::contract_store_key(contract, COUNT_KEY), &updated)?;
        self.bump_tx_counter()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{LedgerApp, Operation};

    #[test]
    fn test_contract_lifecycle_bumps_counter() {
        let mut app = started_app();
        run_block(
            &mut app,
            1_005,
            &[Operation::StoreCode {
                creator: ALICE.to_string(),
                code: b"\0asm counter".to_vec(),
            }],
        );
        let address = LedgerApp::contract_address(1, 1);
        run_block(
            &mut app,
            1_010,
            &[
                Operation::Instantiate {
                    creator: ALICE.to_string(),
                    code_id: 1,
                    label: "c".to_string(),
                    init_count: 5,
                },
                Operation::Execute {
                    sender: BOB.to_string(),
                    contract: address.clone(),
                    increment: 4,
                },
            ],
        );

        assert_eq!(app.contract_count(&address).unwrap(), Some(9));
        assert_eq!(app.tx_counter().unwrap().unwrap().counter, 2);
        assert_eq!(app.codes().unwrap().len(), 1);
        assert_eq!(app.contract_state(&address).unwrap().len(), 1);
    }

    #[test]
    fn test_instantiate_unknown_code_fails() {
        let mut app = started_app();
        app.begin_block(header(2, 1_005)).unwrap();
        assert!(app
            .deliver(&Operation::Instantiate {
                creator: ALICE.to_string(),
                code_id: 9,
                label: "x".to_string(),
                init_count: 0,
            })
            .is_err());
    }
}
