//! Operations (transactions) the ledger accepts.

use super::types::VoteOption;
use super::{AppError, LedgerApp};
use serde::{Deserialize, Serialize};

/// A signed state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Send {
        from: String,
        to: String,
        denom: String,
        amount: u64,
        /// Fee in the bond denom
        fee: u64,
    },
    Delegate {
        delegator: String,
        validator: String,
        amount: u64,
    },
    Undelegate {
        delegator: String,
        validator: String,
        amount: u64,
    },
    Redelegate {
        delegator: String,
        validator_src: String,
        validator_dst: String,
        amount: u64,
    },
    SubmitProposal {
        proposer: String,
        title: String,
        deposit: u64,
    },
    Vote {
        proposal_id: u64,
        voter: String,
        option: VoteOption,
    },
    StoreCode {
        creator: String,
        code: Vec<u8>,
    },
    Instantiate {
        creator: String,
        code_id: u64,
        label: String,
        init_count: u64,
    },
    Execute {
        sender: String,
        contract: String,
        increment: u64,
    },
}

impl Operation {
    /// Every route, in the order weights are drawn.
    pub const ROUTES: &'static [&'static str] = &[
        "bank/send",
        "staking/delegate",
        "staking/undelegate",
        "staking/redelegate",
        "gov/submit_proposal",
        "gov/vote",
        "wasm/store_code",
        "wasm/instantiate",
        "wasm/execute",
    ];

    /// Message route, used for statistics and weights.
    pub fn route(&self) -> &'static str {
        match self {
            Self::Send { .. } => "bank/send",
            Self::Delegate { .. } => "staking/delegate",
            Self::Undelegate { .. } => "staking/undelegate",
            Self::Redelegate { .. } => "staking/redelegate",
            Self::SubmitProposal { .. } => "gov/submit_proposal",
            Self::Vote { .. } => "gov/vote",
            Self::StoreCode { .. } => "wasm/store_code",
            Self::Instantiate { .. } => "wasm/instantiate",
            Self::Execute { .. } => "wasm/execute",
        }
    }

    /// Account whose sequence the operation consumes.
    pub fn signer(&self) -> &str {
        match self {
            Self::Send { from, .. } => from.as_str(),
            Self::Delegate { delegator, .. }
            | Self::Undelegate { delegator, .. }
            | Self::Redelegate { delegator, .. } => delegator.as_str(),
            Self::SubmitProposal { proposer, .. } => proposer.as_str(),
            Self::Vote { voter, .. } => voter.as_str(),
            Self::StoreCode { creator, .. } | Self::Instantiate { creator, .. } => creator.as_str(),
            Self::Execute { sender, .. } => sender.as_str(),
        }
    }
}

impl LedgerApp {
    pub(crate) fn apply_operation(&mut self, op: &Operation) -> Result<(), AppError> {
        let signer = op.signer();
        if self.account(signer)?.is_none() {
            return Err(AppError::not_found(format!("signer account {}", signer)));
        }

        match op {
            Operation::Send {
                from,
                to,
                denom,
                amount,
                fee,
            } => self.handle_send(from, to, denom, *amount, *fee)?,
            Operation::Delegate {
                delegator,
                validator,
                amount,
            } => self.handle_delegate(delegator, validator, *amount)?,
            Operation::Undelegate {
                delegator,
                validator,
                amount,
            } => self.handle_undelegate(delegator, validator, *amount)?,
            Operation::Redelegate {
                delegator,
                validator_src,
                validator_dst,
                amount,
            } => self.handle_redelegate(delegator, validator_src, validator_dst, *amount)?,
            Operation::SubmitProposal {
                proposer,
                title,
                deposit,
            } => self.handle_submit_proposal(proposer, title, *deposit)?,
            Operation::Vote {
                proposal_id,
                voter,
                option,
            } => self.handle_vote(*proposal_id, voter, *option)?,
            Operation::StoreCode { creator, code } => self.handle_store_code(creator, code)?,
            Operation::Instantiate {
                creator,
                code_id,
                label,
                init_count,
            } => self.handle_instantiate(creator, *code_id, label, *init_count)?,
            Operation::Execute {
                contract,
                increment,
                ..
            } => self.handle_execute(contract, *increment)?,
        }

        self.increment_sequence(signer)
    }
}
