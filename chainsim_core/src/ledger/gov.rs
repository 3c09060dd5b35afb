//! Proposals, stake-weighted votes and end-of-voting tallies.

use super::keys;
use super::types::{GovParams, Proposal, ProposalStatus, Vote, VoteOption};
use super::{AppError, LedgerApp};
use tracing::debug;

impl LedgerApp {
    pub fn gov_params(&self) -> Result<GovParams, AppError> {
        self.read(keys::GOV, keys::gov::PARAMS)?
            .ok_or_else(|| AppError::not_found("gov params"))
    }

    pub fn proposal(&self, id: u64) -> Result<Option<Proposal>, AppError> {
        self.read(keys::GOV, &keys::proposal_key(id))
    }

    pub fn proposals(&self) -> Result<Vec<Proposal>, AppError> {
        Ok(self
            .scan::<Proposal>(keys::GOV, &[keys::gov::PROPOSAL])?
            .into_iter()
            .map(|(_, p)| p)
            .collect())
    }

    /// Proposals still accepting votes.
    pub fn active_proposals(&self) -> Result<Vec<Proposal>, AppError> {
        Ok(self
            .proposals()?
            .into_iter()
            .filter(|p| p.status == ProposalStatus::VotingPeriod)
            .collect())
    }

    pub fn votes(&self, proposal_id: u64) -> Result<Vec<Vote>, AppError> {
        Ok(self
            .scan::<Vote>(keys::GOV, &keys::votes_prefix(proposal_id))?
            .into_iter()
            .map(|(_, v)| v)
            .collect())
    }

    pub(crate) fn all_votes(&self) -> Result<Vec<Vote>, AppError> {
        Ok(self
            .scan::<Vote>(keys::GOV, &[keys::gov::VOTE])?
            .into_iter()
            .map(|(_, v)| v)
            .collect())
    }

    pub(crate) fn next_proposal_id(&self) -> Result<u64, AppError> {
        Ok(self.read(keys::GOV, keys::gov::NEXT_PROPOSAL_ID)?.unwrap_or(1))
    }

    pub(crate) fn set_proposal(&mut self, proposal: &Proposal) -> Result<(), AppError> {
        self.write(keys::GOV, keys::proposal_key(proposal.id), proposal)?;
        if proposal.status == ProposalStatus::VotingPeriod {
            self.write(
                keys::GOV,
                keys::active_proposal_key(proposal.voting_end_time, proposal.id),
                &proposal.id,
            )?;
        }
        Ok(())
    }

    pub(crate) fn set_vote(&mut self, vote: &Vote) -> Result<(), AppError> {
        self.write(keys::GOV, keys::vote_key(vote.proposal_id, &vote.voter), vote)
    }

    pub(crate) fn handle_submit_proposal(&mut self, proposer: &str, title: &str, deposit: u64) -> Result<(), AppError> {
        let params = self.gov_params()?;
        if deposit < params.min_deposit {
            return Err(AppError::invalid(format!(
                "deposit {} below minimum {}",
                deposit, params.min_deposit
            )));
        }
        let now = self.header()?.time;
        self.send_coins(proposer, keys::GOV_ACCOUNT, &params.deposit_denom, deposit)?;

        let id = self.next_proposal_id()?;
        self.write(keys::GOV, keys::gov::NEXT_PROPOSAL_ID.to_vec(), &(id + 1))?;
        self.set_proposal(&Proposal {
            id,
            proposer: proposer.to_string(),
            title: title.to_string(),
            deposit,
            submit_time: now,
            voting_end_time: now + params.voting_period,
            status: ProposalStatus::VotingPeriod,
            final_tally: None,
        })
    }

    pub(crate) fn handle_vote(&mut self, proposal_id: u64, voter: &str, option: VoteOption) -> Result<(), AppError> {
        let proposal = self
            .proposal(proposal_id)?
            .ok_or_else(|| AppError::not_found(format!("proposal {}", proposal_id)))?;
        if proposal.status != ProposalStatus::VotingPeriod {
            return Err(AppError::invalid(format!("proposal {} is not in voting period", proposal_id)));
        }
        if self.account(voter)?.is_none() {
            return Err(AppError::not_found(format!("account {}", voter)));
        }
        self.set_vote(&Vote {
            proposal_id,
            voter: voter.to_string(),
            option,
        })
    }

    /// Voting power of an address: the sum of its delegation shares.
    fn voting_power(&self, voter: &str) -> Result<u64, AppError> {
        Ok(self.delegations_of(voter)?.iter().map(|d| d.shares).sum())
    }

    /// Closes every proposal whose voting period ended at or before `now`.
    ///
    /// Passed proposals refund their deposit, rejected ones burn it.
    pub(crate) fn tally_proposals(&mut self, now: i64) -> Result<(), AppError> {
        let denom = self.gov_params()?.deposit_denom;
        let queue = self.scan::<u64>(keys::GOV, &[keys::gov::ACTIVE_PROPOSAL_QUEUE])?;
        for (key, id) in queue {
            match keys::queue_key_time(&key) {
                Some(end) if end <= now => {}
                _ => break,
            }
            self.remove(keys::GOV, &key)?;
            let Some(mut proposal) = self.proposal(id)? else {
                continue;
            };

            let mut tally = [0u64; 3];
            for vote in self.votes(id)? {
                let power = self.voting_power(&vote.voter)?;
                let slot = match vote.option {
                    VoteOption::Yes => 0,
                    VoteOption::No => 1,
                    VoteOption::Abstain => 2,
                };
                tally[slot] += power;
                self.remove(keys::GOV, &keys::vote_key(id, &vote.voter))?;
            }

            let passed = tally[0] > tally[1];
            if passed {
                self.send_coins(keys::GOV_ACCOUNT, &proposal.proposer, &denom, proposal.deposit)?;
                proposal.status = ProposalStatus::Passed;
            } else {
                self.burn_coins(keys::GOV_ACCOUNT, &denom, proposal.deposit)?;
                proposal.status = ProposalStatus::Rejected;
            }
            proposal.final_tally = Some(tally);
            debug!(id, passed, yes = tally[0], no = tally[1], "proposal tallied");
            self.set_proposal(&proposal)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::types::{ProposalStatus, VoteOption};
    use super::super::{keys, Operation};

    fn submit(app: &mut super::LedgerApp, time: i64) {
        run_block(
            app,
            time,
            &[Operation::SubmitProposal {
                proposer: ALICE.to_string(),
                title: "upgrade".to_string(),
                deposit: 10_000,
            }],
        );
    }

    #[test]
    fn test_passed_proposal_refunds_deposit() {
        let mut app = started_app();
        let before = app.balance(ALICE, "stake").unwrap();
        submit(&mut app, 1_002);
        assert_eq!(app.balance(keys::GOV_ACCOUNT, "stake").unwrap(), 10_000);

        run_block(
            &mut app,
            1_004,
            &[Operation::Vote {
                proposal_id: 1,
                voter: VAL1.to_string(),
                option: VoteOption::Yes,
            }],
        );
        run_block(&mut app, 1_020, &[]);

        let proposal = app.proposal(1).unwrap().unwrap();
        assert_eq!(proposal.status, ProposalStatus::Passed);
        assert_eq!(proposal.final_tally, Some([10_000_000, 0, 0]));
        assert_eq!(app.balance(ALICE, "stake").unwrap(), before);
        assert!(app.votes(1).unwrap().is_empty());
    }

    #[test]
    fn test_rejected_proposal_burns_deposit() {
        let mut app = started_app();
        submit(&mut app, 1_002);
        let supply = app.supply("stake").unwrap();
        run_block(&mut app, 1_020, &[]);

        let proposal = app.proposal(1).unwrap().unwrap();
        assert_eq!(proposal.status, ProposalStatus::Rejected);
        assert_eq!(app.balance(keys::GOV_ACCOUNT, "stake").unwrap(), 0);
        // minting in the tally block adds back at most a few units
        assert!(app.supply("stake").unwrap() < supply);
        assert!(app.active_proposals().unwrap().is_empty());
    }

    #[test]
    fn test_vote_on_closed_proposal_fails() {
        let mut app = started_app();
        submit(&mut app, 1_002);
        run_block(&mut app, 1_020, &[]);

        app.begin_block(header(app.next_height(), 1_022)).unwrap();
        assert!(app
            .deliver(&Operation::Vote {
                proposal_id: 1,
                voter: BOB.to_string(),
                option: VoteOption::No,
            })
            .is_err());
    }
}
