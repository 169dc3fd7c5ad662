//! DKG coordinator.
//!
//! Drives group creation from a seed to a registered group:
//!
//! ```text
//!   Idle ─lock─▶ AwaitingSeed ─seed─▶ KeyGeneration ─submit─▶ ChallengeWindow
//!                     │                   │                    │         │
//!               seed timeout        result timeout        challenge   window closes
//!                     ▼                   ▼                    ▼         ▼
//!                  TimedOut            TimedOut          AwaitingSeed  ResultSubmitted
//!                                                                        │ approve
//!                                                                        ▼
//!                                                                     Approved
//!
//!   TimedOut and Approved are reported through `last_outcome`; the
//!   coordinator itself is back in Idle.
//! ```
//!
//! The coordinator is a pure state machine: it never reads the block height
//! on its own, every call receives it. Timeouts are evaluated lazily from
//! block deltas when somebody asks.

use {
    crate::{
        config::GovernanceParameters,
        dkg_validator,
        error::{BeaconError, Result, ValidationError},
        groups::Groups,
        sortition::SortitionPool,
        types::{DkgResult, OperatorId},
    },
    log::*,
    solana_hash::Hash,
    solana_pubkey::Pubkey,
};

/// Externally visible DKG state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DkgState {
    /// No group creation in progress.
    Idle,
    /// Pool locked, waiting for the relay entry that seeds the DKG.
    AwaitingSeed,
    /// Seed known; the selected members run the DKG off-ledger.
    KeyGeneration,
    /// The challenge window of the submitted result closed; it awaits
    /// approval.
    ResultSubmitted,
    /// The submitted result can be challenged.
    ChallengeWindow,
    /// The last round registered a group.
    Approved,
    /// A seed or result deadline elapsed.
    TimedOut,
}

/// The accepted DKG result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedResult {
    pub result_hash: Hash,
    pub submitter: Pubkey,
    pub submitted_at: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum Phase {
    #[default]
    Idle,
    AwaitingSeed {
        locked_at: u64,
    },
    KeyGeneration {
        seed: Hash,
        started_at: u64,
    },
    AwaitingApproval {
        seed: Hash,
        started_at: u64,
        submission: SubmittedResult,
    },
}

/// A successful challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeOutcome {
    pub result_hash: Hash,
    pub submitter: Pubkey,
    pub reason: ValidationError,
}

/// An approved result, ready to become a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovedResult {
    pub result_hash: Hash,
    pub misbehaved: Vec<OperatorId>,
}

#[derive(Debug, Clone, Default)]
pub struct DkgCoordinator {
    phase: Phase,
    last_outcome: Option<DkgState>,
}

impl DkgCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// State at block `now`, with elapsed deadlines reported as `TimedOut`.
    pub fn state_at(&self, now: u64, params: &GovernanceParameters) -> DkgState {
        match &self.phase {
            Phase::Idle => DkgState::Idle,
            Phase::AwaitingSeed { locked_at } => {
                if now > locked_at.saturating_add(params.dkg_seed_timeout()) {
                    DkgState::TimedOut
                } else {
                    DkgState::AwaitingSeed
                }
            }
            Phase::KeyGeneration { started_at, .. } => {
                if self.has_result_timed_out(*started_at, now, params) {
                    DkgState::TimedOut
                } else {
                    DkgState::KeyGeneration
                }
            }
            Phase::AwaitingApproval { submission, .. } => {
                if now <= Self::challenge_period_end(submission, params) {
                    DkgState::ChallengeWindow
                } else {
                    DkgState::ResultSubmitted
                }
            }
        }
    }

    /// Stored state, without evaluating deadlines.
    fn state(&self) -> DkgState {
        match self.phase {
            Phase::Idle => DkgState::Idle,
            Phase::AwaitingSeed { .. } => DkgState::AwaitingSeed,
            Phase::KeyGeneration { .. } => DkgState::KeyGeneration,
            Phase::AwaitingApproval { .. } => DkgState::ChallengeWindow,
        }
    }

    /// Terminal state of the last finished round, if any.
    pub fn last_outcome(&self) -> Option<DkgState> {
        self.last_outcome
    }

    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    pub fn is_awaiting_seed(&self) -> bool {
        matches!(self.phase, Phase::AwaitingSeed { .. })
    }

    pub fn seed(&self) -> Option<Hash> {
        match self.phase {
            Phase::KeyGeneration { seed, .. } | Phase::AwaitingApproval { seed, .. } => Some(seed),
            _ => None,
        }
    }

    /// Block at which the current key generation started.
    pub fn start_block(&self) -> Option<u64> {
        match self.phase {
            Phase::KeyGeneration { started_at, .. }
            | Phase::AwaitingApproval { started_at, .. } => Some(started_at),
            _ => None,
        }
    }

    pub fn submission(&self) -> Option<&SubmittedResult> {
        match &self.phase {
            Phase::AwaitingApproval { submission, .. } => Some(submission),
            _ => None,
        }
    }

    fn has_result_timed_out(&self, started_at: u64, now: u64, params: &GovernanceParameters) -> bool {
        now > started_at.saturating_add(params.group_creation.dkg_result_submission_timeout)
    }

    // -- transitions ---------------------------------------------------------

    /// `Idle -> AwaitingSeed`.
    pub fn lock(&mut self, now: u64) -> Result<()> {
        if !self.is_idle() {
            return Err(BeaconError::InvalidDkgState(self.state()));
        }
        self.phase = Phase::AwaitingSeed { locked_at: now };
        info!("DKG locked at block {now}, awaiting seed");
        Ok(())
    }

    /// `AwaitingSeed -> KeyGeneration`.
    pub fn start(&mut self, seed: Hash, now: u64) -> Result<()> {
        if !self.is_awaiting_seed() {
            return Err(BeaconError::InvalidDkgState(self.state()));
        }
        self.phase = Phase::KeyGeneration {
            seed,
            started_at: now,
        };
        info!("DKG started at block {now} with seed {seed:?}");
        Ok(())
    }

    /// Accept the first structurally valid result and open the challenge
    /// window. Returns the result hash.
    pub fn submit_result(
        &mut self,
        result: &DkgResult,
        submitter: &Pubkey,
        pool: &SortitionPool,
        params: &GovernanceParameters,
        now: u64,
    ) -> Result<Hash> {
        let (seed, started_at) = match self.phase {
            Phase::KeyGeneration { seed, started_at } => (seed, started_at),
            Phase::AwaitingApproval { .. } => return Err(BeaconError::DkgResultAlreadySubmitted),
            _ => return Err(BeaconError::InvalidDkgState(self.state())),
        };
        if self.has_result_timed_out(started_at, now, params) {
            return Err(BeaconError::DkgTimedOut);
        }
        dkg_validator::validate_fields(result, &seed, pool, &params.group_creation)
            .map_err(BeaconError::InvalidDkgResult)?;

        let declared = result
            .member(result.submitter_member_index)
            .and_then(|id| pool.operator(id))
            .map(|entry| entry.operator);
        if declared != Some(*submitter) {
            return Err(BeaconError::NotSubmitter(*submitter));
        }

        let result_hash = result.hash();
        self.phase = Phase::AwaitingApproval {
            seed,
            started_at,
            submission: SubmittedResult {
                result_hash,
                submitter: *submitter,
                submitted_at: now,
            },
        };
        info!(
            "DKG result {result_hash:?} submitted by member {} at block {now}",
            result.submitter_member_index
        );
        Ok(result_hash)
    }

    fn submitted(&self, result: &DkgResult) -> Result<(Hash, u64, SubmittedResult)> {
        let Phase::AwaitingApproval {
            seed,
            started_at,
            submission,
        } = &self.phase
        else {
            return Err(BeaconError::InvalidDkgState(self.state()));
        };
        if result.hash() != submission.result_hash {
            return Err(BeaconError::DkgResultHashMismatch);
        }
        Ok((*seed, *started_at, submission.clone()))
    }

    fn challenge_period_end(submission: &SubmittedResult, params: &GovernanceParameters) -> u64 {
        submission
            .submitted_at
            .saturating_add(params.group_creation.dkg_result_challenge_period_length)
    }

    /// Fully validate the submitted result. An invalid result sends the DKG
    /// back to `AwaitingSeed`; a valid one makes the challenge fail.
    pub fn challenge_result(
        &mut self,
        result: &DkgResult,
        pool: &SortitionPool,
        groups: &Groups,
        params: &GovernanceParameters,
        now: u64,
    ) -> Result<ChallengeOutcome> {
        let (seed, started_at, submission) = self.submitted(result)?;
        if now > Self::challenge_period_end(&submission, params) {
            return Err(BeaconError::ChallengePeriodOver);
        }
        match dkg_validator::validate(
            result,
            &seed,
            started_at,
            pool,
            groups,
            &params.group_creation,
        ) {
            Ok(()) => Err(BeaconError::UnjustifiedChallenge),
            Err(reason) => {
                warn!(
                    "DKG result {:?} challenged: {reason}",
                    submission.result_hash
                );
                self.phase = Phase::AwaitingSeed { locked_at: now };
                Ok(ChallengeOutcome {
                    result_hash: submission.result_hash,
                    submitter: submission.submitter,
                    reason,
                })
            }
        }
    }

    /// Approve the submitted result once the challenge window elapsed.
    /// During the precedence period only the submitter may approve.
    pub fn approve_result(
        &mut self,
        result: &DkgResult,
        approver: &Pubkey,
        params: &GovernanceParameters,
        now: u64,
    ) -> Result<ApprovedResult> {
        let (_, _, submission) = self.submitted(result)?;
        let window_end = Self::challenge_period_end(&submission, params);
        if now <= window_end {
            return Err(BeaconError::ChallengePeriodNotOver);
        }
        let precedence_end =
            window_end.saturating_add(params.group_creation.dkg_submitter_precedence_period_length);
        if now <= precedence_end && *approver != submission.submitter {
            return Err(BeaconError::SubmitterPrecedencePeriod);
        }

        let misbehaved = result
            .misbehaved_members_indices
            .iter()
            .filter_map(|&index| result.member(index))
            .collect();
        self.phase = Phase::Idle;
        self.last_outcome = Some(DkgState::Approved);
        info!("DKG result {:?} approved at block {now}", submission.result_hash);
        Ok(ApprovedResult {
            result_hash: submission.result_hash,
            misbehaved,
        })
    }

    /// Abandon a key generation that produced no result in time.
    pub fn notify_timeout(&mut self, params: &GovernanceParameters, now: u64) -> Result<()> {
        let Phase::KeyGeneration { started_at, .. } = self.phase else {
            return Err(BeaconError::InvalidDkgState(self.state()));
        };
        if !self.has_result_timed_out(started_at, now, params) {
            return Err(BeaconError::DkgNotTimedOut);
        }
        self.phase = Phase::Idle;
        self.last_outcome = Some(DkgState::TimedOut);
        warn!("DKG started at block {started_at} timed out");
        Ok(())
    }

    /// Abandon a DKG whose seed never arrived.
    pub fn notify_seed_timeout(&mut self, params: &GovernanceParameters, now: u64) -> Result<()> {
        let Phase::AwaitingSeed { locked_at } = self.phase else {
            return Err(BeaconError::InvalidDkgState(self.state()));
        };
        if now <= locked_at.saturating_add(params.dkg_seed_timeout()) {
            return Err(BeaconError::SeedNotTimedOut);
        }
        self.phase = Phase::Idle;
        self.last_outcome = Some(DkgState::TimedOut);
        warn!("DKG seed requested at block {locked_at} timed out");
        Ok(())
    }
}
