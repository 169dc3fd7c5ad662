//! Slashing of group members and DKG result submitters.
//!
//! # Violations
//! | Violation             | Who is slashed      | Amount                          | Notifier reward |
//! |-----------------------|---------------------|---------------------------------|-----------------|
//! | Relay entry timeout   | every group member  | submission failure amount       | yes             |
//! | Relay entry delay     | every group member  | pro-rated failure amount        | no              |
//! | Unauthorized signing  | every group member  | unauthorized signing amount     | yes             |
//! | Malicious DKG result  | the submitter       | malicious DKG result amount     | yes             |
//!
//! Each violation is resolved at most once. Resolving happens as part of the
//! state transition that proves the violation; the stake itself is moved
//! afterwards against the staking registry on a best-effort basis. A
//! registry failure produces a `*SlashingFailed` event and never reverts the
//! transition.

use {
    crate::{
        config::{RelayEntryParameters, SlashingParameters},
        error::{BeaconError, Result},
        events::BeaconEvent,
        staking::StakingRegistry,
        types::{GroupId, RequestId},
    },
    log::*,
    solana_hash::Hash,
    solana_pubkey::Pubkey,
    std::collections::HashSet,
};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A slashable violation, keyed so it can be resolved only once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Violation {
    RelayEntryTimeout { request_id: RequestId },
    RelayEntryDelay { request_id: RequestId },
    UnauthorizedSigning { group_id: GroupId },
    MaliciousDkgResult { result_hash: Hash },
}

/// Reward paid to whoever proved the violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifierReward {
    pub notifier: Pubkey,
    /// Percentage of the seized amount.
    pub multiplier: u8,
}

/// A resolved violation waiting to be executed against the staking registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlashOrder {
    pub violation: Violation,
    /// Amount taken from each staking provider.
    pub amount: u128,
    /// `Some` seizes with a notifier reward, `None` slashes.
    pub notifier_reward: Option<NotifierReward>,
    /// Offending operators, as reported in events.
    pub operators: Vec<Pubkey>,
    /// Staking providers behind `operators`.
    pub staking_providers: Vec<Pubkey>,
}

impl SlashOrder {
    /// Total stake the order takes when every provider can cover it.
    pub fn total_amount(&self) -> u128 {
        self.amount
            .saturating_mul(self.staking_providers.len() as u128)
    }

    fn outcome_event(&self, succeeded: bool) -> BeaconEvent {
        let group_members = self.operators.clone();
        let slashing_amount = self.amount;
        match (self.violation, succeeded) {
            (Violation::RelayEntryTimeout { request_id }, true) => {
                BeaconEvent::RelayEntryTimeoutSlashed {
                    request_id,
                    slashing_amount,
                    group_members,
                }
            }
            (Violation::RelayEntryTimeout { request_id }, false) => {
                BeaconEvent::RelayEntryTimeoutSlashingFailed {
                    request_id,
                    slashing_amount,
                    group_members,
                }
            }
            (Violation::RelayEntryDelay { request_id }, true) => {
                BeaconEvent::RelayEntryDelaySlashed {
                    request_id,
                    slashing_amount,
                    group_members,
                }
            }
            (Violation::RelayEntryDelay { request_id }, false) => {
                BeaconEvent::RelayEntryDelaySlashingFailed {
                    request_id,
                    slashing_amount,
                    group_members,
                }
            }
            (Violation::UnauthorizedSigning { group_id }, true) => {
                BeaconEvent::UnauthorizedSigningSlashed {
                    group_id,
                    unauthorized_signing_slashing_amount: slashing_amount,
                    group_members,
                }
            }
            (Violation::UnauthorizedSigning { group_id }, false) => {
                BeaconEvent::UnauthorizedSigningSlashingFailed {
                    group_id,
                    unauthorized_signing_slashing_amount: slashing_amount,
                    group_members,
                }
            }
            (Violation::MaliciousDkgResult { result_hash }, succeeded) => {
                let malicious_submitter = self.operators.first().copied().unwrap_or_default();
                if succeeded {
                    BeaconEvent::DkgMaliciousResultSlashed {
                        result_hash,
                        slashing_amount,
                        malicious_submitter,
                    }
                } else {
                    BeaconEvent::DkgMaliciousResultSlashingFailed {
                        result_hash,
                        slashing_amount,
                        malicious_submitter,
                    }
                }
            }
        }
    }
}

/// Penalty for a relay entry submitted `blocks_late` blocks after the soft
/// timeout: the failure amount pro-rated over the hard timeout, capped at
/// the failure amount.
pub fn relay_entry_delay_penalty(
    blocks_late: u64,
    relay: &RelayEntryParameters,
    slashing: &SlashingParameters,
) -> u128 {
    let amount = slashing.relay_entry_submission_failure_slashing_amount;
    let hard_timeout = u128::from(relay.relay_entry_hard_timeout.max(1));
    u128::from(blocks_late)
        .saturating_mul(amount)
        .checked_div(hard_timeout)
        .unwrap_or(amount)
        .min(amount)
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Tracks resolved violations and turns them into slash orders.
#[derive(Debug, Clone, Default)]
pub struct SlashingEngine {
    resolved: HashSet<Violation>,
}

impl SlashingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_resolved(&self, violation: &Violation) -> bool {
        self.resolved.contains(violation)
    }

    /// Resolve `violation` and produce its slash order.
    pub fn resolve(
        &mut self,
        violation: Violation,
        amount: u128,
        notifier_reward: Option<NotifierReward>,
        operators: Vec<Pubkey>,
        staking_providers: Vec<Pubkey>,
    ) -> Result<SlashOrder> {
        if !self.resolved.insert(violation) {
            return Err(BeaconError::AlreadySlashed(violation));
        }
        info!(
            "resolved {violation:?}: {amount} from each of {} providers",
            staking_providers.len()
        );
        Ok(SlashOrder {
            violation,
            amount,
            notifier_reward,
            operators,
            staking_providers,
        })
    }

    /// Execute `order` against the staking registry and return the event
    /// describing the outcome.
    pub fn execute<S: StakingRegistry + ?Sized>(staking: &mut S, order: &SlashOrder) -> BeaconEvent {
        let result = match order.notifier_reward {
            Some(NotifierReward {
                notifier,
                multiplier,
            }) => staking.seize(order.amount, multiplier, &notifier, &order.staking_providers),
            None => staking.slash(order.amount, &order.staking_providers),
        };
        match result {
            Ok(()) => order.outcome_event(true),
            Err(err) => {
                warn!("slashing for {:?} failed: {err}", order.violation);
                order.outcome_event(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{events::EventKind, staking::InMemoryStaking},
        assert_matches::assert_matches,
        test_case::test_case,
    };

    fn key(seed: u8) -> Pubkey {
        Pubkey::new_from_array([seed; 32])
    }

    fn funded_staking(providers: &[Pubkey], amount: u128) -> InMemoryStaking {
        let mut staking = InMemoryStaking::new();
        for provider in providers {
            staking.set_authorized_stake(*provider, amount);
        }
        staking
    }

    #[test_case(0, 0; "on the soft timeout")]
    #[test_case(1, 10; "one block late")]
    #[test_case(50, 500; "half way")]
    #[test_case(100, 1_000; "on the hard timeout")]
    #[test_case(250, 1_000; "capped")]
    fn test_relay_entry_delay_penalty(blocks_late: u64, expected: u128) {
        let relay = RelayEntryParameters::default();
        let slashing = SlashingParameters {
            relay_entry_submission_failure_slashing_amount: 1_000,
            ..SlashingParameters::default()
        };
        assert_eq!(
            relay_entry_delay_penalty(blocks_late, &relay, &slashing),
            expected
        );
    }

    #[test]
    fn test_violation_resolved_once() {
        let mut engine = SlashingEngine::new();
        let violation = Violation::RelayEntryTimeout { request_id: 7 };
        engine
            .resolve(violation, 10, None, vec![key(1)], vec![key(11)])
            .unwrap();
        assert!(engine.is_resolved(&violation));
        assert_matches!(
            engine.resolve(violation, 10, None, vec![key(1)], vec![key(11)]),
            Err(BeaconError::AlreadySlashed(_))
        );
        assert!(engine
            .resolve(
                Violation::RelayEntryDelay { request_id: 7 },
                10,
                None,
                vec![key(1)],
                vec![key(11)]
            )
            .is_ok());
    }

    #[test]
    fn test_execute_seize_conserves_amount() {
        let providers = vec![key(11), key(12), key(13)];
        let mut staking = funded_staking(&providers, 1_000);
        let mut engine = SlashingEngine::new();
        let order = engine
            .resolve(
                Violation::RelayEntryTimeout { request_id: 1 },
                100,
                Some(NotifierReward {
                    notifier: key(9),
                    multiplier: 40,
                }),
                vec![key(1), key(2), key(3)],
                providers,
            )
            .unwrap();
        let event = SlashingEngine::execute(&mut staking, &order);
        assert_eq!(event.kind(), EventKind::RelayEntryTimeoutSlashed);
        assert_eq!(staking.total_slashed(), order.total_amount());
        assert_eq!(staking.total_slashed(), 300);
        assert_eq!(staking.notifier_reward(&key(9)), 120);
    }

    #[test]
    fn test_execute_failure_reports_event() {
        let mut staking = funded_staking(&[key(11)], 1_000);
        staking.set_failing(true);
        let mut engine = SlashingEngine::new();
        let order = engine
            .resolve(
                Violation::MaliciousDkgResult {
                    result_hash: Hash::new_from_array([5; 32]),
                },
                100,
                None,
                vec![key(1)],
                vec![key(11)],
            )
            .unwrap();
        assert_eq!(
            SlashingEngine::execute(&mut staking, &order),
            BeaconEvent::DkgMaliciousResultSlashingFailed {
                result_hash: Hash::new_from_array([5; 32]),
                slashing_amount: 100,
                malicious_submitter: key(1),
            }
        );
        assert_eq!(staking.total_slashed(), 0);
        assert!(engine.is_resolved(&order.violation));
    }

    #[test]
    fn test_unauthorized_signing_event_fields() {
        let mut staking = funded_staking(&[key(11), key(12)], 1_000);
        let mut engine = SlashingEngine::new();
        let order = engine
            .resolve(
                Violation::UnauthorizedSigning { group_id: 4 },
                10,
                Some(NotifierReward {
                    notifier: key(9),
                    multiplier: 50,
                }),
                vec![key(1), key(2)],
                vec![key(11), key(12)],
            )
            .unwrap();
        assert_eq!(
            SlashingEngine::execute(&mut staking, &order),
            BeaconEvent::UnauthorizedSigningSlashed {
                group_id: 4,
                unauthorized_signing_slashing_amount: 10,
                group_members: vec![key(1), key(2)],
            }
        );
    }
}
