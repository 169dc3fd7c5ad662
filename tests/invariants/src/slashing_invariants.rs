//! Property-based tests for slashing invariants.
//!
//! Properties tested:
//! 1. The delay penalty never exceeds the failure amount and grows with delay
//! 2. Seizing conserves stake: what providers lose is what the registry took
//! 3. Notifier rewards are a bounded share of the seized total
//! 4. A violation is resolved at most once

#[cfg(test)]
mod tests {
    use {
        proptest::prelude::*,
        solana_pubkey::Pubkey,
        trv1_random_beacon::{
            config::{RelayEntryParameters, SlashingParameters},
            slashing::{relay_entry_delay_penalty, SlashingEngine, Violation},
            staking::{InMemoryStaking, StakingRegistry},
            BeaconError,
        },
    };

    // ── Helpers ──

    fn provider(i: usize) -> Pubkey {
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&(i as u64).to_le_bytes());
        bytes[31] = 0x5A;
        Pubkey::new_from_array(bytes)
    }

    fn staking_with(stakes: &[u128]) -> (InMemoryStaking, Vec<Pubkey>) {
        let mut staking = InMemoryStaking::new();
        let providers: Vec<Pubkey> = (0..stakes.len()).map(provider).collect();
        for (provider, &stake) in providers.iter().zip(stakes) {
            staking.set_authorized_stake(*provider, stake);
        }
        (staking, providers)
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 1. Delay penalty bounds
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(1000))]

        #[test]
        fn delay_penalty_is_bounded_and_monotone(
            amount in 0..u128::from(u64::MAX),
            hard_timeout in 1..10_000u64,
            late in 0..20_000u64,
            extra in 0..1_000u64,
        ) {
            let relay = RelayEntryParameters {
                relay_entry_soft_timeout: 10,
                relay_entry_hard_timeout: hard_timeout,
            };
            let slashing = SlashingParameters {
                relay_entry_submission_failure_slashing_amount: amount,
                ..SlashingParameters::default()
            };
            let penalty = relay_entry_delay_penalty(late, &relay, &slashing);
            let later = relay_entry_delay_penalty(late + extra, &relay, &slashing);

            prop_assert!(penalty <= amount);
            prop_assert!(penalty <= later, "{} late: {}, {} late: {}", late, penalty, late + extra, later);
            prop_assert_eq!(relay_entry_delay_penalty(0, &relay, &slashing), 0);
            if late >= hard_timeout {
                prop_assert_eq!(penalty, amount);
            }
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 2-3. Seizing conserves stake
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(1000))]

        #[test]
        fn seize_conserves_stake(
            stakes in prop::collection::vec(0..1_000_000u128, 1..64),
            amount in 0..2_000_000u128,
            multiplier in 0..=100u8,
        ) {
            let (mut staking, providers) = staking_with(&stakes);
            let before: u128 = stakes.iter().sum();
            let notifier = Pubkey::new_from_array([0xAA; 32]);

            staking.seize(amount, multiplier, &notifier, &providers).unwrap();

            let expected: u128 = stakes.iter().map(|&stake| stake.min(amount)).sum();
            let after: u128 = providers.iter().map(|p| staking.authorized_stake(p)).sum();
            prop_assert_eq!(staking.total_slashed(), expected);
            prop_assert_eq!(before - after, expected);

            let reward = staking.notifier_reward(&notifier);
            prop_assert!(reward <= expected, "reward {} exceeds seized {}", reward, expected);
            prop_assert_eq!(reward, expected / 100 * u128::from(multiplier));
        }

        #[test]
        fn failed_seize_moves_nothing(
            stakes in prop::collection::vec(1..1_000u128, 1..16),
            amount in 1..1_000u128,
        ) {
            let (mut staking, mut providers) = staking_with(&stakes);
            providers.push(Pubkey::new_from_array([0xEE; 32]));
            let notifier = Pubkey::new_from_array([0xAA; 32]);

            prop_assert!(staking.seize(amount, 50, &notifier, &providers).is_err());
            prop_assert_eq!(staking.total_slashed(), 0);
            prop_assert_eq!(staking.notifier_reward(&notifier), 0);
            for (provider, &stake) in providers.iter().zip(&stakes) {
                prop_assert_eq!(staking.authorized_stake(provider), stake);
            }
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 4. Violations resolve once
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn violations_resolve_once(request_ids in prop::collection::vec(0..20u64, 1..50)) {
            let mut engine = SlashingEngine::new();
            let mut seen = std::collections::HashSet::new();
            for request_id in request_ids {
                let violation = Violation::RelayEntryTimeout { request_id };
                let result = engine.resolve(violation, 10, None, vec![], vec![provider(0)]);
                if seen.insert(request_id) {
                    let order = result.unwrap();
                    prop_assert_eq!(order.total_amount(), 10);
                } else {
                    prop_assert_eq!(result, Err(BeaconError::AlreadySlashed(violation)));
                }
                prop_assert!(engine.is_resolved(&violation));
            }
        }
    }
}
