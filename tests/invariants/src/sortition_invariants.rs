//! Property-based tests for sortition pool invariants.
//!
//! Properties tested:
//! 1. Selection returns exactly the requested number of distinct operators
//! 2. Only operators with non-zero weight are ever selected
//! 3. Selection is a pure function of pool state and seed
//! 4. Reward distribution never pays out more than was added
//! 5. Pool weight is monotone in authorized stake

#[cfg(test)]
mod tests {
    use {
        proptest::prelude::*,
        solana_hash::Hash,
        solana_pubkey::Pubkey,
        std::collections::HashSet,
        trv1_random_beacon::{
            sortition::{weight_for, SortitionPool},
            BeaconError,
        },
    };

    // ── Helpers ──

    fn operator(i: usize) -> Pubkey {
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&(i as u64).to_le_bytes());
        bytes[31] = 0xBE;
        Pubkey::new_from_array(bytes)
    }

    /// Pool where operator `i + 1` has weight `weights[i]`. Zero weights are
    /// soft-evicted after joining.
    fn pool_with_weights(weights: &[u64]) -> SortitionPool {
        let mut pool = SortitionPool::new();
        for (i, &weight) in weights.iter().enumerate() {
            let key = operator(i);
            pool.insert_operator(key, 1, 1).unwrap();
            pool.update_operator_status(&key, u128::from(weight), 1)
                .unwrap();
        }
        pool
    }

    fn weights_strategy() -> impl Strategy<Value = Vec<u64>> {
        prop::collection::vec(prop_oneof![Just(0u64), 1..10_000u64], 1..40)
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 1-3. Selection
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        #[test]
        fn selection_is_distinct_and_weighted(
            weights in weights_strategy(),
            seed in any::<[u8; 32]>(),
            size in 1u16..40,
        ) {
            let pool = pool_with_weights(&weights);
            let seed = Hash::new_from_array(seed);
            let eligible = weights.iter().filter(|&&w| w > 0).count();

            match pool.select_group(size, &seed) {
                Ok(selected) => {
                    prop_assert!(usize::from(size) <= eligible);
                    prop_assert_eq!(selected.len(), usize::from(size));
                    let distinct: HashSet<_> = selected.iter().collect();
                    prop_assert_eq!(distinct.len(), selected.len(), "duplicate in {:?}", selected);
                    for id in &selected {
                        let index = (*id as usize) - 1;
                        prop_assert!(weights[index] > 0, "zero-weight operator {} selected", id);
                    }
                    prop_assert_eq!(pool.select_group(size, &seed).unwrap(), selected);
                }
                Err(err) => {
                    prop_assert!(usize::from(size) > eligible);
                    prop_assert_eq!(
                        err,
                        BeaconError::PoolEmpty { requested: size, available: eligible }
                    );
                }
            }
        }

        #[test]
        fn selection_prefix_is_stable(
            weights in weights_strategy(),
            seed in any::<[u8; 32]>(),
        ) {
            // Picks are drawn in order, so a smaller group is a prefix of a
            // larger one for the same seed.
            let pool = pool_with_weights(&weights);
            let seed = Hash::new_from_array(seed);
            let eligible = pool.eligible_count() as u16;
            prop_assume!(eligible >= 2);
            let full = pool.select_group(eligible, &seed).unwrap();
            let half = pool.select_group(eligible / 2, &seed).unwrap();
            prop_assert_eq!(&full[..half.len()], &half[..]);
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 4. Reward conservation
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        #[test]
        fn rewards_never_exceed_additions(
            weights in prop::collection::vec(1..1_000u64, 1..20),
            additions in prop::collection::vec(0..1_000_000u128, 1..10),
        ) {
            let mut pool = pool_with_weights(&weights);
            let mut added = 0u128;
            for amount in &additions {
                pool.add_rewards(*amount);
                added += amount;
            }
            let available: u128 = (0..weights.len())
                .map(|i| pool.available_rewards(&operator(i)))
                .sum();

            prop_assert!(available <= added, "paid {} of {}", available, added);
            // Only rounding dust smaller than the pool weight stays behind.
            prop_assert!(added - available < pool.total_weight());

            let withdrawn: u128 = (0..weights.len())
                .map(|i| pool.withdraw_rewards(&operator(i)).unwrap())
                .sum();
            prop_assert_eq!(withdrawn, available);
            for i in 0..weights.len() {
                prop_assert_eq!(pool.available_rewards(&operator(i)), 0);
            }
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 5. Weight monotonicity
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(1000))]

        #[test]
        fn weight_is_monotone_in_stake(
            a in any::<u128>(),
            b in any::<u128>(),
            divisor in 1..u128::MAX,
        ) {
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(weight_for(low, divisor) <= weight_for(high, divisor));
        }
    }
}
