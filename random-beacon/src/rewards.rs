//! Sortition pool rewards.
//!
//! Rewards are spread over the total pool weight with a global per-weight
//! accumulator. Each operator remembers the accumulator value it was last
//! settled at, so its accrual is `(global - accumulated_at) * weight`.
//! Accruals must be settled before an operator's weight or eligibility
//! changes.
//!
//! An operator banned from rewards stays ineligible until it explicitly
//! restores eligibility; everything it accrues meanwhile goes to an
//! ineligible pot that governance can withdraw.

use {crate::types::OperatorId, std::collections::HashMap};

/// Per-operator reward bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperatorRewards {
    accumulated_at: u128,
    available: u128,
    /// Block until which the operator is banned; 0 when eligible.
    ineligible_until: u64,
}

impl OperatorRewards {
    fn is_eligible(&self) -> bool {
        self.ineligible_until == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct Rewards {
    global_accumulator: u128,
    rounding_dust: u128,
    ineligible_earned: u128,
    operators: HashMap<OperatorId, OperatorRewards>,
}

impl Rewards {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `id` from the current accumulator value.
    pub fn register(&mut self, id: OperatorId) {
        let global = self.global_accumulator;
        self.operators.entry(id).or_insert(OperatorRewards {
            accumulated_at: global,
            ..OperatorRewards::default()
        });
    }

    /// Distribute `amount` over `pool_weight`. The remainder is kept as dust
    /// for the next distribution.
    pub fn add_rewards(&mut self, amount: u128, pool_weight: u128) {
        let total = amount.saturating_add(self.rounding_dust);
        if pool_weight == 0 {
            self.rounding_dust = total;
            return;
        }
        let per_weight = total / pool_weight;
        self.global_accumulator = self.global_accumulator.saturating_add(per_weight);
        self.rounding_dust = total % pool_weight;
    }

    /// Settle what `id` accrued at `weight` since its last settlement.
    pub fn settle(&mut self, id: OperatorId, weight: u64) {
        let global = self.global_accumulator;
        let Some(operator) = self.operators.get_mut(&id) else {
            return;
        };
        let accrued = global
            .saturating_sub(operator.accumulated_at)
            .saturating_mul(u128::from(weight));
        operator.accumulated_at = global;
        if operator.is_eligible() {
            operator.available = operator.available.saturating_add(accrued);
        } else {
            self.ineligible_earned = self.ineligible_earned.saturating_add(accrued);
        }
    }

    /// Rewards `id` could withdraw now at `weight`, including unsettled
    /// accruals.
    pub fn available(&self, id: OperatorId, weight: u64) -> u128 {
        self.operators.get(&id).map_or(0, |operator| {
            if !operator.is_eligible() {
                return operator.available;
            }
            let pending = self
                .global_accumulator
                .saturating_sub(operator.accumulated_at)
                .saturating_mul(u128::from(weight));
            operator.available.saturating_add(pending)
        })
    }

    /// Settle and pay out everything `id` has earned.
    pub fn withdraw(&mut self, id: OperatorId, weight: u64) -> u128 {
        self.settle(id, weight);
        self.operators
            .get_mut(&id)
            .map_or(0, |operator| std::mem::take(&mut operator.available))
    }

    /// Pay out the ineligible pot.
    pub fn withdraw_ineligible(&mut self) -> u128 {
        std::mem::take(&mut self.ineligible_earned)
    }

    pub fn ineligible_earned(&self) -> u128 {
        self.ineligible_earned
    }

    /// Ban `id` from rewards until block `until`. An existing longer ban is
    /// kept.
    pub fn set_ineligible(&mut self, id: OperatorId, weight: u64, until: u64) {
        self.settle(id, weight);
        if let Some(operator) = self.operators.get_mut(&id) {
            operator.ineligible_until = operator.ineligible_until.max(until);
        }
    }

    pub fn ineligible_until(&self, id: OperatorId) -> u64 {
        self.operators
            .get(&id)
            .map_or(0, |operator| operator.ineligible_until)
    }

    pub fn is_eligible(&self, id: OperatorId) -> bool {
        self.operators
            .get(&id)
            .map_or(true, OperatorRewards::is_eligible)
    }

    /// Returns true if `id` is banned and the ban has run out at `now`.
    pub fn can_restore(&self, id: OperatorId, now: u64) -> bool {
        let until = self.ineligible_until(id);
        until != 0 && now >= until
    }

    /// Lift the ban of `id`. Callers check `can_restore` first.
    pub fn restore(&mut self, id: OperatorId, weight: u64) {
        self.settle(id, weight);
        if let Some(operator) = self.operators.get_mut(&id) {
            operator.ineligible_until = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewards_split_by_weight() {
        let mut rewards = Rewards::new();
        rewards.register(1);
        rewards.register(2);
        rewards.add_rewards(900, 300);
        assert_eq!(rewards.available(1, 100), 300);
        assert_eq!(rewards.available(2, 200), 600);
        assert_eq!(rewards.withdraw(2, 200), 600);
        assert_eq!(rewards.available(2, 200), 0);
    }

    #[test]
    fn test_rounding_dust_carries_over() {
        let mut rewards = Rewards::new();
        rewards.register(1);
        rewards.add_rewards(10, 3);
        assert_eq!(rewards.available(1, 3), 9);
        rewards.add_rewards(2, 3);
        assert_eq!(rewards.available(1, 3), 12);
    }

    #[test]
    fn test_late_joiner_gets_nothing_from_the_past() {
        let mut rewards = Rewards::new();
        rewards.register(1);
        rewards.add_rewards(100, 10);
        rewards.register(2);
        assert_eq!(rewards.available(2, 10), 0);
        rewards.add_rewards(200, 20);
        assert_eq!(rewards.available(1, 10), 200);
        assert_eq!(rewards.available(2, 10), 100);
    }

    #[test]
    fn test_ineligible_accruals_go_to_pot() {
        let mut rewards = Rewards::new();
        rewards.register(1);
        rewards.add_rewards(100, 10);
        rewards.set_ineligible(1, 10, 50);
        rewards.add_rewards(100, 10);
        assert_eq!(rewards.available(1, 10), 100);
        assert_eq!(rewards.withdraw(1, 10), 100);
        assert_eq!(rewards.withdraw_ineligible(), 100);
        assert_eq!(rewards.withdraw_ineligible(), 0);
    }

    #[test]
    fn test_restore_after_ban_runs_out() {
        let mut rewards = Rewards::new();
        rewards.register(1);
        rewards.set_ineligible(1, 10, 50);
        assert!(!rewards.is_eligible(1));
        assert!(!rewards.can_restore(1, 49));
        assert!(rewards.can_restore(1, 50));
        rewards.restore(1, 10);
        assert!(rewards.is_eligible(1));
        assert!(!rewards.can_restore(1, 60));
        rewards.add_rewards(100, 10);
        assert_eq!(rewards.available(1, 10), 100);
    }

    #[test]
    fn test_longer_ban_is_kept() {
        let mut rewards = Rewards::new();
        rewards.register(1);
        rewards.set_ineligible(1, 0, 100);
        rewards.set_ineligible(1, 0, 40);
        assert_eq!(rewards.ineligible_until(1), 100);
    }

    #[test]
    fn test_empty_pool_keeps_rewards_as_dust() {
        let mut rewards = Rewards::new();
        rewards.add_rewards(50, 0);
        rewards.register(1);
        rewards.add_rewards(50, 10);
        assert_eq!(rewards.available(1, 10), 100);
    }
}
