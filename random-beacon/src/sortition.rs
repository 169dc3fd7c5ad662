//! Weighted operator pool and deterministic group selection.
//!
//! Operators join with a weight derived from their authorized stake. They
//! are never removed: a weight of zero is a soft eviction, and the operator
//! keeps its ID if it comes back.
//!
//! Group selection is weighted sampling without replacement. Cumulative
//! weights live in a Fenwick tree; each pick draws a uniform value below the
//! remaining weight from an HMAC-SHA256 stream keyed by the seed, finds the
//! operator owning that value and zeroes its weight for the rest of the
//! selection. Rejection sampling keeps the draw free of modulo bias and all
//! arithmetic is integer-only, so every node derives the same group.

use {
    crate::{
        error::{BeaconError, Result},
        rewards::Rewards,
        types::OperatorId,
    },
    hmac::{Hmac, Mac},
    log::*,
    sha2::Sha256,
    solana_hash::Hash,
    solana_pubkey::Pubkey,
    std::collections::HashMap,
};

type HmacSha256 = Hmac<Sha256>;

const SELECTION_DOMAIN: &[u8] = b"trv1-beacon:sortition";

/// Sortition weight of `authorized_stake`.
pub fn weight_for(authorized_stake: u128, pool_weight_divisor: u128) -> u64 {
    let weight = authorized_stake.checked_div(pool_weight_divisor).unwrap_or(0);
    u64::try_from(weight).unwrap_or(u64::MAX)
}

/// An operator known to the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOperator {
    pub operator: Pubkey,
    pub id: OperatorId,
    pub authorized_stake: u128,
    pub weight: u64,
}

impl PoolOperator {
    pub fn is_in_pool(&self) -> bool {
        self.weight > 0
    }
}

// ---------------------------------------------------------------------------
// Fenwick tree
// ---------------------------------------------------------------------------

/// Fenwick tree of leaf weights, addressed by 0-based leaf index.
#[derive(Debug, Clone)]
struct WeightTree {
    /// 1-based partial sums; `nodes[0]` is unused.
    nodes: Vec<u128>,
    leaves: Vec<u64>,
}

impl Default for WeightTree {
    fn default() -> Self {
        Self {
            nodes: vec![0],
            leaves: Vec::new(),
        }
    }
}

fn lowest_bit(i: usize) -> usize {
    i & i.wrapping_neg()
}

impl WeightTree {
    fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Sum of the first `count` leaves.
    fn prefix(&self, count: usize) -> u128 {
        let mut sum = 0u128;
        let mut i = count;
        while i > 0 {
            sum = sum.saturating_add(self.nodes[i]);
            i = i.saturating_sub(lowest_bit(i));
        }
        sum
    }

    fn total(&self) -> u128 {
        self.prefix(self.len())
    }

    fn push(&mut self, weight: u64) {
        let i = self.len().saturating_add(1);
        let covered = self
            .prefix(i.saturating_sub(1))
            .saturating_sub(self.prefix(i.saturating_sub(lowest_bit(i))));
        self.nodes.push(covered.saturating_add(u128::from(weight)));
        self.leaves.push(weight);
    }

    fn set(&mut self, index: usize, weight: u64) {
        let old = self.leaves[index];
        self.leaves[index] = weight;
        let mut i = index.saturating_add(1);
        while i <= self.len() {
            self.nodes[i] = if weight >= old {
                self.nodes[i].saturating_add(u128::from(weight.saturating_sub(old)))
            } else {
                self.nodes[i].saturating_sub(u128::from(old.saturating_sub(weight)))
            };
            i = i.saturating_add(lowest_bit(i));
        }
    }

    /// Index of the leaf whose cumulative range contains `value`.
    /// Requires `value < total()`.
    fn find(&self, value: u128) -> usize {
        let mut position = 0usize;
        let mut remaining = value;
        let mut step = self.len().checked_next_power_of_two().unwrap_or(0);
        while step > 0 {
            let next = position.saturating_add(step);
            if next <= self.len() && self.nodes[next] <= remaining {
                position = next;
                remaining = remaining.saturating_sub(self.nodes[next]);
            }
            step >>= 1;
        }
        position
    }
}

// ---------------------------------------------------------------------------
// Seeded draws
// ---------------------------------------------------------------------------

/// Deterministic stream of uniform integers derived from a selection seed.
struct SeedStream {
    mac: HmacSha256,
}

impl SeedStream {
    fn new(seed: &Hash) -> Self {
        let mac = HmacSha256::new_from_slice(seed.as_ref()).expect("HMAC accepts any key length");
        Self { mac }
    }

    fn draw(&self, pick: u32, attempt: u32) -> u128 {
        let mut mac = self.mac.clone();
        mac.update(SELECTION_DOMAIN);
        mac.update(&pick.to_be_bytes());
        mac.update(&attempt.to_be_bytes());
        let digest = mac.finalize().into_bytes();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        u128::from_be_bytes(bytes)
    }

    /// Uniform value in `[0, bound)`. Requires `bound > 0`.
    fn uniform_below(&self, pick: u32, bound: u128) -> u128 {
        // Values below `threshold` would bias the modulo and are redrawn.
        let threshold = bound.wrapping_neg() % bound;
        let mut attempt = 0u32;
        loop {
            let value = self.draw(pick, attempt);
            if value >= threshold {
                return value % bound;
            }
            attempt = attempt.wrapping_add(1);
        }
    }
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// The sortition pool. Operator IDs are leaf indices plus one.
#[derive(Debug, Clone, Default)]
pub struct SortitionPool {
    operators: Vec<PoolOperator>,
    ids: HashMap<Pubkey, OperatorId>,
    tree: WeightTree,
    locked: bool,
    rewards: Rewards,
}

impl SortitionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `operator` with the weight of `authorized_stake`. An operator that
    /// was soft-evicted earlier rejoins under its original ID.
    pub fn insert_operator(
        &mut self,
        operator: Pubkey,
        authorized_stake: u128,
        pool_weight_divisor: u128,
    ) -> Result<OperatorId> {
        if self.locked {
            return Err(BeaconError::PoolLocked);
        }
        if self.is_operator_in_pool(&operator) {
            return Err(BeaconError::AlreadyRegistered(operator));
        }
        let weight = weight_for(authorized_stake, pool_weight_divisor);
        if weight == 0 {
            return Err(BeaconError::InsufficientStake {
                stake: authorized_stake,
            });
        }

        let id = match self.ids.get(&operator) {
            Some(&id) => id,
            None => {
                let id = OperatorId::try_from(self.operators.len().saturating_add(1))
                    .map_err(|_| BeaconError::InsufficientStake {
                        stake: authorized_stake,
                    })?;
                self.operators.push(PoolOperator {
                    operator,
                    id,
                    authorized_stake: 0,
                    weight: 0,
                });
                self.tree.push(0);
                self.ids.insert(operator, id);
                self.rewards.register(id);
                id
            }
        };
        self.set_weight(id, authorized_stake, weight);
        info!("operator {operator:?} joined the sortition pool as {id} with weight {weight}");
        Ok(id)
    }

    /// Recompute the weight of `operator` from `authorized_stake`. Returns
    /// the new weight; zero soft-evicts the operator.
    pub fn update_operator_status(
        &mut self,
        operator: &Pubkey,
        authorized_stake: u128,
        pool_weight_divisor: u128,
    ) -> Result<u64> {
        if self.locked {
            return Err(BeaconError::PoolLocked);
        }
        let id = self
            .operator_id(operator)
            .ok_or(BeaconError::UnknownOperator(*operator))?;
        let weight = weight_for(authorized_stake, pool_weight_divisor);
        self.set_weight(id, authorized_stake, weight);
        debug!("operator {id} weight updated to {weight}");
        Ok(weight)
    }

    fn set_weight(&mut self, id: OperatorId, authorized_stake: u128, weight: u64) {
        let index = Self::index_of(id);
        let Some(entry) = self.operators.get_mut(index) else {
            return;
        };
        self.rewards.settle(id, entry.weight);
        entry.authorized_stake = authorized_stake;
        entry.weight = weight;
        self.tree.set(index, weight);
    }

    fn index_of(id: OperatorId) -> usize {
        usize::try_from(id).unwrap_or(usize::MAX).saturating_sub(1)
    }

    /// Select `group_size` distinct operators for `seed`, in pick order.
    pub fn select_group(&self, group_size: u16, seed: &Hash) -> Result<Vec<OperatorId>> {
        if group_size == 0 {
            return Err(BeaconError::InvalidGroupSize);
        }
        let available = self.eligible_count();
        if available < usize::from(group_size) {
            return Err(BeaconError::PoolEmpty {
                requested: group_size,
                available,
            });
        }

        let stream = SeedStream::new(seed);
        let mut tree = self.tree.clone();
        let mut selected = Vec::with_capacity(usize::from(group_size));
        for pick in 0..u32::from(group_size) {
            let value = stream.uniform_below(pick, tree.total());
            let index = tree.find(value);
            tree.set(index, 0);
            selected.push(self.operators[index].id);
        }
        debug!("selected group {selected:?} for seed {seed:?}");
        Ok(selected)
    }

    // -- locking -------------------------------------------------------------

    /// Freeze weights while a DKG is in progress.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    // -- lookups -------------------------------------------------------------

    pub fn operator_id(&self, operator: &Pubkey) -> Option<OperatorId> {
        self.ids.get(operator).copied()
    }

    pub fn operator(&self, id: OperatorId) -> Option<&PoolOperator> {
        self.operators.get(Self::index_of(id))
    }

    /// Operator addresses for `ids`, or `None` if any ID is unknown.
    pub fn operator_addresses(&self, ids: &[OperatorId]) -> Option<Vec<Pubkey>> {
        ids.iter()
            .map(|&id| self.operator(id).map(|entry| entry.operator))
            .collect()
    }

    pub fn weight_of(&self, operator: &Pubkey) -> u64 {
        self.operator_id(operator)
            .and_then(|id| self.operator(id))
            .map_or(0, |entry| entry.weight)
    }

    pub fn is_operator_in_pool(&self, operator: &Pubkey) -> bool {
        self.weight_of(operator) > 0
    }

    /// Returns true if the pool weight of `operator` reflects
    /// `eligible_stake`. Operators outside the pool are up to date when they
    /// would have no weight anyway.
    pub fn is_operator_up_to_date(
        &self,
        operator: &Pubkey,
        eligible_stake: u128,
        pool_weight_divisor: u128,
    ) -> bool {
        self.weight_of(operator) == weight_for(eligible_stake, pool_weight_divisor)
    }

    /// Number of operators with non-zero weight.
    pub fn eligible_count(&self) -> usize {
        self.operators.iter().filter(|entry| entry.is_in_pool()).count()
    }

    /// Number of operators ever inserted.
    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    pub fn total_weight(&self) -> u128 {
        self.tree.total()
    }

    // -- rewards -------------------------------------------------------------

    /// Spread `amount` over the current pool weight.
    pub fn add_rewards(&mut self, amount: u128) {
        let total_weight = self.total_weight();
        self.rewards.add_rewards(amount, total_weight);
    }

    /// Ban `ids` from rewards until block `until`. Selection is unaffected.
    pub fn set_reward_ineligibility(&mut self, ids: &[OperatorId], until: u64) {
        for &id in ids {
            let weight = self.operator(id).map_or(0, |entry| entry.weight);
            self.rewards.set_ineligible(id, weight, until);
        }
        if !ids.is_empty() {
            info!("operators {ids:?} ineligible for rewards until block {until}");
        }
    }

    pub fn is_eligible_for_rewards(&self, id: OperatorId) -> bool {
        self.rewards.is_eligible(id)
    }

    pub fn reward_ineligible_until(&self, id: OperatorId) -> u64 {
        self.rewards.ineligible_until(id)
    }

    pub fn can_restore_reward_eligibility(&self, id: OperatorId, now: u64) -> bool {
        self.rewards.can_restore(id, now)
    }

    pub fn restore_reward_eligibility(&mut self, operator: &Pubkey, now: u64) -> Result<()> {
        let id = self
            .operator_id(operator)
            .ok_or(BeaconError::UnknownOperator(*operator))?;
        if !self.rewards.can_restore(id, now) {
            return Err(BeaconError::CannotRestoreRewardEligibility(*operator));
        }
        self.rewards.restore(id, self.weight_of(operator));
        Ok(())
    }

    pub fn available_rewards(&self, operator: &Pubkey) -> u128 {
        self.operator_id(operator)
            .map_or(0, |id| self.rewards.available(id, self.weight_of(operator)))
    }

    pub fn withdraw_rewards(&mut self, operator: &Pubkey) -> Result<u128> {
        let id = self
            .operator_id(operator)
            .ok_or(BeaconError::UnknownOperator(*operator))?;
        let weight = self.weight_of(operator);
        Ok(self.rewards.withdraw(id, weight))
    }

    pub fn withdraw_ineligible_rewards(&mut self) -> u128 {
        self.rewards.withdraw_ineligible()
    }

    pub fn ineligible_rewards(&self) -> u128 {
        self.rewards.ineligible_earned()
    }
}
