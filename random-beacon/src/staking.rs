//! Staking registry collaborator.
//!
//! The beacon never holds stake itself. It reads the stake each staking
//! provider authorized for the beacon application and asks the registry to
//! seize or slash it when a violation is proven.

use solana_pubkey::Pubkey;
#[cfg(any(test, feature = "dev-context-only-utils"))]
use {log::*, std::collections::HashMap};

/// Errors reported by a staking registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StakingError {
    #[error("unknown staking provider {0:?}")]
    UnknownStakingProvider(Pubkey),
    #[error("staking registry rejected the call: {0}")]
    Rejected(String),
}

/// Interface to the external staking contract.
pub trait StakingRegistry {
    /// Stake `staking_provider` currently authorizes for the beacon.
    fn authorized_stake(&self, staking_provider: &Pubkey) -> u128;

    /// Seize `amount` from every provider and pay `reward_multiplier`
    /// percent of the seized total to `notifier`.
    fn seize(
        &mut self,
        amount: u128,
        reward_multiplier: u8,
        notifier: &Pubkey,
        staking_providers: &[Pubkey],
    ) -> Result<(), StakingError>;

    /// Slash `amount` from every provider without a notifier reward.
    fn slash(&mut self, amount: u128, staking_providers: &[Pubkey]) -> Result<(), StakingError>;

    /// Lower the authorization of `staking_provider` to `new_authorization`
    /// once the beacon approved a pending decrease.
    fn approve_authorization_decrease(
        &mut self,
        staking_provider: &Pubkey,
        new_authorization: u128,
    ) -> Result<(), StakingError>;
}

// ---------------------------------------------------------------------------
// In-memory registry
// ---------------------------------------------------------------------------

/// Staking registry kept in memory, for tests and local simulations.
///
/// Seizing and slashing are all-or-nothing: unknown providers fail the whole
/// call before any stake moves. Providers with less authorization than the
/// amount lose what they have.
#[cfg(any(test, feature = "dev-context-only-utils"))]
#[derive(Debug, Default)]
pub struct InMemoryStaking {
    authorized: HashMap<Pubkey, u128>,
    notifier_rewards: HashMap<Pubkey, u128>,
    total_slashed: u128,
    failing: bool,
}

#[cfg(any(test, feature = "dev-context-only-utils"))]
impl InMemoryStaking {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_authorized_stake(&mut self, staking_provider: Pubkey, amount: u128) {
        self.authorized.insert(staking_provider, amount);
    }

    /// Make every seize and slash call fail until cleared.
    pub fn set_failing(&mut self, failing: bool) {
        self.failing = failing;
    }

    /// Total stake removed by seize and slash calls.
    pub fn total_slashed(&self) -> u128 {
        self.total_slashed
    }

    /// Rewards paid to `notifier` so far.
    pub fn notifier_reward(&self, notifier: &Pubkey) -> u128 {
        self.notifier_rewards.get(notifier).copied().unwrap_or(0)
    }

    fn take(&mut self, amount: u128, staking_providers: &[Pubkey]) -> Result<u128, StakingError> {
        if self.failing {
            return Err(StakingError::Rejected("registry unavailable".to_string()));
        }
        if let Some(unknown) = staking_providers
            .iter()
            .find(|provider| !self.authorized.contains_key(provider))
        {
            return Err(StakingError::UnknownStakingProvider(*unknown));
        }
        let mut taken = 0u128;
        for provider in staking_providers {
            if let Some(authorized) = self.authorized.get_mut(provider) {
                let slashed = amount.min(*authorized);
                *authorized = authorized.saturating_sub(slashed);
                taken = taken.saturating_add(slashed);
            }
        }
        self.total_slashed = self.total_slashed.saturating_add(taken);
        Ok(taken)
    }
}

#[cfg(any(test, feature = "dev-context-only-utils"))]
impl StakingRegistry for InMemoryStaking {
    fn authorized_stake(&self, staking_provider: &Pubkey) -> u128 {
        self.authorized.get(staking_provider).copied().unwrap_or(0)
    }

    fn seize(
        &mut self,
        amount: u128,
        reward_multiplier: u8,
        notifier: &Pubkey,
        staking_providers: &[Pubkey],
    ) -> Result<(), StakingError> {
        let taken = self.take(amount, staking_providers)?;
        let reward = taken / 100 * u128::from(reward_multiplier);
        let entry = self.notifier_rewards.entry(*notifier).or_default();
        *entry = entry.saturating_add(reward);
        debug!("seized {taken} from {} providers", staking_providers.len());
        Ok(())
    }

    fn slash(&mut self, amount: u128, staking_providers: &[Pubkey]) -> Result<(), StakingError> {
        let taken = self.take(amount, staking_providers)?;
        debug!("slashed {taken} from {} providers", staking_providers.len());
        Ok(())
    }

    fn approve_authorization_decrease(
        &mut self,
        staking_provider: &Pubkey,
        new_authorization: u128,
    ) -> Result<(), StakingError> {
        let authorized = self
            .authorized
            .get_mut(staking_provider)
            .ok_or(StakingError::UnknownStakingProvider(*staking_provider))?;
        if new_authorization > *authorized {
            return Err(StakingError::Rejected(format!(
                "decrease to {new_authorization} exceeds authorization {authorized}"
            )));
        }
        *authorized = new_authorization;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, assert_matches::assert_matches};

    fn provider(seed: u8) -> Pubkey {
        Pubkey::new_from_array([seed; 32])
    }

    #[test]
    fn test_seize_pays_notifier() {
        let mut staking = InMemoryStaking::new();
        staking.set_authorized_stake(provider(1), 1_000);
        staking.set_authorized_stake(provider(2), 1_000);
        staking
            .seize(100, 40, &provider(9), &[provider(1), provider(2)])
            .unwrap();
        assert_eq!(staking.authorized_stake(&provider(1)), 900);
        assert_eq!(staking.authorized_stake(&provider(2)), 900);
        assert_eq!(staking.total_slashed(), 200);
        assert_eq!(staking.notifier_reward(&provider(9)), 80);
    }

    #[test]
    fn test_slash_caps_at_authorization() {
        let mut staking = InMemoryStaking::new();
        staking.set_authorized_stake(provider(1), 30);
        staking.slash(100, &[provider(1)]).unwrap();
        assert_eq!(staking.authorized_stake(&provider(1)), 0);
        assert_eq!(staking.total_slashed(), 30);
    }

    #[test]
    fn test_unknown_provider_moves_nothing() {
        let mut staking = InMemoryStaking::new();
        staking.set_authorized_stake(provider(1), 1_000);
        assert_matches!(
            staking.slash(100, &[provider(1), provider(2)]),
            Err(StakingError::UnknownStakingProvider(_))
        );
        assert_eq!(staking.authorized_stake(&provider(1)), 1_000);
        assert_eq!(staking.total_slashed(), 0);
    }

    #[test]
    fn test_failing_registry() {
        let mut staking = InMemoryStaking::new();
        staking.set_authorized_stake(provider(1), 1_000);
        staking.set_failing(true);
        assert_matches!(
            staking.seize(1, 100, &provider(9), &[provider(1)]),
            Err(StakingError::Rejected(_))
        );
        staking.set_failing(false);
        assert!(staking.seize(1, 100, &provider(9), &[provider(1)]).is_ok());
    }

    #[test]
    fn test_approve_authorization_decrease() {
        let mut staking = InMemoryStaking::new();
        staking.set_authorized_stake(provider(1), 1_000);
        staking
            .approve_authorization_decrease(&provider(1), 400)
            .unwrap();
        assert_eq!(staking.authorized_stake(&provider(1)), 400);
        assert_matches!(
            staking.approve_authorization_decrease(&provider(1), 500),
            Err(StakingError::Rejected(_))
        );
    }
}
