//! Staking authorization lifecycle for the beacon application.
//!
//! Each staking provider registers one operator. The staking contract tells
//! the beacon when authorization grows or shrinks; decreases must be
//! requested, wait out a delay once the operator refreshed its pool weight,
//! and only then are approved back to the staking contract. A pending
//! decrease lowers the eligible stake immediately.

use {
    crate::{
        config::AuthorizationParameters,
        error::{BeaconError, Result},
    },
    log::*,
    solana_pubkey::Pubkey,
    std::collections::HashMap,
};

/// An authorization decrease waiting for approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingDecrease {
    pub decreasing_by: u128,
    /// Block from which the decrease can be approved. `None` until the
    /// operator refreshed its pool weight after the request.
    pub decreasing_at: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct Authorizations {
    /// Staking provider to operator.
    operators: HashMap<Pubkey, Pubkey>,
    /// Operator to staking provider.
    staking_providers: HashMap<Pubkey, Pubkey>,
    pending: HashMap<Pubkey, PendingDecrease>,
}

impl Authorizations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `operator` to `staking_provider`. The binding is permanent.
    pub fn register_operator(&mut self, staking_provider: Pubkey, operator: Pubkey) -> Result<()> {
        if self.operators.contains_key(&staking_provider) {
            return Err(BeaconError::OperatorAlreadySet(staking_provider));
        }
        if self.staking_providers.contains_key(&operator) {
            return Err(BeaconError::OperatorInUse(operator));
        }
        self.operators.insert(staking_provider, operator);
        self.staking_providers.insert(operator, staking_provider);
        info!("operator {operator:?} registered for staking provider {staking_provider:?}");
        Ok(())
    }

    pub fn operator_of(&self, staking_provider: &Pubkey) -> Option<Pubkey> {
        self.operators.get(staking_provider).copied()
    }

    pub fn staking_provider_of(&self, operator: &Pubkey) -> Option<Pubkey> {
        self.staking_providers.get(operator).copied()
    }

    pub fn pending_decrease(&self, staking_provider: &Pubkey) -> Option<&PendingDecrease> {
        self.pending.get(staking_provider)
    }

    /// `authorized` minus any pending decrease.
    pub fn eligible_stake(&self, staking_provider: &Pubkey, authorized: u128) -> u128 {
        let decreasing_by = self
            .pending
            .get(staking_provider)
            .map_or(0, |pending| pending.decreasing_by);
        authorized.saturating_sub(decreasing_by)
    }

    pub fn authorization_increased(
        &self,
        to_amount: u128,
        params: &AuthorizationParameters,
    ) -> Result<()> {
        if to_amount < params.minimum_authorization {
            return Err(BeaconError::AuthorizationBelowMinimum {
                amount: to_amount,
                minimum: params.minimum_authorization,
            });
        }
        Ok(())
    }

    /// Record a decrease request. Providers whose operator is not in the
    /// pool can be approved right away. Returns the block the decrease is
    /// due at, if already known.
    pub fn authorization_decrease_requested(
        &mut self,
        staking_provider: Pubkey,
        from_amount: u128,
        to_amount: u128,
        operator_in_pool: bool,
        params: &AuthorizationParameters,
        now: u64,
    ) -> Result<Option<u64>> {
        if to_amount >= from_amount {
            return Err(BeaconError::InvalidAuthorizationDecrease {
                from: from_amount,
                to: to_amount,
            });
        }
        if to_amount != 0 && to_amount < params.minimum_authorization {
            return Err(BeaconError::AuthorizationBelowMinimum {
                amount: to_amount,
                minimum: params.minimum_authorization,
            });
        }
        if let Some(PendingDecrease {
            decreasing_at: Some(decreasing_at),
            ..
        }) = self.pending.get(&staking_provider)
        {
            let unlocked_at =
                decreasing_at.saturating_sub(params.authorization_decrease_change_period);
            if now < unlocked_at {
                return Err(BeaconError::AuthorizationDecreaseChangeLocked(unlocked_at));
            }
        }

        let decreasing_at = (!operator_in_pool).then_some(now);
        self.pending.insert(
            staking_provider,
            PendingDecrease {
                decreasing_by: from_amount.saturating_sub(to_amount),
                decreasing_at,
            },
        );
        Ok(decreasing_at)
    }

    /// Start the decrease delay once the operator refreshed its pool weight.
    /// Returns the block the decrease becomes due at.
    pub fn operator_status_updated(
        &mut self,
        staking_provider: &Pubkey,
        params: &AuthorizationParameters,
        now: u64,
    ) -> Option<u64> {
        let pending = self.pending.get_mut(staking_provider)?;
        if pending.decreasing_at.is_none() {
            let due = now.saturating_add(params.authorization_decrease_delay);
            pending.decreasing_at = Some(due);
            debug!("authorization decrease of {staking_provider:?} due at block {due}");
        }
        pending.decreasing_at
    }

    /// Approve the pending decrease. Returns the new authorization.
    pub fn approve_authorization_decrease(
        &mut self,
        staking_provider: &Pubkey,
        authorized: u128,
        now: u64,
    ) -> Result<u128> {
        let pending = self
            .pending
            .get(staking_provider)
            .ok_or(BeaconError::NoPendingAuthorizationDecrease(*staking_provider))?;
        match pending.decreasing_at {
            None => {
                let operator = self.operator_of(staking_provider).unwrap_or(*staking_provider);
                return Err(BeaconError::OperatorNotUpToDate(operator));
            }
            Some(due) if now < due => {
                return Err(BeaconError::AuthorizationDecreaseNotDue(due));
            }
            Some(_) => {}
        }
        let new_authorization = authorized.saturating_sub(pending.decreasing_by);
        self.pending.remove(staking_provider);
        Ok(new_authorization)
    }

    /// The staking contract lowered the authorization on its own. A pending
    /// decrease never exceeds what is left.
    pub fn involuntary_authorization_decrease(&mut self, staking_provider: &Pubkey, to_amount: u128) {
        if let Some(pending) = self.pending.get_mut(staking_provider) {
            pending.decreasing_by = pending.decreasing_by.min(to_amount);
        }
    }
}
