//! The random beacon facade.
//!
//! [`RandomBeacon`] exposes every beacon operation on top of a [`Ledger`]
//! and a [`StakingRegistry`]. Each write operation runs as one transaction:
//!
//! 1. copy the storage owned by the ledger,
//! 2. apply the transition to the copy, collecting its effects in order,
//! 3. on success commit the copy, then emit events, execute slash orders
//!    and invoke callbacks in the order they were produced.
//!
//! A failed transition leaves storage untouched and emits nothing. Slashing
//! and callbacks run after commit and can only add `*Failed` events.

use {
    crate::{
        authorization::PendingDecrease,
        config::{
            AuthorizationParameters, GovernanceParameters, GroupCreationParameters,
            RelayEntryParameters, RewardParameters, SlashingParameters,
        },
        crypto::hashv,
        dkg::DkgState,
        error::{BeaconError, Result},
        events::BeaconEvent,
        ledger::{BeaconStorage, Ledger},
        relay::{verify_unauthorized_signing, RelayState},
        slashing::{relay_entry_delay_penalty, NotifierReward, SlashOrder, SlashingEngine, Violation},
        sortition::SortitionPool,
        staking::StakingRegistry,
        types::{
            DkgResult, Group, GroupId, InactivityClaim, OperatorId, RelayEntryRequest, RequestId,
            GENESIS_SEED,
        },
    },
    log::*,
    solana_hash::Hash,
    solana_pubkey::Pubkey,
};

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// Deferred consequence of a transition, applied after commit.
#[derive(Debug)]
enum Effect {
    Emit(BeaconEvent),
    Slash(SlashOrder),
    Callback {
        consumer: Pubkey,
        entry: Vec<u8>,
        block: u64,
    },
}

/// Working state of one transaction.
struct Transaction<'a, S: ?Sized> {
    storage: BeaconStorage,
    staking: &'a mut S,
    now: u64,
    randomness: Hash,
    effects: Vec<Effect>,
}

impl<S: StakingRegistry + ?Sized> Transaction<'_, S> {
    fn emit(&mut self, event: BeaconEvent) {
        self.effects.push(Effect::Emit(event));
    }

    fn slash(&mut self, order: SlashOrder) {
        self.effects.push(Effect::Slash(order));
    }

    fn require_governance(&self, caller: &Pubkey) -> Result<()> {
        if *caller != self.storage.governance {
            return Err(BeaconError::NotGovernance(*caller));
        }
        Ok(())
    }

    fn require_staking_contract(&self, caller: &Pubkey) -> Result<()> {
        if *caller != self.storage.staking_contract {
            return Err(BeaconError::NotStakingContract(*caller));
        }
        Ok(())
    }

    fn pool_weight_divisor(&self) -> u128 {
        self.storage.params.pool_weight_divisor.0
    }

    fn staking_provider_of(&self, operator: &Pubkey) -> Result<Pubkey> {
        self.storage
            .authorizations
            .staking_provider_of(operator)
            .ok_or(BeaconError::OperatorNotRegistered(*operator))
    }

    fn eligible_stake(&self, staking_provider: &Pubkey) -> u128 {
        let authorized = self.staking.authorized_stake(staking_provider);
        self.storage
            .authorizations
            .eligible_stake(staking_provider, authorized)
    }

    /// Check `members` against the group commitment and resolve their
    /// operator keys.
    fn group_members(&self, group_id: GroupId, members: &[OperatorId]) -> Result<(Group, Vec<Pubkey>)> {
        let group = self
            .storage
            .groups
            .validate_members(group_id, members)?
            .clone();
        let keys = self
            .storage
            .pool
            .operator_addresses(members)
            .ok_or(BeaconError::InvalidGroupMembers)?;
        Ok((group, keys))
    }

    fn staking_providers_of(&self, operators: &[Pubkey]) -> Vec<Pubkey> {
        operators
            .iter()
            .filter_map(|operator| self.storage.authorizations.staking_provider_of(operator))
            .collect()
    }

    /// Start the decrease delay of a pending request once the operator's pool
    /// weight reflects it.
    fn activate_pending_decrease(&mut self, staking_provider: Pubkey, operator: Pubkey) {
        let was_waiting = self
            .storage
            .authorizations
            .pending_decrease(&staking_provider)
            .is_some_and(|pending| pending.decreasing_at.is_none());
        if !was_waiting {
            return;
        }
        let params = self.storage.params.authorization.clone();
        let Some(decreasing_at) =
            self.storage
                .authorizations
                .operator_status_updated(&staking_provider, &params, self.now)
        else {
            return;
        };
        let from_amount = self.staking.authorized_stake(&staking_provider);
        let to_amount = self.eligible_stake(&staking_provider);
        self.emit(BeaconEvent::AuthorizationDecreaseRequested {
            staking_provider,
            operator,
            from_amount,
            to_amount,
            decreasing_at,
        });
    }

    fn start_dkg(&mut self, seed: Hash) -> Result<()> {
        self.storage.dkg.start(seed, self.now)?;
        self.emit(BeaconEvent::DkgStarted { seed });
        Ok(())
    }

    fn lock_dkg(&mut self) -> Result<()> {
        self.storage.dkg.lock(self.now)?;
        self.storage.pool.lock();
        self.emit(BeaconEvent::DkgStateLocked);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Facade
// ---------------------------------------------------------------------------

pub struct RandomBeacon<L, S> {
    ledger: L,
    staking: S,
}

impl<L: Ledger, S: StakingRegistry> RandomBeacon<L, S> {
    pub fn new(ledger: L, staking: S) -> Self {
        Self { ledger, staking }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    pub fn staking(&self) -> &S {
        &self.staking
    }

    pub fn staking_mut(&mut self) -> &mut S {
        &mut self.staking
    }

    fn storage(&self) -> &BeaconStorage {
        self.ledger.storage()
    }

    fn now(&self) -> u64 {
        self.ledger.block_height()
    }

    fn transact<T>(
        &mut self,
        operation: impl FnOnce(&mut Transaction<'_, S>) -> Result<T>,
    ) -> Result<T> {
        let now = self.ledger.block_height();
        let mut tx = Transaction {
            storage: self.ledger.storage().clone(),
            staking: &mut self.staking,
            now,
            randomness: self.ledger.randomness(),
            effects: Vec::new(),
        };
        let value = operation(&mut tx)?;
        let Transaction {
            storage, effects, ..
        } = tx;
        self.ledger.commit(storage);
        self.apply_effects(effects);
        Ok(value)
    }

    fn apply_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Emit(event) => self.ledger.emit(event),
                Effect::Slash(order) => {
                    let event = SlashingEngine::execute(&mut self.staking, &order);
                    self.ledger.emit(event);
                }
                Effect::Callback {
                    consumer,
                    entry,
                    block,
                } => {
                    if let Err(err) = self.ledger.invoke_callback(&consumer, &entry, block) {
                        warn!("relay entry callback failed: {err}");
                        self.ledger.emit(BeaconEvent::CallbackFailed {
                            entry,
                            entry_submitted_block: block,
                        });
                    }
                }
            }
        }
    }

    // -- operators -----------------------------------------------------------

    /// Bind `operator` to `staking_provider`.
    pub fn register_operator(&mut self, staking_provider: Pubkey, operator: Pubkey) -> Result<()> {
        self.transact(|tx| {
            tx.storage
                .authorizations
                .register_operator(staking_provider, operator)?;
            tx.emit(BeaconEvent::OperatorRegistered {
                staking_provider,
                operator,
            });
            Ok(())
        })
    }

    /// Join the sortition pool with the operator's eligible stake.
    pub fn insert_operator(&mut self, operator: Pubkey) -> Result<OperatorId> {
        self.transact(|tx| {
            let staking_provider = tx.staking_provider_of(&operator)?;
            let eligible = tx.eligible_stake(&staking_provider);
            let divisor = tx.pool_weight_divisor();
            let id = tx
                .storage
                .pool
                .insert_operator(operator, eligible, divisor)?;
            tx.emit(BeaconEvent::OperatorJoinedSortitionPool {
                staking_provider,
                operator,
            });
            tx.activate_pending_decrease(staking_provider, operator);
            Ok(id)
        })
    }

    /// Refresh the operator's pool weight from its eligible stake.
    pub fn update_operator_status(&mut self, operator: Pubkey) -> Result<()> {
        self.transact(|tx| {
            let staking_provider = tx.staking_provider_of(&operator)?;
            let eligible = tx.eligible_stake(&staking_provider);
            let divisor = tx.pool_weight_divisor();
            if tx.storage.pool.is_operator_in_pool(&operator) {
                tx.storage
                    .pool
                    .update_operator_status(&operator, eligible, divisor)?;
            }
            tx.emit(BeaconEvent::OperatorStatusUpdated {
                staking_provider,
                operator,
            });
            tx.activate_pending_decrease(staking_provider, operator);
            Ok(())
        })
    }

    // -- authorization -------------------------------------------------------

    pub fn authorization_increased(
        &mut self,
        caller: Pubkey,
        staking_provider: Pubkey,
        from_amount: u128,
        to_amount: u128,
    ) -> Result<()> {
        self.transact(|tx| {
            tx.require_staking_contract(&caller)?;
            tx.storage
                .authorizations
                .authorization_increased(to_amount, &tx.storage.params.authorization)?;
            let operator = tx
                .storage
                .authorizations
                .operator_of(&staking_provider)
                .unwrap_or_default();
            tx.emit(BeaconEvent::AuthorizationIncreased {
                staking_provider,
                operator,
                from_amount,
                to_amount,
            });
            Ok(())
        })
    }

    pub fn authorization_decrease_requested(
        &mut self,
        caller: Pubkey,
        staking_provider: Pubkey,
        from_amount: u128,
        to_amount: u128,
    ) -> Result<()> {
        self.transact(|tx| {
            tx.require_staking_contract(&caller)?;
            let operator = tx.storage.authorizations.operator_of(&staking_provider);
            let in_pool = operator
                .is_some_and(|operator| tx.storage.pool.is_operator_in_pool(&operator));
            let params = tx.storage.params.authorization.clone();
            let decreasing_at = tx.storage.authorizations.authorization_decrease_requested(
                staking_provider,
                from_amount,
                to_amount,
                in_pool,
                &params,
                tx.now,
            )?;
            tx.emit(BeaconEvent::AuthorizationDecreaseRequested {
                staking_provider,
                operator: operator.unwrap_or_default(),
                from_amount,
                to_amount,
                decreasing_at: decreasing_at.unwrap_or(u64::MAX),
            });
            Ok(())
        })
    }

    /// Approve a due decrease and apply it in the staking registry.
    pub fn approve_authorization_decrease(&mut self, staking_provider: Pubkey) -> Result<()> {
        self.transact(|tx| {
            if let Some(operator) = tx.storage.authorizations.operator_of(&staking_provider) {
                let eligible = tx.eligible_stake(&staking_provider);
                let divisor = tx.pool_weight_divisor();
                if tx.storage.pool.is_operator_in_pool(&operator)
                    && !tx
                        .storage
                        .pool
                        .is_operator_up_to_date(&operator, eligible, divisor)
                {
                    return Err(BeaconError::OperatorNotUpToDate(operator));
                }
            }
            let authorized = tx.staking.authorized_stake(&staking_provider);
            let new_authorization = tx.storage.authorizations.approve_authorization_decrease(
                &staking_provider,
                authorized,
                tx.now,
            )?;
            tx.staking
                .approve_authorization_decrease(&staking_provider, new_authorization)?;
            tx.emit(BeaconEvent::AuthorizationDecreaseApproved { staking_provider });
            Ok(())
        })
    }

    /// The staking contract lowered the authorization on its own, e.g. after
    /// slashing. The pool weight follows at once unless DKG holds the lock.
    pub fn involuntary_authorization_decrease(
        &mut self,
        caller: Pubkey,
        staking_provider: Pubkey,
        from_amount: u128,
        to_amount: u128,
    ) -> Result<()> {
        self.transact(|tx| {
            tx.require_staking_contract(&caller)?;
            tx.storage
                .authorizations
                .involuntary_authorization_decrease(&staking_provider, to_amount);
            let operator = tx.storage.authorizations.operator_of(&staking_provider);
            if let Some(operator) = operator {
                if !tx.storage.pool.is_locked() && tx.storage.pool.is_operator_in_pool(&operator) {
                    let eligible = tx
                        .storage
                        .authorizations
                        .eligible_stake(&staking_provider, to_amount);
                    let divisor = tx.pool_weight_divisor();
                    tx.storage
                        .pool
                        .update_operator_status(&operator, eligible, divisor)?;
                }
            }
            tx.emit(BeaconEvent::InvoluntaryAuthorizationDecreased {
                staking_provider,
                operator: operator.unwrap_or_default(),
                from_amount,
                to_amount,
            });
            Ok(())
        })
    }

    // -- group creation ------------------------------------------------------

    /// Start the first DKG. Governance only, and only while no group exists.
    pub fn genesis(&mut self, caller: Pubkey) -> Result<()> {
        self.transact(|tx| {
            tx.require_governance(&caller)?;
            if !tx.storage.groups.is_empty() {
                return Err(BeaconError::GenesisAlreadyPerformed);
            }
            tx.lock_dkg()?;
            let seed = hashv(&[
                GENESIS_SEED.as_slice(),
                tx.randomness.as_ref(),
                &tx.now.to_be_bytes(),
            ]);
            tx.start_dkg(seed)
        })
    }

    pub fn submit_dkg_result(&mut self, submitter: Pubkey, result: DkgResult) -> Result<Hash> {
        self.transact(|tx| {
            let params = tx.storage.params.clone();
            let result_hash = tx.storage.dkg.submit_result(
                &result,
                &submitter,
                &tx.storage.pool,
                &params,
                tx.now,
            )?;
            let seed = tx.storage.dkg.seed().unwrap_or_default();
            tx.emit(BeaconEvent::DkgResultSubmitted {
                result_hash,
                seed,
                result,
            });
            Ok(result_hash)
        })
    }

    /// Challenge the submitted result. A justified challenge slashes the
    /// submitter and waits for a new seed.
    pub fn challenge_dkg_result(&mut self, challenger: Pubkey, result: &DkgResult) -> Result<()> {
        self.transact(|tx| {
            let params = tx.storage.params.clone();
            let outcome = tx.storage.dkg.challenge_result(
                result,
                &tx.storage.pool,
                &tx.storage.groups,
                &params,
                tx.now,
            )?;
            tx.emit(BeaconEvent::DkgResultChallenged {
                result_hash: outcome.result_hash,
                challenger,
                reason: outcome.reason.to_string(),
            });
            let operators = vec![outcome.submitter];
            let staking_providers = tx.staking_providers_of(&operators);
            let order = tx.storage.slashing.resolve(
                Violation::MaliciousDkgResult {
                    result_hash: outcome.result_hash,
                },
                params.slashing.malicious_dkg_result_slashing_amount,
                Some(NotifierReward {
                    notifier: challenger,
                    multiplier: params.reward.dkg_malicious_result_notification_reward_multiplier,
                }),
                operators,
                staking_providers,
            )?;
            tx.slash(order);
            Ok(())
        })
    }

    /// Approve the submitted result and register its group. Returns the new
    /// group ID.
    pub fn approve_dkg_result(&mut self, approver: Pubkey, result: &DkgResult) -> Result<GroupId> {
        self.transact(|tx| {
            let params = tx.storage.params.clone();
            let approved = tx
                .storage
                .dkg
                .approve_result(result, &approver, &params, tx.now)?;
            let group_id = tx.storage.groups.add_group(
                result.group_pub_key.clone(),
                result.members_hash,
                tx.now,
            )?;
            let until = tx
                .now
                .saturating_add(params.reward.sortition_pool_rewards_ban_duration);
            tx.storage
                .pool
                .set_reward_ineligibility(&approved.misbehaved, until);
            tx.storage.pool.unlock();
            tx.emit(BeaconEvent::DkgResultApproved {
                result_hash: approved.result_hash,
                approver,
            });
            tx.emit(BeaconEvent::GroupRegistered {
                group_id,
                group_pub_key: result.group_pub_key.clone(),
            });
            Ok(group_id)
        })
    }

    pub fn notify_dkg_timeout(&mut self) -> Result<()> {
        self.transact(|tx| {
            let params = tx.storage.params.clone();
            tx.storage.dkg.notify_timeout(&params, tx.now)?;
            tx.storage.pool.unlock();
            tx.emit(BeaconEvent::DkgTimedOut);
            Ok(())
        })
    }

    pub fn notify_seed_timeout(&mut self) -> Result<()> {
        self.transact(|tx| {
            let params = tx.storage.params.clone();
            tx.storage.dkg.notify_seed_timeout(&params, tx.now)?;
            tx.storage.pool.unlock();
            tx.emit(BeaconEvent::DkgSeedTimedOut);
            Ok(())
        })
    }

    // -- relay entries -------------------------------------------------------

    /// Request a new relay entry. Every `group_creation_frequency`-th request
    /// also locks the DKG so the entry seeds a new group.
    pub fn request_relay_entry(
        &mut self,
        requester: Pubkey,
        callback: Option<Pubkey>,
    ) -> Result<RequestId> {
        self.transact(|tx| {
            if !tx.storage.authorized_requesters.contains(&requester) {
                return Err(BeaconError::UnauthorizedRequester(requester));
            }
            let lifetime = tx.storage.params.group_creation.group_lifetime;
            let request =
                tx.storage
                    .relay
                    .request(&tx.storage.groups, lifetime, callback, tx.now)?;
            tx.emit(BeaconEvent::RelayEntryRequested {
                request_id: request.request_id,
                group_id: request.group_id,
                previous_entry: request.previous_entry.clone(),
            });
            let frequency = tx.storage.params.group_creation.group_creation_frequency;
            if request.request_id % frequency.max(1) == 0 && tx.storage.dkg.is_idle() {
                tx.lock_dkg()?;
            }
            Ok(request.request_id)
        })
    }

    /// Submit the group's signature for the request in flight.
    pub fn submit_relay_entry(
        &mut self,
        submitter: Pubkey,
        entry: Vec<u8>,
        group_members: &[OperatorId],
    ) -> Result<()> {
        self.transact(|tx| {
            let group_id = tx
                .storage
                .relay
                .current_request()
                .map(|request| request.group_id)
                .ok_or(BeaconError::NoPendingRequest)?;
            let (group, members) = tx.group_members(group_id, group_members)?;
            if group.terminated {
                return Err(BeaconError::GroupTerminated(group_id));
            }
            if !members.contains(&submitter) {
                return Err(BeaconError::NotGroupMember(submitter));
            }
            let params = tx.storage.params.clone();
            let accepted = tx.storage.relay.submit(
                &entry,
                &group.group_pub_key,
                &params.relay_entry,
                tx.now,
            )?;
            let request_id = accepted.request.request_id;

            let penalty =
                relay_entry_delay_penalty(accepted.blocks_late, &params.relay_entry, &params.slashing);
            if penalty > 0 {
                let staking_providers = tx.staking_providers_of(&members);
                let order = tx.storage.slashing.resolve(
                    Violation::RelayEntryDelay { request_id },
                    penalty,
                    None,
                    members,
                    staking_providers,
                )?;
                tx.slash(order);
            }

            tx.emit(BeaconEvent::RelayEntrySubmitted {
                request_id,
                submitter,
                entry: entry.clone(),
            });
            if let Some(consumer) = accepted.request.callback {
                tx.effects.push(Effect::Callback {
                    consumer,
                    entry: entry.clone(),
                    block: tx.now,
                });
            }
            if tx.storage.dkg.is_awaiting_seed() {
                tx.start_dkg(hashv(&[entry.as_slice()]))?;
            }
            Ok(())
        })
    }

    /// Close a request that passed its hard timeout, slash the group and
    /// terminate it.
    pub fn report_relay_entry_timeout(
        &mut self,
        reporter: Pubkey,
        group_members: &[OperatorId],
    ) -> Result<()> {
        self.transact(|tx| {
            let group_id = tx
                .storage
                .relay
                .current_request()
                .map(|request| request.group_id)
                .ok_or(BeaconError::NoPendingRequest)?;
            let (group, members) = tx.group_members(group_id, group_members)?;
            let params = tx.storage.params.clone();
            let request = tx
                .storage
                .relay
                .report_timeout(&params.relay_entry, tx.now)?;

            let staking_providers = tx.staking_providers_of(&members);
            let order = tx.storage.slashing.resolve(
                Violation::RelayEntryTimeout {
                    request_id: request.request_id,
                },
                params.slashing.relay_entry_submission_failure_slashing_amount,
                Some(NotifierReward {
                    notifier: reporter,
                    multiplier: params.reward.relay_entry_timeout_notification_reward_multiplier,
                }),
                members,
                staking_providers,
            )?;
            tx.slash(order);
            if !group.terminated {
                tx.storage.groups.terminate(group_id)?;
            }
            tx.emit(BeaconEvent::RelayEntryTimedOut {
                request_id: request.request_id,
                terminated_group_id: group_id,
            });
            Ok(())
        })
    }

    /// Prove that a group signed the reporter's identity outside the
    /// protocol. The group is slashed and terminated.
    pub fn report_unauthorized_signing(
        &mut self,
        reporter: Pubkey,
        signed_msg_sender: &[u8],
        group_id: GroupId,
        group_members: &[OperatorId],
    ) -> Result<()> {
        self.transact(|tx| {
            let (group, members) = tx.group_members(group_id, group_members)?;
            verify_unauthorized_signing(&group, &reporter, signed_msg_sender)?;
            let params = tx.storage.params.clone();
            let staking_providers = tx.staking_providers_of(&members);
            let order = tx.storage.slashing.resolve(
                Violation::UnauthorizedSigning { group_id },
                params.slashing.unauthorized_signing_slashing_amount,
                Some(NotifierReward {
                    notifier: reporter,
                    multiplier: params.reward.unauthorized_signing_notification_reward_multiplier,
                }),
                members,
                staking_providers,
            )?;
            tx.slash(order);
            tx.storage.groups.terminate(group_id)?;
            if let Some(request) = tx.storage.relay.abandon(group_id) {
                tx.emit(BeaconEvent::RelayEntryTimedOut {
                    request_id: request.request_id,
                    terminated_group_id: group_id,
                });
            }
            Ok(())
        })
    }

    // -- inactivity ----------------------------------------------------------

    /// Ban the members a group declared inactive from rewards.
    pub fn notify_operator_inactivity(
        &mut self,
        notifier: Pubkey,
        claim: &InactivityClaim,
        group_members: &[OperatorId],
    ) -> Result<()> {
        self.transact(|tx| {
            let (group, members) = tx.group_members(claim.group_id, group_members)?;
            if group.terminated {
                return Err(BeaconError::GroupTerminated(group.group_id));
            }
            let params = tx.storage.params.clone();
            if group.is_expired(tx.now, params.group_creation.group_lifetime) {
                return Err(BeaconError::GroupExpired(group.group_id));
            }
            let inactive = tx.storage.inactivity.accept(
                claim,
                &group.group_pub_key,
                &members,
                params.group_creation.group_threshold,
            )?;
            let ids: Vec<OperatorId> = inactive
                .into_iter()
                .filter_map(|position| group_members.get(position).copied())
                .collect();
            let until = tx
                .now
                .saturating_add(params.reward.sortition_pool_rewards_ban_duration);
            tx.storage.pool.set_reward_ineligibility(&ids, until);
            tx.emit(BeaconEvent::InactivityClaimed {
                group_id: claim.group_id,
                nonce: claim.nonce,
                notifier,
            });
            Ok(())
        })
    }

    // -- rewards -------------------------------------------------------------

    /// Distribute `amount` over the pool weight.
    pub fn add_rewards(&mut self, amount: u128) -> Result<()> {
        self.transact(|tx| {
            tx.storage.pool.add_rewards(amount);
            tx.emit(BeaconEvent::RewardsAdded { amount });
            Ok(())
        })
    }

    /// Withdraw the rewards of the provider's operator.
    pub fn withdraw_rewards(&mut self, staking_provider: Pubkey) -> Result<u128> {
        self.transact(|tx| {
            let operator = tx
                .storage
                .authorizations
                .operator_of(&staking_provider)
                .ok_or(BeaconError::UnknownStakingProvider(staking_provider))?;
            let amount = tx.storage.pool.withdraw_rewards(&operator)?;
            tx.emit(BeaconEvent::RewardsWithdrawn {
                staking_provider,
                amount,
            });
            Ok(amount)
        })
    }

    pub fn withdraw_ineligible_rewards(&mut self, caller: Pubkey, recipient: Pubkey) -> Result<u128> {
        self.transact(|tx| {
            tx.require_governance(&caller)?;
            let amount = tx.storage.pool.withdraw_ineligible_rewards();
            tx.emit(BeaconEvent::IneligibleRewardsWithdrawn { recipient, amount });
            Ok(amount)
        })
    }

    pub fn restore_reward_eligibility(&mut self, operator: Pubkey) -> Result<()> {
        self.transact(|tx| {
            tx.storage
                .pool
                .restore_reward_eligibility(&operator, tx.now)?;
            tx.emit(BeaconEvent::RewardEligibilityRestored { operator });
            Ok(())
        })
    }

    // -- governance ----------------------------------------------------------

    pub fn update_parameters(&mut self, caller: Pubkey, params: GovernanceParameters) -> Result<()> {
        self.transact(|tx| {
            tx.require_governance(&caller)?;
            params.validate()?;
            if params.group_creation != tx.storage.params.group_creation
                && !tx.storage.dkg.is_idle()
            {
                return Err(BeaconError::InvalidDkgState(
                    tx.storage.dkg.state_at(tx.now, &tx.storage.params),
                ));
            }
            tx.storage.params = params;
            tx.emit(BeaconEvent::ParametersUpdated);
            Ok(())
        })
    }

    pub fn set_requester_authorization(
        &mut self,
        caller: Pubkey,
        requester: Pubkey,
        is_authorized: bool,
    ) -> Result<()> {
        self.transact(|tx| {
            tx.require_governance(&caller)?;
            if is_authorized {
                tx.storage.authorized_requesters.insert(requester);
            } else {
                tx.storage.authorized_requesters.remove(&requester);
            }
            tx.emit(BeaconEvent::RequesterAuthorizationUpdated {
                requester,
                is_authorized,
            });
            Ok(())
        })
    }

    // -- reads ---------------------------------------------------------------

    pub fn sortition_pool(&self) -> &SortitionPool {
        &self.storage().pool
    }

    pub fn select_group_with_size(&self, group_size: u16, seed: &Hash) -> Result<Vec<OperatorId>> {
        self.storage().pool.select_group(group_size, seed)
    }

    /// Select a group of the configured size.
    pub fn select_group(&self, seed: &Hash) -> Result<Vec<OperatorId>> {
        let group_size = self.storage().params.group_creation.group_size;
        self.select_group_with_size(group_size, seed)
    }

    pub fn group(&self, group_id: GroupId) -> Option<&Group> {
        self.storage().groups.get(group_id)
    }

    pub fn group_by_pub_key(&self, group_pub_key: &[u8]) -> Option<&Group> {
        self.storage().groups.get_by_pub_key(group_pub_key)
    }

    pub fn number_of_active_groups(&self) -> usize {
        let lifetime = self.storage().params.group_creation.group_lifetime;
        self.storage()
            .groups
            .number_of_active_groups(self.now(), lifetime)
    }

    pub fn group_creation_state(&self) -> DkgState {
        self.storage().dkg.state_at(self.now(), &self.storage().params)
    }

    /// Seed of the DKG in progress.
    pub fn dkg_seed(&self) -> Option<Hash> {
        self.storage().dkg.seed()
    }

    pub fn dkg_start_block(&self) -> Option<u64> {
        self.storage().dkg.start_block()
    }

    pub fn relay_entry_state(&self) -> RelayState {
        self.storage()
            .relay
            .state_at(self.now(), &self.storage().params.relay_entry)
    }

    pub fn current_request(&self) -> Option<&RelayEntryRequest> {
        self.storage().relay.current_request()
    }

    pub fn previous_entry(&self) -> &[u8] {
        self.storage().relay.previous_entry()
    }

    pub fn operator_id(&self, operator: &Pubkey) -> Option<OperatorId> {
        self.storage().pool.operator_id(operator)
    }

    pub fn is_operator_in_pool(&self, operator: &Pubkey) -> bool {
        self.storage().pool.is_operator_in_pool(operator)
    }

    /// Returns true if the operator's pool weight reflects its eligible
    /// stake.
    pub fn is_operator_up_to_date(&self, operator: &Pubkey) -> Result<bool> {
        let staking_provider = self
            .storage()
            .authorizations
            .staking_provider_of(operator)
            .ok_or(BeaconError::OperatorNotRegistered(*operator))?;
        let eligible = self.eligible_stake(&staking_provider);
        let divisor = self.storage().params.pool_weight_divisor.0;
        Ok(self
            .storage()
            .pool
            .is_operator_up_to_date(operator, eligible, divisor))
    }

    /// Authorized stake minus any pending decrease.
    pub fn eligible_stake(&self, staking_provider: &Pubkey) -> u128 {
        let authorized = self.staking.authorized_stake(staking_provider);
        self.storage()
            .authorizations
            .eligible_stake(staking_provider, authorized)
    }

    pub fn pending_authorization_decrease(
        &self,
        staking_provider: &Pubkey,
    ) -> Option<PendingDecrease> {
        self.storage()
            .authorizations
            .pending_decrease(staking_provider)
            .copied()
    }

    /// Rewards the provider's operator can withdraw.
    pub fn available_rewards(&self, staking_provider: &Pubkey) -> u128 {
        self.storage()
            .authorizations
            .operator_of(staking_provider)
            .map_or(0, |operator| self.storage().pool.available_rewards(&operator))
    }

    pub fn is_eligible_for_rewards(&self, operator: &Pubkey) -> bool {
        self.operator_id(operator)
            .is_some_and(|id| self.storage().pool.is_eligible_for_rewards(id))
    }

    pub fn can_restore_reward_eligibility(&self, operator: &Pubkey) -> bool {
        self.operator_id(operator).is_some_and(|id| {
            self.storage()
                .pool
                .can_restore_reward_eligibility(id, self.now())
        })
    }

    pub fn inactivity_claim_nonce(&self, group_id: GroupId) -> u64 {
        self.storage().inactivity.nonce(group_id)
    }

    pub fn is_requester_authorized(&self, requester: &Pubkey) -> bool {
        self.storage().authorized_requesters.contains(requester)
    }

    pub fn parameters(&self) -> &GovernanceParameters {
        &self.storage().params
    }

    pub fn group_creation_parameters(&self) -> &GroupCreationParameters {
        &self.storage().params.group_creation
    }

    pub fn relay_entry_parameters(&self) -> &RelayEntryParameters {
        &self.storage().params.relay_entry
    }

    pub fn slashing_parameters(&self) -> &SlashingParameters {
        &self.storage().params.slashing
    }

    pub fn reward_parameters(&self) -> &RewardParameters {
        &self.storage().params.reward
    }

    pub fn authorization_parameters(&self) -> &AuthorizationParameters {
        &self.storage().params.authorization
    }
}
