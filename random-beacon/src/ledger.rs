//! Ledger collaborator.
//!
//! The ledger owns the beacon's storage, provides block height and
//! randomness, records events in its log and invokes relay entry callbacks.
//! [`BeaconStorage`] is everything the beacon persists; the facade reads a
//! copy, transforms it and hands it back through [`Ledger::commit`].

use {
    crate::{
        authorization::Authorizations,
        config::GovernanceParameters,
        dkg::DkgCoordinator,
        events::BeaconEvent,
        groups::Groups,
        inactivity::InactivityClaims,
        relay::RelayEntryCoordinator,
        slashing::SlashingEngine,
        sortition::SortitionPool,
    },
    solana_hash::Hash,
    solana_pubkey::Pubkey,
    std::collections::HashSet,
};
#[cfg(any(test, feature = "dev-context-only-utils"))]
use {
    crate::{
        crypto::hashv,
        events::{decode_log, EventBus, EventKind, LedgerLog, Subscription},
    },
    log::*,
};

/// A consumer rejected a relay entry callback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("callback to {consumer:?} failed: {reason}")]
pub struct CallbackError {
    pub consumer: Pubkey,
    pub reason: String,
}

/// Interface to the ledger hosting the beacon.
pub trait Ledger {
    fn block_height(&self) -> u64;

    /// Unpredictable value for the current block.
    fn randomness(&self) -> Hash;

    fn storage(&self) -> &BeaconStorage;

    /// Replace the stored state after a successful transition.
    fn commit(&mut self, storage: BeaconStorage);

    /// Append `event` to the ledger log.
    fn emit(&mut self, event: BeaconEvent);

    /// Deliver a new relay entry to `consumer`.
    fn invoke_callback(
        &mut self,
        consumer: &Pubkey,
        entry: &[u8],
        block: u64,
    ) -> Result<(), CallbackError>;
}

/// State persisted by the beacon.
#[derive(Debug, Clone)]
pub struct BeaconStorage {
    pub params: GovernanceParameters,
    /// Identity allowed to run governance operations.
    pub governance: Pubkey,
    /// Identity of the staking contract reporting authorization changes.
    pub staking_contract: Pubkey,
    pub authorized_requesters: HashSet<Pubkey>,
    pub pool: SortitionPool,
    pub authorizations: Authorizations,
    pub groups: Groups,
    pub dkg: DkgCoordinator,
    pub relay: RelayEntryCoordinator,
    pub inactivity: InactivityClaims,
    pub slashing: SlashingEngine,
}

impl BeaconStorage {
    pub fn new(governance: Pubkey, staking_contract: Pubkey, params: GovernanceParameters) -> Self {
        Self {
            params,
            governance,
            staking_contract,
            authorized_requesters: HashSet::new(),
            pool: SortitionPool::new(),
            authorizations: Authorizations::new(),
            groups: Groups::new(),
            dkg: DkgCoordinator::new(),
            relay: RelayEntryCoordinator::new(),
            inactivity: InactivityClaims::new(),
            slashing: SlashingEngine::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory ledger
// ---------------------------------------------------------------------------

/// A delivered relay entry callback.
#[cfg(any(test, feature = "dev-context-only-utils"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredCallback {
    pub consumer: Pubkey,
    pub entry: Vec<u8>,
    pub block: u64,
}

/// Ledger kept in memory, for tests and local simulations. Events are
/// logged in their encoded form and fanned out to subscribers.
#[cfg(any(test, feature = "dev-context-only-utils"))]
#[derive(Debug)]
pub struct InMemoryLedger {
    block_height: u64,
    storage: BeaconStorage,
    logs: Vec<LedgerLog>,
    bus: EventBus,
    failing_consumers: HashSet<Pubkey>,
    callbacks: Vec<DeliveredCallback>,
}

#[cfg(any(test, feature = "dev-context-only-utils"))]
impl InMemoryLedger {
    pub fn new(storage: BeaconStorage) -> Self {
        Self {
            block_height: 1,
            storage,
            logs: Vec::new(),
            bus: EventBus::new(),
            failing_consumers: HashSet::new(),
            callbacks: Vec::new(),
        }
    }

    pub fn advance_blocks(&mut self, blocks: u64) {
        self.block_height = self.block_height.saturating_add(blocks);
    }

    pub fn set_block_height(&mut self, block_height: u64) {
        self.block_height = block_height;
    }

    pub fn logs(&self) -> &[LedgerLog] {
        &self.logs
    }

    /// Every logged event, decoded.
    pub fn events(&self) -> Vec<BeaconEvent> {
        self.logs
            .iter()
            .filter_map(|log| decode_log(log).ok())
            .collect()
    }

    /// Logged events of `kind`, decoded.
    pub fn events_of(&self, kind: EventKind) -> Vec<BeaconEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.kind() == kind)
            .collect()
    }

    pub fn subscribe(&mut self, kinds: &[EventKind]) -> Subscription {
        self.bus.subscribe(kinds)
    }

    pub fn unsubscribe(&mut self, subscription: &Subscription) -> bool {
        self.bus.unsubscribe(subscription.id())
    }

    /// Make every callback to `consumer` fail.
    pub fn fail_callbacks_to(&mut self, consumer: Pubkey) {
        self.failing_consumers.insert(consumer);
    }

    pub fn delivered_callbacks(&self) -> &[DeliveredCallback] {
        &self.callbacks
    }
}

#[cfg(any(test, feature = "dev-context-only-utils"))]
impl Ledger for InMemoryLedger {
    fn block_height(&self) -> u64 {
        self.block_height
    }

    fn randomness(&self) -> Hash {
        hashv(&[b"in-memory-ledger", &self.block_height.to_be_bytes()])
    }

    fn storage(&self) -> &BeaconStorage {
        &self.storage
    }

    fn commit(&mut self, storage: BeaconStorage) {
        self.storage = storage;
    }

    fn emit(&mut self, event: BeaconEvent) {
        trace!("block {}: {event:?}", self.block_height);
        self.logs.push(event.to_log());
        self.bus.publish(&event);
    }

    fn invoke_callback(
        &mut self,
        consumer: &Pubkey,
        entry: &[u8],
        block: u64,
    ) -> Result<(), CallbackError> {
        if self.failing_consumers.contains(consumer) {
            return Err(CallbackError {
                consumer: *consumer,
                reason: "consumer reverted".to_string(),
            });
        }
        self.callbacks.push(DeliveredCallback {
            consumer: *consumer,
            entry: entry.to_vec(),
            block,
        });
        Ok(())
    }
}
