//! Beacon events, their ledger log encoding and typed subscriptions.
//!
//! Every event is one variant of [`BeaconEvent`]. On the ledger an event is
//! a [`LedgerLog`]: the event name plus the borsh encoding of the variant,
//! with fields in the order listed here. [`decode_log`] turns any log back
//! into a typed event.
//!
//! [`EventBus`] fans events out to subscribers over crossbeam channels.
//! Each subscription filters by [`EventKind`] and is cancelled explicitly
//! with [`EventBus::unsubscribe`] or implicitly by dropping its receiver.

use {
    crate::types::{DkgResult, GroupId, RequestId},
    borsh::{BorshDeserialize, BorshSerialize},
    crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError},
    log::*,
    solana_hash::Hash,
    solana_pubkey::Pubkey,
    std::{collections::HashSet, time::Duration},
};

macro_rules! beacon_events {
    ($(
        $(#[$meta:meta])*
        $name:ident $({ $($field:ident: $ty:ty),* $(,)? })?
    ),* $(,)?) => {
        /// Events emitted by the beacon.
        #[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
        pub enum BeaconEvent {
            $($(#[$meta])* $name $({ $($field: $ty),* })?,)*
        }

        /// Field-less discriminant of a [`BeaconEvent`].
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum EventKind {
            $($name,)*
        }

        impl BeaconEvent {
            pub fn kind(&self) -> EventKind {
                match self {
                    $(BeaconEvent::$name { .. } => EventKind::$name,)*
                }
            }
        }

        impl EventKind {
            pub const ALL: &'static [EventKind] = &[$(EventKind::$name,)*];

            /// Name of the event as it appears in ledger logs.
            pub fn name(self) -> &'static str {
                match self {
                    $(EventKind::$name => stringify!($name),)*
                }
            }
        }
    };
}

beacon_events! {
    // -- DKG
    DkgStateLocked,
    DkgStarted { seed: Hash },
    DkgResultSubmitted { result_hash: Hash, seed: Hash, result: DkgResult },
    DkgResultChallenged { result_hash: Hash, challenger: Pubkey, reason: String },
    DkgResultApproved { result_hash: Hash, approver: Pubkey },
    DkgTimedOut,
    DkgSeedTimedOut,
    DkgMaliciousResultSlashed {
        result_hash: Hash,
        slashing_amount: u128,
        malicious_submitter: Pubkey,
    },
    DkgMaliciousResultSlashingFailed {
        result_hash: Hash,
        slashing_amount: u128,
        malicious_submitter: Pubkey,
    },
    GroupRegistered { group_id: GroupId, group_pub_key: Vec<u8> },

    // -- relay entries
    RelayEntryRequested { request_id: RequestId, group_id: GroupId, previous_entry: Vec<u8> },
    RelayEntrySubmitted { request_id: RequestId, submitter: Pubkey, entry: Vec<u8> },
    RelayEntryTimedOut { request_id: RequestId, terminated_group_id: GroupId },
    RelayEntryDelaySlashed {
        request_id: RequestId,
        slashing_amount: u128,
        group_members: Vec<Pubkey>,
    },
    RelayEntryDelaySlashingFailed {
        request_id: RequestId,
        slashing_amount: u128,
        group_members: Vec<Pubkey>,
    },
    RelayEntryTimeoutSlashed {
        request_id: RequestId,
        slashing_amount: u128,
        group_members: Vec<Pubkey>,
    },
    RelayEntryTimeoutSlashingFailed {
        request_id: RequestId,
        slashing_amount: u128,
        group_members: Vec<Pubkey>,
    },
    UnauthorizedSigningSlashed {
        group_id: GroupId,
        unauthorized_signing_slashing_amount: u128,
        group_members: Vec<Pubkey>,
    },
    UnauthorizedSigningSlashingFailed {
        group_id: GroupId,
        unauthorized_signing_slashing_amount: u128,
        group_members: Vec<Pubkey>,
    },
    CallbackFailed { entry: Vec<u8>, entry_submitted_block: u64 },

    // -- operators and authorization
    OperatorRegistered { staking_provider: Pubkey, operator: Pubkey },
    OperatorJoinedSortitionPool { staking_provider: Pubkey, operator: Pubkey },
    OperatorStatusUpdated { staking_provider: Pubkey, operator: Pubkey },
    AuthorizationIncreased {
        staking_provider: Pubkey,
        operator: Pubkey,
        from_amount: u128,
        to_amount: u128,
    },
    /// `decreasing_at` is `u64::MAX` until the operator refreshes its pool
    /// weight.
    AuthorizationDecreaseRequested {
        staking_provider: Pubkey,
        operator: Pubkey,
        from_amount: u128,
        to_amount: u128,
        decreasing_at: u64,
    },
    AuthorizationDecreaseApproved { staking_provider: Pubkey },
    InvoluntaryAuthorizationDecreased {
        staking_provider: Pubkey,
        operator: Pubkey,
        from_amount: u128,
        to_amount: u128,
    },
    InactivityClaimed { group_id: GroupId, nonce: u64, notifier: Pubkey },

    // -- rewards
    RewardsAdded { amount: u128 },
    RewardsWithdrawn { staking_provider: Pubkey, amount: u128 },
    IneligibleRewardsWithdrawn { recipient: Pubkey, amount: u128 },
    RewardEligibilityRestored { operator: Pubkey },

    // -- governance
    RequesterAuthorizationUpdated { requester: Pubkey, is_authorized: bool },
    ParametersUpdated,
}

impl EventKind {
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }
}

// ---------------------------------------------------------------------------
// Ledger logs
// ---------------------------------------------------------------------------

/// An event as written to the ledger log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerLog {
    pub name: String,
    pub data: Vec<u8>,
}

/// Errors decoding a ledger log.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown event {0}")]
    UnknownEvent(String),
    #[error("malformed {name} payload: {reason}")]
    Malformed { name: String, reason: String },
    #[error("log named {name} carries a {actual} payload")]
    NameMismatch { name: String, actual: &'static str },
}

impl BeaconEvent {
    pub fn to_log(&self) -> LedgerLog {
        LedgerLog {
            name: self.kind().name().to_string(),
            data: borsh::to_vec(self).unwrap_or_default(),
        }
    }
}

/// Decode any beacon log into its typed event.
pub fn decode_log(log: &LedgerLog) -> Result<BeaconEvent, DecodeError> {
    let kind =
        EventKind::from_name(&log.name).ok_or_else(|| DecodeError::UnknownEvent(log.name.clone()))?;
    let event = borsh::from_slice::<BeaconEvent>(&log.data).map_err(|e| DecodeError::Malformed {
        name: log.name.clone(),
        reason: e.to_string(),
    })?;
    if event.kind() != kind {
        return Err(DecodeError::NameMismatch {
            name: log.name.clone(),
            actual: event.kind().name(),
        });
    }
    Ok(event)
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

/// Identifier of a subscription on an [`EventBus`].
pub type SubscriptionId = u64;

/// The receiving end of a subscription.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    receiver: Receiver<BeaconEvent>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next event, if one is queued. `None` also once the subscription was
    /// cancelled and drained.
    pub fn try_next(&self) -> Option<BeaconEvent> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Wait up to `timeout` for the next event.
    pub fn next_timeout(&self, timeout: Duration) -> Option<BeaconEvent> {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// All events queued right now.
    pub fn drain(&self) -> Vec<BeaconEvent> {
        self.receiver.try_iter().collect()
    }

    /// Returns true once the bus dropped this subscription.
    pub fn is_cancelled(&self) -> bool {
        self.receiver.is_empty() && matches!(self.receiver.try_recv(), Err(TryRecvError::Disconnected))
    }
}

#[derive(Debug)]
struct Subscriber {
    id: SubscriptionId,
    /// `None` subscribes to every kind.
    kinds: Option<HashSet<EventKind>>,
    sender: Sender<BeaconEvent>,
}

/// Fan-out of beacon events to typed subscribers.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<Subscriber>,
    next_id: SubscriptionId,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to the given kinds of events.
    pub fn subscribe(&mut self, kinds: &[EventKind]) -> Subscription {
        self.add_subscriber(Some(kinds.iter().copied().collect()))
    }

    /// Subscribe to every event.
    pub fn subscribe_all(&mut self) -> Subscription {
        self.add_subscriber(None)
    }

    fn add_subscriber(&mut self, kinds: Option<HashSet<EventKind>>) -> Subscription {
        let (sender, receiver) = unbounded();
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        self.subscribers.push(Subscriber { id, kinds, sender });
        Subscription { id, receiver }
    }

    /// Cancel a subscription. Events already queued stay readable.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|subscriber| subscriber.id != id);
        self.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver `event` to matching subscribers and drop those whose receiver
    /// is gone.
    pub fn publish(&mut self, event: &BeaconEvent) {
        let kind = event.kind();
        self.subscribers.retain(|subscriber| {
            let wanted = subscriber
                .kinds
                .as_ref()
                .map_or(true, |kinds| kinds.contains(&kind));
            if !wanted {
                return true;
            }
            match subscriber.sender.send(event.clone()) {
                Ok(()) => true,
                Err(_) => {
                    debug!("dropping disconnected subscription {}", subscriber.id);
                    false
                }
            }
        });
    }
}
