//! Key fixtures and signing helpers for tests and local simulations.

use {
    crate::{
        beacon::RandomBeacon,
        config::{
            AuthorizationParameters, GovernanceParameters, GroupCreationParameters,
            PoolWeightDivisor, RelayEntryParameters, RewardParameters, SlashingParameters,
        },
        crypto::{relay_entry_message, GROUP_SIGNATURE_DST},
        events::BeaconEvent,
        ledger::{BeaconStorage, InMemoryLedger, Ledger},
        sortition::SortitionPool,
        staking::InMemoryStaking,
        types::{members_hash, DkgResult, GroupId, InactivityClaim, MemberIndex, OperatorId},
    },
    ed25519_dalek::{Keypair, PublicKey, SecretKey, Signer},
    solana_pubkey::Pubkey,
    std::collections::HashMap,
};

/// An operator whose identity is an ed25519 key derived from one seed byte.
#[derive(Debug, Clone)]
pub struct TestOperator {
    seed: [u8; 32],
    pubkey: Pubkey,
}

impl TestOperator {
    pub fn new(seed: u8) -> Self {
        let seed = [seed; 32];
        let keypair = Self::keypair_from(&seed);
        Self {
            seed,
            pubkey: Pubkey::new_from_array(keypair.public.to_bytes()),
        }
    }

    fn keypair_from(seed: &[u8; 32]) -> Keypair {
        let secret = SecretKey::from_bytes(seed).expect("any 32 bytes form a secret key");
        let public = PublicKey::from(&secret);
        Keypair { secret, public }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.pubkey
    }

    /// Staking provider that registers this operator in fixtures.
    pub fn staking_provider(&self) -> Pubkey {
        let mut bytes = [0xa5; 32];
        bytes[0] = self.seed[0];
        Pubkey::new_from_array(bytes)
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        Self::keypair_from(&self.seed)
            .sign(message)
            .to_bytes()
            .to_vec()
    }
}

/// A BLS group key held by a single party, standing in for a threshold key.
pub struct TestGroupKey {
    secret: blst::min_sig::SecretKey,
}

impl TestGroupKey {
    pub fn new(seed: u8) -> Self {
        let ikm = [seed.wrapping_add(1); 32];
        Self {
            secret: blst::min_sig::SecretKey::key_gen(&ikm, &[])
                .expect("32 bytes of key material"),
        }
    }

    /// Compressed G2 public key.
    pub fn public_key(&self) -> Vec<u8> {
        self.secret.sk_to_pk().compress().to_vec()
    }

    /// Compressed G1 signature over `message`.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.secret
            .sign(message, GROUP_SIGNATURE_DST, &[])
            .compress()
            .to_vec()
    }
}

fn signer_for<'a>(operators: &'a [TestOperator], operator: &Pubkey) -> &'a TestOperator {
    operators
        .iter()
        .find(|candidate| candidate.pubkey() == *operator)
        .expect("signer is one of the test operators")
}

/// Sign `result` by the members at `signers` as of a DKG started at
/// `start_block`. Members are resolved through `pool`.
pub fn sign_dkg_result(
    result: &mut DkgResult,
    operators: &[TestOperator],
    pool: &SortitionPool,
    signers: &[MemberIndex],
    start_block: u64,
) {
    let digest = result.signing_digest(start_block);
    result.signing_members_indices = signers.to_vec();
    result.signatures = signers
        .iter()
        .flat_map(|&index| {
            let id = result.member(index).expect("signer index within members");
            let operator = pool.operator(id).expect("member is in the pool").operator;
            signer_for(operators, &operator).sign(digest.as_ref())
        })
        .collect();
}

/// Sign `claim` by the members at `signers`, where member `i` is
/// `members[i - 1]`.
pub fn sign_inactivity_claim(
    claim: &mut InactivityClaim,
    members: &[TestOperator],
    group_pub_key: &[u8],
    signers: &[MemberIndex],
) {
    let digest = claim.signing_digest(group_pub_key);
    claim.signing_members_indices = signers.to_vec();
    claim.signatures = signers
        .iter()
        .flat_map(|&index| members[usize::from(index) - 1].sign(digest.as_ref()))
        .collect();
}

// ---------------------------------------------------------------------------
// Beacon fixture
// ---------------------------------------------------------------------------

pub type TestBeacon = RandomBeacon<InMemoryLedger, InMemoryStaking>;

/// Small parameters so scenarios run in a handful of blocks.
pub fn test_parameters() -> GovernanceParameters {
    GovernanceParameters {
        group_creation: GroupCreationParameters {
            group_size: 3,
            group_threshold: 2,
            dkg_result_signature_threshold: 2,
            group_creation_frequency: 2,
            group_lifetime: 1_000,
            dkg_result_challenge_period_length: 10,
            dkg_result_submission_timeout: 30,
            dkg_submitter_precedence_period_length: 5,
        },
        relay_entry: RelayEntryParameters {
            relay_entry_soft_timeout: 10,
            relay_entry_hard_timeout: 20,
        },
        slashing: SlashingParameters {
            relay_entry_submission_failure_slashing_amount: 100,
            malicious_dkg_result_slashing_amount: 500,
            unauthorized_signing_slashing_amount: 200,
        },
        reward: RewardParameters {
            sortition_pool_rewards_ban_duration: 50,
            ..RewardParameters::default()
        },
        authorization: AuthorizationParameters {
            minimum_authorization: 100,
            authorization_decrease_delay: 40,
            authorization_decrease_change_period: 20,
        },
        pool_weight_divisor: PoolWeightDivisor(1),
    }
}

/// A beacon on an in-memory ledger with registered operators in the pool
/// and one authorized requester.
pub struct BeaconFixture {
    pub beacon: TestBeacon,
    pub operators: Vec<TestOperator>,
    pub governance: Pubkey,
    pub staking_contract: Pubkey,
    pub requester: Pubkey,
    group_members: HashMap<GroupId, Vec<OperatorId>>,
}

impl BeaconFixture {
    /// `stakes[i]` is the authorized stake of operator `i + 1`.
    pub fn new(params: GovernanceParameters, stakes: &[u128]) -> Self {
        let governance = Pubkey::new_from_array([0xf0; 32]);
        let staking_contract = Pubkey::new_from_array([0xf1; 32]);
        let requester = Pubkey::new_from_array([0xf2; 32]);
        let ledger = InMemoryLedger::new(BeaconStorage::new(governance, staking_contract, params));
        let mut beacon = RandomBeacon::new(ledger, InMemoryStaking::new());
        beacon
            .set_requester_authorization(governance, requester, true)
            .expect("governance authorizes the requester");

        let operators: Vec<TestOperator> = (1..=stakes.len())
            .map(|seed| TestOperator::new(seed as u8))
            .collect();
        for (operator, &stake) in operators.iter().zip(stakes) {
            let staking_provider = operator.staking_provider();
            beacon
                .staking_mut()
                .set_authorized_stake(staking_provider, stake);
            beacon
                .register_operator(staking_provider, operator.pubkey())
                .expect("fresh operator registers");
            beacon
                .insert_operator(operator.pubkey())
                .expect("operator joins the pool");
        }
        Self {
            beacon,
            operators,
            governance,
            staking_contract,
            requester,
            group_members: HashMap::new(),
        }
    }

    pub fn now(&self) -> u64 {
        self.beacon.ledger().block_height()
    }

    pub fn advance(&mut self, blocks: u64) {
        self.beacon.ledger_mut().advance_blocks(blocks);
    }

    pub fn events(&self) -> Vec<BeaconEvent> {
        self.beacon.ledger().events()
    }

    /// Operator key behind a pool ID.
    pub fn operator_key(&self, id: OperatorId) -> Pubkey {
        self.beacon
            .sortition_pool()
            .operator(id)
            .expect("known operator ID")
            .operator
    }

    pub fn operator_by_key(&self, key: &Pubkey) -> &TestOperator {
        signer_for(&self.operators, key)
    }

    /// A result for the DKG in progress, signed by `signers`.
    pub fn dkg_result(
        &self,
        group_key: &TestGroupKey,
        submitter: MemberIndex,
        misbehaved: Vec<MemberIndex>,
        signers: &[MemberIndex],
    ) -> DkgResult {
        let seed = self.beacon.dkg_seed().expect("DKG in progress");
        let start_block = self.beacon.dkg_start_block().expect("DKG in progress");
        let members = self.beacon.select_group(&seed).expect("enough operators");
        let mut result = DkgResult {
            submitter_member_index: submitter,
            group_pub_key: group_key.public_key(),
            misbehaved_members_indices: misbehaved,
            signatures: vec![],
            signing_members_indices: vec![],
            members,
            members_hash: Default::default(),
        };
        result.members_hash = members_hash(&result.active_members());
        sign_dkg_result(
            &mut result,
            &self.operators,
            self.beacon.sortition_pool(),
            signers,
            start_block,
        );
        result
    }

    /// Submitter of `result`.
    pub fn submitter_of(&self, result: &DkgResult) -> Pubkey {
        self.operator_key(
            result
                .member(result.submitter_member_index)
                .expect("submitter index in range"),
        )
    }

    /// Submit `result`, wait out the challenge window and approve it as the
    /// submitter.
    pub fn submit_and_approve(&mut self, result: DkgResult) -> GroupId {
        let submitter = self.submitter_of(&result);
        let active = result.active_members();
        self.beacon
            .submit_dkg_result(submitter, result.clone())
            .expect("valid result");
        let challenge_period = self
            .beacon
            .group_creation_parameters()
            .dkg_result_challenge_period_length;
        self.advance(challenge_period + 1);
        let group_id = self
            .beacon
            .approve_dkg_result(submitter, &result)
            .expect("approval after the challenge period");
        self.group_members.insert(group_id, active);
        group_id
    }

    /// Run genesis and register the resulting group under `group_key`.
    pub fn genesis_group(&mut self, group_key: &TestGroupKey) -> GroupId {
        self.beacon
            .genesis(self.governance)
            .expect("genesis on a fresh beacon");
        let size = self.beacon.group_creation_parameters().group_size;
        let signers: Vec<MemberIndex> = (1..=size as MemberIndex).collect();
        let result = self.dkg_result(group_key, 1, vec![], &signers);
        self.submit_and_approve(result)
    }

    /// Active members of a group registered through this fixture.
    pub fn group_members(&self, group_id: GroupId) -> Vec<OperatorId> {
        self.group_members
            .get(&group_id)
            .cloned()
            .expect("group registered through the fixture")
    }

    /// The entry `group_key` produces for the request in flight.
    pub fn relay_entry(&self, group_key: &TestGroupKey) -> Vec<u8> {
        let request = self.beacon.current_request().expect("request in flight");
        group_key.sign(&relay_entry_message(
            &request.previous_entry,
            request.request_id,
        ))
    }
}
