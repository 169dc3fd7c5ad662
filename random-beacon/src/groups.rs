//! Registry of groups produced by DKG.

use {
    crate::{
        crypto::hashv,
        error::{BeaconError, Result},
        types::{members_hash, Group, GroupId, OperatorId},
    },
    log::*,
    solana_hash::Hash,
    std::collections::HashMap,
};

#[derive(Debug, Clone, Default)]
pub struct Groups {
    groups: Vec<Group>,
    by_pub_key: HashMap<Vec<u8>, GroupId>,
}

impl Groups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new group and return its ID.
    pub fn add_group(
        &mut self,
        group_pub_key: Vec<u8>,
        members_hash: Hash,
        registration_block: u64,
    ) -> Result<GroupId> {
        if self.by_pub_key.contains_key(&group_pub_key) {
            return Err(BeaconError::DuplicateGroupPublicKey);
        }
        let group_id =
            GroupId::try_from(self.groups.len()).map_err(|_| BeaconError::GroupRegistryFull)?;
        self.by_pub_key.insert(group_pub_key.clone(), group_id);
        self.groups.push(Group {
            group_id,
            group_pub_key,
            members_hash,
            registration_block,
            terminated: false,
        });
        info!("registered group {group_id} at block {registration_block}");
        Ok(group_id)
    }

    pub fn get(&self, group_id: GroupId) -> Option<&Group> {
        usize::try_from(group_id)
            .ok()
            .and_then(|index| self.groups.get(index))
    }

    pub fn get_by_pub_key(&self, group_pub_key: &[u8]) -> Option<&Group> {
        self.by_pub_key
            .get(group_pub_key)
            .and_then(|&group_id| self.get(group_id))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Mark a group terminated. Terminating twice fails.
    pub fn terminate(&mut self, group_id: GroupId) -> Result<()> {
        let group = usize::try_from(group_id)
            .ok()
            .and_then(|index| self.groups.get_mut(index))
            .ok_or(BeaconError::UnknownGroup(group_id))?;
        if group.terminated {
            return Err(BeaconError::GroupTerminated(group_id));
        }
        group.terminated = true;
        warn!("group {group_id} terminated");
        Ok(())
    }

    /// IDs of groups that may serve new relay requests at `now`.
    pub fn active_group_ids(&self, now: u64, lifetime: u64) -> Vec<GroupId> {
        self.groups
            .iter()
            .filter(|group| group.is_active(now, lifetime))
            .map(|group| group.group_id)
            .collect()
    }

    pub fn number_of_active_groups(&self, now: u64, lifetime: u64) -> usize {
        self.groups
            .iter()
            .filter(|group| group.is_active(now, lifetime))
            .count()
    }

    /// Pick the group for the next relay request: `H(previous_entry)` modulo
    /// the number of active groups, over active groups in registration order.
    pub fn select_group(&self, previous_entry: &[u8], now: u64, lifetime: u64) -> Result<GroupId> {
        let active = self.active_group_ids(now, lifetime);
        if active.is_empty() {
            return Err(BeaconError::NoActiveGroups);
        }
        let digest = hashv(&[previous_entry]);
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest.as_ref()[..8]);
        let count = u64::try_from(active.len()).map_err(|_| BeaconError::NoActiveGroups)?;
        u64::from_be_bytes(bytes)
            .checked_rem(count)
            .and_then(|index| usize::try_from(index).ok())
            .and_then(|index| active.get(index).copied())
            .ok_or(BeaconError::NoActiveGroups)
    }

    /// Check `members` against the group's commitment.
    pub fn validate_members(&self, group_id: GroupId, members: &[OperatorId]) -> Result<&Group> {
        let group = self.get(group_id).ok_or(BeaconError::UnknownGroup(group_id))?;
        if members_hash(members) != group.members_hash {
            return Err(BeaconError::InvalidGroupMembers);
        }
        Ok(group)
    }
}
