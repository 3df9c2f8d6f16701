//! In-memory secondary index over known raffles.
use solana_program::{clock::UnixTimestamp, pubkey::Pubkey};
use std::{
    cmp::Reverse,
    collections::{BTreeSet, HashMap},
};

use crate::state::Raffle;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct IndexEntry {
    owner: Pubkey,
    created_at: UnixTimestamp,
}

/// Raffle addresses keyed by owner and ordered newest first.
#[derive(Clone, Debug, Default)]
pub struct RaffleIndex {
    entries: HashMap<Pubkey, IndexEntry>,
    by_owner: HashMap<Pubkey, BTreeSet<Pubkey>>,
    by_created_at: BTreeSet<(Reverse<UnixTimestamp>, Pubkey)>,
}

impl RaffleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or refreshes the raffle stored at `address`.
    pub fn insert(&mut self, address: Pubkey, raffle: &Raffle) {
        self.remove(&address);

        let entry = IndexEntry {
            owner: raffle.owner,
            created_at: raffle.created_at,
        };
        self.by_owner.entry(entry.owner).or_default().insert(address);
        self.by_created_at.insert((Reverse(entry.created_at), address));
        self.entries.insert(address, entry);
    }

    pub fn remove(&mut self, address: &Pubkey) -> bool {
        let entry = match self.entries.remove(address) {
            Some(entry) => entry,
            None => return false,
        };
        if let Some(addresses) = self.by_owner.get_mut(&entry.owner) {
            addresses.remove(address);
            if addresses.is_empty() {
                self.by_owner.remove(&entry.owner);
            }
        }
        self.by_created_at.remove(&(Reverse(entry.created_at), *address));
        true
    }

    pub fn contains(&self, address: &Pubkey) -> bool {
        self.entries.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Addresses ordered by creation time, newest first. Ties are broken by
    /// address so the order is stable.
    pub fn newest_first(&self, owner: Option<&Pubkey>) -> Vec<Pubkey> {
        match owner {
            None => self.by_created_at.iter().map(|(_, address)| *address).collect(),
            Some(owner) => {
                let addresses = match self.by_owner.get(owner) {
                    Some(addresses) => addresses,
                    None => return Vec::new(),
                };
                let mut ordered: Vec<(Reverse<UnixTimestamp>, Pubkey)> = addresses
                    .iter()
                    .filter_map(|address| {
                        self.entries
                            .get(address)
                            .map(|entry| (Reverse(entry.created_at), *address))
                    })
                    .collect();
                ordered.sort();
                ordered.into_iter().map(|(_, address)| address).collect()
            }
        }
    }
}
