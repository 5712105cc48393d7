use anchor_lang::prelude::*;
use solana_program::keccak::hashv;

use crate::{
    errors::SortedTrovesError,
    events::{NodeAdded, NodeRemoved},
};

use super::{Journal, JournaledMap};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Node {
    pub prev: Pubkey,
    pub next: Pubkey,
    pub nicr: u128,
}

/// Doubly linked list of troves ordered by descending NICR. `Pubkey::default()` is the null link.
#[derive(Clone, Debug, Default)]
pub struct SortedTroves {
    nodes: JournaledMap<Pubkey, Node>,
    head: Pubkey,
    tail: Pubkey,
    size: u64,
    // 0 = unbounded
    max_size: u64,
    hint_walk_limit: u64,
    saved: Option<ListBounds>,
}

#[derive(Clone, Copy, Debug)]
struct ListBounds {
    head: Pubkey,
    tail: Pubkey,
    size: u64,
    max_size: u64,
    hint_walk_limit: u64,
}

impl Journal for SortedTroves {
    fn checkpoint(&mut self) {
        self.nodes.checkpoint();
        self.saved = Some(ListBounds {
            head: self.head,
            tail: self.tail,
            size: self.size,
            max_size: self.max_size,
            hint_walk_limit: self.hint_walk_limit,
        });
    }

    fn commit(&mut self) {
        self.nodes.commit();
        self.saved = None;
    }

    fn rollback(&mut self) {
        self.nodes.rollback();
        if let Some(bounds) = self.saved.take() {
            self.head = bounds.head;
            self.tail = bounds.tail;
            self.size = bounds.size;
            self.max_size = bounds.max_size;
            self.hint_walk_limit = bounds.hint_walk_limit;
        }
    }
}

impl SortedTroves {
    pub fn new(max_size: u64, hint_walk_limit: u64) -> Self {
        Self {
            max_size,
            hint_walk_limit,
            ..Default::default()
        }
    }

    pub fn contains(&self, id: &Pubkey) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn is_full(&self) -> bool {
        self.max_size > 0 && self.size >= self.max_size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn get_size(&self) -> u64 {
        self.size
    }

    pub fn get_max_size(&self) -> u64 {
        self.max_size
    }

    pub fn set_limits(&mut self, max_size: u64, hint_walk_limit: u64) -> Result<()> {
        require!(
            max_size == 0 || max_size >= self.size,
            SortedTrovesError::ListFull
        );
        self.max_size = max_size;
        self.hint_walk_limit = hint_walk_limit;
        Ok(())
    }

    pub fn get_first(&self) -> Pubkey {
        self.head
    }

    pub fn get_last(&self) -> Pubkey {
        self.tail
    }

    pub fn get_next(&self, id: &Pubkey) -> Pubkey {
        self.nodes.get(id).map(|node| node.next).unwrap_or_default()
    }

    pub fn get_prev(&self, id: &Pubkey) -> Pubkey {
        self.nodes.get(id).map(|node| node.prev).unwrap_or_default()
    }

    pub fn get_nicr(&self, id: &Pubkey) -> Option<u128> {
        self.nodes.get(id).map(|node| node.nicr)
    }

    pub fn insert(
        &mut self,
        id: Pubkey,
        nicr: u128,
        prev_hint: Pubkey,
        next_hint: Pubkey,
    ) -> Result<()> {
        require!(!self.is_full(), SortedTrovesError::ListFull);
        require!(!self.contains(&id), SortedTrovesError::AlreadyExists);
        require_keys_neq!(id, Pubkey::default(), SortedTrovesError::InvalidId);
        require!(nicr > 0, SortedTrovesError::NICRZero);

        let (prev, next) = self.find_insert_position(nicr, prev_hint, next_hint);
        self.link(id, nicr, prev, next);
        emit!(NodeAdded { owner: id, nicr });
        Ok(())
    }

    pub fn remove(&mut self, id: &Pubkey) -> Result<()> {
        let node = match self.nodes.remove(id) {
            Some(node) => node,
            None => return Err(error!(SortedTrovesError::NotFound).with_pubkeys((*id, *id))),
        };

        if node.prev == Pubkey::default() {
            // The removed node is the head
            self.head = node.next;
        } else if let Some(prev) = self.nodes.get_mut(&node.prev) {
            prev.next = node.next;
        }

        if node.next == Pubkey::default() {
            // The removed node is the tail
            self.tail = node.prev;
        } else if let Some(next) = self.nodes.get_mut(&node.next) {
            next.prev = node.prev;
        }

        self.size -= 1;
        emit!(NodeRemoved { owner: *id });
        Ok(())
    }

    pub fn re_insert(
        &mut self,
        id: Pubkey,
        new_nicr: u128,
        prev_hint: Pubkey,
        next_hint: Pubkey,
    ) -> Result<()> {
        require!(self.contains(&id), SortedTrovesError::NotFound);
        require!(new_nicr > 0, SortedTrovesError::NICRZero);

        self.remove(&id)?;
        let (prev, next) = self.find_insert_position(new_nicr, prev_hint, next_hint);
        self.link(id, new_nicr, prev, next);
        emit!(NodeAdded {
            owner: id,
            nicr: new_nicr
        });
        Ok(())
    }

    fn link(&mut self, id: Pubkey, nicr: u128, prev: Pubkey, next: Pubkey) {
        if prev == Pubkey::default() {
            self.head = id;
        } else if let Some(prev_node) = self.nodes.get_mut(&prev) {
            prev_node.next = id;
        }
        if next == Pubkey::default() {
            self.tail = id;
        } else if let Some(next_node) = self.nodes.get_mut(&next) {
            next_node.prev = id;
        }
        self.nodes.insert(id, Node { prev, next, nicr });
        self.size += 1;
    }

    /// `(prev, next)` is valid when they are adjacent and `prev.nicr >= nicr > next.nicr`.
    /// Equal keys sit before the new one, so insertion order breaks ties.
    pub fn valid_insert_position(&self, nicr: u128, prev: Pubkey, next: Pubkey) -> bool {
        let null = Pubkey::default();
        if prev == null && next == null {
            // `(null, null)` is a valid insert position if the list is empty
            return self.is_empty();
        }
        if prev == null {
            // `(null, next)` is a valid insert position if `next` is the head of the list
            return self.head == next && self.nicr_of(&next) < nicr;
        }
        if next == null {
            // `(prev, null)` is a valid insert position if `prev` is the tail of the list
            return self.tail == prev && self.nicr_of(&prev) >= nicr;
        }
        match self.nodes.get(&prev) {
            Some(prev_node) => {
                prev_node.next == next
                    && prev_node.nicr >= nicr
                    && nicr > self.nicr_of(&next)
            }
            None => false,
        }
    }

    /// `(prev, next)` neighbours for `nicr`. Stale hints are dropped, then the walk starts from
    /// whichever hint is left. A position more than `hint_walk_limit` links away from the hint
    /// falls back to a descent from the head, so a bad hint costs O(n).
    pub fn find_insert_position(
        &self,
        nicr: u128,
        prev_hint: Pubkey,
        next_hint: Pubkey,
    ) -> (Pubkey, Pubkey) {
        let null = Pubkey::default();
        let mut prev_id = prev_hint;
        let mut next_id = next_hint;

        if prev_id != null && (!self.contains(&prev_id) || self.nicr_of(&prev_id) < nicr) {
            // `prev_id` does not exist anymore or now has a smaller NICR than the given NICR
            prev_id = null;
        }
        if next_id != null && (!self.contains(&next_id) || nicr <= self.nicr_of(&next_id)) {
            // `next_id` does not exist anymore or now has a larger or equal NICR
            next_id = null;
        }

        let hinted = if prev_id == null && next_id == null {
            None
        } else if prev_id == null {
            self.ascend_list(nicr, next_id, self.hint_walk_limit)
        } else {
            self.descend_list(nicr, prev_id, self.hint_walk_limit)
        };

        match hinted {
            Some(position) => position,
            None => self
                .descend_list(nicr, self.head, u64::MAX)
                .unwrap_or((self.tail, null)),
        }
    }

    /// Walks towards the tail from `start`. `None` once more than `max_steps` links were followed.
    fn descend_list(&self, nicr: u128, start: Pubkey, max_steps: u64) -> Option<(Pubkey, Pubkey)> {
        let null = Pubkey::default();
        if start == null {
            return Some((null, null));
        }
        if self.head == start && nicr > self.nicr_of(&start) {
            return Some((null, start));
        }

        let mut prev_id = start;
        let mut next_id = self.get_next(&prev_id);
        let mut steps = 0u64;
        while prev_id != null && !self.valid_insert_position(nicr, prev_id, next_id) {
            if steps >= max_steps {
                return None;
            }
            steps += 1;
            prev_id = next_id;
            next_id = self.get_next(&prev_id);
        }
        Some((prev_id, next_id))
    }

    /// Walks towards the head from `start`.
    fn ascend_list(&self, nicr: u128, start: Pubkey, max_steps: u64) -> Option<(Pubkey, Pubkey)> {
        let null = Pubkey::default();
        if self.tail == start && nicr <= self.nicr_of(&start) {
            return Some((start, null));
        }

        let mut next_id = start;
        let mut prev_id = self.get_prev(&next_id);
        let mut steps = 0u64;
        while next_id != null && !self.valid_insert_position(nicr, prev_id, next_id) {
            if steps >= max_steps {
                return None;
            }
            steps += 1;
            next_id = prev_id;
            prev_id = self.get_prev(&next_id);
        }
        Some((prev_id, next_id))
    }

    fn nicr_of(&self, id: &Pubkey) -> u128 {
        self.nodes.get(id).map(|node| node.nicr).unwrap_or(0)
    }

    /// Samples `owners` with a keccak chain seeded by `seed`, starting from the tail.
    /// Returns the closest node found, its distance to `nicr` and the advanced seed.
    pub fn get_approx_hint(
        &self,
        owners: &[Pubkey],
        nicr: u128,
        num_trials: u64,
        seed: u64,
    ) -> (Pubkey, u128, u64) {
        if owners.is_empty() || self.is_empty() {
            return (Pubkey::default(), 0, seed);
        }

        let mut hint = self.tail;
        let mut diff = self.nicr_of(&hint).abs_diff(nicr);
        let mut latest_seed = seed;

        let mut i = 1;
        while i < num_trials {
            latest_seed = next_seed(latest_seed);
            let array_index = (latest_seed % owners.len() as u64) as usize;
            let current = owners[array_index];
            if let Some(current_nicr) = self.get_nicr(&current) {
                let current_diff = current_nicr.abs_diff(nicr);
                if current_diff < diff {
                    diff = current_diff;
                    hint = current;
                }
            }
            i += 1;
        }
        (hint, diff, latest_seed)
    }

    /// Troves from head to tail.
    pub fn iter(&self) -> SortedTrovesIter<'_> {
        SortedTrovesIter {
            list: self,
            cursor: self.head,
        }
    }
}

pub fn next_seed(seed: u64) -> u64 {
    let hash = hashv(&[&seed.to_le_bytes()]).to_bytes();
    let mut word = [0u8; 8];
    word.copy_from_slice(&hash[..8]);
    u64::from_le_bytes(word)
}

pub struct SortedTrovesIter<'a> {
    list: &'a SortedTroves,
    cursor: Pubkey,
}

impl<'a> Iterator for SortedTrovesIter<'a> {
    type Item = (Pubkey, u128);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.list.nodes.get(&self.cursor)?;
        let id = self.cursor;
        self.cursor = node.next;
        Some((id, node.nicr))
    }
}
