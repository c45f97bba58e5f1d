//! The document-wide binary pool.
//!
//! Payloads are keyed by a non-negative index. Indices loaded from a document
//! may have gaps; [`BinaryPool::compact`] renumbers them to `0..n` before a
//! save and reports the old→new mapping so references can follow.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, warn};

use crate::error::{PoolError, Result};
use crate::payload::{BinaryPayload, Fingerprint};

#[derive(Debug)]
struct Slot {
    /// Insertion sequence; compaction preserves this order.
    seq: u64,
    payload: BinaryPayload,
}

/// Canonical set of binary payloads for one document.
///
/// A pool belongs to exactly one document and is deliberately not `Clone`.
#[derive(Debug, Default)]
pub struct BinaryPool {
    slots: BTreeMap<u32, Slot>,
    by_fingerprint: HashMap<Fingerprint, u32>,
    next_seq: u64,
    /// Highest index stored since the last compaction.
    ceiling: Option<u32>,
}

impl BinaryPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pool whose indices are the positions of `payloads`.
    ///
    /// This is how containers that keep binaries outside the XML (KDBX 4
    /// inner header) hand their payload list over.
    pub fn from_payloads(payloads: impl IntoIterator<Item = BinaryPayload>) -> Self {
        let mut pool = Self::new();
        for (index, payload) in (0u32..).zip(payloads) {
            pool.store(index, payload);
        }
        pool
    }

    /// Store `payload`, reusing the index of identical content if present.
    ///
    /// New content gets the index one past the highest index stored since the
    /// last compaction, so an index freed by
    /// [`remove_unreferenced`](Self::remove_unreferenced) is never handed out
    /// again before the next compaction.
    pub fn put(&mut self, payload: BinaryPayload) -> u32 {
        if let Some(&index) = self.by_fingerprint.get(&payload.fingerprint()) {
            debug!(index, "reused pooled payload");
            return index;
        }
        let index = self.next_index();
        debug!(index, len = payload.len(), "pooled new payload");
        self.store(index, payload);
        index
    }

    /// Store `payload` under an index declared by the document being loaded.
    pub fn insert_at(&mut self, index: u32, payload: BinaryPayload) -> Result<()> {
        if self.slots.contains_key(&index) {
            return Err(PoolError::DuplicatePoolIndex { index });
        }
        self.store(index, payload);
        Ok(())
    }

    pub fn get(&self, index: u32) -> Result<&BinaryPayload> {
        self.slots
            .get(&index)
            .map(|slot| &slot.payload)
            .ok_or(PoolError::ReferenceNotFound { index })
    }

    pub fn contains(&self, index: u32) -> bool {
        self.slots.contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Sum of payload sizes in bytes.
    pub fn total_bytes(&self) -> usize {
        self.slots.values().map(|slot| slot.payload.len()).sum()
    }

    /// Entries in index order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &BinaryPayload)> {
        self.slots.iter().map(|(&index, slot)| (index, &slot.payload))
    }

    /// Renumber entries to `0..n` in insertion order.
    ///
    /// Entries loaded under different indices but holding identical bytes are
    /// folded onto a single new index.
    pub fn compact(&mut self) -> IndexRemap {
        let mut ordered: Vec<(u32, Slot)> = std::mem::take(&mut self.slots).into_iter().collect();
        ordered.sort_by_key(|(_, slot)| slot.seq);
        self.by_fingerprint.clear();

        let mut remap = IndexRemap::default();
        let mut next = 0u32;
        for (old, slot) in ordered {
            let fingerprint = slot.payload.fingerprint();
            if let Some(&existing) = self.by_fingerprint.get(&fingerprint) {
                warn!(old_index = old, merged_into = existing, "merged duplicate payload");
                remap.map.insert(old, existing);
                continue;
            }
            self.by_fingerprint.insert(fingerprint, next);
            self.slots.insert(next, slot);
            remap.map.insert(old, next);
            next += 1;
        }
        self.ceiling = next.checked_sub(1);
        debug!(entries = next, "compacted binary pool");
        remap
    }

    /// Drop every payload whose index is not in `live`.
    ///
    /// Returns the number of payloads removed.
    pub fn remove_unreferenced(&mut self, live: &BTreeSet<u32>) -> usize {
        let before = self.slots.len();
        self.slots.retain(|index, _| live.contains(index));
        let removed = before - self.slots.len();
        if removed > 0 {
            self.rebuild_fingerprints();
            debug!(removed, "dropped unreferenced payloads");
        }
        removed
    }

    fn store(&mut self, index: u32, payload: BinaryPayload) {
        self.by_fingerprint
            .entry(payload.fingerprint())
            .or_insert(index);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.ceiling = Some(self.ceiling.map_or(index, |ceiling| ceiling.max(index)));
        self.slots.insert(index, Slot { seq, payload });
    }

    fn next_index(&self) -> u32 {
        match self.ceiling {
            None => 0,
            Some(ceiling) if ceiling < u32::MAX => ceiling + 1,
            // Index space topped out; fall back to the lowest gap.
            Some(_) => self
                .slots
                .keys()
                .zip(0u32..)
                .find(|(index, expected)| **index != *expected)
                .map_or(0, |(_, expected)| expected),
        }
    }

    fn rebuild_fingerprints(&mut self) {
        let mut ordered: Vec<(u64, u32, Fingerprint)> = self
            .slots
            .iter()
            .map(|(&index, slot)| (slot.seq, index, slot.payload.fingerprint()))
            .collect();
        ordered.sort_unstable();
        self.by_fingerprint.clear();
        for (_, index, fingerprint) in ordered {
            self.by_fingerprint.entry(fingerprint).or_insert(index);
        }
    }
}

/// Old→new index mapping produced by [`BinaryPool::compact`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexRemap {
    map: BTreeMap<u32, u32>,
}

impl IndexRemap {
    pub fn get(&self, old: u32) -> Option<u32> {
        self.map.get(&old).copied()
    }

    /// True when no index moved.
    pub fn is_identity(&self) -> bool {
        self.map.iter().all(|(old, new)| old == new)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.map.iter().map(|(&old, &new)| (old, new))
    }
}
