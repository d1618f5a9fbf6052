//! Versioned delete bitmaps.
//!
//! Maps `(rowset, segment, version)` to the rows deleted by that version.
//! Entries at different versions of one segment are independent deltas; the
//! rows deleted as of version `V` are the union of the entries with
//! `version <= V`, which callers compute from [`DeleteBitmap::subset`].
//!
//! One readers-writer lock guards the whole map. Reads and snapshots take the
//! shared side; mutation and merge take the exclusive side, so no reader ever
//! sees a half-applied update of an entry.

use crate::error::{Error, Result};
use parking_lot::RwLock;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a rowset.
pub type RowsetId = u64;

/// Key of one delete bitmap entry, ordered by rowset, segment, then version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BitmapKey {
    /// Rowset the segment belongs to.
    pub rowset_id: RowsetId,
    /// Segment within the rowset.
    pub segment_id: u32,
    /// Version that produced the deletes.
    pub version: u64,
}

impl BitmapKey {
    /// Creates a key.
    pub fn new(rowset_id: RowsetId, segment_id: u32, version: u64) -> Self {
        Self { rowset_id, segment_id, version }
    }
}

impl fmt::Display for BitmapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.rowset_id, self.segment_id, self.version)
    }
}

/// What [`DeleteBitmap::set`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// The key was new.
    Inserted,
    /// An existing entry was replaced.
    Replaced,
}

#[derive(Serialize, Deserialize)]
struct EncodedEntry {
    key: BitmapKey,
    bitmap: Vec<u8>,
}

/// Thread-safe map from [`BitmapKey`] to deleted row ordinals.
#[derive(Default)]
pub struct DeleteBitmap {
    entries: RwLock<BTreeMap<BitmapKey, RoaringBitmap>>,
}

impl DeleteBitmap {
    /// Creates an empty delete bitmap.
    pub fn new() -> Self {
        Self::default()
    }

    fn from_entries(entries: BTreeMap<BitmapKey, RoaringBitmap>) -> Self {
        Self { entries: RwLock::new(entries) }
    }

    /// Marks `row_id` deleted at `key`.
    pub fn add(&self, key: BitmapKey, row_id: u32) {
        self.entries.write().entry(key).or_default().insert(row_id);
    }

    /// Clears `row_id` at `key`. Fails with `NotFound` if `key` has no entry.
    pub fn remove(&self, key: BitmapKey, row_id: u32) -> Result<()> {
        let mut entries = self.entries.write();
        let bitmap = entries
            .get_mut(&key)
            .ok_or_else(|| Error::not_found(format!("delete bitmap entry {}", key)))?;
        bitmap.remove(row_id);
        Ok(())
    }

    /// Drops every entry with `low <= key < high` and returns how many went.
    pub fn remove_range(&self, low: BitmapKey, high: BitmapKey) -> usize {
        if high <= low {
            return 0;
        }
        let mut entries = self.entries.write();
        let mut tail = entries.split_off(&low);
        let mut rest = tail.split_off(&high);
        entries.append(&mut rest);
        log::debug!("removed {} delete bitmap entries in [{}, {})", tail.len(), low, high);
        tail.len()
    }

    /// Whether `row_id` is deleted at `key`. An absent key deletes nothing.
    pub fn contains(&self, key: BitmapKey, row_id: u32) -> bool {
        self.entries.read().get(&key).is_some_and(|b| b.contains(row_id))
    }

    /// A copy of the entry at `key`. Fails with `NotFound` if there is none.
    pub fn get(&self, key: BitmapKey) -> Result<RoaringBitmap> {
        self.entries
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("delete bitmap entry {}", key)))
    }

    /// Runs `f` on the entry at `key` under the shared lock.
    pub fn with_bitmap<R>(&self, key: BitmapKey, f: impl FnOnce(&RoaringBitmap) -> R) -> Option<R> {
        self.entries.read().get(&key).map(f)
    }

    /// Inserts or replaces the entry at `key`.
    pub fn set(&self, key: BitmapKey, bitmap: RoaringBitmap) -> SetOutcome {
        match self.entries.write().insert(key, bitmap) {
            Some(_) => SetOutcome::Replaced,
            None => SetOutcome::Inserted,
        }
    }

    /// A new delete bitmap holding copies of the entries with
    /// `low <= key < high`.
    pub fn subset(&self, low: BitmapKey, high: BitmapKey) -> DeleteBitmap {
        if high <= low {
            return DeleteBitmap::new();
        }
        let entries = self.entries.read();
        let copied = entries.range(low..high).map(|(k, v)| (*k, v.clone())).collect();
        DeleteBitmap::from_entries(copied)
    }

    /// Copies every entry of `other` into this bitmap. On a shared key the
    /// entry of `other` wins.
    pub fn merge(&self, other: &DeleteBitmap) {
        // Copy first so the two locks are never held together.
        let incoming = other.entries.read().clone();
        let count = incoming.len();
        let mut entries = self.entries.write();
        entries.extend(incoming);
        log::debug!("merged {} delete bitmap entries, {} total", count, entries.len());
    }

    /// An independent deep copy taken at one instant.
    pub fn snapshot(&self) -> DeleteBitmap {
        DeleteBitmap::from_entries(self.entries.read().clone())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Total deleted rows over all entries.
    pub fn cardinality(&self) -> u64 {
        self.entries.read().values().map(RoaringBitmap::len).sum()
    }

    /// Keys in order.
    pub fn keys(&self) -> Vec<BitmapKey> {
        self.entries.read().keys().copied().collect()
    }

    /// Serialises the whole map; bitmaps use the portable roaring format.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let entries = self.entries.read();
        let mut encoded = Vec::with_capacity(entries.len());
        for (key, bitmap) in entries.iter() {
            let mut bytes = Vec::with_capacity(bitmap.serialized_size());
            bitmap.serialize_into(&mut bytes)?;
            encoded.push(EncodedEntry { key: *key, bitmap: bytes });
        }
        Ok(bincode::serialize(&encoded)?)
    }

    /// Parses the output of [`DeleteBitmap::encode`].
    pub fn decode(data: &[u8]) -> Result<Self> {
        let encoded: Vec<EncodedEntry> = bincode::deserialize(data)
            .map_err(|e| Error::corruption(format!("malformed delete bitmap: {}", e)))?;
        let mut entries = BTreeMap::new();
        for entry in encoded {
            let bitmap = RoaringBitmap::deserialize_from(entry.bitmap.as_slice()).map_err(|e| {
                Error::corruption(format!("malformed bitmap for entry {}: {}", entry.key, e))
            })?;
            if entries.insert(entry.key, bitmap).is_some() {
                return Err(Error::corruption(format!(
                    "duplicate delete bitmap entry {}",
                    entry.key
                )));
            }
        }
        Ok(Self::from_entries(entries))
    }
}

impl Clone for DeleteBitmap {
    fn clone(&self) -> Self {
        self.snapshot()
    }
}

impl fmt::Debug for DeleteBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read();
        f.debug_map().entries(entries.iter().map(|(k, v)| (k, v.len()))).finish()
    }
}

impl PartialEq for DeleteBitmap {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        // Copy one side first so the two locks are never held together.
        let theirs = other.entries.read().clone();
        *self.entries.read() == theirs
    }
}
