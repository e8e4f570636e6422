// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
//! Hash-map family backing the join build-side index.
//!
//! Responsibilities:
//! - Owns one raw table per key shape; only the table matching the chosen
//!   layout is ever populated.
//! - Implements the insertion and lookup protocol with stable bucket indexes
//!   ("slot offsets") that address the usage-flag bank.
//!
//! Key exported interfaces:
//! - Types: `JoinKeyTable`, `EmplaceResult`.
//!
//! Current limitations:
//! - Bucket indexes are only stable once the build phase has finished; the
//!   flag bank is re-sized after every inserted block to keep up with
//!   resizes.

use std::mem;

use hashbrown::raw::RawTable;

use super::key_encode::{EncodedKeys, ProbeKeys};
use super::key_layout::JoinKeyLayout;
use super::key_storage::{RowKey, RowStorage};

pub(crate) struct EmplaceResult<'a, M> {
    pub(crate) mapped: &'a mut M,
    pub(crate) inserted: bool,
    pub(crate) slot: usize,
}

/// Map container generic over the mapped value shape (single row reference,
/// chained list, or as-of index).
pub(crate) struct JoinKeyTable<M> {
    layout: JoinKeyLayout,
    table_u64: RawTable<(u64, u64, M)>,
    table_u128: RawTable<(u128, u64, M)>,
    table_u256: RawTable<([u8; 32], u64, M)>,
    table_bytes: RawTable<(RowKey, u64, M)>,
    key_storage: RowStorage,
}

impl<M> JoinKeyTable<M> {
    pub(crate) fn new(layout: JoinKeyLayout) -> Self {
        Self {
            layout,
            table_u64: RawTable::new(),
            table_u128: RawTable::new(),
            table_u256: RawTable::new(),
            table_bytes: RawTable::new(),
            key_storage: RowStorage::new(64 * 1024),
        }
    }

    pub(crate) fn layout(&self) -> JoinKeyLayout {
        self.layout
    }

    /// Insert or find the entry for `row` of the encoded keys. The returned
    /// slot stays valid until the next insertion resizes the table.
    pub(crate) fn emplace(
        &mut self,
        keys: &ProbeKeys<'_>,
        row: usize,
        new_mapped: impl FnOnce() -> M,
    ) -> Result<EmplaceResult<'_, M>, String> {
        if keys.layout != self.layout {
            return Err(format!(
                "join key layout mismatch: table={:?} keys={:?}",
                self.layout, keys.layout
            ));
        }
        let hash = keys.hashes[row];
        match &keys.keys {
            EncodedKeys::U64(values) => {
                Ok(emplace_fixed(&mut self.table_u64, values[row], hash, new_mapped))
            }
            EncodedKeys::U128(values) => {
                Ok(emplace_fixed(&mut self.table_u128, values[row], hash, new_mapped))
            }
            EncodedKeys::U256(values) => {
                Ok(emplace_fixed(&mut self.table_u256, values[row], hash, new_mapped))
            }
            EncodedKeys::Str(arr) => Ok(emplace_bytes(
                &mut self.table_bytes,
                &mut self.key_storage,
                arr.value(row).as_bytes(),
                hash,
                new_mapped,
            )),
            EncodedKeys::FixedStr(arr) => Ok(emplace_bytes(
                &mut self.table_bytes,
                &mut self.key_storage,
                arr.value(row),
                hash,
                new_mapped,
            )),
        }
    }

    pub(crate) fn find(
        &self,
        keys: &ProbeKeys<'_>,
        row: usize,
    ) -> Result<Option<(usize, &M)>, String> {
        if keys.layout != self.layout {
            return Err(format!(
                "join key layout mismatch: table={:?} keys={:?}",
                self.layout, keys.layout
            ));
        }
        let hash = keys.hashes[row];
        let found = match &keys.keys {
            EncodedKeys::U64(values) => find_fixed(&self.table_u64, values[row], hash),
            EncodedKeys::U128(values) => find_fixed(&self.table_u128, values[row], hash),
            EncodedKeys::U256(values) => find_fixed(&self.table_u256, values[row], hash),
            EncodedKeys::Str(arr) => {
                find_bytes(&self.table_bytes, arr.value(row).as_bytes(), hash)
            }
            EncodedKeys::FixedStr(arr) => find_bytes(&self.table_bytes, arr.value(row), hash),
        };
        Ok(found)
    }

    /// Number of distinct keys in the active table.
    pub(crate) fn entry_count(&self) -> usize {
        match self.layout {
            JoinKeyLayout::Key8
            | JoinKeyLayout::Key16
            | JoinKeyLayout::Key32
            | JoinKeyLayout::Key64 => self.table_u64.len(),
            JoinKeyLayout::Keys128 | JoinKeyLayout::Hashed => self.table_u128.len(),
            JoinKeyLayout::Keys256 => self.table_u256.len(),
            JoinKeyLayout::KeyString | JoinKeyLayout::KeyFixedString => self.table_bytes.len(),
            JoinKeyLayout::Empty | JoinKeyLayout::Cross | JoinKeyLayout::Dict => 0,
        }
    }

    /// Bucket count of the active table; the flag bank is sized from this.
    pub(crate) fn bucket_count(&self) -> usize {
        match self.layout {
            JoinKeyLayout::Key8
            | JoinKeyLayout::Key16
            | JoinKeyLayout::Key32
            | JoinKeyLayout::Key64 => self.table_u64.buckets(),
            JoinKeyLayout::Keys128 | JoinKeyLayout::Hashed => self.table_u128.buckets(),
            JoinKeyLayout::Keys256 => self.table_u256.buckets(),
            JoinKeyLayout::KeyString | JoinKeyLayout::KeyFixedString => {
                self.table_bytes.buckets()
            }
            JoinKeyLayout::Empty | JoinKeyLayout::Cross | JoinKeyLayout::Dict => 0,
        }
    }

    pub(crate) fn allocated_bytes(&self) -> usize {
        fn table_bytes<T>(table: &RawTable<T>) -> usize {
            table.buckets().saturating_mul(mem::size_of::<T>())
        }
        table_bytes(&self.table_u64)
            .saturating_add(table_bytes(&self.table_u128))
            .saturating_add(table_bytes(&self.table_u256))
            .saturating_add(table_bytes(&self.table_bytes))
            .saturating_add(self.key_storage.allocated_bytes())
    }
}

impl<M: Copy> JoinKeyTable<M> {
    /// Snapshot the occupied slots in internal order for the non-joined
    /// emitter. Only valid after the build phase.
    pub(crate) fn collect_entries(&self) -> Vec<(usize, M)> {
        match self.layout {
            JoinKeyLayout::Key8
            | JoinKeyLayout::Key16
            | JoinKeyLayout::Key32
            | JoinKeyLayout::Key64 => collect(&self.table_u64),
            JoinKeyLayout::Keys128 | JoinKeyLayout::Hashed => collect(&self.table_u128),
            JoinKeyLayout::Keys256 => collect(&self.table_u256),
            JoinKeyLayout::KeyString | JoinKeyLayout::KeyFixedString => {
                collect(&self.table_bytes)
            }
            JoinKeyLayout::Empty | JoinKeyLayout::Cross | JoinKeyLayout::Dict => Vec::new(),
        }
    }
}

fn emplace_fixed<'a, K: Copy + PartialEq, M>(
    table: &'a mut RawTable<(K, u64, M)>,
    key: K,
    hash: u64,
    new_mapped: impl FnOnce() -> M,
) -> EmplaceResult<'a, M> {
    match table.find_or_find_insert_slot(hash, |entry| entry.0 == key, |entry| entry.1) {
        Ok(bucket) => {
            let slot = unsafe { table.bucket_index(&bucket) };
            EmplaceResult {
                mapped: unsafe { &mut bucket.as_mut().2 },
                inserted: false,
                slot,
            }
        }
        Err(insert_slot) => {
            let bucket =
                unsafe { table.insert_in_slot(hash, insert_slot, (key, hash, new_mapped())) };
            let slot = unsafe { table.bucket_index(&bucket) };
            EmplaceResult {
                mapped: unsafe { &mut bucket.as_mut().2 },
                inserted: true,
                slot,
            }
        }
    }
}

fn emplace_bytes<'a, M>(
    table: &'a mut RawTable<(RowKey, u64, M)>,
    storage: &mut RowStorage,
    key: &[u8],
    hash: u64,
    new_mapped: impl FnOnce() -> M,
) -> EmplaceResult<'a, M> {
    match table.find_or_find_insert_slot(hash, |entry| entry.0.as_slice() == key, |entry| entry.1)
    {
        Ok(bucket) => {
            let slot = unsafe { table.bucket_index(&bucket) };
            EmplaceResult {
                mapped: unsafe { &mut bucket.as_mut().2 },
                inserted: false,
                slot,
            }
        }
        Err(insert_slot) => {
            let stored = storage.alloc_copy(key);
            let bucket =
                unsafe { table.insert_in_slot(hash, insert_slot, (stored, hash, new_mapped())) };
            let slot = unsafe { table.bucket_index(&bucket) };
            EmplaceResult {
                mapped: unsafe { &mut bucket.as_mut().2 },
                inserted: true,
                slot,
            }
        }
    }
}

fn find_fixed<K: Copy + PartialEq, M>(
    table: &RawTable<(K, u64, M)>,
    key: K,
    hash: u64,
) -> Option<(usize, &M)> {
    table
        .find(hash, |entry| entry.0 == key)
        .map(|bucket| (unsafe { table.bucket_index(&bucket) }, unsafe { &bucket.as_ref().2 }))
}

fn find_bytes<'a, M>(
    table: &'a RawTable<(RowKey, u64, M)>,
    key: &[u8],
    hash: u64,
) -> Option<(usize, &'a M)> {
    table
        .find(hash, |entry| entry.0.as_slice() == key)
        .map(|bucket| (unsafe { table.bucket_index(&bucket) }, unsafe { &bucket.as_ref().2 }))
}

fn collect<K, M: Copy>(table: &RawTable<(K, u64, M)>) -> Vec<(usize, M)> {
    let mut out = Vec::with_capacity(table.len());
    unsafe {
        for bucket in table.iter() {
            let slot = table.bucket_index(&bucket);
            out.push((slot, bucket.as_ref().2));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash_table::key_encode::encode_join_keys;
    use arrow::array::{ArrayRef, Int64Array, StringArray};
    use std::sync::Arc;

    fn i64_keys(values: Vec<i64>) -> Vec<ArrayRef> {
        vec![Arc::new(Int64Array::from(values)) as ArrayRef]
    }

    #[test]
    fn emplace_then_find_round_trips_fixed_keys() {
        let arrays = i64_keys(vec![10, 20, 10]);
        let keys = encode_join_keys(&arrays, JoinKeyLayout::Key64, 7, None).expect("encode");
        let mut table = JoinKeyTable::<u32>::new(JoinKeyLayout::Key64);

        let first = table.emplace(&keys, 0, || 100).expect("emplace");
        assert!(first.inserted);
        let dup = table.emplace(&keys, 2, || 999).expect("emplace");
        assert!(!dup.inserted);
        assert_eq!(*dup.mapped, 100);

        table.emplace(&keys, 1, || 200).expect("emplace");
        assert_eq!(table.entry_count(), 2);

        let probe_arrays = i64_keys(vec![20, 30]);
        let probe =
            encode_join_keys(&probe_arrays, JoinKeyLayout::Key64, 7, None).expect("encode");
        let hit = table.find(&probe, 0).expect("find").expect("hit");
        assert_eq!(*hit.1, 200);
        assert!(table.find(&probe, 1).expect("find").is_none());
    }

    #[test]
    fn string_keys_are_copied_into_storage() {
        let arrays: Vec<ArrayRef> =
            vec![Arc::new(StringArray::from(vec!["left", "right", "left"]))];
        let keys = encode_join_keys(&arrays, JoinKeyLayout::KeyString, 7, None).expect("encode");
        let mut table = JoinKeyTable::<u32>::new(JoinKeyLayout::KeyString);
        assert!(table.emplace(&keys, 0, || 1).expect("emplace").inserted);
        assert!(table.emplace(&keys, 1, || 2).expect("emplace").inserted);
        assert!(!table.emplace(&keys, 2, || 3).expect("emplace").inserted);
        drop(arrays);
        assert_eq!(table.entry_count(), 2);
    }

    #[test]
    fn slots_address_distinct_buckets() {
        let arrays = i64_keys((0..100).collect());
        let keys = encode_join_keys(&arrays, JoinKeyLayout::Key64, 7, None).expect("encode");
        let mut table = JoinKeyTable::<u32>::new(JoinKeyLayout::Key64);
        for row in 0..100 {
            table.emplace(&keys, row, || row as u32).expect("emplace");
        }
        let mut slots: Vec<usize> = table.collect_entries().iter().map(|(s, _)| *s).collect();
        slots.sort_unstable();
        slots.dedup();
        assert_eq!(slots.len(), 100);
        assert!(slots.iter().all(|s| *s < table.bucket_count()));
    }
}
