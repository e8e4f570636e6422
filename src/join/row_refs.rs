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
use std::cmp::Ordering;
use std::mem;

use arrow::array::{
    Array, ArrayRef, Date32Array, Decimal128Array, Float32Array, Float64Array, Int16Array,
    Int32Array, Int64Array, Int8Array, TimestampMicrosecondArray, TimestampMillisecondArray,
    TimestampNanosecondArray, TimestampSecondArray, UInt16Array, UInt32Array, UInt64Array,
    UInt8Array,
};
use arrow::datatypes::{DataType, TimeUnit};

use super::config::AsofInequality;

const ROW_NONE: u32 = u32::MAX;

/// Stable reference to one build-side row: stored-block index plus row index
/// within that block. Never mutated after insertion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct RowRef {
    pub(crate) block: u32,
    pub(crate) row: u32,
}

#[derive(Clone, Copy)]
struct RowRefNode {
    row: RowRef,
    next: u32,
}

/// Index-based arena holding the overflow chains of multi-mapped values.
/// Nodes are addressed by 32-bit ids so map resizes never invalidate chains.
pub(crate) struct RowRefArena {
    nodes: Vec<RowRefNode>,
}

impl RowRefArena {
    pub(crate) fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    fn alloc(&mut self, row: RowRef) -> u32 {
        let id = self.nodes.len() as u32;
        self.nodes.push(RowRefNode {
            row,
            next: ROW_NONE,
        });
        id
    }

    pub(crate) fn allocated_bytes(&self) -> usize {
        self.nodes.capacity().saturating_mul(mem::size_of::<RowRefNode>())
    }
}

/// Multi-mapped value: the first row inline, later rows chained through the
/// arena in insertion order.
#[derive(Clone, Copy)]
pub(crate) struct RowRefList {
    pub(crate) head: RowRef,
    first: u32,
    last: u32,
}

impl RowRefList {
    pub(crate) fn new(head: RowRef) -> Self {
        Self {
            head,
            first: ROW_NONE,
            last: ROW_NONE,
        }
    }

    pub(crate) fn push(&mut self, row: RowRef, arena: &mut RowRefArena) {
        let id = arena.alloc(row);
        if self.last == ROW_NONE {
            self.first = id;
        } else {
            arena.nodes[self.last as usize].next = id;
        }
        self.last = id;
    }

    pub(crate) fn iter<'a>(&self, arena: &'a RowRefArena) -> RowRefListIter<'a> {
        RowRefListIter {
            arena,
            head: Some(self.head),
            next: self.first,
        }
    }
}

pub(crate) struct RowRefListIter<'a> {
    arena: &'a RowRefArena,
    head: Option<RowRef>,
    next: u32,
}

impl Iterator for RowRefListIter<'_> {
    type Item = RowRef;

    fn next(&mut self) -> Option<RowRef> {
        if let Some(head) = self.head.take() {
            return Some(head);
        }
        if self.next == ROW_NONE {
            return None;
        }
        let node = self.arena.nodes[self.next as usize];
        self.next = node.next;
        Some(node.row)
    }
}

/// As-of key value drawn from the trailing key column. Variants never mix
/// within one operator because the column type is fixed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum AsofKey {
    Int(i128),
    Float(f64),
}

impl PartialOrd for AsofKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.total_cmp(other))
    }
}

impl AsofKey {
    fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (AsofKey::Int(a), AsofKey::Int(b)) => a.cmp(b),
            (AsofKey::Float(a), AsofKey::Float(b)) => a.total_cmp(b),
            (AsofKey::Int(_), AsofKey::Float(_)) => Ordering::Less,
            (AsofKey::Float(_), AsofKey::Int(_)) => Ordering::Greater,
        }
    }
}

pub(crate) fn asof_key_type_supported(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
            | DataType::Date32
            | DataType::Timestamp(_, _)
            | DataType::Decimal128(_, _)
    )
}

/// Read the as-of key at `row`; the column was validated non-nullable on the
/// build side and null probe rows never reach this point.
pub(crate) fn asof_key_at(array: &ArrayRef, row: usize) -> Result<AsofKey, String> {
    macro_rules! int_key {
        ($arr_ty:ty) => {{
            let arr = array
                .as_any()
                .downcast_ref::<$arr_ty>()
                .ok_or_else(|| format!("failed to downcast asof column {}", array.data_type()))?;
            Ok(AsofKey::Int(arr.value(row) as i128))
        }};
    }
    match array.data_type() {
        DataType::Int8 => int_key!(Int8Array),
        DataType::Int16 => int_key!(Int16Array),
        DataType::Int32 => int_key!(Int32Array),
        DataType::Int64 => int_key!(Int64Array),
        DataType::UInt8 => int_key!(UInt8Array),
        DataType::UInt16 => int_key!(UInt16Array),
        DataType::UInt32 => int_key!(UInt32Array),
        DataType::UInt64 => int_key!(UInt64Array),
        DataType::Date32 => int_key!(Date32Array),
        DataType::Decimal128(_, _) => int_key!(Decimal128Array),
        DataType::Timestamp(unit, _) => match unit {
            TimeUnit::Second => int_key!(TimestampSecondArray),
            TimeUnit::Millisecond => int_key!(TimestampMillisecondArray),
            TimeUnit::Microsecond => int_key!(TimestampMicrosecondArray),
            TimeUnit::Nanosecond => int_key!(TimestampNanosecondArray),
        },
        DataType::Float32 => {
            let arr = array
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| "failed to downcast Float32 asof column".to_string())?;
            Ok(AsofKey::Float(arr.value(row) as f64))
        }
        DataType::Float64 => {
            let arr = array
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| "failed to downcast Float64 asof column".to_string())?;
            Ok(AsofKey::Float(arr.value(row)))
        }
        other => Err(format!("unsupported asof join column type {}", other)),
    }
}

/// Per-key ordered index over the as-of column. Entries stay sorted by key;
/// equal keys keep insertion order.
#[derive(Clone)]
pub(crate) struct AsofRowRefs {
    entries: Vec<(AsofKey, RowRef)>,
}

impl AsofRowRefs {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub(crate) fn insert(&mut self, key: AsofKey, row: RowRef) {
        let pos = self
            .entries
            .partition_point(|(k, _)| k.total_cmp(&key) != Ordering::Greater);
        self.entries.insert(pos, (key, row));
    }

    /// Nearest entry satisfying `right_key OP left_key` for the configured
    /// inequality: the greatest admissible key for `<=`/`<`, the smallest for
    /// `>=`/`>`.
    pub(crate) fn find_asof(&self, inequality: AsofInequality, left: AsofKey) -> Option<RowRef> {
        match inequality {
            AsofInequality::LessOrEquals => {
                let end = self
                    .entries
                    .partition_point(|(k, _)| k.total_cmp(&left) != Ordering::Greater);
                end.checked_sub(1).map(|i| self.entries[i].1)
            }
            AsofInequality::Less => {
                let end = self
                    .entries
                    .partition_point(|(k, _)| k.total_cmp(&left) == Ordering::Less);
                end.checked_sub(1).map(|i| self.entries[i].1)
            }
            AsofInequality::GreaterOrEquals => {
                let start = self
                    .entries
                    .partition_point(|(k, _)| k.total_cmp(&left) == Ordering::Less);
                self.entries.get(start).map(|e| e.1)
            }
            AsofInequality::Greater => {
                let start = self
                    .entries
                    .partition_point(|(k, _)| k.total_cmp(&left) != Ordering::Greater);
                self.entries.get(start).map(|e| e.1)
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
