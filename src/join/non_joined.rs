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
//! Emitter for right rows that no probe matched.
//!
//! Walks the hash map in internal order, skipping slots whose usage flag was
//! set during probing, then drains the side list of null-key, mask-rejected
//! and collision-losing rows. Yields batches of at most `max_block_size`
//! rows, suspending between batches by remembering its positions.

use arrow::array::{new_null_array, Array, ArrayRef};
use arrow::compute::interleave;
use arrow::datatypes::SchemaRef;

use crate::chunk::{default_array, Chunk};
use crate::join::operator::{HashJoinOperator, JoinMaps};
use crate::join::row_refs::{RowRef, RowRefList};

#[derive(Clone, Copy)]
enum MappedRows {
    One(RowRef),
    List(RowRefList),
}

pub struct NonJoinedBlocks<'a> {
    op: &'a HashJoinOperator,
    result_schema: SchemaRef,
    max_block_size: usize,
    entries: Option<Vec<(usize, MappedRows)>>,
    position: usize,
    side_position: usize,
}

impl<'a> NonJoinedBlocks<'a> {
    pub(crate) fn new(
        op: &'a HashJoinOperator,
        result_schema: SchemaRef,
        max_block_size: usize,
    ) -> Self {
        Self {
            op,
            result_schema,
            max_block_size: max_block_size.max(1),
            entries: None,
            position: 0,
            side_position: 0,
        }
    }

    /// Next batch of non-joined rows in the result schema, or `None` once
    /// the map and the side list are exhausted.
    pub fn next_block(&mut self) -> Result<Option<Chunk>, String> {
        let data = self.op.joined_data();
        if self.entries.is_none() {
            self.entries = Some(match &data.maps {
                JoinMaps::One(table) => table
                    .collect_entries()
                    .into_iter()
                    .map(|(slot, row)| (slot, MappedRows::One(row)))
                    .collect(),
                JoinMaps::All(table) => table
                    .collect_entries()
                    .into_iter()
                    .map(|(slot, list)| (slot, MappedRows::List(list)))
                    .collect(),
                // As-of strictness never reaches the emitter.
                JoinMaps::Asof(_) => Vec::new(),
            });
        }
        let entries = self.entries.as_ref().expect("non-joined entries");

        let mut refs: Vec<(usize, usize)> = Vec::new();
        while self.position < entries.len() && refs.len() < self.max_block_size {
            let (slot, mapped) = entries[self.position];
            self.position += 1;
            if self.op.used_flags.get_used(slot) {
                continue;
            }
            match mapped {
                MappedRows::One(row) => refs.push((row.block as usize, row.row as usize)),
                MappedRows::List(list) => {
                    for row in list.iter(&data.arena) {
                        refs.push((row.block as usize, row.row as usize));
                    }
                }
            }
        }

        while self.side_position < data.side_rows.len() && refs.len() < self.max_block_size {
            let (block_index, mask) = &data.side_rows[self.side_position];
            self.side_position += 1;
            for (row, flagged) in mask.iter().enumerate() {
                if *flagged {
                    refs.push((*block_index as usize, row));
                }
            }
        }

        if refs.is_empty() {
            return Ok(None);
        }
        self.build_block(&refs).map(Some)
    }

    fn build_block(&self, refs: &[(usize, usize)]) -> Result<Chunk, String> {
        let data = self.op.joined_data();
        let len = refs.len();
        let mut fields = Vec::with_capacity(self.result_schema.fields().len());
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(fields.capacity());
        for field in self.result_schema.fields() {
            let column = match self.op.saved_block_index_of(field.name()) {
                Ok(index) => {
                    let arrays: Vec<&dyn Array> = data
                        .blocks
                        .iter()
                        .map(|b| b.columns()[index].as_ref())
                        .collect();
                    interleave(&arrays, refs).map_err(|e| e.to_string())?
                }
                // Left-side columns: nulls when the schema allows, type
                // defaults otherwise.
                Err(_) => {
                    if field.is_nullable() {
                        new_null_array(field.data_type(), len)
                    } else {
                        default_array(field.data_type(), len)?
                    }
                }
            };
            fields.push(field.as_ref().clone());
            columns.push(column);
        }
        Chunk::try_from_parts(fields, columns)
    }
}
