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
//! Nested-loop cross join with bounded output and resumable state.

use std::sync::Arc;

use arrow::array::{new_empty_array, Array, ArrayRef, UInt32Array};
use arrow::compute::{interleave, take};
use arrow::datatypes::Field;

use crate::chunk::Chunk;
use crate::join::operator::HashJoinOperator;

/// Resume point written when a cross join hits the output bound: the
/// remaining left block, the left row to continue at, and the 1-based next
/// right block. Hand it back unchanged on the next `join_block` call.
pub struct CrossJoinContinuation {
    pub block: Chunk,
    pub(crate) left_row: usize,
    pub(crate) right_block: usize,
}

pub(crate) fn join_block_cross(
    op: &HashJoinOperator,
    block: &mut Chunk,
    not_processed: &mut Option<CrossJoinContinuation>,
) -> Result<(), String> {
    let max_joined_block_rows = op.config.max_joined_block_rows;
    let (start_left_row, mut start_right_block) = match not_processed.take() {
        Some(continuation) => (continuation.left_row, continuation.right_block),
        None => (0, 0),
    };

    let data = op.joined_data();
    let rows_left = block.len();

    let mut left_indices: Vec<u32> = Vec::new();
    let mut right_refs: Vec<(usize, usize)> = Vec::new();
    let mut rows_added = 0usize;

    for left_row in start_left_row..rows_left {
        let mut block_number = 0usize;
        for (block_index, block_right) in data.blocks.iter().enumerate() {
            block_number += 1;
            if block_number < start_right_block {
                continue;
            }
            let rows_right = block_right.len();
            rows_added += rows_right;
            for row in 0..rows_right {
                left_indices.push(left_row as u32);
                right_refs.push((block_index, row));
            }
        }
        start_right_block = 0;

        if rows_added > max_joined_block_rows {
            *not_processed = Some(CrossJoinContinuation {
                block: block.clone(),
                left_row,
                right_block: block_number + 1,
            });
            break;
        }
    }

    let schema = block.schema();
    let mut fields: Vec<Field> = schema
        .fields()
        .iter()
        .map(|f| f.as_ref().clone())
        .collect();
    let take_indices: ArrayRef = Arc::new(UInt32Array::from(left_indices));
    let mut columns = Vec::with_capacity(fields.len() + op.columns_to_add.len());
    for column in block.columns() {
        columns.push(take(column, &take_indices, None).map_err(|e| e.to_string())?);
    }

    for field in &op.columns_to_add {
        let index = op.saved_block_index_of(field.name())?;
        let column = if right_refs.is_empty() {
            new_empty_array(field.data_type())
        } else {
            let arrays: Vec<&dyn Array> = data
                .blocks
                .iter()
                .map(|b| b.columns()[index].as_ref())
                .collect();
            interleave(&arrays, &right_refs).map_err(|e| e.to_string())?
        };
        fields.push(field.clone());
        columns.push(column);
    }

    *block = Chunk::try_from_parts(fields, columns)?;
    Ok(())
}
