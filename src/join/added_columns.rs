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
//! Column-wise assembly of the joined right-side output.
//!
//! The probe loop records one `(source block, row)` pair per emitted output
//! row; misses record a shared defaults slot instead, which stands in for
//! per-row default insertion. Materialization pulls each added column through
//! a single `interleave` call per column.

use arrow::array::{new_null_array, Array, ArrayRef};
use arrow::compute::interleave;
use arrow::datatypes::Field;

use crate::chunk::{default_array, Chunk};
use crate::join::row_refs::RowRef;

pub(crate) struct AddedColumns<'a> {
    sources: Vec<&'a Chunk>,
    fields: Vec<Field>,
    right_indexes: Vec<usize>,
    indices: Vec<(usize, usize)>,
}

impl<'a> AddedColumns<'a> {
    /// `fields` are the output columns to add; `right_indexes` gives each
    /// one's position inside every source block (all sources share the saved
    /// block schema).
    pub(crate) fn new(
        sources: Vec<&'a Chunk>,
        fields: Vec<Field>,
        right_indexes: Vec<usize>,
        expected_rows: usize,
    ) -> Self {
        debug_assert_eq!(fields.len(), right_indexes.len());
        Self {
            sources,
            fields,
            right_indexes,
            indices: Vec::with_capacity(expected_rows),
        }
    }

    pub(crate) fn num_columns(&self) -> usize {
        self.fields.len()
    }

    pub(crate) fn append_row(&mut self, row_ref: RowRef) {
        self.indices
            .push((row_ref.block as usize, row_ref.row as usize));
    }

    /// Deferred NULL/default row; resolved against the shared defaults slot
    /// at materialization time.
    pub(crate) fn append_default_row(&mut self) {
        self.indices.push((self.sources.len(), 0));
    }

    /// Build the added columns. Missing rows become NULL for nullable output
    /// fields and type defaults otherwise.
    pub(crate) fn materialize(self) -> Result<Vec<(Field, ArrayRef)>, String> {
        let mut out = Vec::with_capacity(self.fields.len());
        for (field, right_index) in self.fields.into_iter().zip(self.right_indexes) {
            let defaults: ArrayRef = if field.is_nullable() {
                new_null_array(field.data_type(), 1)
            } else {
                default_array(field.data_type(), 1)?
            };
            let mut arrays: Vec<&dyn Array> = Vec::with_capacity(self.sources.len() + 1);
            for source in &self.sources {
                let column = source.columns().get(right_index).ok_or_else(|| {
                    format!(
                        "stored join block misses column index {} (columns={})",
                        right_index,
                        source.columns().len()
                    )
                })?;
                if column.data_type() != field.data_type() {
                    return Err(format!(
                        "stored join column type mismatch for {}: stored={} output={}",
                        field.name(),
                        column.data_type(),
                        field.data_type()
                    ));
                }
                arrays.push(column.as_ref());
            }
            arrays.push(defaults.as_ref());
            let column = interleave(&arrays, &self.indices).map_err(|e| e.to_string())?;
            out.push((field, column));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int32Array, RecordBatch, StringArray};
    use arrow::datatypes::{DataType, Schema};
    use std::sync::Arc;

    fn source_chunk() -> Chunk {
        let schema = Arc::new(Schema::new(vec![
            Field::new("k", DataType::Int32, false),
            Field::new("v", DataType::Utf8, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int32Array::from(vec![1, 2])) as ArrayRef,
                Arc::new(StringArray::from(vec!["a", "b"])) as ArrayRef,
            ],
        )
        .expect("batch");
        Chunk::new(batch)
    }

    #[test]
    fn interleaves_rows_and_lazy_defaults() {
        let source = source_chunk();
        let mut added = AddedColumns::new(
            vec![&source],
            vec![Field::new("v", DataType::Utf8, true)],
            vec![1],
            3,
        );
        added.append_row(RowRef { block: 0, row: 1 });
        added.append_default_row();
        added.append_row(RowRef { block: 0, row: 0 });
        let columns = added.materialize().expect("materialize");
        assert_eq!(columns.len(), 1);
        let v = columns[0]
            .1
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("utf8");
        assert_eq!(v.value(0), "b");
        assert!(v.is_null(1));
        assert_eq!(v.value(2), "a");
    }

    #[test]
    fn non_nullable_misses_become_defaults() {
        let source = source_chunk();
        let mut added = AddedColumns::new(
            vec![&source],
            vec![Field::new("k", DataType::Int32, false)],
            vec![0],
            2,
        );
        added.append_default_row();
        added.append_row(RowRef { block: 0, row: 0 });
        let columns = added.materialize().expect("materialize");
        let k = columns[0]
            .1
            .as_any()
            .downcast_ref::<Int32Array>()
            .expect("i32");
        assert_eq!(k.values(), &[0, 1]);
        assert_eq!(k.null_count(), 0);
    }
}
