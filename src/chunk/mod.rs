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
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BinaryArray, BooleanArray, Date32Array, Decimal128Array, Decimal256Array,
    FixedSizeBinaryArray, Float32Array, Float64Array, Int16Array, Int32Array, Int64Array,
    Int8Array, RecordBatch, StringArray, TimestampMicrosecondArray, TimestampMillisecondArray,
    TimestampNanosecondArray, TimestampSecondArray, UInt16Array, UInt32Array, UInt64Array,
    UInt8Array,
};
use arrow::buffer::Buffer;
use arrow::compute::kernels::zip::zip;
use arrow::datatypes::{i256, DataType, Field, Schema, SchemaRef, TimeUnit};

/// A block of rows addressed by column name.
/// Wrapper around an Arrow `RecordBatch`.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub batch: RecordBatch,
    name_to_index: Arc<HashMap<String, usize>>,
}

impl Chunk {
    pub fn try_new(batch: RecordBatch) -> Result<Self, String> {
        let name_to_index = name_to_index_from_schema(batch.schema().as_ref())?;
        Ok(Self {
            batch,
            name_to_index: Arc::new(name_to_index),
        })
    }

    pub fn new(batch: RecordBatch) -> Self {
        match Self::try_new(batch) {
            Ok(v) => v,
            Err(e) => panic!("{e}"),
        }
    }

    pub fn try_from_parts(fields: Vec<Field>, columns: Vec<ArrayRef>) -> Result<Self, String> {
        let schema = Arc::new(Schema::new(fields));
        let batch = RecordBatch::try_new(schema, columns).map_err(|e| e.to_string())?;
        Self::try_new(batch)
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn len(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    pub fn columns(&self) -> &[ArrayRef] {
        self.batch.columns()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.name_to_index.contains_key(name)
    }

    pub fn column_by_name(&self, name: &str) -> Result<ArrayRef, String> {
        let idx = self.index_of(name).ok_or_else(|| {
            format!(
                "no such column {} in chunk (columns={:?})",
                name,
                self.batch
                    .schema()
                    .fields()
                    .iter()
                    .map(|f| f.name().clone())
                    .collect::<Vec<_>>()
            )
        })?;
        self.batch
            .columns()
            .get(idx)
            .cloned()
            .ok_or_else(|| format!("column {} mapped to invalid index {}", name, idx))
    }

    pub fn field_by_name(&self, name: &str) -> Result<Field, String> {
        let idx = self
            .index_of(name)
            .ok_or_else(|| format!("no such column {} in chunk", name))?;
        Ok(self.batch.schema().field(idx).clone())
    }

    pub fn estimated_bytes(&self) -> usize {
        record_batch_bytes(&self.batch)
    }
}

impl Default for Chunk {
    fn default() -> Self {
        Self {
            batch: RecordBatch::new_empty(Arc::new(Schema::empty())),
            name_to_index: Arc::new(HashMap::new()),
        }
    }
}

fn name_to_index_from_schema(schema: &Schema) -> Result<HashMap<String, usize>, String> {
    let mut map = HashMap::new();
    for (idx, field) in schema.fields().iter().enumerate() {
        if map.insert(field.name().clone(), idx).is_some() {
            // Duplicate names would make name-addressed join plumbing ambiguous.
            return Err(format!("duplicate column name {} in chunk schema", field.name()));
        }
    }
    Ok(map)
}

/// Estimate batch size by summing unique buffers inside the batch.
/// Shared buffers across batches (slices, dictionaries) are double-counted.
pub fn record_batch_bytes(batch: &RecordBatch) -> usize {
    let mut seen = HashSet::new();
    let mut total = 0usize;
    for column in batch.columns() {
        total = total.saturating_add(array_data_bytes(&column.to_data(), &mut seen));
    }
    total
}

fn array_data_bytes(data: &arrow::array::ArrayData, seen: &mut HashSet<usize>) -> usize {
    let mut total = 0usize;
    for buffer in data.buffers() {
        total = total.saturating_add(buffer_bytes(buffer, seen));
    }
    if let Some(nulls) = data.nulls() {
        total = total.saturating_add(buffer_bytes(nulls.buffer(), seen));
    }
    for child in data.child_data() {
        total = total.saturating_add(array_data_bytes(child, seen));
    }
    total
}

fn buffer_bytes(buffer: &Buffer, seen: &mut HashSet<usize>) -> usize {
    let ptr = buffer.data_ptr().as_ptr() as usize;
    if !seen.insert(ptr) {
        return 0;
    }
    buffer.capacity().max(buffer.len())
}

/// Array of `len` type-default values (zero, empty string, false).
pub fn default_array(data_type: &DataType, len: usize) -> Result<ArrayRef, String> {
    let array: ArrayRef = match data_type {
        DataType::Int8 => Arc::new(Int8Array::from(vec![0i8; len])),
        DataType::Int16 => Arc::new(Int16Array::from(vec![0i16; len])),
        DataType::Int32 => Arc::new(Int32Array::from(vec![0i32; len])),
        DataType::Int64 => Arc::new(Int64Array::from(vec![0i64; len])),
        DataType::UInt8 => Arc::new(UInt8Array::from(vec![0u8; len])),
        DataType::UInt16 => Arc::new(UInt16Array::from(vec![0u16; len])),
        DataType::UInt32 => Arc::new(UInt32Array::from(vec![0u32; len])),
        DataType::UInt64 => Arc::new(UInt64Array::from(vec![0u64; len])),
        DataType::Float32 => Arc::new(Float32Array::from(vec![0f32; len])),
        DataType::Float64 => Arc::new(Float64Array::from(vec![0f64; len])),
        DataType::Boolean => Arc::new(BooleanArray::from(vec![false; len])),
        DataType::Utf8 => Arc::new(StringArray::from(vec![""; len])),
        DataType::Binary => Arc::new(BinaryArray::from(vec![&b""[..]; len])),
        DataType::Date32 => Arc::new(Date32Array::from(vec![0i32; len])),
        DataType::Timestamp(unit, tz) => match unit {
            TimeUnit::Second => {
                Arc::new(TimestampSecondArray::from(vec![0i64; len]).with_timezone_opt(tz.clone()))
            }
            TimeUnit::Millisecond => Arc::new(
                TimestampMillisecondArray::from(vec![0i64; len]).with_timezone_opt(tz.clone()),
            ),
            TimeUnit::Microsecond => Arc::new(
                TimestampMicrosecondArray::from(vec![0i64; len]).with_timezone_opt(tz.clone()),
            ),
            TimeUnit::Nanosecond => Arc::new(
                TimestampNanosecondArray::from(vec![0i64; len]).with_timezone_opt(tz.clone()),
            ),
        },
        DataType::Decimal128(precision, scale) => Arc::new(
            Decimal128Array::from(vec![0i128; len])
                .with_precision_and_scale(*precision, *scale)
                .map_err(|e| e.to_string())?,
        ),
        DataType::Decimal256(precision, scale) => Arc::new(
            Decimal256Array::from(vec![i256::ZERO; len])
                .with_precision_and_scale(*precision, *scale)
                .map_err(|e| e.to_string())?,
        ),
        DataType::FixedSizeBinary(width) => {
            let bytes = (*width as usize).saturating_mul(len);
            Arc::new(
                FixedSizeBinaryArray::try_new(*width, Buffer::from(vec![0u8; bytes]), None)
                    .map_err(|e| e.to_string())?,
            )
        }
        other => return Err(format!("no default value for column type {}", other)),
    };
    Ok(array)
}

/// Per-row flag set when any of the arrays is null at that row.
/// `None` when no array carries nulls.
pub(crate) fn any_null_mask(arrays: &[ArrayRef]) -> Option<Vec<bool>> {
    let num_rows = arrays.first().map(|a| a.len()).unwrap_or(0);
    if arrays.iter().all(|a| a.null_count() == 0) {
        return None;
    }
    let mut mask = vec![false; num_rows];
    for array in arrays {
        if array.null_count() == 0 {
            continue;
        }
        for (row, flag) in mask.iter_mut().enumerate() {
            if array.is_null(row) {
                *flag = true;
            }
        }
    }
    Some(mask)
}

/// Read a boolean ON-condition column as a row mask; nulls count as false.
pub(crate) fn column_as_mask(
    chunk: &Chunk,
    name: Option<&str>,
) -> Result<Option<Vec<bool>>, String> {
    let Some(name) = name else {
        return Ok(None);
    };
    let column = chunk.column_by_name(name)?;
    let arr = column
        .as_any()
        .downcast_ref::<BooleanArray>()
        .ok_or_else(|| {
            format!(
                "join condition column {} must be Boolean, got {}",
                name,
                column.data_type()
            )
        })?;
    let mut mask = Vec::with_capacity(arr.len());
    for row in 0..arr.len() {
        mask.push(!arr.is_null(row) && arr.value(row));
    }
    Ok(Some(mask))
}

/// Keep rows where `filter` is set and replace the rest with type defaults,
/// preserving length. `inverse` flips the mask.
pub(crate) fn filter_with_blanks(
    array: &ArrayRef,
    filter: &[bool],
    inverse: bool,
) -> Result<ArrayRef, String> {
    let mask: Vec<bool> = if inverse {
        filter.iter().map(|v| !*v).collect()
    } else {
        filter.to_vec()
    };
    let mask = BooleanArray::from(mask);
    let defaults = default_array(array.data_type(), array.len())?;
    zip(&mask, array, &defaults).map_err(|e| e.to_string())
}

/// Align an array with the requested nullability: dropping nullability
/// replaces values masked by nulls with type defaults.
pub(crate) fn correct_nullability(array: &ArrayRef, nullable: bool) -> Result<ArrayRef, String> {
    if nullable || array.null_count() == 0 {
        return Ok(Arc::clone(array));
    }
    let valid: Vec<bool> = (0..array.len()).map(|row| array.is_valid(row)).collect();
    filter_with_blanks(array, &valid, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_column_names() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("a", DataType::Int32, true),
            Field::new("a", DataType::Int32, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int32Array::from(vec![1])) as ArrayRef,
                Arc::new(Int32Array::from(vec![2])) as ArrayRef,
            ],
        )
        .expect("record batch");
        let err = Chunk::try_new(batch).expect_err("expected duplicate error");
        assert!(err.contains("duplicate column name"), "err={}", err);
    }

    #[test]
    fn filter_with_blanks_keeps_length() {
        let array: ArrayRef = Arc::new(Int32Array::from(vec![5, 6, 7]));
        let out = filter_with_blanks(&array, &[true, false, true], false).expect("filter");
        let out = out.as_any().downcast_ref::<Int32Array>().expect("i32");
        assert_eq!(out.values(), &[5, 0, 7]);
    }

    #[test]
    fn correct_nullability_defaults_masked_rows() {
        let array: ArrayRef = Arc::new(Int32Array::from(vec![Some(5), None, Some(7)]));
        let out = correct_nullability(&array, false).expect("correct");
        assert_eq!(out.null_count(), 0);
        let out = out.as_any().downcast_ref::<Int32Array>().expect("i32");
        assert_eq!(out.values(), &[5, 0, 7]);
    }

    #[test]
    fn default_arrays_are_zero_valued() {
        let arr = default_array(&DataType::Utf8, 2).expect("default");
        let arr = arr.as_any().downcast_ref::<StringArray>().expect("utf8");
        assert_eq!(arr.value(0), "");
        let arr = default_array(&DataType::Decimal128(10, 2), 1).expect("default");
        assert_eq!(arr.null_count(), 0);
    }
}
