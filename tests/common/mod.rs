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
//! Shared helpers for the join integration tests.

#![allow(dead_code)]

use std::sync::{Arc, OnceLock};

use arrow::array::{Array, ArrayRef, BooleanArray, Int64Array, StringArray};
use arrow::datatypes::{Field, Schema, SchemaRef};
use tracing_subscriber::EnvFilter;

use junction::Chunk;

static LOGGING: OnceLock<()> = OnceLock::new();

/// Install the test log subscriber once per binary; `RUST_LOG` controls
/// verbosity.
pub fn init_logging() {
    LOGGING.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Build a chunk from `(name, array, nullable)` column triples.
pub fn chunk(columns: Vec<(&str, ArrayRef, bool)>) -> Chunk {
    let fields: Vec<Field> = columns
        .iter()
        .map(|(name, array, nullable)| Field::new(*name, array.data_type().clone(), *nullable))
        .collect();
    let arrays: Vec<ArrayRef> = columns.into_iter().map(|(_, array, _)| array).collect();
    Chunk::try_from_parts(fields, arrays).expect("test chunk")
}

pub fn schema(columns: Vec<(&str, arrow::datatypes::DataType, bool)>) -> SchemaRef {
    Arc::new(Schema::new(
        columns
            .into_iter()
            .map(|(name, data_type, nullable)| Field::new(name, data_type, nullable))
            .collect::<Vec<_>>(),
    ))
}

pub fn int64(values: Vec<i64>) -> ArrayRef {
    Arc::new(Int64Array::from(values))
}

pub fn int64_opt(values: Vec<Option<i64>>) -> ArrayRef {
    Arc::new(Int64Array::from(values))
}

pub fn utf8(values: Vec<&str>) -> ArrayRef {
    Arc::new(StringArray::from(values))
}

pub fn utf8_opt(values: Vec<Option<&str>>) -> ArrayRef {
    Arc::new(StringArray::from(values))
}

pub fn boolean(values: Vec<bool>) -> ArrayRef {
    Arc::new(BooleanArray::from(values))
}

pub fn i64_column(chunk: &Chunk, name: &str) -> Vec<Option<i64>> {
    let column = chunk.column_by_name(name).expect("column");
    let arr = column
        .as_any()
        .downcast_ref::<Int64Array>()
        .expect("int64 column");
    (0..arr.len())
        .map(|row| (!arr.is_null(row)).then(|| arr.value(row)))
        .collect()
}

pub fn utf8_column(chunk: &Chunk, name: &str) -> Vec<Option<String>> {
    let column = chunk.column_by_name(name).expect("column");
    let arr = column
        .as_any()
        .downcast_ref::<StringArray>()
        .expect("utf8 column");
    (0..arr.len())
        .map(|row| (!arr.is_null(row)).then(|| arr.value(row).to_string()))
        .collect()
}

/// Rows as `(key, value)` pairs for order-insensitive comparisons.
pub fn key_value_rows(chunk: &Chunk, key: &str, value: &str) -> Vec<(Option<i64>, Option<String>)> {
    i64_column(chunk, key)
        .into_iter()
        .zip(utf8_column(chunk, value))
        .collect()
}
