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
//! Per-layout key encoding for join hash tables.
//!
//! Responsibilities:
//! - Normalizes key column values into the fixed/variable key shapes the map
//!   family stores, one vector per probed or inserted block.
//! - Computes the per-row bucket hashes alongside.
//!
//! Key exported interfaces:
//! - Types: `EncodedKeys`, `ProbeKeys`.
//! - Functions: `encode_join_keys`, `write_fixed_value`.

use arrow::array::{
    Array, ArrayRef, BooleanArray, Date32Array, Decimal128Array, Decimal256Array,
    FixedSizeBinaryArray, Float32Array, Float64Array, Int16Array, Int32Array, Int64Array,
    Int8Array, StringArray, TimestampMicrosecondArray, TimestampMillisecondArray,
    TimestampNanosecondArray, TimestampSecondArray, UInt16Array, UInt32Array, UInt64Array,
    UInt8Array,
};
use arrow::datatypes::{DataType, TimeUnit};
use arrow::row::RowConverter;

use super::hash::{
    canonical_f32_bits, canonical_f64_bits, hash_bytes_with_seed, hash_u128_with_seed,
    hash_u64_with_seed,
};
use super::key_layout::JoinKeyLayout;

// Second seed mixed into the high half of serialized-key hashes.
const HASHED_HIGH_SEED: u64 = 0x517cc1b727220a95;

/// Normalized key material for one block, shaped per layout.
pub(crate) enum EncodedKeys<'a> {
    U64(Vec<u64>),
    U128(Vec<u128>),
    U256(Vec<[u8; 32]>),
    Str(&'a StringArray),
    FixedStr(&'a FixedSizeBinaryArray),
}

/// Encoded keys plus per-row bucket hashes. Rows with a null in any key
/// column carry unspecified key bytes and a zero hash; callers never look at
/// them.
pub(crate) struct ProbeKeys<'a> {
    pub(crate) layout: JoinKeyLayout,
    pub(crate) keys: EncodedKeys<'a>,
    pub(crate) hashes: Vec<u64>,
    pub(crate) len: usize,
}

pub(crate) fn encode_join_keys<'a>(
    arrays: &'a [ArrayRef],
    layout: JoinKeyLayout,
    seed: u64,
    row_converter: Option<&RowConverter>,
) -> Result<ProbeKeys<'a>, String> {
    let num_rows = arrays.first().map(|a| a.len()).unwrap_or(0);
    for array in arrays {
        if array.len() != num_rows {
            return Err(format!(
                "join key column row count mismatch: expected_rows={} actual_rows={}",
                num_rows,
                array.len()
            ));
        }
    }

    match layout {
        JoinKeyLayout::Key8
        | JoinKeyLayout::Key16
        | JoinKeyLayout::Key32
        | JoinKeyLayout::Key64 => {
            let array = single_key_array(arrays)?;
            let mut keys = Vec::with_capacity(num_rows);
            let mut hashes = Vec::with_capacity(num_rows);
            for row in 0..num_rows {
                let mut buf = [0u8; 8];
                write_fixed_value(array.as_ref(), row, &mut buf)?;
                let key = u64::from_le_bytes(buf);
                keys.push(key);
                hashes.push(hash_u64_with_seed(seed, key));
            }
            Ok(ProbeKeys {
                layout,
                keys: EncodedKeys::U64(keys),
                hashes,
                len: num_rows,
            })
        }
        JoinKeyLayout::Keys128 => {
            let mut keys = Vec::with_capacity(num_rows);
            let mut hashes = Vec::with_capacity(num_rows);
            for row in 0..num_rows {
                let mut buf = [0u8; 16];
                let mut offset = 0usize;
                for array in arrays {
                    offset += write_fixed_value(array.as_ref(), row, &mut buf[offset..])?;
                }
                let key = u128::from_le_bytes(buf);
                keys.push(key);
                hashes.push(hash_u128_with_seed(seed, key));
            }
            Ok(ProbeKeys {
                layout,
                keys: EncodedKeys::U128(keys),
                hashes,
                len: num_rows,
            })
        }
        JoinKeyLayout::Keys256 => {
            let mut keys = Vec::with_capacity(num_rows);
            let mut hashes = Vec::with_capacity(num_rows);
            for row in 0..num_rows {
                let mut buf = [0u8; 32];
                let mut offset = 0usize;
                for array in arrays {
                    offset += write_fixed_value(array.as_ref(), row, &mut buf[offset..])?;
                }
                hashes.push(hash_bytes_with_seed(seed, &buf));
                keys.push(buf);
            }
            Ok(ProbeKeys {
                layout,
                keys: EncodedKeys::U256(keys),
                hashes,
                len: num_rows,
            })
        }
        JoinKeyLayout::KeyString => {
            let array = single_key_array(arrays)?;
            let arr = array
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| "string join key expects a Utf8 column".to_string())?;
            let mut hashes = Vec::with_capacity(num_rows);
            for row in 0..num_rows {
                if arr.is_null(row) {
                    hashes.push(0);
                } else {
                    hashes.push(hash_bytes_with_seed(seed, arr.value(row).as_bytes()));
                }
            }
            Ok(ProbeKeys {
                layout,
                keys: EncodedKeys::Str(arr),
                hashes,
                len: num_rows,
            })
        }
        JoinKeyLayout::KeyFixedString => {
            let array = single_key_array(arrays)?;
            let arr = array
                .as_any()
                .downcast_ref::<FixedSizeBinaryArray>()
                .ok_or_else(|| "fixed string join key expects a FixedSizeBinary column".to_string())?;
            let mut hashes = Vec::with_capacity(num_rows);
            for row in 0..num_rows {
                if arr.is_null(row) {
                    hashes.push(0);
                } else {
                    hashes.push(hash_bytes_with_seed(seed, arr.value(row)));
                }
            }
            Ok(ProbeKeys {
                layout,
                keys: EncodedKeys::FixedStr(arr),
                hashes,
                len: num_rows,
            })
        }
        JoinKeyLayout::Hashed => {
            let converter = row_converter
                .ok_or_else(|| "serialized join keys require a row converter".to_string())?;
            let rows = converter
                .convert_columns(arrays)
                .map_err(|e| e.to_string())?;
            let mut keys = Vec::with_capacity(num_rows);
            let mut hashes = Vec::with_capacity(num_rows);
            for row in 0..num_rows {
                let bytes = rows.row(row).data();
                let low = hash_bytes_with_seed(seed, bytes);
                let high = hash_bytes_with_seed(seed ^ HASHED_HIGH_SEED, bytes);
                let key = ((high as u128) << 64) | low as u128;
                keys.push(key);
                hashes.push(hash_u128_with_seed(seed, key));
            }
            Ok(ProbeKeys {
                layout,
                keys: EncodedKeys::U128(keys),
                hashes,
                len: num_rows,
            })
        }
        JoinKeyLayout::Empty | JoinKeyLayout::Cross | JoinKeyLayout::Dict => Err(format!(
            "unsupported join keys for layout {:?}",
            layout
        )),
    }
}

fn single_key_array(arrays: &[ArrayRef]) -> Result<&ArrayRef, String> {
    if arrays.len() != 1 {
        return Err(format!(
            "single-column key layout got {} key columns",
            arrays.len()
        ));
    }
    Ok(&arrays[0])
}

/// Write the little-endian fixed-width value of `array[row]` into `out`,
/// returning the width. Null rows write zeroed bytes.
pub(crate) fn write_fixed_value(
    array: &dyn Array,
    row: usize,
    out: &mut [u8],
) -> Result<usize, String> {
    macro_rules! write_primitive {
        ($arr_ty:ty, $width:expr, $to_bytes:expr) => {{
            let arr = array
                .as_any()
                .downcast_ref::<$arr_ty>()
                .ok_or_else(|| format!("failed to downcast {} key column", array.data_type()))?;
            if !array.is_null(row) {
                let bytes = $to_bytes(arr.value(row));
                out[..$width].copy_from_slice(&bytes);
            } else {
                out[..$width].fill(0);
            }
            Ok($width)
        }};
    }

    match array.data_type() {
        DataType::Int8 => write_primitive!(Int8Array, 1, |v: i8| v.to_le_bytes()),
        DataType::Int16 => write_primitive!(Int16Array, 2, |v: i16| v.to_le_bytes()),
        DataType::Int32 => write_primitive!(Int32Array, 4, |v: i32| v.to_le_bytes()),
        DataType::Int64 => write_primitive!(Int64Array, 8, |v: i64| v.to_le_bytes()),
        DataType::UInt8 => write_primitive!(UInt8Array, 1, |v: u8| v.to_le_bytes()),
        DataType::UInt16 => write_primitive!(UInt16Array, 2, |v: u16| v.to_le_bytes()),
        DataType::UInt32 => write_primitive!(UInt32Array, 4, |v: u32| v.to_le_bytes()),
        DataType::UInt64 => write_primitive!(UInt64Array, 8, |v: u64| v.to_le_bytes()),
        DataType::Float32 => {
            write_primitive!(Float32Array, 4, |v: f32| canonical_f32_bits(v).to_le_bytes())
        }
        DataType::Float64 => {
            write_primitive!(Float64Array, 8, |v: f64| canonical_f64_bits(v).to_le_bytes())
        }
        DataType::Boolean => {
            let arr = array
                .as_any()
                .downcast_ref::<BooleanArray>()
                .ok_or_else(|| "failed to downcast Boolean key column".to_string())?;
            out[0] = if !array.is_null(row) && arr.value(row) {
                1
            } else {
                0
            };
            Ok(1)
        }
        DataType::Date32 => write_primitive!(Date32Array, 4, |v: i32| v.to_le_bytes()),
        DataType::Timestamp(unit, _) => match unit {
            TimeUnit::Second => {
                write_primitive!(TimestampSecondArray, 8, |v: i64| v.to_le_bytes())
            }
            TimeUnit::Millisecond => {
                write_primitive!(TimestampMillisecondArray, 8, |v: i64| v.to_le_bytes())
            }
            TimeUnit::Microsecond => {
                write_primitive!(TimestampMicrosecondArray, 8, |v: i64| v.to_le_bytes())
            }
            TimeUnit::Nanosecond => {
                write_primitive!(TimestampNanosecondArray, 8, |v: i64| v.to_le_bytes())
            }
        },
        DataType::Decimal128(_, _) => {
            write_primitive!(Decimal128Array, 16, |v: i128| v.to_le_bytes())
        }
        DataType::Decimal256(_, _) => {
            let arr = array
                .as_any()
                .downcast_ref::<Decimal256Array>()
                .ok_or_else(|| "failed to downcast Decimal256 key column".to_string())?;
            if !array.is_null(row) {
                out[..32].copy_from_slice(&arr.value(row).to_le_bytes());
            } else {
                out[..32].fill(0);
            }
            Ok(32)
        }
        DataType::FixedSizeBinary(width) => {
            let arr = array
                .as_any()
                .downcast_ref::<FixedSizeBinaryArray>()
                .ok_or_else(|| "failed to downcast FixedSizeBinary key column".to_string())?;
            let width = *width as usize;
            if !array.is_null(row) {
                out[..width].copy_from_slice(arr.value(row));
            } else {
                out[..width].fill(0);
            }
            Ok(width)
        }
        other => Err(format!("unsupported fixed-width join key type {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn u64_keys_match_between_blocks() {
        let left: Vec<ArrayRef> = vec![Arc::new(Int32Array::from(vec![7, -1, 7]))];
        let right: Vec<ArrayRef> = vec![Arc::new(Int32Array::from(vec![Some(7), None, Some(2)]))];
        let ka = encode_join_keys(&left, JoinKeyLayout::Key32, 42, None).expect("encode");
        let kb = encode_join_keys(&right, JoinKeyLayout::Key32, 42, None).expect("encode");
        let (EncodedKeys::U64(ka), EncodedKeys::U64(kb)) = (&ka.keys, &kb.keys) else {
            panic!("expected u64 keys");
        };
        assert_eq!(ka[0], kb[0]);
        assert_ne!(ka[1], kb[2]);
    }

    #[test]
    fn composite_fixed_keys_pack_in_column_order() {
        let arrays: Vec<ArrayRef> = vec![
            Arc::new(Int64Array::from(vec![1, 2])),
            Arc::new(Int64Array::from(vec![10, 20])),
        ];
        let keys = encode_join_keys(&arrays, JoinKeyLayout::Keys128, 0, None).expect("encode");
        let EncodedKeys::U128(keys) = &keys.keys else {
            panic!("expected u128 keys");
        };
        assert_eq!(keys[0], 1u128 | (10u128 << 64));
        assert_eq!(keys[1], 2u128 | (20u128 << 64));
    }
}
