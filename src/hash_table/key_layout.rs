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
use arrow::datatypes::DataType;

/// Concrete hash-map family chosen from the right-side key column types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum JoinKeyLayout {
    /// Operator not initialized; accepts no build rows.
    Empty,
    /// No equi-join keys; blocks are stored, no index is built.
    Cross,
    /// Single fixed-width key of 1 byte.
    Key8,
    /// Single fixed-width key of 2 bytes.
    Key16,
    /// Single fixed-width key of 4 bytes.
    Key32,
    /// Single fixed-width key of 8 bytes.
    Key64,
    /// Fixed keys packed into 16 bytes (single 16-byte key or composite).
    Keys128,
    /// Fixed keys packed into 32 bytes (single 32-byte key or composite).
    Keys256,
    /// Single variable-length UTF-8 key.
    KeyString,
    /// Single fixed-length binary key.
    KeyFixedString,
    /// Serialized-and-hashed composite key (fallback for everything else).
    Hashed,
    /// Lookups delegate to an external key oracle; no map is built.
    Dict,
}

impl JoinKeyLayout {
    pub(crate) fn is_cross(self) -> bool {
        matches!(self, JoinKeyLayout::Cross)
    }

    pub(crate) fn is_dict(self) -> bool {
        matches!(self, JoinKeyLayout::Dict)
    }
}

/// Pick the map family per the total fixed width of the key columns.
///
/// Dictionary-encoded keys must be resolved to their value types by the
/// caller before selection.
pub(crate) fn choose_join_key_layout(types: &[DataType]) -> Result<JoinKeyLayout, String> {
    if types.is_empty() {
        return Ok(JoinKeyLayout::Cross);
    }

    let mut all_fixed = true;
    let mut keys_bytes = 0usize;
    for data_type in types {
        match fixed_key_width(data_type) {
            Some(width) => keys_bytes += width,
            None => {
                all_fixed = false;
                break;
            }
        }
    }

    if types.len() == 1 && is_numeric_key_type(&types[0]) {
        let width = fixed_key_width(&types[0])
            .ok_or_else(|| format!("numeric key type {} has no fixed width", types[0]))?;
        return match width {
            1 => Ok(JoinKeyLayout::Key8),
            2 => Ok(JoinKeyLayout::Key16),
            4 => Ok(JoinKeyLayout::Key32),
            8 => Ok(JoinKeyLayout::Key64),
            16 => Ok(JoinKeyLayout::Keys128),
            32 => Ok(JoinKeyLayout::Keys256),
            other => Err(format!(
                "numeric key width {} not in {{1,2,4,8,16,32}} for type {}",
                other, types[0]
            )),
        };
    }

    if all_fixed && keys_bytes <= 16 {
        return Ok(JoinKeyLayout::Keys128);
    }
    if all_fixed && keys_bytes <= 32 {
        return Ok(JoinKeyLayout::Keys256);
    }

    if types.len() == 1 && matches!(types[0], DataType::Utf8) {
        return Ok(JoinKeyLayout::KeyString);
    }
    if types.len() == 1 && matches!(types[0], DataType::FixedSizeBinary(_)) {
        return Ok(JoinKeyLayout::KeyFixedString);
    }

    Ok(JoinKeyLayout::Hashed)
}

pub(crate) fn is_numeric_key_type(data_type: &DataType) -> bool {
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
            | DataType::Boolean
            | DataType::Date32
            | DataType::Timestamp(_, _)
            | DataType::Decimal128(_, _)
            | DataType::Decimal256(_, _)
    )
}

pub(crate) fn fixed_key_width(data_type: &DataType) -> Option<usize> {
    let width = match data_type {
        DataType::Int8 | DataType::UInt8 | DataType::Boolean => 1,
        DataType::Int16 | DataType::UInt16 => 2,
        DataType::Int32 | DataType::UInt32 | DataType::Float32 | DataType::Date32 => 4,
        DataType::Int64 | DataType::UInt64 | DataType::Float64 | DataType::Timestamp(_, _) => 8,
        DataType::Decimal128(_, _) => 16,
        DataType::Decimal256(_, _) => 32,
        DataType::FixedSizeBinary(width) => usize::try_from(*width).ok()?,
        _ => return None,
    };
    Some(width)
}

/// Strip nullability and dictionary encoding down to the indexed value type.
pub(crate) fn key_value_type(data_type: &DataType) -> DataType {
    match data_type {
        DataType::Dictionary(_, value) => key_value_type(value),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::TimeUnit;

    #[test]
    fn single_numeric_widths_pick_narrow_tables() {
        assert_eq!(
            choose_join_key_layout(&[DataType::Int8]).expect("layout"),
            JoinKeyLayout::Key8
        );
        assert_eq!(
            choose_join_key_layout(&[DataType::UInt16]).expect("layout"),
            JoinKeyLayout::Key16
        );
        assert_eq!(
            choose_join_key_layout(&[DataType::Date32]).expect("layout"),
            JoinKeyLayout::Key32
        );
        assert_eq!(
            choose_join_key_layout(&[DataType::Timestamp(TimeUnit::Millisecond, None)])
                .expect("layout"),
            JoinKeyLayout::Key64
        );
        assert_eq!(
            choose_join_key_layout(&[DataType::Decimal128(18, 2)]).expect("layout"),
            JoinKeyLayout::Keys128
        );
        assert_eq!(
            choose_join_key_layout(&[DataType::Decimal256(40, 2)]).expect("layout"),
            JoinKeyLayout::Keys256
        );
    }

    #[test]
    fn fixed_composites_pack_by_total_width() {
        assert_eq!(
            choose_join_key_layout(&[DataType::Int64, DataType::Int64]).expect("layout"),
            JoinKeyLayout::Keys128
        );
        assert_eq!(
            choose_join_key_layout(&[DataType::Int64, DataType::Int64, DataType::Int32])
                .expect("layout"),
            JoinKeyLayout::Keys256
        );
    }

    #[test]
    fn string_and_fallback_layouts() {
        assert_eq!(
            choose_join_key_layout(&[DataType::Utf8]).expect("layout"),
            JoinKeyLayout::KeyString
        );
        // Short fixed binaries still pack into the fixed-width tables.
        assert_eq!(
            choose_join_key_layout(&[DataType::FixedSizeBinary(20)]).expect("layout"),
            JoinKeyLayout::Keys256
        );
        assert_eq!(
            choose_join_key_layout(&[DataType::FixedSizeBinary(40)]).expect("layout"),
            JoinKeyLayout::KeyFixedString
        );
        assert_eq!(
            choose_join_key_layout(&[DataType::Utf8, DataType::Int64]).expect("layout"),
            JoinKeyLayout::Hashed
        );
        assert_eq!(
            choose_join_key_layout(&[]).expect("layout"),
            JoinKeyLayout::Cross
        );
    }
}
