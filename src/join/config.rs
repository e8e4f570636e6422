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
use std::sync::Arc;

use super::dict::DictionaryLookup;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinKind {
    pub fn is_left_or_full(self) -> bool {
        matches!(self, JoinKind::Left | JoinKind::Full)
    }

    pub fn is_right_or_full(self) -> bool {
        matches!(self, JoinKind::Right | JoinKind::Full)
    }

    pub fn is_inner_or_right(self) -> bool {
        matches!(self, JoinKind::Inner | JoinKind::Right)
    }
}

/// Match-cardinality flavor of the join.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinStrictness {
    /// Pick one match per probe row.
    Any,
    /// Legacy any: single-mapped on every kind, first insertion wins.
    RightAny,
    /// Emit all matches.
    All,
    /// Equality on the leading keys, nearest match on the trailing column.
    Asof,
    Semi,
    Anti,
}

/// Inequality applied as `right_key OP left_key` when picking the as-of row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AsofInequality {
    Less,
    Greater,
    LessOrEquals,
    GreaterOrEquals,
}

/// Index growth limits checked after every build block. Zero disables a
/// limit.
#[derive(Clone, Copy, Debug, Default)]
pub struct SizeLimits {
    pub max_rows: usize,
    pub max_bytes: usize,
}

impl SizeLimits {
    pub fn check(&self, rows: usize, bytes: usize) -> bool {
        (self.max_rows == 0 || rows <= self.max_rows)
            && (self.max_bytes == 0 || bytes <= self.max_bytes)
    }
}

/// Behavioral knobs of one join operator.
#[derive(Clone)]
pub struct JoinConfig {
    pub kind: JoinKind,
    pub strictness: JoinStrictness,
    pub key_names_left: Vec<String>,
    pub key_names_right: Vec<String>,
    /// Boolean ON-condition columns; rows where the mask is false or null do
    /// not join.
    pub left_mask_column: Option<String>,
    pub right_mask_column: Option<String>,
    /// Widen the respective side's columns to nullable in the output.
    pub nullable_left_side: bool,
    pub nullable_right_side: bool,
    /// Right key columns that must appear in the output, filled from the
    /// corresponding left key column.
    pub required_right_keys: Vec<String>,
    pub asof_inequality: AsofInequality,
    pub size_limits: SizeLimits,
    /// Output bound for the cross-join continuation protocol.
    pub max_joined_block_rows: usize,
    pub dictionary: Option<Arc<dyn DictionaryLookup>>,
}

impl JoinConfig {
    pub fn new(kind: JoinKind, strictness: JoinStrictness) -> Self {
        Self {
            kind,
            strictness,
            key_names_left: Vec::new(),
            key_names_right: Vec::new(),
            left_mask_column: None,
            right_mask_column: None,
            nullable_left_side: false,
            nullable_right_side: false,
            required_right_keys: Vec::new(),
            asof_inequality: AsofInequality::LessOrEquals,
            size_limits: SizeLimits::default(),
            max_joined_block_rows: 65536,
            dictionary: None,
        }
    }
}

/// Reject kind/strictness pairs the probe engine has no semantics for.
pub(crate) fn validate_kind_strictness(
    kind: JoinKind,
    strictness: JoinStrictness,
) -> Result<(), String> {
    let valid = match strictness {
        JoinStrictness::Semi | JoinStrictness::Anti => {
            matches!(kind, JoinKind::Left | JoinKind::Right)
        }
        JoinStrictness::Asof => matches!(kind, JoinKind::Left | JoinKind::Inner),
        JoinStrictness::Any | JoinStrictness::RightAny | JoinStrictness::All => {
            !matches!(kind, JoinKind::Cross)
        }
    };
    if valid || matches!(kind, JoinKind::Cross) {
        Ok(())
    } else {
        Err(format!(
            "unsupported join kind/strictness combination: {:?} {:?}",
            kind, strictness
        ))
    }
}

/// Whether the usage-flag bank must be allocated: a second pass emits
/// unmatched right rows, or a right row may be claimed at most once.
pub(crate) fn flags_required(kind: JoinKind, strictness: JoinStrictness) -> bool {
    match strictness {
        JoinStrictness::Any => !matches!(kind, JoinKind::Left),
        JoinStrictness::RightAny | JoinStrictness::All => kind.is_right_or_full(),
        JoinStrictness::Semi | JoinStrictness::Anti => matches!(kind, JoinKind::Right),
        JoinStrictness::Asof => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semi_asof_combinations_are_restricted() {
        assert!(validate_kind_strictness(JoinKind::Left, JoinStrictness::Semi).is_ok());
        assert!(validate_kind_strictness(JoinKind::Full, JoinStrictness::Semi).is_err());
        assert!(validate_kind_strictness(JoinKind::Inner, JoinStrictness::Asof).is_ok());
        assert!(validate_kind_strictness(JoinKind::Right, JoinStrictness::Asof).is_err());
        assert!(validate_kind_strictness(JoinKind::Cross, JoinStrictness::All).is_ok());
    }

    #[test]
    fn flagged_combinations_match_second_pass_consumers() {
        assert!(flags_required(JoinKind::Inner, JoinStrictness::Any));
        assert!(flags_required(JoinKind::Full, JoinStrictness::Any));
        assert!(!flags_required(JoinKind::Left, JoinStrictness::Any));
        assert!(flags_required(JoinKind::Right, JoinStrictness::All));
        assert!(!flags_required(JoinKind::Inner, JoinStrictness::All));
        assert!(flags_required(JoinKind::Right, JoinStrictness::Semi));
        assert!(!flags_required(JoinKind::Left, JoinStrictness::Anti));
        assert!(!flags_required(JoinKind::Left, JoinStrictness::Asof));
    }
}
