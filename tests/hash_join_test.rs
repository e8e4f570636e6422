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
//! Integration tests for the keyed hash-join kinds and strictness variants.

mod common;

use arrow::datatypes::DataType;

use common::*;
use junction::{Chunk, HashJoinOperator, JoinConfig, JoinKind, JoinStrictness};

fn single_key_config(kind: JoinKind, strictness: JoinStrictness) -> JoinConfig {
    init_logging();
    let mut config = JoinConfig::new(kind, strictness);
    config.key_names_left = vec!["lk".to_string()];
    config.key_names_right = vec!["rk".to_string()];
    config
}

fn probe(op: &HashJoinOperator, mut block: Chunk) -> Chunk {
    let mut continuation = None;
    op.join_block(&mut block, &mut continuation).expect("probe");
    assert!(continuation.is_none());
    block
}

#[test]
fn inner_all_emits_duplicates_in_insertion_order() {
    let config = single_key_config(JoinKind::Inner, JoinStrictness::All);
    let right = chunk(vec![
        ("rk", int64(vec![1, 1, 2, 4]), false),
        ("v", utf8(vec!["a", "b", "c", "d"]), false),
    ]);
    let mut op = HashJoinOperator::new(config, right.schema(), false).expect("operator");
    assert!(op.add_joined_block(&right, true).expect("build"));

    let out = probe(&op, chunk(vec![("lk", int64(vec![1, 2, 3]), false)]));
    assert_eq!(
        key_value_rows(&out, "lk", "v"),
        vec![
            (Some(1), Some("a".to_string())),
            (Some(1), Some("b".to_string())),
            (Some(2), Some("c".to_string())),
        ]
    );
}

#[test]
fn left_any_fills_missing_rows_with_nulls() {
    let mut config = single_key_config(JoinKind::Left, JoinStrictness::Any);
    config.nullable_right_side = true;
    let right = chunk(vec![
        ("rk", int64(vec![3]), false),
        ("v", utf8(vec!["x"]), false),
    ]);
    let mut op = HashJoinOperator::new(config, right.schema(), false).expect("operator");
    assert!(op.add_joined_block(&right, true).expect("build"));

    let out = probe(&op, chunk(vec![("lk", int64(vec![1, 2]), false)]));
    assert_eq!(
        key_value_rows(&out, "lk", "v"),
        vec![(Some(1), None), (Some(2), None)]
    );
    let field = out.field_by_name("v").expect("field");
    assert!(field.is_nullable());
}

#[test]
fn right_all_splits_output_between_probe_and_emitter() {
    let mut config = single_key_config(JoinKind::Right, JoinStrictness::All);
    config.required_right_keys = vec!["rk".to_string()];
    config.nullable_left_side = true;
    let right = chunk(vec![
        ("rk", int64_opt(vec![Some(1), None, Some(2)]), true),
        ("v", utf8(vec!["a", "b", "c"]), false),
    ]);
    let mut op = HashJoinOperator::new(config, right.schema(), false).expect("operator");
    assert!(op.add_joined_block(&right, true).expect("build"));

    let out = probe(&op, chunk(vec![("lk", int64(vec![1]), false)]));
    assert_eq!(i64_column(&out, "lk"), vec![Some(1)]);
    assert_eq!(i64_column(&out, "rk"), vec![Some(1)]);
    assert_eq!(utf8_column(&out, "v"), vec![Some("a".to_string())]);

    let result_schema = schema(vec![
        ("lk", DataType::Int64, true),
        ("rk", DataType::Int64, true),
        ("v", DataType::Utf8, false),
    ]);
    // A one-row bound exercises the suspension protocol.
    let mut emitter = op
        .get_non_joined_blocks(result_schema, 1)
        .expect("emitter");
    let mut rows = Vec::new();
    while let Some(block) = emitter.next_block().expect("next block") {
        for ((lk, rk), v) in i64_column(&block, "lk")
            .into_iter()
            .zip(i64_column(&block, "rk"))
            .zip(utf8_column(&block, "v"))
        {
            rows.push((lk, rk, v));
        }
    }
    rows.sort();
    assert_eq!(
        rows,
        vec![
            (None, None, Some("b".to_string())),
            (None, Some(2), Some("c".to_string())),
        ]
    );
}

#[test]
fn full_any_sends_masked_and_duplicate_rows_to_emitter() {
    let mut config = single_key_config(JoinKind::Full, JoinStrictness::Any);
    config.right_mask_column = Some("m".to_string());
    config.required_right_keys = vec!["rk".to_string()];
    config.nullable_left_side = true;
    config.nullable_right_side = true;
    let right = chunk(vec![
        ("rk", int64(vec![1, 2, 2]), false),
        ("v", utf8(vec!["a", "b", "c"]), false),
        ("m", boolean(vec![false, true, true]), false),
    ]);
    let mut op = HashJoinOperator::new(config, right.schema(), false).expect("operator");
    assert!(op.add_joined_block(&right, true).expect("build"));

    let out = probe(&op, chunk(vec![("lk", int64(vec![1, 2]), false)]));
    assert_eq!(i64_column(&out, "lk"), vec![Some(1), Some(2)]);
    assert_eq!(i64_column(&out, "rk"), vec![None, Some(2)]);
    assert_eq!(
        utf8_column(&out, "v"),
        vec![None, Some("b".to_string())]
    );

    let result_schema = schema(vec![
        ("lk", DataType::Int64, true),
        ("rk", DataType::Int64, true),
        ("v", DataType::Utf8, true),
    ]);
    let mut emitter = op
        .get_non_joined_blocks(result_schema, 16)
        .expect("emitter");
    let mut rows = Vec::new();
    while let Some(block) = emitter.next_block().expect("next block") {
        for ((lk, rk), v) in i64_column(&block, "lk")
            .into_iter()
            .zip(i64_column(&block, "rk"))
            .zip(utf8_column(&block, "v"))
        {
            rows.push((lk, rk, v));
        }
    }
    rows.sort();
    assert_eq!(
        rows,
        vec![
            (None, Some(1), Some("a".to_string())),
            (None, Some(2), Some("c".to_string())),
        ]
    );
}

#[test]
fn left_semi_keeps_matches_once_and_anti_keeps_misses() {
    let right = chunk(vec![
        ("rk", int64(vec![1, 1]), false),
        ("v", utf8(vec!["a", "b"]), false),
    ]);

    let config = single_key_config(JoinKind::Left, JoinStrictness::Semi);
    let mut op = HashJoinOperator::new(config, right.schema(), false).expect("operator");
    assert!(op.add_joined_block(&right, true).expect("build"));
    let out = probe(&op, chunk(vec![("lk", int64(vec![1, 2]), false)]));
    assert_eq!(
        key_value_rows(&out, "lk", "v"),
        vec![(Some(1), Some("a".to_string()))]
    );

    let mut config = single_key_config(JoinKind::Left, JoinStrictness::Anti);
    config.nullable_right_side = true;
    let mut op = HashJoinOperator::new(config, right.schema(), false).expect("operator");
    assert!(op.add_joined_block(&right, true).expect("build"));
    let out = probe(&op, chunk(vec![("lk", int64(vec![1, 2]), false)]));
    assert_eq!(key_value_rows(&out, "lk", "v"), vec![(Some(2), None)]);
}

#[test]
fn right_semi_emits_each_right_row_at_most_once() {
    let config = single_key_config(JoinKind::Right, JoinStrictness::Semi);
    let right = chunk(vec![
        ("rk", int64(vec![1, 1, 2]), false),
        ("v", utf8(vec!["a", "b", "c"]), false),
    ]);
    let mut op = HashJoinOperator::new(config, right.schema(), false).expect("operator");
    assert!(op.add_joined_block(&right, true).expect("build"));

    // Two identical probe rows: only the first claims the chain.
    let out = probe(&op, chunk(vec![("lk", int64(vec![1, 1]), false)]));
    assert_eq!(
        key_value_rows(&out, "lk", "v"),
        vec![
            (Some(1), Some("a".to_string())),
            (Some(1), Some("b".to_string())),
        ]
    );
    let result_schema = schema(vec![("rk", DataType::Int64, false)]);
    assert!(op.get_non_joined_blocks(result_schema, 16).is_none());
}

#[test]
fn right_anti_probe_is_empty_and_emitter_holds_the_rest() {
    let config = single_key_config(JoinKind::Right, JoinStrictness::Anti);
    let right = chunk(vec![
        ("rk", int64(vec![1, 2]), false),
        ("v", utf8(vec!["a", "b"]), false),
    ]);
    let mut op = HashJoinOperator::new(config, right.schema(), false).expect("operator");
    assert!(op.add_joined_block(&right, true).expect("build"));

    let out = probe(&op, chunk(vec![("lk", int64(vec![1]), false)]));
    assert_eq!(out.len(), 0);

    let result_schema = schema(vec![
        ("lk", DataType::Int64, true),
        ("rk", DataType::Int64, false),
        ("v", DataType::Utf8, false),
    ]);
    let mut emitter = op
        .get_non_joined_blocks(result_schema, 16)
        .expect("emitter");
    let block = emitter.next_block().expect("next block").expect("block");
    assert_eq!(i64_column(&block, "rk"), vec![Some(2)]);
    assert_eq!(utf8_column(&block, "v"), vec![Some("b".to_string())]);
    assert!(emitter.next_block().expect("next block").is_none());
}

#[test]
fn inner_any_claims_a_key_for_the_first_probe_row_only() {
    let config = single_key_config(JoinKind::Inner, JoinStrictness::Any);
    let right = chunk(vec![
        ("rk", int64(vec![1]), false),
        ("v", utf8(vec!["a"]), false),
    ]);
    let mut op = HashJoinOperator::new(config, right.schema(), false).expect("operator");
    assert!(op.add_joined_block(&right, true).expect("build"));

    let out = probe(&op, chunk(vec![("lk", int64(vec![1, 1]), false)]));
    assert_eq!(
        key_value_rows(&out, "lk", "v"),
        vec![(Some(1), Some("a".to_string()))]
    );
}

#[test]
fn any_take_last_row_overwrites_single_mapped_collisions() {
    let config = single_key_config(JoinKind::Left, JoinStrictness::Any);
    let right = chunk(vec![
        ("rk", int64(vec![1, 1]), false),
        ("v", utf8(vec!["a", "b"]), false),
    ]);

    let mut keep_first = HashJoinOperator::new(config.clone(), right.schema(), false).expect("operator");
    assert!(keep_first.add_joined_block(&right, true).expect("build"));
    let out = probe(&keep_first, chunk(vec![("lk", int64(vec![1]), false)]));
    assert_eq!(utf8_column(&out, "v"), vec![Some("a".to_string())]);

    let mut take_last = HashJoinOperator::new(config, right.schema(), true).expect("operator");
    assert!(take_last.add_joined_block(&right, true).expect("build"));
    let out = probe(&take_last, chunk(vec![("lk", int64(vec![1]), false)]));
    assert_eq!(utf8_column(&out, "v"), vec![Some("b".to_string())]);
}

#[test]
fn output_is_independent_of_build_block_boundaries() {
    let one_block = chunk(vec![
        ("rk", int64(vec![1, 1, 2]), false),
        ("v", utf8(vec!["a", "b", "c"]), false),
    ]);
    let split_first = chunk(vec![
        ("rk", int64(vec![1, 1]), false),
        ("v", utf8(vec!["a", "b"]), false),
    ]);
    let split_second = chunk(vec![
        ("rk", int64(vec![2]), false),
        ("v", utf8(vec!["c"]), false),
    ]);

    let config = single_key_config(JoinKind::Inner, JoinStrictness::All);
    let mut merged = HashJoinOperator::new(config.clone(), one_block.schema(), false).expect("operator");
    assert!(merged.add_joined_block(&one_block, true).expect("build"));
    let mut split = HashJoinOperator::new(config, one_block.schema(), false).expect("operator");
    assert!(split.add_joined_block(&split_first, true).expect("build"));
    assert!(split.add_joined_block(&split_second, true).expect("build"));

    let left = chunk(vec![("lk", int64(vec![2, 1]), false)]);
    let mut merged_rows = key_value_rows(&probe(&merged, left.clone()), "lk", "v");
    let mut split_rows = key_value_rows(&probe(&split, left), "lk", "v");
    merged_rows.sort();
    split_rows.sort();
    assert_eq!(merged_rows, split_rows);
}

#[test]
fn null_probe_keys_never_match() {
    let mut config = single_key_config(JoinKind::Left, JoinStrictness::Any);
    config.nullable_right_side = true;
    let right = chunk(vec![
        ("rk", int64(vec![1]), false),
        ("v", utf8(vec!["a"]), false),
    ]);
    let mut op = HashJoinOperator::new(config, right.schema(), false).expect("operator");
    assert!(op.add_joined_block(&right, true).expect("build"));

    let out = probe(
        &op,
        chunk(vec![("lk", int64_opt(vec![Some(1), None]), true)]),
    );
    assert_eq!(
        key_value_rows(&out, "lk", "v"),
        vec![(Some(1), Some("a".to_string())), (None, None)]
    );
}

#[test]
fn size_limit_breach_reports_false_and_stays_false() {
    let mut config = single_key_config(JoinKind::Left, JoinStrictness::Any);
    config.size_limits.max_rows = 1;
    let first = chunk(vec![
        ("rk", int64(vec![1, 2]), false),
        ("v", utf8(vec!["a", "b"]), false),
    ]);
    let second = chunk(vec![
        ("rk", int64(vec![3]), false),
        ("v", utf8(vec!["c"]), false),
    ]);
    let mut op = HashJoinOperator::new(config, first.schema(), false).expect("operator");
    assert!(!op.add_joined_block(&first, true).expect("build"));
    assert!(!op.add_joined_block(&second, true).expect("build"));
    assert!(op.total_row_count() > 1);
}

#[test]
fn reused_data_probes_identically_and_rejects_inserts() {
    let mut config = single_key_config(JoinKind::Left, JoinStrictness::Any);
    config.nullable_right_side = true;
    let right = chunk(vec![
        ("rk", int64(vec![1, 2]), false),
        ("v", utf8(vec!["a", "b"]), false),
    ]);
    let mut original = HashJoinOperator::new(config.clone(), right.schema(), false).expect("operator");
    assert!(original.add_joined_block(&right, true).expect("build"));

    let mut adopted = HashJoinOperator::new(config, right.schema(), false).expect("operator");
    adopted.reuse_joined_data(&original).expect("reuse");

    let left = chunk(vec![("lk", int64(vec![2, 3]), false)]);
    assert_eq!(
        key_value_rows(&probe(&original, left.clone()), "lk", "v"),
        key_value_rows(&probe(&adopted, left), "lk", "v")
    );

    let err = adopted.add_joined_block(&right, true).expect_err("locked");
    assert!(err.contains("locked"), "err={}", err);
}

#[test]
fn probe_key_type_mismatch_is_rejected() {
    let config = single_key_config(JoinKind::Inner, JoinStrictness::All);
    let right = chunk(vec![
        ("rk", int64(vec![1]), false),
        ("v", utf8(vec!["a"]), false),
    ]);
    let mut op = HashJoinOperator::new(config, right.schema(), false).expect("operator");
    assert!(op.add_joined_block(&right, true).expect("build"));

    let mut block = chunk(vec![("lk", utf8(vec!["1"]), false)]);
    let mut continuation = None;
    let err = op
        .join_block(&mut block, &mut continuation)
        .expect_err("mismatch");
    assert!(err.contains("type mismatch"), "err={}", err);
}

#[test]
fn string_keys_probe_through_the_bytes_table() {
    let mut config = single_key_config(JoinKind::Left, JoinStrictness::Any);
    config.nullable_right_side = true;
    let right = chunk(vec![
        ("rk", utf8(vec!["x", "y"]), false),
        ("v", utf8(vec!["a", "b"]), false),
    ]);
    let mut op = HashJoinOperator::new(config, right.schema(), false).expect("operator");
    assert!(op.add_joined_block(&right, true).expect("build"));

    let out = probe(&op, chunk(vec![("lk", utf8(vec!["y", "z"]), false)]));
    assert_eq!(
        utf8_column(&out, "v"),
        vec![Some("b".to_string()), None]
    );
}

#[test]
fn composite_and_serialized_key_layouts_agree_with_equality() {
    // Two fixed 8-byte keys pack into the 128-bit table.
    let mut config = JoinConfig::new(JoinKind::Inner, JoinStrictness::All);
    config.key_names_left = vec!["l1".to_string(), "l2".to_string()];
    config.key_names_right = vec!["r1".to_string(), "r2".to_string()];
    let right = chunk(vec![
        ("r1", int64(vec![1, 1, 2]), false),
        ("r2", int64(vec![10, 11, 10]), false),
        ("v", utf8(vec!["a", "b", "c"]), false),
    ]);
    let mut op = HashJoinOperator::new(config, right.schema(), false).expect("operator");
    assert!(op.add_joined_block(&right, true).expect("build"));
    let mut block = chunk(vec![
        ("l1", int64(vec![1, 2]), false),
        ("l2", int64(vec![11, 99]), false),
    ]);
    let mut continuation = None;
    op.join_block(&mut block, &mut continuation).expect("probe");
    assert_eq!(utf8_column(&block, "v"), vec![Some("b".to_string())]);

    // A string plus a number falls back to serialized-and-hashed keys.
    let mut config = JoinConfig::new(JoinKind::Inner, JoinStrictness::All);
    config.key_names_left = vec!["ls".to_string(), "ln".to_string()];
    config.key_names_right = vec!["rs".to_string(), "rn".to_string()];
    let right = chunk(vec![
        ("rs", utf8(vec!["x", "x", "y"]), false),
        ("rn", int64(vec![1, 2, 1]), false),
        ("v", utf8(vec!["a", "b", "c"]), false),
    ]);
    let mut op = HashJoinOperator::new(config, right.schema(), false).expect("operator");
    assert!(op.add_joined_block(&right, true).expect("build"));
    let mut block = chunk(vec![
        ("ls", utf8(vec!["x", "y", "y"]), false),
        ("ln", int64(vec![2, 1, 2]), false),
    ]);
    op.join_block(&mut block, &mut continuation).expect("probe");
    assert_eq!(
        utf8_column(&block, "v"),
        vec![Some("b".to_string()), Some("c".to_string())]
    );
}

#[test]
fn unsupported_combinations_are_rejected_at_construction() {
    let right_schema = schema(vec![("rk", DataType::Int64, false)]);
    let err = HashJoinOperator::new(
        single_key_config(JoinKind::Full, JoinStrictness::Semi),
        right_schema.clone(),
        false,
    )
    .expect_err("invalid combination");
    assert!(err.contains("unsupported join kind"), "err={}", err);

    let err = HashJoinOperator::new(
        single_key_config(JoinKind::Right, JoinStrictness::Asof),
        right_schema,
        false,
    )
    .expect_err("invalid asof kind");
    assert!(err.contains("asof"), "err={}", err);
}

#[test]
fn empty_build_side_marks_inner_joins_as_empty_sets() {
    let config = single_key_config(JoinKind::Inner, JoinStrictness::All);
    let right_schema = schema(vec![
        ("rk", DataType::Int64, false),
        ("v", DataType::Utf8, false),
    ]);
    let op = HashJoinOperator::new(config, right_schema, false).expect("operator");
    assert!(op.always_returns_empty_set());
    assert_eq!(op.total_row_count(), 0);
}
