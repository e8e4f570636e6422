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
//! Probe engine for the hash-join operator.
//!
//! Responsibilities:
//! - Runs the per-row match loop specialized by mapped shape (single row,
//!   chained list, as-of index) with the kind/strictness branches inside.
//! - Applies the filter-or-replicate output shaping and materializes the
//!   required right key columns from their left sources.
//!
//! Key exported interfaces:
//! - Functions: `join_block_impl`, `join_block_dict`.
//!
//! Current limitations:
//! - Unknown kind/strictness pairs reaching the loops are reported as
//!   runtime errors rather than silently degrading.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, UInt32Array};
use arrow::compute::kernels::nullif::nullif;
use arrow::compute::{cast, filter, take};
use arrow::datatypes::{DataType, Field};

use crate::chunk::{any_null_mask, column_as_mask, correct_nullability, filter_with_blanks, Chunk};
use crate::hash_table::key_encode::{encode_join_keys, ProbeKeys};
use crate::hash_table::key_table::JoinKeyTable;
use crate::join::config::{JoinKind, JoinStrictness};
use crate::join::added_columns::AddedColumns;
use crate::join::operator::{HashJoinOperator, JoinMaps};
use crate::join::row_refs::{asof_key_at, AsofRowRefs, RowRef, RowRefArena, RowRefList};
use crate::join::used_flags::JoinUsedFlags;

struct ProbeCtx {
    kind: JoinKind,
    strictness: JoinStrictness,
    rows: usize,
    /// Rows excluded up front: a null in any key column, or rejected by the
    /// left ON mask.
    skip: Vec<bool>,
    add_missing: bool,
    need_replication: bool,
    build_filter: bool,
}

struct ProbeResult {
    filter: Vec<bool>,
    offsets: Option<Vec<u64>>,
}

/// Joins right table columns into `block` using the operator's hash index.
pub(crate) fn join_block_impl(
    op: &HashJoinOperator,
    block: &mut Chunk,
    kind: JoinKind,
    strictness: JoinStrictness,
    key_names_left: &[String],
    columns_to_add: &[Field],
    is_join_get: bool,
) -> Result<(), String> {
    let rows = block.len();

    let left_keys = materialize_key_columns(block, key_names_left)?;
    let null_mask = any_null_mask(&left_keys);
    let left_mask = if is_join_get {
        None
    } else {
        column_as_mask(block, op.config.left_mask_column.as_deref())?
    };

    let ctx = build_ctx(op, kind, strictness, rows, null_mask, left_mask, is_join_get);

    let data = op.joined_data();
    let sources: Vec<&Chunk> = data.blocks.iter().collect();
    let mut added = new_added_columns(op, block, &sources, columns_to_add, strictness, rows)?;

    let asof_key_count = if strictness == JoinStrictness::Asof {
        left_keys.len() - 1
    } else {
        left_keys.len()
    };
    let probe_keys = encode_join_keys(
        &left_keys[..asof_key_count],
        data.layout,
        data.hash_seed,
        data.row_converter.as_ref(),
    )?;

    let result = match &data.maps {
        JoinMaps::One(table) => probe_single(
            |row| Ok(table.find(&probe_keys, row)?.map(|(slot, r)| (slot, *r))),
            &op.used_flags,
            &ctx,
            &mut added,
        )?,
        JoinMaps::All(table) => {
            probe_multi(table, &data.arena, &probe_keys, &op.used_flags, &ctx, &mut added)?
        }
        JoinMaps::Asof(table) => {
            let left_asof = left_keys
                .last()
                .ok_or_else(|| "asof join needs at least one equi-join column".to_string())?;
            if let Some(expected) = op.asof_type() {
                if left_asof.data_type() != expected {
                    return Err(format!(
                        "join key type mismatch in asof column: left is {}, right is {}",
                        left_asof.data_type(),
                        expected
                    ));
                }
            }
            probe_asof(table, &probe_keys, left_asof, op, &ctx, &mut added)?
        }
    };

    assemble_output(op, block, kind, strictness, &ctx, added, result)
}

/// Dictionary-backed probe: no hash map, lookups delegate to the external
/// key oracle. Only Left x {Any, Semi, Anti} reach this point.
pub(crate) fn join_block_dict(
    op: &HashJoinOperator,
    block: &mut Chunk,
    kind: JoinKind,
    strictness: JoinStrictness,
    key_names_left: &[String],
    columns_to_add: &[Field],
) -> Result<(), String> {
    let dictionary = op
        .config
        .dictionary
        .as_ref()
        .ok_or_else(|| "dictionary join without a dictionary reader".to_string())?;
    let rows = block.len();

    let left_keys = materialize_key_columns(block, key_names_left)?;
    if left_keys.len() != 1 {
        return Err(format!(
            "dictionary join expects a single key column, got {}",
            left_keys.len()
        ));
    }
    let lookup = dictionary.read_keys(&left_keys[0])?;
    if lookup.found.len() != rows || lookup.positions.len() != rows {
        return Err(format!(
            "dictionary lookup row count mismatch: rows={} found={} positions={}",
            rows,
            lookup.found.len(),
            lookup.positions.len()
        ));
    }

    let null_mask = any_null_mask(&left_keys);
    let left_mask = column_as_mask(block, op.config.left_mask_column.as_deref())?;
    let ctx = build_ctx(op, kind, strictness, rows, null_mask, left_mask, false);

    let dict_block = lookup.block;
    let sources = vec![&dict_block];
    let mut fields = Vec::with_capacity(columns_to_add.len());
    let mut right_indexes = Vec::with_capacity(columns_to_add.len());
    for field in columns_to_add {
        if block.has_column(field.name()) {
            continue;
        }
        let index = dict_block.index_of(field.name()).ok_or_else(|| {
            format!("no such column {} in dictionary block", field.name())
        })?;
        right_indexes.push(index);
        fields.push(field.clone());
    }
    let mut added = AddedColumns::new(sources, fields, right_indexes, rows);

    let result = probe_single(
        |row| {
            Ok(lookup.found[row].then(|| {
                (
                    0usize,
                    RowRef {
                        block: 0,
                        row: lookup.positions[row],
                    },
                )
            }))
        },
        &op.used_flags,
        &ctx,
        &mut added,
    )?;

    assemble_output(op, block, kind, strictness, &ctx, added, result)
}

fn build_ctx(
    op: &HashJoinOperator,
    kind: JoinKind,
    strictness: JoinStrictness,
    rows: usize,
    null_mask: Option<Vec<bool>>,
    left_mask: Option<Vec<bool>>,
    is_join_get: bool,
) -> ProbeCtx {
    let is_all = strictness == JoinStrictness::All;
    let is_any = strictness == JoinStrictness::Any;
    let is_semi = strictness == JoinStrictness::Semi;
    let is_anti = strictness == JoinStrictness::Anti;

    let need_replication = is_all
        || (is_any && kind == JoinKind::Right)
        || (is_semi && kind == JoinKind::Right);
    let need_filter = !need_replication
        && (kind == JoinKind::Inner
            || kind == JoinKind::Right
            || (is_semi && kind == JoinKind::Left)
            || (is_anti && kind == JoinKind::Left));
    let add_missing = kind.is_left_or_full() && !is_semi;
    let has_required = !is_join_get && !op.required_right_keys.is_empty();

    let mut skip = vec![false; rows];
    if let Some(nulls) = null_mask {
        for (flag, is_null) in skip.iter_mut().zip(nulls) {
            *flag |= is_null;
        }
    }
    if let Some(mask) = left_mask {
        for (flag, ok) in skip.iter_mut().zip(mask) {
            *flag |= !ok;
        }
    }

    ProbeCtx {
        kind,
        strictness,
        rows,
        skip,
        add_missing,
        need_replication,
        build_filter: need_filter || has_required,
    }
}

fn new_added_columns<'a>(
    op: &HashJoinOperator,
    block: &Chunk,
    sources: &[&'a Chunk],
    columns_to_add: &[Field],
    strictness: JoinStrictness,
    rows: usize,
) -> Result<AddedColumns<'a>, String> {
    let mut fields = Vec::with_capacity(columns_to_add.len() + 1);
    for field in columns_to_add {
        // A column already present on the left is not added twice.
        if block.has_column(field.name()) {
            continue;
        }
        fields.push(field.clone());
    }
    if strictness == JoinStrictness::Asof {
        // The right as-of column always travels with the output.
        fields.push(op.right_asof_field()?);
    }
    let mut right_indexes = Vec::with_capacity(fields.len());
    for field in &fields {
        right_indexes.push(op.saved_block_index_of(field.name())?);
    }
    Ok(AddedColumns::new(
        sources.to_vec(),
        fields,
        right_indexes,
        rows,
    ))
}

fn materialize_key_columns(block: &Chunk, names: &[String]) -> Result<Vec<ArrayRef>, String> {
    let mut columns = Vec::with_capacity(names.len());
    for name in names {
        let column = block.column_by_name(name)?;
        let column = match column.data_type() {
            DataType::Dictionary(_, value) => {
                let value = value.as_ref().clone();
                cast(&column, &value).map_err(|e| e.to_string())?
            }
            _ => column,
        };
        columns.push(column);
    }
    Ok(columns)
}

fn on_miss(
    ctx: &ProbeCtx,
    added: &mut AddedColumns<'_>,
    current_offset: &mut u64,
) {
    if ctx.add_missing {
        added.append_default_row();
        if ctx.need_replication {
            *current_offset += 1;
        }
    }
}

/// Match loop over single-mapped tables: Left/Inner/Full x Any, RightAny on
/// every kind, Left Semi, and the dictionary path.
fn probe_single(
    finder: impl Fn(usize) -> Result<Option<(usize, RowRef)>, String>,
    flags: &JoinUsedFlags,
    ctx: &ProbeCtx,
    added: &mut AddedColumns<'_>,
) -> Result<ProbeResult, String> {
    let mut filter = vec![false; if ctx.build_filter { ctx.rows } else { 0 }];
    let mut offsets = ctx
        .need_replication
        .then(|| vec![0u64; ctx.rows]);
    let mut current_offset = 0u64;

    for i in 0..ctx.rows {
        if ctx.skip[i] {
            on_miss(ctx, added, &mut current_offset);
        } else {
            match finder(i)? {
                Some((slot, row_ref)) => match (ctx.strictness, ctx.kind) {
                    (JoinStrictness::Any, JoinKind::Inner) => {
                        // Use the first appeared left key only.
                        if flags.set_used_once(slot) {
                            set_filter(ctx, &mut filter, i);
                            added.append_row(row_ref);
                        }
                    }
                    (JoinStrictness::Any, JoinKind::Left | JoinKind::Full)
                    | (JoinStrictness::Semi, JoinKind::Left)
                    | (JoinStrictness::RightAny, _) => {
                        set_filter(ctx, &mut filter, i);
                        flags.set_used(slot);
                        added.append_row(row_ref);
                    }
                    (JoinStrictness::Anti, JoinKind::Left) => {
                        // Matched anti rows are dropped; nothing to record.
                    }
                    (strictness, kind) => {
                        debug_assert!(false, "unexpected single-mapped join {kind:?} {strictness:?}");
                        return Err(format!(
                            "unsupported join kind/strictness combination: {:?} {:?}",
                            kind, strictness
                        ));
                    }
                },
                None => {
                    if ctx.strictness == JoinStrictness::Anti && ctx.kind == JoinKind::Left {
                        set_filter(ctx, &mut filter, i);
                    }
                    on_miss(ctx, added, &mut current_offset);
                }
            }
        }
        if let Some(offsets) = offsets.as_mut() {
            offsets[i] = current_offset;
        }
    }

    Ok(ProbeResult { filter, offsets })
}

/// Match loop over multi-mapped tables: All on every kind, Right x
/// {Any, Semi, Anti}, Left Anti.
fn probe_multi(
    table: &JoinKeyTable<RowRefList>,
    arena: &RowRefArena,
    keys: &ProbeKeys<'_>,
    flags: &JoinUsedFlags,
    ctx: &ProbeCtx,
    added: &mut AddedColumns<'_>,
) -> Result<ProbeResult, String> {
    let mut filter = vec![false; if ctx.build_filter { ctx.rows } else { 0 }];
    let mut offsets = ctx.need_replication.then(|| vec![0u64; ctx.rows]);
    let mut current_offset = 0u64;

    for i in 0..ctx.rows {
        if ctx.skip[i] {
            on_miss(ctx, added, &mut current_offset);
        } else {
            match table.find(keys, i)? {
                Some((slot, list)) => match (ctx.strictness, ctx.kind) {
                    (JoinStrictness::All, _) => {
                        set_filter(ctx, &mut filter, i);
                        flags.set_used(slot);
                        for row_ref in list.iter(arena) {
                            added.append_row(row_ref);
                            current_offset += 1;
                        }
                    }
                    (JoinStrictness::Any | JoinStrictness::Semi, JoinKind::Right) => {
                        // First probe claims the whole chain; later probes
                        // with the same key add nothing.
                        if flags.set_used_once(slot) {
                            set_filter(ctx, &mut filter, i);
                            for row_ref in list.iter(arena) {
                                added.append_row(row_ref);
                                current_offset += 1;
                            }
                        }
                    }
                    (JoinStrictness::Anti, JoinKind::Right) => {
                        flags.set_used(slot);
                    }
                    (JoinStrictness::Anti, JoinKind::Left) => {}
                    (strictness, kind) => {
                        debug_assert!(false, "unexpected multi-mapped join {kind:?} {strictness:?}");
                        return Err(format!(
                            "unsupported join kind/strictness combination: {:?} {:?}",
                            kind, strictness
                        ));
                    }
                },
                None => {
                    if ctx.strictness == JoinStrictness::Anti && ctx.kind == JoinKind::Left {
                        set_filter(ctx, &mut filter, i);
                    }
                    on_miss(ctx, added, &mut current_offset);
                }
            }
        }
        if let Some(offsets) = offsets.as_mut() {
            offsets[i] = current_offset;
        }
    }

    Ok(ProbeResult { filter, offsets })
}

fn probe_asof(
    table: &JoinKeyTable<AsofRowRefs>,
    keys: &ProbeKeys<'_>,
    left_asof: &ArrayRef,
    op: &HashJoinOperator,
    ctx: &ProbeCtx,
    added: &mut AddedColumns<'_>,
) -> Result<ProbeResult, String> {
    let mut filter = vec![false; if ctx.build_filter { ctx.rows } else { 0 }];
    let inequality = op.config.asof_inequality;
    let mut current_offset = 0u64;

    for i in 0..ctx.rows {
        if ctx.skip[i] {
            on_miss(ctx, added, &mut current_offset);
            continue;
        }
        let hit = match table.find(keys, i)? {
            Some((_slot, refs)) => refs.find_asof(inequality, asof_key_at(left_asof, i)?),
            None => None,
        };
        match hit {
            Some(row_ref) => {
                set_filter(ctx, &mut filter, i);
                added.append_row(row_ref);
            }
            None => on_miss(ctx, added, &mut current_offset),
        }
    }

    Ok(ProbeResult {
        filter,
        offsets: None,
    })
}

fn set_filter(ctx: &ProbeCtx, filter: &mut [bool], row: usize) {
    if ctx.build_filter {
        filter[row] = true;
    }
}

/// Applies the filter/replication shaping and appends the added and required
/// right key columns, rebuilding `block` in place.
fn assemble_output(
    op: &HashJoinOperator,
    block: &mut Chunk,
    kind: JoinKind,
    strictness: JoinStrictness,
    ctx: &ProbeCtx,
    added: AddedColumns<'_>,
    result: ProbeResult,
) -> Result<(), String> {
    let need_filter = ctx.build_filter
        && !ctx.need_replication
        && (kind == JoinKind::Inner
            || kind == JoinKind::Right
            || (strictness == JoinStrictness::Semi && kind == JoinKind::Left)
            || (strictness == JoinStrictness::Anti && kind == JoinKind::Left));

    // Left columns of RIGHT/FULL joins must be nullable in the final output:
    // the non-joined emitter fills them with nulls.
    let widen_left = kind.is_right_or_full() && op.config.nullable_left_side;

    let mut fields: Vec<Field> = Vec::with_capacity(block.batch.num_columns() + added.num_columns());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(fields.capacity());
    let schema = block.schema();
    for (field, column) in schema.fields().iter().zip(block.columns()) {
        let field = if widen_left {
            field.as_ref().clone().with_nullable(true)
        } else {
            field.as_ref().clone()
        };
        fields.push(field);
        columns.push(Arc::clone(column));
    }
    let existing_columns = columns.len();

    if need_filter {
        let predicate = BooleanArray::from(result.filter.clone());
        for column in columns.iter_mut() {
            *column = filter(column.as_ref(), &predicate).map_err(|e| e.to_string())?;
        }
    }

    for (field, column) in added.materialize()? {
        fields.push(field);
        columns.push(column);
    }

    let mut right_keys_to_replicate = Vec::new();
    if need_filter {
        for (right_name, left_source) in &op.required_right_keys {
            if asof_column_in_output(op, strictness, right_name) {
                continue;
            }
            let source_index = index_of_field(&fields[..existing_columns], left_source)?;
            let is_nullable = op.right_key_output_nullable(right_name)?;
            let column = correct_nullability(&columns[source_index], is_nullable)?;
            fields.push(Field::new(
                right_name.clone(),
                column.data_type().clone(),
                is_nullable,
            ));
            columns.push(column);
        }
    } else if !op.required_right_keys.is_empty() {
        let negated: BooleanArray = result.filter.iter().map(|v| !*v).collect::<Vec<bool>>().into();
        for (right_name, left_source) in &op.required_right_keys {
            if asof_column_in_output(op, strictness, right_name) {
                continue;
            }
            let source_index = index_of_field(&fields[..existing_columns], left_source)?;
            let is_nullable = op.right_key_output_nullable(right_name)?;
            let thin = filter_with_blanks(&columns[source_index], &result.filter, false)?;
            let column = if is_nullable {
                // Rows the probe left unmatched become NULL, not defaults.
                nullif(&thin, &negated).map_err(|e| e.to_string())?
            } else {
                correct_nullability(&thin, false)?
            };
            fields.push(Field::new(
                right_name.clone(),
                column.data_type().clone(),
                is_nullable,
            ));
            if ctx.need_replication {
                right_keys_to_replicate.push(columns.len());
            }
            columns.push(column);
        }
    }

    if let Some(offsets) = result.offsets.as_ref() {
        let indices = replication_indices(offsets);
        let indices: ArrayRef = Arc::new(UInt32Array::from(indices));
        for index in (0..existing_columns).chain(right_keys_to_replicate) {
            columns[index] = take(&columns[index], &indices, None).map_err(|e| e.to_string())?;
        }
    }

    *block = Chunk::try_from_parts(fields, columns)?;
    Ok(())
}

fn asof_column_in_output(
    op: &HashJoinOperator,
    strictness: JoinStrictness,
    right_name: &str,
) -> bool {
    strictness == JoinStrictness::Asof
        && op
            .config
            .key_names_right
            .last()
            .is_some_and(|last| last == right_name)
}

fn index_of_field(fields: &[Field], name: &str) -> Result<usize, String> {
    fields
        .iter()
        .position(|f| f.name() == name)
        .ok_or_else(|| format!("no such column {} in probe block", name))
}

fn replication_indices(offsets: &[u64]) -> Vec<u32> {
    let total = offsets.last().copied().unwrap_or(0) as usize;
    let mut out = Vec::with_capacity(total);
    let mut prev = 0u64;
    for (row, &offset) in offsets.iter().enumerate() {
        for _ in prev..offset {
            out.push(row as u32);
        }
        prev = offset;
    }
    out
}
