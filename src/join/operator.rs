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
//! The in-memory hash-join operator.
//!
//! Responsibilities:
//! - Splits the right-side schema, picks the key layout and map shape, and
//!   owns the build-side index, block store, chain arena and usage flags.
//! - Drives the build path (`add_joined_block`) and dispatches probes, the
//!   cross join, the value-lookup path and the non-joined emitter.
//!
//! Key exported interfaces:
//! - Types: `HashJoinOperator`.
//!
//! Current limitations:
//! - The build phase is single-writer; probing is safe from multiple threads
//!   once the build phase has finished.

use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, SchemaRef};
use arrow::row::{RowConverter, SortField};
use hashbrown::hash_map::DefaultHashBuilder;
use tracing::debug;

use crate::chunk::{any_null_mask, column_as_mask, Chunk};
use crate::hash_table::hash::seed_from_hasher;
use crate::hash_table::key_encode::encode_join_keys;
use crate::hash_table::key_layout::{
    choose_join_key_layout, key_value_type, JoinKeyLayout,
};
use crate::hash_table::key_table::JoinKeyTable;
use crate::join::config::{
    flags_required, validate_kind_strictness, JoinConfig, JoinKind, JoinStrictness,
};
use crate::join::cross::{join_block_cross, CrossJoinContinuation};
use crate::join::non_joined::NonJoinedBlocks;
use crate::join::probe::{join_block_dict, join_block_impl};
use crate::join::row_refs::{
    asof_key_at, asof_key_type_supported, AsofRowRefs, RowRef, RowRefArena, RowRefList,
};
use crate::join::used_flags::JoinUsedFlags;

/// The build-side index variants, selected once at construction.
pub(crate) enum JoinMaps {
    One(JoinKeyTable<RowRef>),
    All(JoinKeyTable<RowRefList>),
    Asof(JoinKeyTable<AsofRowRefs>),
}

/// Immutable-after-build state shared between an operator and any operator
/// that adopted it through `reuse_joined_data`.
pub(crate) struct JoinedData {
    pub(crate) layout: JoinKeyLayout,
    pub(crate) maps: JoinMaps,
    pub(crate) blocks: Vec<Chunk>,
    /// Right rows owed to the non-joined emitter: null keys, ON-mask
    /// rejects, and single-map collision losers of RIGHT/FULL kinds.
    pub(crate) side_rows: Vec<(u32, Vec<bool>)>,
    pub(crate) arena: RowRefArena,
    pub(crate) row_converter: Option<RowConverter>,
    pub(crate) hash_seed: u64,
    pub(crate) empty: bool,
}

impl JoinedData {
    fn bucket_count(&self) -> usize {
        match &self.maps {
            JoinMaps::One(table) => table.bucket_count(),
            JoinMaps::All(table) => table.bucket_count(),
            JoinMaps::Asof(table) => table.bucket_count(),
        }
    }

    fn entry_count(&self) -> usize {
        match &self.maps {
            JoinMaps::One(table) => table.entry_count(),
            JoinMaps::All(table) => table.entry_count(),
            JoinMaps::Asof(table) => table.entry_count(),
        }
    }

    fn map_bytes(&self) -> usize {
        match &self.maps {
            JoinMaps::One(table) => table.allocated_bytes(),
            JoinMaps::All(table) => table.allocated_bytes(),
            JoinMaps::Asof(table) => table.allocated_bytes(),
        }
    }
}

pub struct HashJoinOperator {
    pub(crate) config: JoinConfig,
    kind: JoinKind,
    strictness: JoinStrictness,
    any_take_last_row: bool,
    /// Right key fields in `key_names_right` order, dictionary encoding
    /// removed.
    right_table_key_fields: Vec<Field>,
    /// Non-key right fields the join adds to the output, widened to nullable
    /// when the right side becomes nullable.
    pub(crate) columns_to_add: Vec<Field>,
    saved_block_fields: Vec<Field>,
    /// (right key name, left source name) pairs to materialize in the
    /// output.
    pub(crate) required_right_keys: Vec<(String, String)>,
    asof_type: Option<DataType>,
    data: Arc<JoinedData>,
    pub(crate) used_flags: JoinUsedFlags,
    from_reused_data: bool,
}

impl std::fmt::Debug for HashJoinOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashJoinOperator").finish_non_exhaustive()
    }
}

impl HashJoinOperator {
    pub fn new(
        config: JoinConfig,
        right_schema: SchemaRef,
        any_take_last_row: bool,
    ) -> Result<Self, String> {
        let kind = config.kind;
        let strictness = config.strictness;
        validate_kind_strictness(kind, strictness)?;

        if kind != JoinKind::Cross && config.key_names_left.len() != config.key_names_right.len() {
            return Err(format!(
                "join key name count mismatch: left={} right={}",
                config.key_names_left.len(),
                config.key_names_right.len()
            ));
        }

        // Split the right sample into key columns and columns to add; the
        // right ON-mask column is internal and never joins the output.
        let mut right_table_key_fields = Vec::with_capacity(config.key_names_right.len());
        for name in &config.key_names_right {
            let field = right_schema
                .fields()
                .iter()
                .find(|f| f.name() == name)
                .map(|f| f.as_ref().clone())
                .ok_or_else(|| format!("no such column {} in right sample", name))?;
            let decoded = key_value_type(field.data_type());
            right_table_key_fields.push(
                Field::new(name.clone(), decoded, field.is_nullable()),
            );
        }
        let mut columns_to_add = Vec::new();
        for field in right_schema.fields() {
            if config.key_names_right.iter().any(|n| n == field.name()) {
                continue;
            }
            if config
                .right_mask_column
                .as_deref()
                .is_some_and(|mask| mask == field.name())
            {
                continue;
            }
            let field = field.as_ref().clone();
            let field = if config.nullable_right_side {
                field.with_nullable(true)
            } else {
                field
            };
            columns_to_add.push(field);
        }

        let mut required_right_keys = Vec::with_capacity(config.required_right_keys.len());
        for name in &config.required_right_keys {
            let index = config
                .key_names_right
                .iter()
                .position(|n| n == name)
                .ok_or_else(|| format!("required right key {} is not a join key", name))?;
            required_right_keys.push((name.clone(), config.key_names_left[index].clone()));
        }

        let mut asof_type = None;
        let mut hashed_key_types: Vec<DataType> = right_table_key_fields
            .iter()
            .map(|f| f.data_type().clone())
            .collect();
        if strictness == JoinStrictness::Asof {
            // INNER here means "left semi asof"; anything else has no
            // defined nearest-match semantics.
            if !matches!(kind, JoinKind::Left | JoinKind::Inner) {
                return Err(
                    "wrong asof join type: only asof and left asof joins are supported".to_string(),
                );
            }
            if right_table_key_fields.len() <= 1 {
                return Err("asof join needs at least one equi-join column".to_string());
            }
            let trailing = right_table_key_fields
                .last()
                .expect("asof trailing key column");
            if trailing.is_nullable() {
                return Err("asof join over nullable right column is not implemented".to_string());
            }
            if !asof_key_type_supported(trailing.data_type()) {
                return Err(format!(
                    "unsupported asof join column type {}",
                    trailing.data_type()
                ));
            }
            asof_type = Some(trailing.data_type().clone());
            hashed_key_types.pop();
        }

        let layout = if config.dictionary.is_some() {
            JoinKeyLayout::Dict
        } else if kind == JoinKind::Cross {
            JoinKeyLayout::Cross
        } else if config.key_names_right.is_empty() {
            // A keyed join without key columns accepts no build rows.
            JoinKeyLayout::Empty
        } else {
            choose_join_key_layout(&hashed_key_types)?
        };

        let row_converter = if layout == JoinKeyLayout::Hashed {
            let fields = hashed_key_types
                .iter()
                .cloned()
                .map(SortField::new)
                .collect::<Vec<_>>();
            Some(RowConverter::new(fields).map_err(|e| e.to_string())?)
        } else {
            None
        };

        let maps = match map_shape(kind, strictness) {
            MapShape::One => JoinMaps::One(JoinKeyTable::new(layout)),
            MapShape::All => JoinMaps::All(JoinKeyTable::new(layout)),
            MapShape::Asof => JoinMaps::Asof(JoinKeyTable::new(layout)),
        };

        let saved_block_fields =
            saved_block_structure(&config, kind, strictness, &right_table_key_fields, &columns_to_add);

        debug!(
            ?kind,
            ?strictness,
            ?layout,
            right_keys = ?config.key_names_right,
            columns_to_add = columns_to_add.len(),
            "hash join initialized"
        );

        Ok(Self {
            config,
            kind,
            strictness,
            any_take_last_row,
            right_table_key_fields,
            columns_to_add,
            saved_block_fields,
            required_right_keys,
            asof_type,
            data: Arc::new(JoinedData {
                layout,
                maps,
                blocks: Vec::new(),
                side_rows: Vec::new(),
                arena: RowRefArena::new(),
                row_converter,
                hash_seed: seed_from_hasher(&DefaultHashBuilder::default()),
                empty: true,
            }),
            used_flags: JoinUsedFlags::new(),
            from_reused_data: false,
        })
    }

    pub(crate) fn joined_data(&self) -> &JoinedData {
        &self.data
    }

    pub(crate) fn asof_type(&self) -> Option<&DataType> {
        self.asof_type.as_ref()
    }

    pub(crate) fn saved_block_index_of(&self, name: &str) -> Result<usize, String> {
        self.saved_block_fields
            .iter()
            .position(|f| f.name() == name)
            .ok_or_else(|| format!("no such column {} in saved join block", name))
    }

    pub(crate) fn right_asof_field(&self) -> Result<Field, String> {
        let name = self
            .config
            .key_names_right
            .last()
            .ok_or_else(|| "asof join needs at least one equi-join column".to_string())?;
        let index = self.saved_block_index_of(name)?;
        Ok(self.saved_block_fields[index].clone())
    }

    pub(crate) fn right_key_output_nullable(&self, right_name: &str) -> Result<bool, String> {
        let field = self
            .right_table_key_fields
            .iter()
            .find(|f| f.name() == right_name)
            .ok_or_else(|| format!("no such right key column {}", right_name))?;
        Ok(self.config.nullable_right_side || field.is_nullable())
    }

    pub fn over_dictionary(&self) -> bool {
        self.data.layout.is_dict()
    }

    pub fn empty(&self) -> bool {
        self.data.layout == JoinKeyLayout::Empty
    }

    pub fn always_returns_empty_set(&self) -> bool {
        self.kind.is_inner_or_right() && self.data.empty && !self.over_dictionary()
    }

    pub fn total_row_count(&self) -> usize {
        match self.data.layout {
            JoinKeyLayout::Cross => self.data.blocks.iter().map(|b| b.len()).sum(),
            JoinKeyLayout::Dict => 0,
            _ => self.data.entry_count(),
        }
    }

    pub fn total_byte_count(&self) -> usize {
        match self.data.layout {
            JoinKeyLayout::Cross => self.data.blocks.iter().map(|b| b.estimated_bytes()).sum(),
            JoinKeyLayout::Dict => 0,
            _ => self
                .data
                .map_bytes()
                .saturating_add(self.data.arena.allocated_bytes()),
        }
    }

    /// Index one right-side block. Returns false when the configured size
    /// limits are exceeded after this block; the caller decides whether to
    /// keep feeding.
    pub fn add_joined_block(&mut self, block: &Chunk, check_limits: bool) -> Result<bool, String> {
        if self.empty() {
            return Err("hash join was not initialized".to_string());
        }
        if self.over_dictionary() {
            return Err("insert into hash map over dictionary join".to_string());
        }
        if self.from_reused_data {
            return Err("hash join locked to prevent updates".to_string());
        }
        let rows = block.len();
        // Row indexes inside a stored block are 32-bit for map cell size.
        if rows > u32::MAX as usize {
            return Err(format!(
                "too many rows in right table block for hash join: {}",
                rows
            ));
        }

        let key_columns = self.materialize_right_keys(block)?;
        let null_mask = any_null_mask(&key_columns);
        let right_mask = column_as_mask(block, self.config.right_mask_column.as_deref())?;
        let stored = self.structure_right_block(block)?;

        let kind = self.kind;
        let strictness = self.strictness;
        let any_take_last_row = self.any_take_last_row;
        let track_side_rows = kind.is_right_or_full();

        let data = Arc::get_mut(&mut self.data)
            .ok_or_else(|| "hash join locked to prevent updates".to_string())?;
        let block_index = data.blocks.len() as u32;
        data.blocks.push(stored);
        if rows > 0 {
            data.empty = false;
        }

        let mut side_losers = vec![false; if track_side_rows { rows } else { 0 }];
        if !data.layout.is_cross() {
            let hashed_key_count = match &data.maps {
                JoinMaps::Asof(_) => key_columns.len() - 1,
                _ => key_columns.len(),
            };
            let keys = encode_join_keys(
                &key_columns[..hashed_key_count],
                data.layout,
                data.hash_seed,
                data.row_converter.as_ref(),
            )?;
            let usable = |row: usize| {
                !null_mask.as_ref().is_some_and(|m| m[row])
                    && !right_mask.as_ref().is_some_and(|m| !m[row])
            };

            let JoinedData { maps, arena, .. } = &mut *data;
            match maps {
                JoinMaps::One(table) => {
                    for row in 0..rows {
                        if !usable(row) {
                            continue;
                        }
                        let row_ref = RowRef {
                            block: block_index,
                            row: row as u32,
                        };
                        let result = table.emplace(&keys, row, || row_ref)?;
                        if !result.inserted {
                            if any_take_last_row {
                                *result.mapped = row_ref;
                            } else if track_side_rows {
                                // A single-mapped collision loser still owes
                                // the non-joined emitter an appearance.
                                side_losers[row] = true;
                            }
                        }
                    }
                }
                JoinMaps::All(table) => {
                    for row in 0..rows {
                        if !usable(row) {
                            continue;
                        }
                        let row_ref = RowRef {
                            block: block_index,
                            row: row as u32,
                        };
                        let result = table.emplace(&keys, row, || RowRefList::new(row_ref))?;
                        if !result.inserted {
                            result.mapped.push(row_ref, arena);
                        }
                    }
                }
                JoinMaps::Asof(table) => {
                    let asof_column = key_columns
                        .last()
                        .ok_or_else(|| "asof join needs at least one equi-join column".to_string())?;
                    for row in 0..rows {
                        if !usable(row) {
                            continue;
                        }
                        let key = asof_key_at(asof_column, row)?;
                        let row_ref = RowRef {
                            block: block_index,
                            row: row as u32,
                        };
                        let result = table.emplace(&keys, row, AsofRowRefs::new)?;
                        result.mapped.insert(key, row_ref);
                    }
                }
            }
        }

        if track_side_rows {
            let mut side_mask = vec![false; rows];
            let mut any = false;
            for row in 0..rows {
                let is_null = null_mask.as_ref().is_some_and(|m| m[row]);
                let mask_rejected = right_mask.as_ref().is_some_and(|m| !m[row]);
                let lost = side_losers.get(row).copied().unwrap_or(false);
                if is_null || mask_rejected || lost {
                    side_mask[row] = true;
                    any = true;
                }
            }
            if any {
                data.side_rows.push((block_index, side_mask));
            }
        }

        // Buckets plus one reserved slot, re-created after every block since
        // resizes renumber the buckets.
        let bucket_count = data.bucket_count();
        self.used_flags
            .reinit(bucket_count + 1, flags_required(kind, strictness));

        if !check_limits {
            return Ok(true);
        }
        let total_rows = self.total_row_count();
        let total_bytes = self.total_byte_count();
        let within_limits = self.config.size_limits.check(total_rows, total_bytes);
        if !within_limits {
            debug!(total_rows, total_bytes, "hash join size limits exceeded");
        }
        Ok(within_limits)
    }

    /// Mutates `block` in place to carry the joined output. For CROSS joins
    /// `not_processed` receives the continuation when the output bound is
    /// hit; pass it back unchanged to resume.
    pub fn join_block(
        &self,
        block: &mut Chunk,
        not_processed: &mut Option<CrossJoinContinuation>,
    ) -> Result<(), String> {
        if self.kind == JoinKind::Cross {
            return join_block_cross(self, block, not_processed);
        }
        self.check_probe_key_types(block)?;

        if self.over_dictionary() {
            let (kind, strictness) = match (self.kind, self.strictness) {
                (JoinKind::Left, JoinStrictness::Any | JoinStrictness::All | JoinStrictness::RightAny) => {
                    (JoinKind::Left, JoinStrictness::Any)
                }
                (JoinKind::Left, JoinStrictness::Semi) => (JoinKind::Left, JoinStrictness::Semi),
                (JoinKind::Left, JoinStrictness::Anti) => (JoinKind::Left, JoinStrictness::Anti),
                (JoinKind::Inner, JoinStrictness::All) => (JoinKind::Left, JoinStrictness::Semi),
                (kind, strictness) => {
                    return Err(format!(
                        "unsupported join kind/strictness combination over dictionary: {:?} {:?}",
                        kind, strictness
                    ))
                }
            };
            return join_block_dict(
                self,
                block,
                kind,
                strictness,
                &self.config.key_names_left,
                &self.columns_to_add,
            );
        }

        join_block_impl(
            self,
            block,
            self.kind,
            self.strictness,
            &self.config.key_names_left,
            &self.columns_to_add,
            false,
        )
    }

    /// Emitter for right rows with no left match; `None` for kinds and
    /// strictness that never produce them.
    pub fn get_non_joined_blocks(
        &self,
        result_schema: SchemaRef,
        max_block_size: usize,
    ) -> Option<NonJoinedBlocks<'_>> {
        if matches!(
            self.strictness,
            JoinStrictness::Asof | JoinStrictness::Semi
        ) || !self.kind.is_right_or_full()
        {
            return None;
        }
        Some(NonJoinedBlocks::new(self, result_schema, max_block_size))
    }

    /// Validate a `join_get` call shape and return the output field.
    pub fn join_get_check_and_get_return_type(
        &self,
        arg_types: &[DataType],
        column_name: &str,
        or_null: bool,
    ) -> Result<Field, String> {
        if arg_types.len() != self.right_table_key_fields.len() {
            return Err(format!(
                "number of arguments for join_get does not match: passed {}, should be {}",
                arg_types.len(),
                self.right_table_key_fields.len()
            ));
        }
        for (index, (left_type, right_field)) in arg_types
            .iter()
            .zip(&self.right_table_key_fields)
            .enumerate()
        {
            let left_type = key_value_type(left_type);
            let right_type = key_value_type(right_field.data_type());
            if left_type != right_type {
                return Err(format!(
                    "type mismatch in join_get key {}: found type {}, while the needed type is {}",
                    index, left_type, right_type
                ));
            }
        }
        let field = self
            .columns_to_add
            .iter()
            .find(|f| f.name() == column_name)
            .ok_or_else(|| format!("no such column {} in joined table", column_name))?;
        Ok(field.clone().with_nullable(or_null || field.is_nullable()))
    }

    /// Value-lookup API over the index: returns the requested column for
    /// each input key row. Misses yield NULL when `or_null`, defaults
    /// otherwise.
    pub fn join_get(
        &self,
        keys: &Chunk,
        column_name: &str,
        or_null: bool,
    ) -> Result<ArrayRef, String> {
        let is_valid = matches!(
            self.strictness,
            JoinStrictness::Any | JoinStrictness::RightAny
        ) && self.kind == JoinKind::Left;
        if !is_valid {
            return Err("join_get only supports a left any join".to_string());
        }
        let arg_types: Vec<DataType> = keys
            .schema()
            .fields()
            .iter()
            .map(|f| f.data_type().clone())
            .collect();
        let value_field = self.join_get_check_and_get_return_type(&arg_types, column_name, or_null)?;

        // Rename the key block to the right key schema and run the standard
        // probe over it.
        let mut fields = Vec::with_capacity(keys.schema().fields().len());
        for (field, name) in keys
            .schema()
            .fields()
            .iter()
            .zip(&self.config.key_names_right)
        {
            fields.push(field.as_ref().clone().with_name(name.clone()));
        }
        let mut probe_block = Chunk::try_from_parts(fields, keys.columns().to_vec())?;

        join_block_impl(
            self,
            &mut probe_block,
            JoinKind::Left,
            JoinStrictness::Any,
            &self.config.key_names_right,
            std::slice::from_ref(&value_field),
            true,
        )?;
        probe_block.column_by_name(value_field.name())
    }

    /// Adopt another operator's build-side data. Further insertions through
    /// either operator are rejected; the flag bank is re-sized against the
    /// borrowed index.
    pub fn reuse_joined_data(&mut self, other: &HashJoinOperator) -> Result<(), String> {
        self.data = Arc::clone(&other.data);
        self.from_reused_data = true;
        let bucket_count = self.data.bucket_count();
        self.used_flags
            .reinit(bucket_count + 1, flags_required(self.kind, self.strictness));
        Ok(())
    }

    fn materialize_right_keys(&self, block: &Chunk) -> Result<Vec<ArrayRef>, String> {
        let mut columns = Vec::with_capacity(self.config.key_names_right.len());
        for (name, field) in self
            .config
            .key_names_right
            .iter()
            .zip(&self.right_table_key_fields)
        {
            let column = block.column_by_name(name)?;
            let column = if column.data_type() != field.data_type() {
                cast(&column, field.data_type()).map_err(|e| e.to_string())?
            } else {
                column
            };
            columns.push(column);
        }
        Ok(columns)
    }

    /// Project a right block down to the saved schema, widening to nullable
    /// where the sample requires it.
    fn structure_right_block(&self, block: &Chunk) -> Result<Chunk, String> {
        let mut columns = Vec::with_capacity(self.saved_block_fields.len());
        for field in &self.saved_block_fields {
            let column = block.column_by_name(field.name())?;
            let column = if column.data_type() != field.data_type() {
                cast(&column, field.data_type()).map_err(|e| e.to_string())?
            } else {
                column
            };
            columns.push(column);
        }
        Chunk::try_from_parts(self.saved_block_fields.clone(), columns)
    }

    fn check_probe_key_types(&self, block: &Chunk) -> Result<(), String> {
        for (index, (left_name, right_field)) in self
            .config
            .key_names_left
            .iter()
            .zip(&self.right_table_key_fields)
            .enumerate()
        {
            let left_field = block.field_by_name(left_name)?;
            let left_type = key_value_type(left_field.data_type());
            let right_type = key_value_type(right_field.data_type());
            if left_type != right_type {
                return Err(format!(
                    "join key type mismatch in key {}: left {} is {}, right {} is {}",
                    index,
                    left_name,
                    left_type,
                    right_field.name(),
                    right_type
                ));
            }
        }
        Ok(())
    }
}

enum MapShape {
    One,
    All,
    Asof,
}

fn map_shape(kind: JoinKind, strictness: JoinStrictness) -> MapShape {
    match strictness {
        JoinStrictness::Asof => MapShape::Asof,
        JoinStrictness::All => MapShape::All,
        JoinStrictness::RightAny => MapShape::One,
        JoinStrictness::Any => {
            if kind == JoinKind::Right {
                MapShape::All
            } else {
                MapShape::One
            }
        }
        JoinStrictness::Semi => {
            if kind == JoinKind::Left {
                MapShape::One
            } else {
                MapShape::All
            }
        }
        JoinStrictness::Anti => MapShape::All,
    }
}

/// Saved block schema: keys are retained for RIGHT/FULL (the non-joined
/// emitter needs them), the as-of column is always retained, and the columns
/// to add always follow.
fn saved_block_structure(
    config: &JoinConfig,
    kind: JoinKind,
    strictness: JoinStrictness,
    right_table_key_fields: &[Field],
    columns_to_add: &[Field],
) -> Vec<Field> {
    let mut fields = Vec::new();
    if kind.is_right_or_full() {
        fields.extend(right_table_key_fields.iter().cloned());
    } else if strictness == JoinStrictness::Asof {
        if let Some(trailing) = right_table_key_fields.last() {
            fields.push(trailing.clone());
        }
    }
    let key_fields = fields.len();
    fields.extend(columns_to_add.iter().cloned());

    if config.nullable_right_side {
        // FULL keeps its key columns tight; the nullable view is produced at
        // required-right-key materialization time instead.
        let start = if kind == JoinKind::Full { key_fields } else { 0 };
        for field in fields.iter_mut().skip(start) {
            *field = field.clone().with_nullable(true);
        }
    }
    fields
}
