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
use arrow::array::ArrayRef;

use crate::chunk::Chunk;

/// Positional lookup result for one probe key column: a preloaded block of
/// right-side values and, per probe row, whether the key exists and where its
/// values sit in that block.
pub struct DictionaryKeys {
    pub block: Chunk,
    pub found: Vec<bool>,
    pub positions: Vec<u32>,
}

/// External key→row oracle backing dictionary joins. Replaces the hash index:
/// the operator never builds a map when a dictionary is configured.
pub trait DictionaryLookup: Send + Sync {
    fn read_keys(&self, keys: &ArrayRef) -> Result<DictionaryKeys, String>;
}
