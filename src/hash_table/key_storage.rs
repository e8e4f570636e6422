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
use std::ptr::NonNull;

/// Pointer/length pair into `RowStorage`. Valid for the storage's lifetime;
/// storage blocks are never freed or moved until teardown.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RowKey {
    ptr: usize,
    len: usize,
}

impl RowKey {
    pub(crate) fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr as *const u8, self.len) }
    }

    #[allow(dead_code)]
    pub(crate) fn empty() -> Self {
        Self {
            ptr: NonNull::<u8>::dangling().as_ptr() as usize,
            len: 0,
        }
    }
}

impl PartialEq for RowKey {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for RowKey {}

/// Bump allocator for variable-length key bytes owned by the join operator.
pub(crate) struct RowStorage {
    blocks: Vec<Box<[u8]>>,
    cursor: usize,
    block_size: usize,
}

impl RowStorage {
    pub(crate) fn new(block_size: usize) -> Self {
        Self {
            blocks: Vec::new(),
            cursor: 0,
            block_size: block_size.max(1),
        }
    }

    pub(crate) fn alloc_copy(&mut self, bytes: &[u8]) -> RowKey {
        let needed = bytes.len().max(1);
        let current_block_len = self.blocks.last().map(|b| b.len()).unwrap_or(0);
        if self.blocks.is_empty() || self.cursor + needed > current_block_len {
            let block_size = self.block_size.max(needed);
            self.blocks.push(vec![0u8; block_size].into_boxed_slice());
            self.block_size = self.block_size.max(block_size);
            self.cursor = 0;
        }
        let block = self.blocks.last_mut().expect("row storage block");
        let start = self.cursor;
        let end = start + bytes.len();
        block[start..end].copy_from_slice(bytes);
        self.cursor = end;
        let ptr = block.as_mut_ptr().wrapping_add(start) as usize;
        RowKey {
            ptr,
            len: bytes.len(),
        }
    }

    pub(crate) fn allocated_bytes(&self) -> usize {
        self.blocks.iter().map(|b| b.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_keys_survive_block_growth() {
        let mut storage = RowStorage::new(8);
        let a = storage.alloc_copy(b"alpha");
        let b = storage.alloc_copy(b"beta-long-enough-to-spill");
        let c = storage.alloc_copy(b"");
        assert_eq!(a.as_slice(), b"alpha");
        assert_eq!(b.as_slice(), b"beta-long-enough-to-spill");
        assert_eq!(c.as_slice(), b"");
        assert!(storage.allocated_bytes() >= 8);
    }
}
