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
use std::sync::atomic::{AtomicBool, Ordering};

/// Per-slot "has been matched" bits, addressed by hash-table bucket index.
/// Allocated only for kind/strictness combinations that read them back; an
/// unflagged bank answers `true` to every `get` so those probe paths cost
/// nothing.
pub(crate) struct JoinUsedFlags {
    need_flags: bool,
    flags: Vec<AtomicBool>,
}

impl JoinUsedFlags {
    pub(crate) fn new() -> Self {
        Self {
            need_flags: false,
            flags: Vec::new(),
        }
    }

    /// Re-create the bank at `size` slots. Called after every build block;
    /// earlier slot indexes are invalidated by table resizes anyway.
    pub(crate) fn reinit(&mut self, size: usize, flagged: bool) {
        if !flagged {
            return;
        }
        debug_assert!(self.flags.len() <= size);
        self.need_flags = true;
        let mut flags = Vec::with_capacity(size);
        flags.resize_with(size, || AtomicBool::new(false));
        self.flags = flags;
    }

    /// May race with other probe threads on the same slot.
    pub(crate) fn set_used(&self, slot: usize) {
        if !self.need_flags {
            return;
        }
        self.flags[slot].store(true, Ordering::Relaxed);
    }

    /// Returns true for exactly one caller per slot.
    pub(crate) fn set_used_once(&self, slot: usize) -> bool {
        if !self.need_flags {
            return true;
        }
        // Cheap check first so the common already-claimed path skips the CAS.
        if self.flags[slot].load(Ordering::Relaxed) {
            return false;
        }
        self.flags[slot]
            .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    pub(crate) fn get_used(&self, slot: usize) -> bool {
        if self.flags.is_empty() {
            return !self.need_flags;
        }
        self.flags[slot].load(Ordering::Acquire)
    }
}
