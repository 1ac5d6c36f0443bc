// Copyright 2024 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::types::LockKind;

/// Map the transaction mode to a lock kind: read-only transactions take shared locks.
pub fn resolve_lock_kind(read_only: bool) -> LockKind {
    if read_only { LockKind::Shared } else { LockKind::Exclusive }
}

/// Answers whether the active transaction is read-only
pub trait TransactionMode: Send + Sync {
    fn is_read_only(&self) -> bool;

    /// Lock kind required by the active transaction
    fn lock_kind(&self) -> LockKind {
        let kind = resolve_lock_kind(self.is_read_only());
        tracing::debug!("Lock manager, lock type: {}", kind);
        kind
    }
}

/// Transaction mode flag toggled by the transaction layer
#[derive(Debug, Default)]
pub struct TransactionState {
    read_only: AtomicBool,
}

impl TransactionState {
    pub fn new(read_only: bool) -> Self {
        Self {
            read_only: AtomicBool::new(read_only),
        }
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::Release);
    }
}

impl TransactionMode for TransactionState {
    fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::Acquire)
    }
}

impl TransactionMode for bool {
    fn is_read_only(&self) -> bool {
        *self
    }
}
