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

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a storage tile, the unit of locking.
///
/// Ids are totally ordered; two ids are adjacent when they differ by exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TileId(i64);

impl TileId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> i64 {
        self.0
    }

    /// Tiles that have not been written to the database yet carry an id <= 0.
    pub const fn is_persistent(self) -> bool {
        self.0 > 0
    }

    /// Check whether `next` directly follows this id
    pub fn is_followed_by(self, next: TileId) -> bool {
        self.0.checked_add(1) == Some(next.0)
    }
}

impl From<i64> for TileId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lock kind enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockKind {
    /// Shared lock (read lock), may coexist with shared locks of other servers
    Shared,
    /// Exclusive lock (write lock), excludes every lock held by another server
    Exclusive,
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockKind::Shared => f.write_str("shared"),
            LockKind::Exclusive => f.write_str("exclusive"),
        }
    }
}

/// Closed range `[begin, end]` of consecutive tile ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockInterval {
    begin: TileId,
    end: TileId,
}

impl LockInterval {
    /// Create an interval, `None` if `begin > end`
    pub fn new(begin: TileId, end: TileId) -> Option<Self> {
        (begin <= end).then_some(Self { begin, end })
    }

    /// Interval covering exactly one tile
    pub fn single(id: TileId) -> Self {
        Self { begin: id, end: id }
    }

    pub fn begin(&self) -> TileId {
        self.begin
    }

    pub fn end(&self) -> TileId {
        self.end
    }

    /// Number of tile ids covered by the interval
    pub fn len(&self) -> u64 {
        self.end.0.abs_diff(self.begin.0).saturating_add(1)
    }

    /// An interval always covers at least one id
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn is_single(&self) -> bool {
        self.begin == self.end
    }

    pub fn contains(&self, id: TileId) -> bool {
        self.begin <= id && id <= self.end
    }

    pub fn overlaps(&self, other: &LockInterval) -> bool {
        self.begin <= other.end && other.begin <= self.end
    }

    /// Iterate over every tile id in ascending order
    pub fn ids(&self) -> impl Iterator<Item = TileId> + use<> {
        (self.begin.0..=self.end.0).map(TileId)
    }
}

impl fmt::Display for LockInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single() {
            write!(f, "{}", self.begin)
        } else {
            write!(f, "[{}, {}]", self.begin, self.end)
        }
    }
}

/// Token naming the server process that owns a lock
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerIdentity(String);

impl ServerIdentity {
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for ServerIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Round-trip statistics of a lock store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStats {
    /// Transactions opened
    pub transactions_begun: usize,
    /// Transactions closed
    pub transactions_ended: usize,
    /// Single tile lock calls
    pub single_lock_calls: usize,
    /// Range lock calls
    pub range_lock_calls: usize,
    /// Lock state queries
    pub query_calls: usize,
    /// Unlock, unlock-all and clear calls
    pub unlock_calls: usize,
    /// Rows currently held in the lock table
    pub held_locks: usize,
}

impl LockStats {
    /// Total number of lock calls issued, single and range
    pub fn lock_calls(&self) -> usize {
        self.single_lock_calls + self.range_lock_calls
    }
}
