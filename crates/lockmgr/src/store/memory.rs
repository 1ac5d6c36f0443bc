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

use parking_lot::Mutex;
use std::sync::Arc;

use crate::store::{LockStore, StoreError, StoreResult};
use crate::types::{LockInterval, LockKind, LockStats, ServerIdentity, TileId};

/// One row of the lock table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRow {
    pub owner: ServerIdentity,
    pub interval: LockInterval,
    pub kind: LockKind,
}

#[derive(Debug)]
struct TableState {
    rows: Vec<LockRow>,
    available: bool,
    stats: LockStats,
}

impl TableState {
    /// First row of another owner that conflicts with `kind` on `interval`
    fn conflict(&self, owner: &ServerIdentity, interval: &LockInterval, kind: LockKind) -> Option<(TileId, &ServerIdentity)> {
        self.rows
            .iter()
            .filter(|row| &row.owner != owner && row.interval.overlaps(interval))
            .filter(|row| match kind {
                LockKind::Exclusive => true,
                LockKind::Shared => row.kind == LockKind::Exclusive,
            })
            .map(|row| (row.interval.begin().max(interval.begin()), &row.owner))
            .min_by_key(|(tile, _)| *tile)
    }

    fn holds(&self, owner: Option<&ServerIdentity>, tile: TileId, kind: LockKind) -> bool {
        self.rows
            .iter()
            .any(|row| row.kind == kind && row.interval.contains(tile) && owner.is_none_or(|o| &row.owner == o))
    }

    fn covered(&self, owner: &ServerIdentity, interval: &LockInterval, kind: LockKind) -> bool {
        interval.ids().all(|tile| self.holds(Some(owner), tile, kind))
    }

    fn insert(&mut self, owner: &ServerIdentity, interval: LockInterval, kind: LockKind) {
        self.rows.push(LockRow {
            owner: owner.clone(),
            interval,
            kind,
        });
    }

    /// Remove `tile` from every row of `owner`, splitting ranges around it
    fn remove_tile(&mut self, owner: &ServerIdentity, tile: TileId) {
        let mut kept = Vec::with_capacity(self.rows.len());
        for row in self.rows.drain(..) {
            if &row.owner != owner || !row.interval.contains(tile) {
                kept.push(row);
                continue;
            }
            let below = tile.get().checked_sub(1).map(TileId::new);
            let above = tile.get().checked_add(1).map(TileId::new);
            if let Some(interval) = below.and_then(|end| LockInterval::new(row.interval.begin(), end)) {
                kept.push(LockRow { interval, ..row.clone() });
            }
            if let Some(interval) = above.and_then(|begin| LockInterval::new(begin, row.interval.end())) {
                kept.push(LockRow { interval, ..row });
            }
        }
        self.rows = kept;
    }

    fn remove_owner(&mut self, owner: &ServerIdentity) -> usize {
        let before = self.rows.len();
        self.rows.retain(|row| &row.owner != owner);
        before - self.rows.len()
    }
}

/// In-process lock table shared by any number of connections.
///
/// Cloning yields another handle to the same table, so several lock managers
/// (standing in for several server processes) can contend on one table.
#[derive(Debug, Clone)]
pub struct MemoryLockTable {
    state: Arc<Mutex<TableState>>,
}

impl Default for MemoryLockTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLockTable {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(TableState {
                rows: Vec::new(),
                available: true,
                stats: LockStats::default(),
            })),
        }
    }

    /// Open a new connection on this table
    pub fn connection(&self) -> MemoryLockStore {
        MemoryLockStore {
            table: self.clone(),
            session: None,
        }
    }

    /// Make the database reachable or unreachable for connect and disconnect
    pub fn set_available(&self, available: bool) {
        self.state.lock().available = available;
    }

    /// Snapshot of all rows
    pub fn rows(&self) -> Vec<LockRow> {
        self.state.lock().rows.clone()
    }

    /// Rows owned by `owner`
    pub fn rows_of(&self, owner: &ServerIdentity) -> Vec<LockRow> {
        self.state.lock().rows.iter().filter(|row| &row.owner == owner).cloned().collect()
    }

    /// Check whether `owner` (or anyone) holds a `kind` lock on `tile`, bypassing transactions
    pub fn is_held(&self, owner: Option<&ServerIdentity>, tile: TileId, kind: LockKind) -> bool {
        self.state.lock().holds(owner, tile, kind)
    }

    pub fn stats(&self) -> LockStats {
        let state = self.state.lock();
        LockStats {
            held_locks: state.rows.len(),
            ..state.stats.clone()
        }
    }

    pub fn reset_stats(&self) {
        self.state.lock().stats = LockStats::default();
    }
}

#[derive(Debug)]
struct Session {
    name: String,
    in_transaction: bool,
}

/// Connection to a [`MemoryLockTable`]
#[derive(Debug)]
pub struct MemoryLockStore {
    table: MemoryLockTable,
    session: Option<Session>,
}

impl Default for MemoryLockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLockStore {
    /// Connection on a fresh private table
    pub fn new() -> Self {
        MemoryLockTable::new().connection()
    }

    pub fn table(&self) -> &MemoryLockTable {
        &self.table
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn session(&mut self, name: &str) -> StoreResult<&mut Session> {
        match self.session.as_mut() {
            Some(session) if session.name == name => Ok(session),
            _ => Err(StoreError::not_connected(name)),
        }
    }

    fn in_transaction(&mut self, name: &str) -> StoreResult<()> {
        if self.session(name)?.in_transaction {
            Ok(())
        } else {
            Err(StoreError::no_active_transaction(name))
        }
    }

    fn lock_single(&mut self, name: &str, owner: &ServerIdentity, tile: TileId, kind: LockKind) -> StoreResult<()> {
        self.in_transaction(name)?;
        let interval = LockInterval::single(tile);
        let mut state = self.table.state.lock();
        state.stats.single_lock_calls += 1;
        if let Some((_, holder)) = state.conflict(owner, &interval, kind) {
            tracing::debug!("Tile {} held by '{}', {} lock for '{}' not inserted", tile, holder, kind, owner);
            return Ok(());
        }
        if !state.holds(Some(owner), tile, kind) {
            state.insert(owner, interval, kind);
        }
        Ok(())
    }

    fn lock_range(&mut self, name: &str, owner: &ServerIdentity, begin: TileId, end: TileId, kind: LockKind) -> StoreResult<()> {
        self.in_transaction(name)?;
        let interval = LockInterval::new(begin, end).ok_or(StoreError::InvalidRange { begin, end })?;
        let mut state = self.table.state.lock();
        state.stats.range_lock_calls += 1;
        if let Some((tile, holder)) = state.conflict(owner, &interval, kind) {
            return Err(StoreError::conflict(tile, holder.as_str()));
        }
        if !state.covered(owner, &interval, kind) {
            state.insert(owner, interval, kind);
        }
        Ok(())
    }

    fn is_locked(&mut self, name: &str, owner: Option<&ServerIdentity>, tile: TileId, kind: LockKind) -> StoreResult<bool> {
        self.in_transaction(name)?;
        let mut state = self.table.state.lock();
        state.stats.query_calls += 1;
        Ok(state.holds(owner, tile, kind))
    }

    fn remove_owner(&mut self, name: &str, owner: &ServerIdentity) -> StoreResult<()> {
        self.in_transaction(name)?;
        let mut state = self.table.state.lock();
        state.stats.unlock_calls += 1;
        let removed = state.remove_owner(owner);
        tracing::debug!("Removed {} lock rows of '{}'", removed, owner);
        Ok(())
    }
}

impl LockStore for MemoryLockStore {
    fn connect(&mut self, connection_id: &str, name: &str, _user: Option<&str>, _password: Option<&str>) -> bool {
        if !self.table.state.lock().available || connection_id.is_empty() {
            return false;
        }
        self.session = Some(Session {
            name: name.to_string(),
            in_transaction: false,
        });
        true
    }

    fn disconnect(&mut self, name: &str) -> bool {
        if !self.table.state.lock().available {
            return false;
        }
        match &self.session {
            Some(session) if session.name == name => {
                self.session = None;
                true
            }
            _ => false,
        }
    }

    fn begin_transaction(&mut self, name: &str) -> StoreResult<()> {
        let session = self.session(name)?;
        if session.in_transaction {
            return Err(StoreError::TransactionAlreadyActive { name: name.to_string() });
        }
        session.in_transaction = true;
        self.table.state.lock().stats.transactions_begun += 1;
        Ok(())
    }

    fn end_transaction(&mut self, name: &str) -> StoreResult<()> {
        let session = self.session(name)?;
        if !session.in_transaction {
            return Err(StoreError::no_active_transaction(name));
        }
        session.in_transaction = false;
        self.table.state.lock().stats.transactions_ended += 1;
        Ok(())
    }

    fn lock_shared(&mut self, name: &str, owner: &ServerIdentity, tile: TileId) -> StoreResult<()> {
        self.lock_single(name, owner, tile, LockKind::Shared)
    }

    fn lock_exclusive(&mut self, name: &str, owner: &ServerIdentity, tile: TileId) -> StoreResult<()> {
        self.lock_single(name, owner, tile, LockKind::Exclusive)
    }

    fn lock_range_shared(&mut self, name: &str, owner: &ServerIdentity, begin: TileId, end: TileId) -> StoreResult<()> {
        self.lock_range(name, owner, begin, end, LockKind::Shared)
    }

    fn lock_range_exclusive(&mut self, name: &str, owner: &ServerIdentity, begin: TileId, end: TileId) -> StoreResult<()> {
        self.lock_range(name, owner, begin, end, LockKind::Exclusive)
    }

    fn is_locked_shared(&mut self, name: &str, owner: Option<&ServerIdentity>, tile: TileId) -> StoreResult<bool> {
        self.is_locked(name, owner, tile, LockKind::Shared)
    }

    fn is_locked_exclusive(&mut self, name: &str, owner: Option<&ServerIdentity>, tile: TileId) -> StoreResult<bool> {
        self.is_locked(name, owner, tile, LockKind::Exclusive)
    }

    fn unlock(&mut self, name: &str, owner: &ServerIdentity, tile: TileId) -> StoreResult<()> {
        self.in_transaction(name)?;
        let mut state = self.table.state.lock();
        state.stats.unlock_calls += 1;
        state.remove_tile(owner, tile);
        Ok(())
    }

    fn unlock_all(&mut self, name: &str, owner: &ServerIdentity) -> StoreResult<()> {
        self.remove_owner(name, owner)
    }

    fn clear_all(&mut self, name: &str, owner: &ServerIdentity) -> StoreResult<()> {
        self.remove_owner(name, owner)
    }
}
