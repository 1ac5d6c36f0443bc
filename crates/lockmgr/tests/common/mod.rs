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

#![allow(dead_code)]

use rasdaman_lockmgr::{
    LockManager, LockStore, MemoryLockStore, MemoryLockTable, ServerConfig, ServerIdentity, StoreError, StoreResult, TileId,
    TransactionState,
};
use std::io;
use std::sync::{Arc, Mutex, Once};

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt::try_init();
    });
}

pub fn server_config(name: &str) -> ServerConfig {
    ServerConfig::new("rasmgr.local", 7001, name, 7002)
}

pub fn manager(table: &MemoryLockTable, name: &str) -> LockManager<MemoryLockStore> {
    LockManager::connect(
        table.connection(),
        Arc::new(server_config(name)),
        Arc::new(TransactionState::default()),
    )
    .expect("memory lock table is reachable")
}

pub fn tiles(ids: impl IntoIterator<Item = i64>) -> Vec<TileId> {
    ids.into_iter().map(TileId::new).collect()
}

/// Memory store with injectable failures
#[derive(Debug)]
pub struct FaultyStore {
    pub inner: MemoryLockStore,
    /// Lock queries for this tile report "not locked"
    pub deny_tile: Option<TileId>,
    /// `clear_all` fails with a backend error
    pub fail_clear: bool,
}

impl FaultyStore {
    pub fn new(table: &MemoryLockTable) -> Self {
        Self {
            inner: table.connection(),
            deny_tile: None,
            fail_clear: false,
        }
    }
}

impl LockStore for FaultyStore {
    fn connect(&mut self, connection_id: &str, name: &str, user: Option<&str>, password: Option<&str>) -> bool {
        self.inner.connect(connection_id, name, user, password)
    }

    fn disconnect(&mut self, name: &str) -> bool {
        self.inner.disconnect(name)
    }

    fn begin_transaction(&mut self, name: &str) -> StoreResult<()> {
        self.inner.begin_transaction(name)
    }

    fn end_transaction(&mut self, name: &str) -> StoreResult<()> {
        self.inner.end_transaction(name)
    }

    fn lock_shared(&mut self, name: &str, owner: &ServerIdentity, tile: TileId) -> StoreResult<()> {
        if self.deny_tile == Some(tile) {
            return Ok(());
        }
        self.inner.lock_shared(name, owner, tile)
    }

    fn lock_exclusive(&mut self, name: &str, owner: &ServerIdentity, tile: TileId) -> StoreResult<()> {
        if self.deny_tile == Some(tile) {
            return Ok(());
        }
        self.inner.lock_exclusive(name, owner, tile)
    }

    fn lock_range_shared(&mut self, name: &str, owner: &ServerIdentity, begin: TileId, end: TileId) -> StoreResult<()> {
        self.inner.lock_range_shared(name, owner, begin, end)
    }

    fn lock_range_exclusive(&mut self, name: &str, owner: &ServerIdentity, begin: TileId, end: TileId) -> StoreResult<()> {
        self.inner.lock_range_exclusive(name, owner, begin, end)
    }

    fn is_locked_shared(&mut self, name: &str, owner: Option<&ServerIdentity>, tile: TileId) -> StoreResult<bool> {
        if self.deny_tile == Some(tile) {
            return Ok(false);
        }
        self.inner.is_locked_shared(name, owner, tile)
    }

    fn is_locked_exclusive(&mut self, name: &str, owner: Option<&ServerIdentity>, tile: TileId) -> StoreResult<bool> {
        if self.deny_tile == Some(tile) {
            return Ok(false);
        }
        self.inner.is_locked_exclusive(name, owner, tile)
    }

    fn unlock(&mut self, name: &str, owner: &ServerIdentity, tile: TileId) -> StoreResult<()> {
        self.inner.unlock(name, owner, tile)
    }

    fn unlock_all(&mut self, name: &str, owner: &ServerIdentity) -> StoreResult<()> {
        self.inner.unlock_all(name, owner)
    }

    fn clear_all(&mut self, name: &str, owner: &ServerIdentity) -> StoreResult<()> {
        if self.fail_clear {
            return Err(StoreError::backend_with_source(
                "lock table relation is missing",
                io::Error::other("relation \"raslocks\" does not exist"),
            ));
        }
        self.inner.clear_all(name, owner)
    }
}

/// Shared in-memory sink for formatted log output
#[derive(Debug, Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
