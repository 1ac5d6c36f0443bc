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
use std::fmt;
use std::sync::Arc;

use crate::{
    coalesce::{LockDecision, coalesce},
    config::{ConfigProvider, LockManagerConfig},
    error::{LockError, Result},
    identity::generate_bounded,
    kind::TransactionMode,
    store::{LockStore, StoreError},
    tile::{TileHandle, persistent_ids},
    types::{LockInterval, LockKind, ServerIdentity, TileId},
};

/// Outcome of a best-effort lock table cleanup
#[derive(Debug)]
pub enum CleanupStatus {
    /// All locks of the server were removed
    Cleared,
    /// Cleanup failed; the failure has already been logged
    Failed(LockError),
}

impl CleanupStatus {
    pub fn is_cleared(&self) -> bool {
        matches!(self, CleanupStatus::Cleared)
    }
}

#[derive(Debug)]
struct Connection<S> {
    store: S,
    connected: bool,
}

/// Store calls issued inside one open transaction
struct Session<'a, S: LockStore> {
    store: &'a mut S,
    name: &'a str,
}

impl<S: LockStore> Session<'_, S> {
    /// Lock one tile and verify that the lock is held afterwards
    fn lock_tile(&mut self, owner: &ServerIdentity, tile: TileId, kind: LockKind) -> Result<()> {
        let held = match kind {
            LockKind::Exclusive => {
                self.store
                    .lock_exclusive(self.name, owner, tile)
                    .map_err(|e| LockError::store("lock_exclusive", e))?;
                self.store
                    .is_locked_exclusive(self.name, Some(owner), tile)
                    .map_err(|e| LockError::store("is_locked_exclusive", e))?
            }
            LockKind::Shared => {
                self.store
                    .lock_shared(self.name, owner, tile)
                    .map_err(|e| LockError::store("lock_shared", e))?;
                self.store
                    .is_locked_shared(self.name, Some(owner), tile)
                    .map_err(|e| LockError::store("is_locked_shared", e))?
            }
        };

        if !held {
            tracing::error!("Lock manager: tile {} cannot be locked {} for '{}'", tile, kind, owner);
            return Err(LockError::acquisition_failed(LockInterval::single(tile), kind, owner));
        }
        Ok(())
    }

    fn lock_range(&mut self, owner: &ServerIdentity, interval: LockInterval, kind: LockKind) -> Result<()> {
        let (operation, result) = match kind {
            LockKind::Exclusive => (
                "lock_range_exclusive",
                self.store.lock_range_exclusive(self.name, owner, interval.begin(), interval.end()),
            ),
            LockKind::Shared => (
                "lock_range_shared",
                self.store.lock_range_shared(self.name, owner, interval.begin(), interval.end()),
            ),
        };

        result.map_err(|e| match e {
            StoreError::Conflict { tile, holder } => {
                tracing::error!(
                    "Lock manager: tiles {} cannot be locked {} for '{}', tile {} held by '{}'",
                    interval,
                    kind,
                    owner,
                    tile,
                    holder
                );
                LockError::acquisition_failed(interval, kind, owner)
            }
            other => LockError::store(operation, other),
        })
    }

    /// Issue coalesced lock calls in ascending id order; stops at the first failure
    fn lock_decisions(&mut self, owner: &ServerIdentity, decisions: &[LockDecision], kind: LockKind) -> Result<()> {
        for decision in decisions {
            match *decision {
                LockDecision::Bulk(interval) => self.lock_range(owner, interval, kind)?,
                LockDecision::Single(tile) => self.lock_tile(owner, tile, kind)?,
            }
        }
        Ok(())
    }

    fn unlock_tile(&mut self, owner: &ServerIdentity, tile: TileId) -> Result<()> {
        self.store
            .unlock(self.name, owner, tile)
            .map_err(|e| LockError::store("unlock", e))
    }

    fn unlock_all(&mut self, owner: &ServerIdentity) -> Result<()> {
        self.store
            .unlock_all(self.name, owner)
            .map_err(|e| LockError::store("unlock_all", e))
    }

    fn is_tile_locked(&mut self, tile: TileId, kind: LockKind) -> Result<bool> {
        match kind {
            LockKind::Exclusive => self
                .store
                .is_locked_exclusive(self.name, None, tile)
                .map_err(|e| LockError::store("is_locked_exclusive", e)),
            LockKind::Shared => self
                .store
                .is_locked_shared(self.name, None, tile)
                .map_err(|e| LockError::store("is_locked_shared", e)),
        }
    }

    fn clear_all(&mut self, owner: &ServerIdentity) -> Result<()> {
        self.store
            .clear_all(self.name, owner)
            .map_err(|e| LockError::store("clear_all", e))
    }
}

/// Process-wide coordinator of tile locks.
///
/// Owns the single connection to the lock table. The connection is opened on
/// construction and closed by [`LockManager::shutdown`] or on drop. Every
/// operation holds the internal mutex from the beginning to the end of its
/// transaction, so a manager can be shared between threads through an `Arc`.
///
/// When a batch fails part way, locks issued earlier in the same batch stay
/// held. The transaction is still ended before the error is returned; the
/// caller aborts its own transaction and releases with
/// [`LockManager::unlock_all_tiles`].
pub struct LockManager<S: LockStore> {
    connection: Mutex<Connection<S>>,
    config: LockManagerConfig,
    server_config: Arc<dyn ConfigProvider>,
    transaction_mode: Arc<dyn TransactionMode>,
}

impl<S: LockStore> LockManager<S> {
    /// Connect to the lock table with the default manager configuration
    pub fn connect(store: S, server_config: Arc<dyn ConfigProvider>, transaction_mode: Arc<dyn TransactionMode>) -> Result<Self> {
        Self::connect_with_config(store, LockManagerConfig::default(), server_config, transaction_mode)
    }

    /// Connect to the lock table
    pub fn connect_with_config(
        mut store: S,
        config: LockManagerConfig,
        server_config: Arc<dyn ConfigProvider>,
        transaction_mode: Arc<dyn TransactionMode>,
    ) -> Result<Self> {
        config.validate()?;

        let endpoint = server_config.server_config().db_endpoint();
        tracing::debug!("Lock manager: connecting '{}' to {}", config.connection_name, endpoint.connection_id);
        let connected = store.connect(
            &endpoint.connection_id,
            &config.connection_name,
            endpoint.user.as_deref(),
            endpoint.password.as_deref(),
        );
        if !connected {
            tracing::error!("Lock manager: database {} is not connected", endpoint.connection_id);
            return Err(LockError::connection_unavailable(
                config.connection_name,
                format!("cannot connect to {}", endpoint.connection_id),
            ));
        }

        Ok(Self {
            connection: Mutex::new(Connection { store, connected: true }),
            config,
            server_config,
            transaction_mode,
        })
    }

    pub fn config(&self) -> &LockManagerConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.connection.lock().connected
    }

    /// Close the connection to the lock table
    pub fn shutdown(self) -> Result<()> {
        self.disconnect()
    }

    fn disconnect(&self) -> Result<()> {
        let name = self.config.connection_name.as_str();
        let mut conn = self.connection.lock();
        if !conn.connected {
            return Ok(());
        }
        if !conn.store.disconnect(name) {
            tracing::error!("Lock manager: database connection '{}' cannot be disconnected", name);
            return Err(LockError::connection_unavailable(name, "cannot disconnect"));
        }
        conn.connected = false;
        tracing::debug!("Lock manager: connection '{}' closed", name);
        Ok(())
    }

    /// Run `op` between a begin and an end transaction call.
    ///
    /// The transaction is ended even when `op` fails; the error of `op` wins
    /// over a failure to end the transaction.
    fn in_transaction<T>(&self, op: impl FnOnce(&mut Session<'_, S>) -> Result<T>) -> Result<T> {
        let name = self.config.connection_name.as_str();
        let mut conn = self.connection.lock();
        if !conn.connected {
            return Err(LockError::connection_unavailable(name, "lock manager is disconnected"));
        }

        tracing::debug!("Lock manager: begin transaction");
        conn.store
            .begin_transaction(name)
            .map_err(|e| LockError::store("begin_transaction", e))?;

        let result = op(&mut Session {
            store: &mut conn.store,
            name,
        });

        let ended = conn.store.end_transaction(name).map_err(|e| LockError::store("end_transaction", e));
        tracing::debug!("Lock manager: end transaction");

        match (result, ended) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(end_err)) => Err(end_err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(end_err)) => {
                tracing::warn!("Lock manager: ending transaction after failure also failed: {}", end_err);
                Err(err)
            }
        }
    }

    /// Lock one tile for `owner` and verify the lock is held
    pub fn lock_tile(&self, owner: &ServerIdentity, tile: TileId, kind: LockKind) -> Result<()> {
        tracing::debug!("Lock manager, lock tile: locking tile {} {} for '{}'", tile, kind, owner);
        self.in_transaction(|session| session.lock_tile(owner, tile, kind))
    }

    /// Lock a set of tiles for `owner` inside one transaction.
    ///
    /// Duplicate ids are ignored. Runs of consecutive ids of at least the bulk
    /// threshold are locked with one range call, all other ids one by one. An
    /// empty set opens no transaction.
    pub fn lock_tiles(&self, owner: &ServerIdentity, tiles: impl IntoIterator<Item = TileId>, kind: LockKind) -> Result<()> {
        let decisions = coalesce(tiles, self.config.bulk_threshold);
        if decisions.is_empty() {
            tracing::debug!("Lock manager, lock tiles: no tiles to lock");
            return Ok(());
        }

        tracing::debug!(
            "Lock manager, lock tiles: {} lock calls {} for '{}'",
            decisions.len(),
            kind,
            owner
        );
        self.in_transaction(|session| session.lock_decisions(owner, &decisions, kind))
    }

    /// Release the locks of `owner` on one tile; unheld tiles are ignored
    pub fn unlock_tile(&self, owner: &ServerIdentity, tile: TileId) -> Result<()> {
        tracing::debug!("Lock manager, unlock tile: unlocking tile {} for '{}'", tile, owner);
        self.in_transaction(|session| session.unlock_tile(owner, tile))
    }

    /// Release every lock held by `owner`
    pub fn unlock_all_tiles(&self, owner: &ServerIdentity) -> Result<()> {
        tracing::debug!("Lock manager, unlock all tiles: unlocking all tiles for '{}'", owner);
        self.in_transaction(|session| session.unlock_all(owner))
    }

    /// Check whether any server holds a `kind` lock on `tile`
    pub fn is_tile_locked(&self, tile: TileId, kind: LockKind) -> Result<bool> {
        let locked = self.in_transaction(|session| session.is_tile_locked(tile, kind))?;
        tracing::debug!("Lock manager, is tile locked: tile {} {}: {}", tile, kind, locked);
        Ok(locked)
    }

    /// Remove every lock table entry of `owner`, best effort.
    ///
    /// Used to discard locks left behind by a crashed instance of the same
    /// server. Failures are logged and reported in the returned status, never
    /// as an error.
    pub fn clear_lock_table(&self, owner: &ServerIdentity) -> CleanupStatus {
        match self.in_transaction(|session| session.clear_all(owner)) {
            Ok(()) => {
                tracing::debug!("Lock manager, clear lock table for '{}': ok", owner);
                CleanupStatus::Cleared
            }
            Err(e) => self.cleanup_failed(owner.as_str(), e),
        }
    }

    fn cleanup_failed(&self, owner: &str, cause: LockError) -> CleanupStatus {
        let err = LockError::cleanup_failed(owner, cause.to_string());
        tracing::error!("Lock manager, clear lock table failed: {}", err);
        CleanupStatus::Failed(err)
    }

    /// Identity of this server derived from the current configuration
    pub fn server_identity(&self) -> Result<ServerIdentity> {
        generate_bounded(&self.server_config.server_config(), self.config.max_identity_len)
    }

    /// Lock kind required by the active transaction
    pub fn current_lock_kind(&self) -> LockKind {
        self.transaction_mode.lock_kind()
    }

    /// Lock a tile for this server with the kind of the active transaction.
    /// Tiles not yet written to the database are skipped.
    pub fn lock_tile_handle<T: TileHandle + ?Sized>(&self, tile: &T) -> Result<()> {
        let tile = tile.tile_id();
        if !tile.is_persistent() {
            tracing::debug!("Lock manager, lock tile: tile {} is not persistent, skipped", tile);
            return Ok(());
        }
        let owner = self.server_identity()?;
        let kind = self.current_lock_kind();
        self.lock_tile(&owner, tile, kind)
    }

    /// Lock the tiles of an object for this server with the kind of the active transaction
    pub fn lock_tile_handles<T: TileHandle>(&self, tiles: &[T]) -> Result<()> {
        let ids = persistent_ids(tiles);
        if ids.is_empty() {
            tracing::debug!("Lock manager, lock tiles: no tiles to lock");
            return Ok(());
        }
        let owner = self.server_identity()?;
        let kind = self.current_lock_kind();
        self.lock_tiles(&owner, ids, kind)
    }

    /// Release this server's locks on a tile
    pub fn unlock_tile_handle<T: TileHandle + ?Sized>(&self, tile: &T) -> Result<()> {
        let tile = tile.tile_id();
        if !tile.is_persistent() {
            return Ok(());
        }
        let owner = self.server_identity()?;
        self.unlock_tile(&owner, tile)
    }

    /// Check whether a tile carries a `kind` lock; unpersisted tiles never do
    pub fn is_tile_handle_locked<T: TileHandle + ?Sized>(&self, tile: &T, kind: LockKind) -> Result<bool> {
        let tile = tile.tile_id();
        if !tile.is_persistent() {
            return Ok(false);
        }
        self.is_tile_locked(tile, kind)
    }

    /// Release every lock held by this server
    pub fn unlock_own_tiles(&self) -> Result<()> {
        let owner = self.server_identity()?;
        self.unlock_all_tiles(&owner)
    }

    /// Discard stale locks of this server, best effort
    pub fn clear_own_lock_table(&self) -> CleanupStatus {
        match self.server_identity() {
            Ok(owner) => self.clear_lock_table(&owner),
            Err(e) => self.cleanup_failed("unknown", e),
        }
    }
}

impl<S: LockStore> fmt::Debug for LockManager<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockManager")
            .field("config", &self.config)
            .field("connected", &self.connection.try_lock().map(|conn| conn.connected))
            .finish_non_exhaustive()
    }
}

impl<S: LockStore> Drop for LockManager<S> {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            tracing::error!("Lock manager: disconnect on drop failed: {}", e);
        }
    }
}
