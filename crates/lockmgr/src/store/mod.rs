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

pub mod memory;

use crate::types::{ServerIdentity, TileId};
use thiserror::Error;

/// Lock store error types
#[derive(Error, Debug)]
pub enum StoreError {
    /// No open connection with this name
    #[error("Connection '{name}' is not open")]
    NotConnected { name: String },

    /// Call issued outside a transaction
    #[error("No active transaction on connection '{name}'")]
    NoActiveTransaction { name: String },

    /// Transaction begun twice
    #[error("Transaction already active on connection '{name}'")]
    TransactionAlreadyActive { name: String },

    /// Range lock rejected because another server holds a conflicting lock
    #[error("Tile {tile} is already locked by '{holder}'")]
    Conflict { tile: TileId, holder: String },

    /// Range with `begin > end`
    #[error("Invalid tile range [{begin}, {end}]")]
    InvalidRange { begin: TileId, end: TileId },

    /// Backend failure
    #[error("Lock store backend error: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl StoreError {
    pub fn not_connected(name: impl Into<String>) -> Self {
        Self::NotConnected { name: name.into() }
    }

    pub fn no_active_transaction(name: impl Into<String>) -> Self {
        Self::NoActiveTransaction { name: name.into() }
    }

    pub fn conflict(tile: TileId, holder: impl Into<String>) -> Self {
        Self::Conflict {
            tile,
            holder: holder.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            source: None,
        }
    }

    pub fn backend_with_source(message: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Lock store Result type
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Connection to the persistent lock table.
///
/// Every call names the connection it runs on. Lock, unlock and query calls are
/// only valid between `begin_transaction` and `end_transaction`. The store is
/// responsible for atomicity of each call across server processes; lock calls
/// that meet a conflicting lock of another server either leave the table
/// unchanged (single tile, detected by the following query) or fail with
/// [`StoreError::Conflict`] (range).
pub trait LockStore: Send + std::fmt::Debug {
    /// Open the connection, `false` if the database is unreachable
    fn connect(&mut self, connection_id: &str, name: &str, user: Option<&str>, password: Option<&str>) -> bool;

    /// Close the connection, `false` if it cannot be closed
    fn disconnect(&mut self, name: &str) -> bool;

    fn begin_transaction(&mut self, name: &str) -> StoreResult<()>;

    fn end_transaction(&mut self, name: &str) -> StoreResult<()>;

    fn lock_shared(&mut self, name: &str, owner: &ServerIdentity, tile: TileId) -> StoreResult<()>;

    fn lock_exclusive(&mut self, name: &str, owner: &ServerIdentity, tile: TileId) -> StoreResult<()>;

    fn lock_range_shared(&mut self, name: &str, owner: &ServerIdentity, begin: TileId, end: TileId) -> StoreResult<()>;

    fn lock_range_exclusive(&mut self, name: &str, owner: &ServerIdentity, begin: TileId, end: TileId) -> StoreResult<()>;

    /// Check for a shared lock on `tile`, held by `owner` or by anyone when `None`
    fn is_locked_shared(&mut self, name: &str, owner: Option<&ServerIdentity>, tile: TileId) -> StoreResult<bool>;

    /// Check for an exclusive lock on `tile`, held by `owner` or by anyone when `None`
    fn is_locked_exclusive(&mut self, name: &str, owner: Option<&ServerIdentity>, tile: TileId) -> StoreResult<bool>;

    /// Remove the locks of `owner` on `tile`; no-op when none are held
    fn unlock(&mut self, name: &str, owner: &ServerIdentity, tile: TileId) -> StoreResult<()>;

    /// Remove every lock of `owner`
    fn unlock_all(&mut self, name: &str, owner: &ServerIdentity) -> StoreResult<()>;

    /// Remove every lock table entry of `owner`, used for stale-lock recovery
    fn clear_all(&mut self, name: &str, owner: &ServerIdentity) -> StoreResult<()>;
}

impl<S: LockStore + ?Sized> LockStore for Box<S> {
    fn connect(&mut self, connection_id: &str, name: &str, user: Option<&str>, password: Option<&str>) -> bool {
        (**self).connect(connection_id, name, user, password)
    }

    fn disconnect(&mut self, name: &str) -> bool {
        (**self).disconnect(name)
    }

    fn begin_transaction(&mut self, name: &str) -> StoreResult<()> {
        (**self).begin_transaction(name)
    }

    fn end_transaction(&mut self, name: &str) -> StoreResult<()> {
        (**self).end_transaction(name)
    }

    fn lock_shared(&mut self, name: &str, owner: &ServerIdentity, tile: TileId) -> StoreResult<()> {
        (**self).lock_shared(name, owner, tile)
    }

    fn lock_exclusive(&mut self, name: &str, owner: &ServerIdentity, tile: TileId) -> StoreResult<()> {
        (**self).lock_exclusive(name, owner, tile)
    }

    fn lock_range_shared(&mut self, name: &str, owner: &ServerIdentity, begin: TileId, end: TileId) -> StoreResult<()> {
        (**self).lock_range_shared(name, owner, begin, end)
    }

    fn lock_range_exclusive(&mut self, name: &str, owner: &ServerIdentity, begin: TileId, end: TileId) -> StoreResult<()> {
        (**self).lock_range_exclusive(name, owner, begin, end)
    }

    fn is_locked_shared(&mut self, name: &str, owner: Option<&ServerIdentity>, tile: TileId) -> StoreResult<bool> {
        (**self).is_locked_shared(name, owner, tile)
    }

    fn is_locked_exclusive(&mut self, name: &str, owner: Option<&ServerIdentity>, tile: TileId) -> StoreResult<bool> {
        (**self).is_locked_exclusive(name, owner, tile)
    }

    fn unlock(&mut self, name: &str, owner: &ServerIdentity, tile: TileId) -> StoreResult<()> {
        (**self).unlock(name, owner, tile)
    }

    fn unlock_all(&mut self, name: &str, owner: &ServerIdentity) -> StoreResult<()> {
        (**self).unlock_all(name, owner)
    }

    fn clear_all(&mut self, name: &str, owner: &ServerIdentity) -> StoreResult<()> {
        (**self).clear_all(name, owner)
    }
}
