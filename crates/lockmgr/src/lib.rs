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

// ============================================================================
// Core Module Declarations
// ============================================================================

// Application Layer Modules
pub mod manager;

// Abstraction Layer Modules
pub mod store;
pub mod tile;

// Algorithm Modules
pub mod coalesce;
pub mod identity;
pub mod kind;

// Core Modules
pub mod config;
pub mod error;
pub mod types;

// ============================================================================
// Public API Exports
// ============================================================================

pub use crate::{
    // Interval coalescing
    coalesce::{LockDecision, coalesce, consecutive_runs},
    // Configuration
    config::{ConfigProvider, EnvConfig, LockManagerConfig, ServerConfig, SharedServerConfig},
    // Error types
    error::{LockError, Result},
    // Identity and lock kind resolution
    identity::generate_server_identity,
    kind::{TransactionMode, TransactionState, resolve_lock_kind},
    // Main components
    manager::{CleanupStatus, LockManager},
    // Store interfaces
    store::{LockStore, StoreError, StoreResult, memory::MemoryLockStore, memory::MemoryLockTable},
    tile::TileHandle,
    // Core types
    types::{LockInterval, LockKind, LockStats, ServerIdentity, TileId},
};

// ============================================================================
// Version Information
// ============================================================================

/// Current version of the lock manager crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
