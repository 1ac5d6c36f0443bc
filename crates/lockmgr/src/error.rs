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

use crate::store::StoreError;
use crate::types::{LockInterval, LockKind, ServerIdentity};
use thiserror::Error;

/// Lock manager error types
#[derive(Error, Debug)]
pub enum LockError {
    /// The lock table connection could not be opened or closed
    #[error("Lock table connection '{connection}' unavailable: {reason}")]
    ConnectionUnavailable { connection: String, reason: String },

    /// A lock was issued but is not held afterwards
    #[error("Tile {interval} cannot be locked {kind} for server '{owner}'")]
    LockAcquisitionFailed {
        interval: LockInterval,
        kind: LockKind,
        owner: ServerIdentity,
    },

    /// Server identity could not be composed from the configuration
    #[error("Server identity composition failed: {reason}")]
    IdentityCompositionFailed { reason: String },

    /// Lock table cleanup failed; reported through the cleanup status only
    #[error("Clearing lock table for server '{owner}' failed: {reason}")]
    BestEffortCleanupFailed { owner: String, reason: String },

    /// A lock store call failed
    #[error("Lock store operation '{operation}' failed: {source}")]
    Store {
        operation: &'static str,
        #[source]
        source: StoreError,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl LockError {
    /// Create connection unavailable error
    pub fn connection_unavailable(connection: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectionUnavailable {
            connection: connection.into(),
            reason: reason.into(),
        }
    }

    /// Create lock acquisition error
    pub fn acquisition_failed(interval: LockInterval, kind: LockKind, owner: &ServerIdentity) -> Self {
        Self::LockAcquisitionFailed {
            interval,
            kind,
            owner: owner.clone(),
        }
    }

    /// Create identity composition error
    pub fn identity_composition(reason: impl Into<String>) -> Self {
        Self::IdentityCompositionFailed { reason: reason.into() }
    }

    /// Create cleanup error
    pub fn cleanup_failed(owner: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BestEffortCleanupFailed {
            owner: owner.into(),
            reason: reason.into(),
        }
    }

    /// Create store error
    pub fn store(operation: &'static str, source: StoreError) -> Self {
        Self::Store { operation, source }
    }

    /// Create configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Fatal errors leave the manager unusable or misconfigured
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConnectionUnavailable { .. } | Self::IdentityCompositionFailed { .. } | Self::Configuration { .. }
        )
    }

    /// Recoverable errors require the caller to abort its enclosing transaction only
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::LockAcquisitionFailed { .. })
    }
}

/// Lock operation Result type
pub type Result<T> = std::result::Result<T, LockError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TileId;

    #[test]
    fn test_error_creation() {
        let conn_err = LockError::connection_unavailable("lockmgrConn", "refused");
        assert!(matches!(conn_err, LockError::ConnectionUnavailable { .. }));

        let owner = ServerIdentity::new("host-1-srv-2");
        let lock_err = LockError::acquisition_failed(LockInterval::single(TileId::new(4)), LockKind::Exclusive, &owner);
        assert_eq!(lock_err.to_string(), "Tile 4 cannot be locked exclusive for server 'host-1-srv-2'");

        let store_err = LockError::store("unlock", StoreError::not_connected("lockmgrConn"));
        assert!(store_err.to_string().contains("unlock"));
    }

    #[test]
    fn test_error_fatal() {
        assert!(LockError::connection_unavailable("c", "down").is_fatal());
        assert!(LockError::identity_composition("bad").is_fatal());
        assert!(LockError::configuration("bad").is_fatal());
        assert!(!LockError::cleanup_failed("owner", "boom").is_fatal());
    }

    #[test]
    fn test_error_recoverable() {
        let owner = ServerIdentity::new("owner");
        let lock_err = LockError::acquisition_failed(LockInterval::single(TileId::new(1)), LockKind::Shared, &owner);
        assert!(lock_err.is_recoverable());
        assert!(!lock_err.is_fatal());
        assert!(!LockError::connection_unavailable("c", "down").is_recoverable());
    }
}
