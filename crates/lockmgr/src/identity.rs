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

//! Server identity composition.
//!
//! A server identity has the form `<rasmgrHost>-<rasmgrPort>-<serverName>-<listenPort>`.
//! Absent host or server name fields are replaced by fixed placeholders, and the
//! result is cut to the configured byte bound. Cutting is reported as a warning
//! and never fails the operation.

use std::fmt::Write;

use crate::config::{DEFAULT_MAX_IDENTITY_LEN, DEFAULT_RASMGR_HOST, DEFAULT_SERVER_NAME, ServerConfig};
use crate::error::{LockError, Result};
use crate::types::ServerIdentity;

/// Compose the identity of the calling server, bounded by 255 bytes
pub fn generate_server_identity(config: &ServerConfig) -> Result<ServerIdentity> {
    generate_bounded(config, DEFAULT_MAX_IDENTITY_LEN)
}

/// Compose the identity of the calling server, bounded by `max_len` bytes
pub fn generate_bounded(config: &ServerConfig, max_len: usize) -> Result<ServerIdentity> {
    if max_len == 0 {
        return Err(LockError::identity_composition("identity length bound is zero"));
    }

    // the port goes with its name: an absent name resets both
    let (rasmgr_host, rasmgr_port) = match config.rasmgr_host.as_deref() {
        Some(host) => (host, config.rasmgr_port),
        None => (DEFAULT_RASMGR_HOST, 0),
    };
    let (server_name, listen_port) = match config.server_name.as_deref() {
        Some(name) => (name, config.listen_port),
        None => (DEFAULT_SERVER_NAME, 0),
    };

    for (field, value) in [("rasmgr host", rasmgr_host), ("server name", server_name)] {
        if value.contains('\0') {
            tracing::error!("Lock manager, generate server id: {} contains a NUL byte", field);
            return Err(LockError::identity_composition(format!("{field} contains a NUL byte")));
        }
    }

    let mut id = String::with_capacity(rasmgr_host.len() + server_name.len() + 16);
    write!(id, "{rasmgr_host}-{rasmgr_port}-{server_name}-{listen_port}").map_err(|e| {
        tracing::error!("Lock manager, generate server id: concatenation of id components failed: {}", e);
        LockError::identity_composition(format!("concatenation of id components failed: {e}"))
    })?;

    if id.len() > max_len {
        let full_len = id.len();
        truncate_at_char_boundary(&mut id, max_len);
        tracing::warn!(
            "Lock manager, generate server id: id of {} bytes exceeds {} bytes and was truncated to '{}'",
            full_len,
            max_len,
            id
        );
    } else {
        tracing::debug!("Lock manager, generate server id: id = {}", id);
    }

    Ok(ServerIdentity::new(id))
}

fn truncate_at_char_boundary(s: &mut String, max_len: usize) {
    let mut cut = max_len.min(s.len());
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}
