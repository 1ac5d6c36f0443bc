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

mod common;

use common::{FaultyStore, LogBuffer, init_tracing, manager, server_config, tiles};
use rasdaman_lockmgr::{
    CleanupStatus, LockError, LockInterval, LockKind, LockManager, LockStats, LockStore, MemoryLockTable, ServerIdentity,
    StoreError, TileId, TransactionState,
};
use std::sync::Arc;

#[test]
fn test_short_runs_are_locked_one_by_one() {
    init_tracing();
    let table = MemoryLockTable::new();
    let mgr = manager(&table, "N1");
    let owner = mgr.server_identity().unwrap();

    mgr.lock_tiles(&owner, tiles([5, 6, 7, 1, 2, 3]), LockKind::Exclusive).unwrap();

    let stats = table.stats();
    assert_eq!(stats.transactions_begun, 1);
    assert_eq!(stats.transactions_ended, 1);
    assert_eq!(stats.single_lock_calls, 6);
    assert_eq!(stats.range_lock_calls, 0);
    for id in [1, 2, 3, 5, 6, 7] {
        assert!(table.is_held(Some(&owner), TileId::new(id), LockKind::Exclusive));
    }
    assert!(!table.is_held(None, TileId::new(4), LockKind::Exclusive));
}

#[test]
fn test_long_run_is_locked_with_one_range_call() {
    init_tracing();
    let table = MemoryLockTable::new();
    let mgr = manager(&table, "N1");
    let owner = mgr.server_identity().unwrap();

    mgr.lock_tiles(&owner, tiles(1..=15), LockKind::Shared).unwrap();

    let stats = table.stats();
    assert_eq!(stats.range_lock_calls, 1);
    assert_eq!(stats.single_lock_calls, 0);
    assert_eq!(stats.held_locks, 1);
    let rows = table.rows_of(&owner);
    assert_eq!(rows[0].interval, LockInterval::new(TileId::new(1), TileId::new(15)).unwrap());
    assert_eq!(rows[0].kind, LockKind::Shared);
}

#[test]
fn test_empty_request_opens_no_transaction() {
    init_tracing();
    let table = MemoryLockTable::new();
    let mgr = manager(&table, "N1");
    let owner = mgr.server_identity().unwrap();

    mgr.lock_tiles(&owner, Vec::new(), LockKind::Exclusive).unwrap();

    assert_eq!(table.stats(), LockStats::default());
}

#[test]
fn test_single_id_batch_is_verified() {
    init_tracing();
    let table = MemoryLockTable::new();
    let mgr = manager(&table, "N1");
    let owner = mgr.server_identity().unwrap();

    mgr.lock_tiles(&owner, tiles([9, 9, 9]), LockKind::Exclusive).unwrap();

    let stats = table.stats();
    assert_eq!(stats.transactions_begun, 1);
    assert_eq!(stats.single_lock_calls, 1);
    assert_eq!(stats.query_calls, 1);
}

#[test]
fn test_failure_mid_batch_keeps_earlier_locks() {
    init_tracing();
    let table = MemoryLockTable::new();
    let mut store = FaultyStore::new(&table);
    store.deny_tile = Some(TileId::new(3));
    let mgr = LockManager::connect(store, Arc::new(server_config("N1")), Arc::new(TransactionState::default())).unwrap();
    let owner = mgr.server_identity().unwrap();

    let err = mgr.lock_tiles(&owner, tiles(1..=5), LockKind::Exclusive).unwrap_err();

    match &err {
        LockError::LockAcquisitionFailed { interval, kind, owner: failed_owner } => {
            assert_eq!(*interval, LockInterval::single(TileId::new(3)));
            assert_eq!(*kind, LockKind::Exclusive);
            assert_eq!(failed_owner, &owner);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_recoverable());

    // earlier locks of the batch stay held, later ids were never issued
    assert!(table.is_held(Some(&owner), TileId::new(1), LockKind::Exclusive));
    assert!(table.is_held(Some(&owner), TileId::new(2), LockKind::Exclusive));
    assert!(!table.is_held(None, TileId::new(4), LockKind::Exclusive));
    assert!(!table.is_held(None, TileId::new(5), LockKind::Exclusive));

    let stats = table.stats();
    assert_eq!(stats.transactions_begun, 1);
    assert_eq!(stats.transactions_ended, 1);

    // the caller releases what the batch acquired
    mgr.unlock_all_tiles(&owner).unwrap();
    assert!(table.rows_of(&owner).is_empty());
}

#[test]
fn test_unlock_all_without_locks_is_noop() {
    init_tracing();
    let table = MemoryLockTable::new();
    let mgr = manager(&table, "N1");
    let owner = mgr.server_identity().unwrap();

    mgr.unlock_all_tiles(&owner).unwrap();
    mgr.unlock_tile(&owner, TileId::new(77)).unwrap();

    let stats = table.stats();
    assert_eq!(stats.transactions_begun, 2);
    assert_eq!(stats.transactions_ended, 2);
    assert_eq!(stats.held_locks, 0);
}

#[test]
fn test_clear_lock_table_failure_is_logged_not_propagated() {
    let table = MemoryLockTable::new();
    let mut store = FaultyStore::new(&table);
    store.fail_clear = true;
    let mgr = LockManager::connect(store, Arc::new(server_config("N1")), Arc::new(TransactionState::default())).unwrap();
    let owner = mgr.server_identity().unwrap();

    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();

    let status = tracing::subscriber::with_default(subscriber, || mgr.clear_lock_table(&owner));

    match status {
        CleanupStatus::Failed(LockError::BestEffortCleanupFailed { owner: failed_owner, reason }) => {
            assert_eq!(failed_owner, owner.as_str());
            assert!(reason.contains("clear_all"));
        }
        other => panic!("unexpected cleanup status: {other:?}"),
    }
    assert!(logs.contents().contains("clear lock table failed"));

    // the transaction was closed and the manager keeps working
    let stats = table.stats();
    assert_eq!(stats.transactions_begun, stats.transactions_ended);
    mgr.lock_tile(&owner, TileId::new(1), LockKind::Shared).unwrap();
}

#[test]
fn test_range_conflict_surfaces_as_acquisition_failure() {
    init_tracing();
    let table = MemoryLockTable::new();
    let writer = manager(&table, "N1");
    let other = manager(&table, "N2");
    let (w, o) = (writer.server_identity().unwrap(), other.server_identity().unwrap());

    writer.lock_tile(&w, TileId::new(14), LockKind::Exclusive).unwrap();
    let err = other.lock_tiles(&o, tiles(1..=20), LockKind::Shared).unwrap_err();

    assert!(matches!(
        err,
        LockError::LockAcquisitionFailed { interval, .. } if interval == LockInterval::new(TileId::new(1), TileId::new(20)).unwrap()
    ));
    assert!(table.rows_of(&o).is_empty());
}

#[test]
fn test_store_calls_outside_transaction_rejected() {
    init_tracing();
    let table = MemoryLockTable::new();
    let owner = ServerIdentity::new("N1");

    let mut store = table.connection();
    assert!(store.connect("RASBASE:5432", "probe", None, None));
    let err = store.lock_range_shared("probe", &owner, TileId::new(1), TileId::new(2)).unwrap_err();
    assert!(matches!(err, StoreError::NoActiveTransaction { .. }));
    assert!(table.rows().is_empty());
}

#[test]
fn test_is_tile_locked_checks_any_server() {
    init_tracing();
    let table = MemoryLockTable::new();
    let a = manager(&table, "N1");
    let b = manager(&table, "N2");
    let owner_a = a.server_identity().unwrap();

    a.lock_tile(&owner_a, TileId::new(3), LockKind::Shared).unwrap();

    assert!(b.is_tile_locked(TileId::new(3), LockKind::Shared).unwrap());
    assert!(!b.is_tile_locked(TileId::new(3), LockKind::Exclusive).unwrap());
    assert!(!b.is_tile_locked(TileId::new(4), LockKind::Shared).unwrap());
}
