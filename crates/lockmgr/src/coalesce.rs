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

//! Interval coalescing of tile ids.
//!
//! Ids are deduplicated, sorted and split into maximal runs of consecutive
//! values. A run of at least `bulk_threshold` ids becomes one range lock call,
//! shorter runs become one call per id.

use crate::types::{LockInterval, TileId};

/// How one part of a lock request is sent to the lock store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockDecision {
    /// One range lock call covering the interval
    Bulk(LockInterval),
    /// One single tile lock call
    Single(TileId),
}

impl LockDecision {
    /// Interval of tile ids covered by the decision
    pub fn interval(&self) -> LockInterval {
        match self {
            LockDecision::Bulk(interval) => *interval,
            LockDecision::Single(id) => LockInterval::single(*id),
        }
    }
}

/// Deduplicate and sort `ids`, then split them into maximal consecutive runs
pub fn consecutive_runs(ids: impl IntoIterator<Item = TileId>) -> Vec<LockInterval> {
    let mut ids: Vec<TileId> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();

    let mut runs = Vec::new();
    let mut iter = ids.into_iter();
    let Some(first) = iter.next() else {
        return runs;
    };

    let (mut begin, mut end) = (first, first);
    for id in iter {
        if end.is_followed_by(id) {
            end = id;
        } else {
            runs.push(run(begin, end));
            begin = id;
            end = id;
        }
    }
    runs.push(run(begin, end));
    runs
}

fn run(begin: TileId, end: TileId) -> LockInterval {
    LockInterval::new(begin, end).unwrap_or(LockInterval::single(begin))
}

/// Turn `ids` into lock decisions in ascending id order
pub fn coalesce(ids: impl IntoIterator<Item = TileId>, bulk_threshold: usize) -> Vec<LockDecision> {
    let mut decisions = Vec::new();
    for run in consecutive_runs(ids) {
        if !run.is_single() && run.len() >= bulk_threshold as u64 {
            tracing::debug!("Lock manager, coalesce: interval locking for {}", run);
            decisions.push(LockDecision::Bulk(run));
        } else {
            tracing::debug!("Lock manager, coalesce: locking {} one by one", run);
            decisions.extend(run.ids().map(LockDecision::Single));
        }
    }
    decisions
}
