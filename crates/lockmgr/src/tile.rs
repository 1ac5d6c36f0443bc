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

use std::sync::Arc;

use crate::types::TileId;

/// A stored tile; the lock manager only reads its id
pub trait TileHandle {
    fn tile_id(&self) -> TileId;
}

impl TileHandle for TileId {
    fn tile_id(&self) -> TileId {
        *self
    }
}

impl<T: TileHandle + ?Sized> TileHandle for &T {
    fn tile_id(&self) -> TileId {
        (**self).tile_id()
    }
}

impl<T: TileHandle + ?Sized> TileHandle for Arc<T> {
    fn tile_id(&self) -> TileId {
        (**self).tile_id()
    }
}

impl<T: TileHandle + ?Sized> TileHandle for Box<T> {
    fn tile_id(&self) -> TileId {
        (**self).tile_id()
    }
}

/// Ids of the tiles that exist in the database, skipping unpersisted ones
pub(crate) fn persistent_ids<T: TileHandle>(tiles: &[T]) -> Vec<TileId> {
    tiles.iter().map(TileHandle::tile_id).filter(|id| id.is_persistent()).collect()
}
