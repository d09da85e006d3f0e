/**
 * LatentReco
 * Copyright (C) 2018 Sebastian Schelter
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

use fnv::FnvHashMap;

/// Maps external entity identifiers to consecutive internal indices.
pub trait IdMapping {

    /// Returns the internal index for `external_id`, allocating the next free index the first
    /// time an identifier is seen.
    fn to_internal_id(&mut self, external_id: u64) -> u32;
}

/// First-seen allocation of internal indices, with a reverse lookup for writing results.
#[derive(Debug, Default, Clone)]
pub struct EntityMapping {
    internal_ids: FnvHashMap<u64, u32>,
    external_ids: Vec<u64>,
}

impl EntityMapping {

    pub fn new() -> Self {
        EntityMapping {
            internal_ids: FnvHashMap::with_capacity_and_hasher(100, Default::default()),
            external_ids: Vec::with_capacity(100),
        }
    }

    pub fn num_entities(&self) -> usize {
        self.external_ids.len()
    }

    /// Lookup without allocation.
    pub fn internal_id(&self, external_id: u64) -> Option<u32> {
        self.internal_ids.get(&external_id).cloned()
    }

    pub fn to_external_id(&self, internal_id: u32) -> Option<u64> {
        self.external_ids.get(internal_id as usize).cloned()
    }
}

impl IdMapping for EntityMapping {

    fn to_internal_id(&mut self, external_id: u64) -> u32 {
        let next_index = self.external_ids.len() as u32;
        let external_ids = &mut self.external_ids;

        *self.internal_ids.entry(external_id).or_insert_with(|| {
            external_ids.push(external_id);
            next_index
        })
    }
}
