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

use fnv::FnvHashSet;

use crate::types::{self, SparseBinaryMatrix};

/// A sparse boolean relation over internal entity indices. Entries are directional: storing
/// `(a, b)` says nothing about `(b, a)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseBinaryRelation {
    rows: SparseBinaryMatrix,
    num_columns: usize,
    num_entries: usize,
    empty: FnvHashSet<u32>,
}

impl SparseBinaryRelation {

    pub fn new() -> Self {
        SparseBinaryRelation::with_rows(0)
    }

    pub fn with_rows(num_rows: usize) -> Self {
        SparseBinaryRelation {
            rows: types::new_sparse_binary_matrix(num_rows),
            num_columns: 0,
            num_entries: 0,
            empty: FnvHashSet::default(),
        }
    }

    /// Sets the entry `(row, column)` to true, growing the relation if needed. Returns whether
    /// the entry was newly set.
    pub fn insert(&mut self, row: u32, column: u32) -> bool {
        let row_idx = row as usize;

        if row_idx >= self.rows.len() {
            self.rows.resize(row_idx + 1, FnvHashSet::default());
        }
        self.num_columns = self.num_columns.max(column as usize + 1);

        let newly_set = self.rows[row_idx].insert(column);
        if newly_set {
            self.num_entries += 1;
        }

        newly_set
    }

    pub fn contains(&self, row: u32, column: u32) -> bool {
        self.rows.get(row as usize)
            .map(|columns| columns.contains(&column))
            .unwrap_or(false)
    }

    /// The set of columns associated with `row`, empty for rows never inserted.
    pub fn attributes(&self, row: u32) -> &FnvHashSet<u32> {
        self.rows.get(row as usize).unwrap_or(&self.empty)
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.num_columns
    }

    /// Size of the square index space, determined by the largest index seen on either side.
    pub fn num_entities(&self) -> usize {
        self.rows.len().max(self.num_columns)
    }

    pub fn num_entries(&self) -> usize {
        self.num_entries
    }

    /// The column sets of the stored rows only, without padding.
    pub fn rows(&self) -> &[FnvHashSet<u32>] {
        &self.rows
    }

    /// Per-row column sets, padded with empty sets up to `num_entities`.
    pub fn row_sets(&self) -> SparseBinaryMatrix {
        let mut sets = self.rows.clone();
        sets.resize(self.num_entities(), FnvHashSet::default());
        sets
    }

    pub fn transpose(&self) -> SparseBinaryRelation {
        let mut transposed = SparseBinaryRelation::with_rows(self.num_columns);
        transposed.num_columns = self.rows.len();

        for (row, columns) in self.rows.iter().enumerate() {
            for column in columns.iter() {
                transposed.insert(*column, row as u32);
            }
        }

        transposed
    }

    /// Inserts the reverse of every stored entry. Only done on request, reading keeps
    /// relations directional.
    pub fn symmetrize(&mut self) {
        let entries: Vec<(u32, u32)> = self.rows.iter()
            .enumerate()
            .flat_map(|(row, columns)| columns.iter().map(move |column| (row as u32, *column)))
            .collect();

        for (row, column) in entries {
            self.insert(column, row);
        }
    }
}

#[cfg(test)]
mod tests {

    use crate::relation::SparseBinaryRelation;

    #[test]
    fn directional_storage() {
        let mut relation = SparseBinaryRelation::new();

        assert!(relation.insert(0, 3));
        assert!(!relation.insert(0, 3));
        relation.insert(2, 1);

        assert!(relation.contains(0, 3));
        assert!(!relation.contains(3, 0));
        assert!(!relation.contains(7, 7));

        assert_eq!(relation.num_rows(), 3);
        assert_eq!(relation.num_columns(), 4);
        assert_eq!(relation.num_entities(), 4);
        assert_eq!(relation.num_entries(), 2);

        assert!(relation.attributes(1).is_empty());
        assert!(relation.attributes(12).is_empty());
        assert_eq!(relation.row_sets().len(), 4);
    }

    #[test]
    fn transpose_and_symmetrize() {
        let mut relation = SparseBinaryRelation::new();
        relation.insert(0, 1);
        relation.insert(0, 2);

        let transposed = relation.transpose();
        assert!(transposed.contains(1, 0));
        assert!(transposed.contains(2, 0));
        assert_eq!(transposed.num_entries(), 2);
        assert_eq!(transposed.num_columns(), 1);

        relation.symmetrize();
        assert!(relation.contains(1, 0));
        assert!(relation.contains(0, 1));
        assert_eq!(relation.num_entries(), 4);
    }
}
