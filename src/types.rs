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
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde_derive::{Deserialize, Serialize};

use crate::error::{RecoError, Result};

pub type SparseBinaryMatrix = Vec<FnvHashSet<u32>>;

pub fn new_sparse_binary_matrix(num_rows: usize) -> SparseBinaryMatrix {
    vec![FnvHashSet::with_capacity_and_hasher(0, Default::default()); num_rows]
}

/// Row-major dense matrix of floats, used for factor matrices, mapping weights and similarities.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DenseMatrix {
    num_rows: usize,
    num_columns: usize,
    values: Vec<f64>,
}

impl DenseMatrix {

    pub fn new(num_rows: usize, num_columns: usize) -> Self {
        DenseMatrix { num_rows, num_columns, values: vec![0.0; num_rows * num_columns] }
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.num_columns
    }

    #[inline(always)]
    pub fn get(&self, row: usize, column: usize) -> f64 {
        self.values[row * self.num_columns + column]
    }

    #[inline(always)]
    pub fn set(&mut self, row: usize, column: usize, value: f64) {
        self.values[row * self.num_columns + column] = value;
    }

    pub fn row(&self, row: usize) -> &[f64] {
        let start = row * self.num_columns;
        &self.values[start..start + self.num_columns]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [f64] {
        let start = row * self.num_columns;
        &mut self.values[start..start + self.num_columns]
    }

    /// Disjoint mutable views on all rows, which allows handing rows to different workers.
    pub fn rows_mut(&mut self) -> impl Iterator<Item=&mut [f64]> {
        // chunks_mut panics on a zero chunk size
        let chunk_size = self.num_columns.max(1);
        self.values.chunks_mut(chunk_size)
    }

    pub fn column(&self, column: usize) -> Vec<f64> {
        (0..self.num_rows).map(|row| self.get(row, column)).collect()
    }

    pub fn set_column(&mut self, column: usize, values: &[f64]) {
        assert_eq!(values.len(), self.num_rows);
        for (row, value) in values.iter().enumerate() {
            self.set(row, column, *value);
        }
    }

    /// Euclidean norm of a single column.
    pub fn column_norm(&self, column: usize) -> f64 {
        (0..self.num_rows)
            .map(|row| {
                let value = self.get(row, column);
                value * value
            })
            .sum::<f64>()
            .sqrt()
    }

    /// Overwrites all entries with draws from Normal(mean, stdev).
    pub fn init_normal<R: Rng>(&mut self, mean: f64, stdev: f64, rng: &mut R) -> Result<()> {
        // rand_distr accepts a negative deviation and mirrors the samples
        if !(stdev >= 0.0) {
            return Err(RecoError::InvalidConfig(
                format!("standard deviation must be non-negative, got {}", stdev)));
        }

        let normal = Normal::new(mean, stdev)
            .map_err(|error| RecoError::InvalidConfig(format!("{:?}", error)))?;

        for value in self.values.iter_mut() {
            *value = normal.sample(rng);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {

    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;
    use crate::types::DenseMatrix;

    #[test]
    fn rows_and_columns() {
        let mut matrix = DenseMatrix::new(3, 2);
        matrix.set(0, 1, 3.0);
        matrix.set(2, 0, 4.0);

        assert_eq!(matrix.row(0), &[0.0, 3.0]);
        assert_eq!(matrix.column(0), vec![0.0, 0.0, 4.0]);
        assert_eq!(matrix.column_norm(1), 3.0);

        matrix.set_column(1, &[1.0, 2.0, 3.0]);
        assert_eq!(matrix.get(2, 1), 3.0);
        assert_eq!(matrix.rows_mut().count(), 3);
    }

    #[test]
    fn normal_initialization() {
        let mut rng = XorShiftRng::seed_from_u64(42);
        let mut matrix = DenseMatrix::new(50, 4);
        matrix.init_normal(0.0, 0.1, &mut rng).unwrap();

        let num_nonzero = (0..50)
            .flat_map(|row| matrix.row(row).to_vec())
            .filter(|value| *value != 0.0)
            .count();
        assert_eq!(num_nonzero, 200);

        assert!(matrix.init_normal(0.0, -1.0, &mut rng).is_err());
    }

    #[test]
    fn rejects_invalid_deviation() {
        let mut rng = XorShiftRng::seed_from_u64(7);
        let mut matrix = DenseMatrix::new(3, 2);

        assert!(matrix.init_normal(0.0, -0.01, &mut rng).is_err());
        assert!(matrix.init_normal(0.0, std::f64::NAN, &mut rng).is_err());
        assert!(matrix.values.iter().all(|value| *value == 0.0));

        matrix.init_normal(1.0, 0.0, &mut rng).unwrap();
        assert!(matrix.values.iter().all(|value| *value == 1.0));
    }
}
