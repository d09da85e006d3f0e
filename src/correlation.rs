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

use std::time::Instant;

use fnv::FnvHashSet;
use log::{debug, info};
use scoped_pool::Pool;

use crate::relation::SparseBinaryRelation;
use crate::scored::{self, ScoredItem};
use crate::types::DenseMatrix;
use crate::utils;

/// A symmetric similarity measure between two sparse binary vectors, given as sets of their
/// nonzero indices. Both sets are guaranteed to be nonempty.
pub trait BinarySimilarity: Sync {
    fn similarity(&self, a: &FnvHashSet<u32>, b: &FnvHashSet<u32>) -> f64;
}

/// Cosine similarity of binary vectors, `|A ∩ B| / sqrt(|A| * |B|)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cosine;

impl BinarySimilarity for Cosine {

    fn similarity(&self, a: &FnvHashSet<u32>, b: &FnvHashSet<u32>) -> f64 {
        let overlap = intersection_size(a, b) as f64;
        overlap / ((a.len() * b.len()) as f64).sqrt()
    }
}

/// Pearson correlation of binary vectors of length `num_attributes` (the phi coefficient).
#[derive(Debug, Clone, Copy)]
pub struct Pearson {
    num_attributes: usize,
}

impl Pearson {
    pub fn new(num_attributes: usize) -> Self {
        Pearson { num_attributes }
    }
}

impl BinarySimilarity for Pearson {

    fn similarity(&self, a: &FnvHashSet<u32>, b: &FnvHashSet<u32>) -> f64 {
        let n = self.num_attributes as f64;
        let size_a = a.len() as f64;
        let size_b = b.len() as f64;
        let overlap = intersection_size(a, b) as f64;

        let denominator = ((n * size_a - size_a * size_a) * (n * size_b - size_b * size_b)).sqrt();

        // constant vectors have no variance
        if denominator == 0.0 || !denominator.is_finite() {
            0.0
        } else {
            (n * overlap - size_a * size_b) / denominator
        }
    }
}

/// We only look up the elements of the smaller set in the larger one.
#[inline(always)]
fn intersection_size(a: &FnvHashSet<u32>, b: &FnvHashSet<u32>) -> usize {
    let (smaller, larger) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    smaller.iter().filter(|index| larger.contains(index)).count()
}

/// Dense symmetric matrix of pairwise similarities between entities.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    similarities: DenseMatrix,
    has_attributes: Vec<bool>,
}

impl CorrelationMatrix {

    pub fn num_entities(&self) -> usize {
        self.similarities.num_rows()
    }

    pub fn get(&self, entity_a: u32, entity_b: u32) -> f64 {
        self.similarities.get(entity_a as usize, entity_b as usize)
    }

    pub fn row(&self, entity: u32) -> &[f64] {
        self.similarities.row(entity as usize)
    }

    /// Whether any similarities were computed for `entity`.
    pub fn has_attributes(&self, entity: u32) -> bool {
        self.has_attributes[entity as usize]
    }

    /// The `k` entities most similar to `entity`, excluding itself, most similar first. Entities
    /// without attributes have no computed similarities, they neither get nor are neighbors.
    pub fn nearest_neighbors(&self, entity: u32, k: usize) -> Vec<ScoredItem> {
        if !self.has_attributes(entity) {
            return Vec::new();
        }

        let candidates = self.row(entity)
            .iter()
            .enumerate()
            .filter(|&(other, _)| other as u32 != entity && self.has_attributes[other])
            .map(|(other, score)| ScoredItem { item: other as u32, score: *score });

        scored::top_k(candidates, k)
    }
}

/// Computes all pairwise similarities between the given attribute sets. Pairs where either set
/// is empty are not computed and keep a similarity of zero, the diagonal is always one.
///
/// Rows are computed in parallel on `pool_size` threads, each worker owns the cells `(i, j)` with
/// `j > i` of its row; the lower triangle is mirrored afterwards.
pub fn compute_correlations<S>(
    entity_attributes: &[FnvHashSet<u32>],
    similarity: &S,
    pool_size: usize,
) -> CorrelationMatrix
    where S: BinarySimilarity {

    let num_entities = entity_attributes.len();
    let start = Instant::now();

    let mut similarities = DenseMatrix::new(num_entities, num_entities);

    let pool = Pool::new(pool_size.max(1));

    pool.scoped(|scope| {
        for (entity, row) in similarities.rows_mut().enumerate() {
            scope.execute(move || {
                compute_row(entity, row, entity_attributes, similarity)
            });
        }
    });

    pool.shutdown();

    for entity in 0..num_entities {
        for other in (entity + 1)..num_entities {
            let value = similarities.get(entity, other);
            similarities.set(other, entity, value);
        }
    }

    info!("Computed similarities between {} entities in {}ms",
        num_entities, utils::to_millis(start.elapsed()));

    let has_attributes = entity_attributes.iter()
        .map(|attributes| !attributes.is_empty())
        .collect();

    CorrelationMatrix { similarities, has_attributes }
}

/// Similarities between the rows of a relation whose columns live in a separate index space,
/// e.g. items and their attributes.
pub fn compute_row_correlations<S>(
    relation: &SparseBinaryRelation,
    similarity: &S,
    pool_size: usize,
) -> CorrelationMatrix
    where S: BinarySimilarity {

    compute_correlations(relation.rows(), similarity, pool_size)
}

/// Convenience wrapper using the rows of a relation as attribute sets, where rows and columns
/// share one index space.
pub fn compute_correlations_for_relation<S>(
    relation: &SparseBinaryRelation,
    similarity: &S,
    pool_size: usize,
) -> CorrelationMatrix
    where S: BinarySimilarity {

    compute_correlations(&relation.row_sets(), similarity, pool_size)
}

fn compute_row<S>(
    entity: usize,
    row: &mut [f64],
    entity_attributes: &[FnvHashSet<u32>],
    similarity: &S,
) where S: BinarySimilarity {

    row[entity] = 1.0;

    let attributes = &entity_attributes[entity];
    if attributes.is_empty() {
        return;
    }

    for other in (entity + 1)..entity_attributes.len() {
        let other_attributes = &entity_attributes[other];

        if !other_attributes.is_empty() {
            row[other] = similarity.similarity(attributes, other_attributes);
        }
    }

    if entity % 1_000 == 0 {
        debug!("Finished similarity row {}", entity);
    }
}
