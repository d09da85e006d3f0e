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

extern crate csv;
extern crate fnv;
extern crate log;
extern crate rand;
extern crate rand_distr;
extern crate rand_xorshift;
extern crate scoped_pool;
extern crate serde;
extern crate serde_derive;
extern crate serde_json;
extern crate thiserror;

pub mod attribute_mapping;
pub mod correlation;
pub mod error;
pub mod evaluation;
pub mod io;
pub mod mapping;
pub mod model;
pub mod relation;
pub mod scored;
pub mod training;
pub mod types;
pub mod utils;

mod usage_tests;

pub use attribute_mapping::{AttributeToFeatureMapping, AttributeToFeatureMappingTrainer,
    MappedFeatureRecommender, MappingConfig, UNKNOWN_SCORE};
pub use correlation::{BinarySimilarity, CorrelationMatrix, Cosine, Pearson};
pub use error::{RecoError, Result};
pub use mapping::{EntityMapping, IdMapping};
pub use model::{LatentFactorModel, MatrixFactorization, Ratings, SgdConfig};
pub use relation::SparseBinaryRelation;
pub use training::{IterativeModel, JsonCheckpointStore, TrainingConfig, TrainingController,
    TrainingState};

/// Computes the similarities between all entities of a relation, where the attributes of an
/// entity are the entities it relates to.
pub fn similarities<S: BinarySimilarity>(
    relation: &SparseBinaryRelation,
    similarity: &S,
    pool_size: usize,
) -> CorrelationMatrix {
    correlation::compute_correlations_for_relation(relation, similarity, pool_size)
}

/// Computes the similarities between the rows of a bipartite relation, where the attributes of
/// a row entity are its columns, e.g. items described by their attributes.
pub fn row_similarities<S: BinarySimilarity>(
    relation: &SparseBinaryRelation,
    similarity: &S,
    pool_size: usize,
) -> CorrelationMatrix {
    correlation::compute_row_correlations(relation, similarity, pool_size)
}
