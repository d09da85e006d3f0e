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

use std::cell::RefCell;
use std::sync::Mutex;
use std::time::Instant;

use fnv::{FnvHashMap, FnvHashSet};
use log::{debug, info};
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;
use scoped_pool::Pool;

use crate::error::{RecoError, Result};
use crate::model::LatentFactorModel;
use crate::relation::SparseBinaryRelation;
use crate::types::DenseMatrix;
use crate::utils;

/// Score for user-item pairs which are outside of the trained factor matrices.
pub const UNKNOWN_SCORE: f64 = std::f64::MIN;

#[derive(Debug, Clone)]
pub struct MappingConfig {
    /// Number of independently initialized training runs to select from.
    pub num_init_mapping: usize,
    pub num_iter_mapping: usize,
    pub learn_rate: f64,
    pub regularization: f64,
    pub init_mean: f64,
    pub init_stdev: f64,
    /// Number of threads to run restarts on.
    pub pool_size: usize,
}

impl Default for MappingConfig {
    fn default() -> Self {
        MappingConfig {
            num_init_mapping: 5,
            num_iter_mapping: 10,
            learn_rate: 0.01,
            regularization: 0.1,
            init_mean: 0.0,
            init_stdev: 0.1,
            pool_size: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingMode {
    /// Weights change with every update, mapped features are always recomputed.
    Training,
    /// Weights are fixed, mapped features are memoized per item.
    Frozen,
}

/// Memoized mapped features, all of which were computed from weights of `generation`.
#[derive(Debug, Default)]
struct FeatureCache {
    generation: u64,
    features: FnvHashMap<u32, Vec<f64>>,
}

/// Linear mapping from binary attributes to latent features. The weight matrix has one row per
/// attribute plus a trailing bias row, and one column per latent feature.
#[derive(Debug)]
pub struct AttributeToFeatureMapping {
    weights: DenseMatrix,
    generation: u64,
    mode: MappingMode,
    cache: RefCell<FeatureCache>,
}

impl AttributeToFeatureMapping {

    pub fn new(num_attributes: usize, num_features: usize) -> Self {
        AttributeToFeatureMapping::with_weights(DenseMatrix::new(num_attributes + 1, num_features))
    }

    /// Wraps an existing weight matrix, which needs at least the bias row.
    pub fn from_weights(weights: DenseMatrix) -> Result<Self> {
        if weights.num_rows() == 0 {
            return Err(RecoError::InvalidConfig(
                "the weight matrix needs a bias row".to_string()));
        }

        Ok(AttributeToFeatureMapping::with_weights(weights))
    }

    fn with_weights(weights: DenseMatrix) -> Self {
        AttributeToFeatureMapping {
            weights,
            generation: 0,
            mode: MappingMode::Training,
            cache: RefCell::new(FeatureCache::default()),
        }
    }

    pub fn num_attributes(&self) -> usize {
        self.weights.num_rows() - 1
    }

    pub fn num_features(&self) -> usize {
        self.weights.num_columns()
    }

    pub fn weights(&self) -> &DenseMatrix {
        &self.weights
    }

    pub fn mode(&self) -> MappingMode {
        self.mode
    }

    pub fn freeze(&mut self) {
        self.mode = MappingMode::Frozen;
    }

    pub fn thaw(&mut self) {
        self.mode = MappingMode::Training;
    }

    /// Replaces the weights, invalidating all memoized features. The new weights must have the
    /// shape of the current ones.
    pub fn set_weights(&mut self, weights: DenseMatrix) -> Result<()> {
        if weights.num_rows() != self.weights.num_rows()
            || weights.num_columns() != self.weights.num_columns() {

            return Err(RecoError::InvalidConfig(format!(
                "expected a {}x{} weight matrix, got {}x{}",
                self.weights.num_rows(), self.weights.num_columns(),
                weights.num_rows(), weights.num_columns())));
        }

        self.weights = weights;
        self.generation += 1;
        Ok(())
    }

    pub fn init_normal<R: Rng>(&mut self, mean: f64, stdev: f64, rng: &mut R) -> Result<()> {
        self.generation += 1;
        self.weights.init_normal(mean, stdev, rng)
    }

    /// Maps the attributes of `item` to the latent feature space, `bias + Σ weights[attribute]`.
    pub fn map(&self, item: u32, attributes: &FnvHashSet<u32>) -> Vec<f64> {
        match self.mode {
            MappingMode::Training => self.compute(attributes),
            MappingMode::Frozen => {
                let mut cache = self.cache.borrow_mut();

                if cache.generation != self.generation {
                    cache.features.clear();
                    cache.generation = self.generation;
                }

                cache.features.entry(item)
                    .or_insert_with(|| self.compute(attributes))
                    .clone()
            }
        }
    }

    fn num_cached(&self) -> usize {
        self.cache.borrow().features.len()
    }

    fn compute(&self, attributes: &FnvHashSet<u32>) -> Vec<f64> {
        let num_attributes = self.num_attributes();
        let mut features = self.weights.row(num_attributes).to_vec();

        for attribute in attributes.iter() {
            let attribute = *attribute as usize;
            if attribute < num_attributes {
                for (feature, weight) in features.iter_mut().zip(self.weights.row(attribute)) {
                    *feature += weight;
                }
            }
        }

        features
    }

    /// One gradient step towards `true_features`. Only features which the mapping currently
    /// overestimates are updated; the rows of the given attributes and the bias row change.
    fn apply_update(
        &mut self,
        attributes: &FnvHashSet<u32>,
        true_features: &[f64],
        learn_rate: f64,
        regularization: f64,
    ) {
        let mapped_features = self.compute(attributes);
        let bias_row = self.num_attributes();

        for (feature, (mapped, actual)) in mapped_features.iter().zip(true_features).enumerate() {
            let diff = mapped - actual;

            if diff <= 0.0 {
                continue;
            }

            for attribute in attributes.iter() {
                let attribute = *attribute as usize;
                if attribute < bias_row {
                    let weight = self.weights.get(attribute, feature);
                    self.weights.set(attribute, feature,
                        weight - learn_rate * (diff * weight + regularization * weight));
                }
            }

            let bias = self.weights.get(bias_row, feature);
            self.weights.set(bias_row, feature,
                bias - learn_rate * (diff * bias + regularization * bias));
        }

        self.generation += 1;
    }
}

/// Goodness of fit of a mapping over all eligible items.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingFit {
    /// Mean squared error plus regularization penalty, per latent feature.
    pub per_feature: Vec<f64>,
    /// Squared error averaged over features and items.
    pub mean_error: f64,
    /// Penalty averaged over features and items.
    pub mean_penalty: f64,
}

/// Weights and fit of a single restart.
#[derive(Debug, Clone)]
pub struct RestartOutcome {
    pub weights: DenseMatrix,
    pub fit: MappingFit,
}

/// Final weights assembled column by column, together with the restart each column came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSelection {
    pub weights: DenseMatrix,
    pub chosen_restarts: Vec<usize>,
}

/// For each latent feature, takes the full weight column of the restart with the lowest fit for
/// that feature. Ties keep the earlier restart.
pub fn select_best_columns(outcomes: &[RestartOutcome]) -> Option<ModelSelection> {

    let first = outcomes.first()?;

    let mut weights = first.weights.clone();
    let mut best_fit = first.fit.per_feature.clone();
    let mut chosen_restarts = vec![0; best_fit.len()];

    for (restart, outcome) in outcomes.iter().enumerate().skip(1) {
        for feature in 0..best_fit.len() {
            if outcome.fit.per_feature[feature] < best_fit[feature] {
                weights.set_column(feature, &outcome.weights.column(feature));
                best_fit[feature] = outcome.fit.per_feature[feature];
                chosen_restarts[feature] = restart;
            }
        }
    }

    Some(ModelSelection { weights, chosen_restarts })
}

/// Learns an `AttributeToFeatureMapping` which approximates the trained factors of items from
/// their attributes. Only items with at least one interaction and at least one attribute take
/// part in training.
pub struct AttributeToFeatureMappingTrainer<'a> {
    config: MappingConfig,
    item_factors: &'a DenseMatrix,
    item_attributes: &'a SparseBinaryRelation,
    item_interactions: &'a [u32],
    num_attributes: usize,
}

impl<'a> AttributeToFeatureMappingTrainer<'a> {

    pub fn new(
        config: MappingConfig,
        item_factors: &'a DenseMatrix,
        item_attributes: &'a SparseBinaryRelation,
        item_interactions: &'a [u32],
        num_attributes: usize,
    ) -> Self {
        AttributeToFeatureMappingTrainer {
            config,
            item_factors,
            item_attributes,
            item_interactions,
            num_attributes,
        }
    }

    fn num_items(&self) -> usize {
        self.item_factors.num_rows()
    }

    fn num_features(&self) -> usize {
        self.item_factors.num_columns()
    }

    pub fn is_eligible(&self, item: u32) -> bool {
        let has_interactions = self.item_interactions.get(item as usize)
            .map(|count| *count > 0)
            .unwrap_or(false);

        has_interactions && !self.item_attributes.attributes(item).is_empty()
    }

    pub fn eligible_items(&self) -> Vec<u32> {
        (0..self.num_items() as u32).filter(|item| self.is_eligible(*item)).collect()
    }

    /// Draws items uniformly until an eligible one comes up. Loops forever if there is no
    /// eligible item, `train` checks this upfront.
    pub fn sample_item<R: Rng>(&self, rng: &mut R) -> u32 {
        loop {
            let item = rng.gen_range(0..self.num_items()) as u32;
            if self.is_eligible(item) {
                return item;
            }
        }
    }

    fn update_mapping<R: Rng>(&self, mapping: &mut AttributeToFeatureMapping, rng: &mut R) {
        let item = self.sample_item(rng);

        mapping.apply_update(
            self.item_attributes.attributes(item),
            self.item_factors.row(item as usize),
            self.config.learn_rate,
            self.config.regularization);
    }

    /// One pass of as many updates as there are items.
    pub fn iterate_mapping<R: Rng>(&self, mapping: &mut AttributeToFeatureMapping, rng: &mut R) {
        for _ in 0..self.num_items() {
            self.update_mapping(mapping, rng);
        }
    }

    pub fn compute_mapping_fit(&self, mapping: &AttributeToFeatureMapping) -> MappingFit {
        let num_features = self.num_features();

        let penalties: Vec<f64> = (0..num_features)
            .map(|feature| self.config.regularization * mapping.weights().column_norm(feature))
            .collect();

        let mut per_feature = vec![0.0; num_features];
        let mut total_error = 0.0;
        let mut total_penalty = 0.0;
        let mut num_items = 0;

        for item in 0..self.num_items() as u32 {

            if !self.is_eligible(item) {
                continue;
            }

            num_items += 1;

            let mapped = mapping.map(item, self.item_attributes.attributes(item));
            let actual = self.item_factors.row(item as usize);

            for feature in 0..num_features {
                let error = (mapped[feature] - actual[feature]).powi(2);
                total_error += error;
                total_penalty += penalties[feature];
                per_feature[feature] += error + penalties[feature];
            }
        }

        if num_items == 0 {
            return MappingFit { per_feature, mean_error: 0.0, mean_penalty: 0.0 };
        }

        for value in per_feature.iter_mut() {
            *value /= num_items as f64;
        }

        let num_terms = (num_items * num_features) as f64;

        MappingFit {
            per_feature,
            mean_error: total_error / num_terms,
            mean_penalty: total_penalty / num_terms,
        }
    }

    fn train_restart(&self, restart: usize, seed: u64) -> Result<RestartOutcome> {
        let mut rng = XorShiftRng::seed_from_u64(seed);

        let mut mapping = AttributeToFeatureMapping::new(self.num_attributes, self.num_features());
        mapping.init_normal(self.config.init_mean, self.config.init_stdev, &mut rng)?;

        for _ in 0..self.config.num_iter_mapping {
            self.iterate_mapping(&mut mapping, &mut rng);
        }

        let fit = self.compute_mapping_fit(&mapping);

        debug!("Restart {}: error {} penalty {}", restart, fit.mean_error, fit.mean_penalty);

        Ok(RestartOutcome { weights: mapping.weights, fit })
    }

    /// Runs all restarts, each from its own initialization. Seeds are drawn from `rng` up front,
    /// so the outcomes do not depend on the number of threads.
    pub fn train_restarts<R: Rng>(&self, rng: &mut R) -> Result<Vec<RestartOutcome>> {

        if self.config.num_init_mapping == 0 {
            return Err(RecoError::InvalidConfig(
                "num_init_mapping must be at least one".to_string()));
        }

        if self.eligible_items().is_empty() {
            return Err(RecoError::NoEligibleItems);
        }

        let seeds: Vec<u64> = (0..self.config.num_init_mapping).map(|_| rng.gen()).collect();

        let slots: Vec<Mutex<Option<Result<RestartOutcome>>>> =
            seeds.iter().map(|_| Mutex::new(None)).collect();

        let pool = Pool::new(self.config.pool_size.max(1));

        pool.scoped(|scope| {
            for (restart, (seed, slot)) in seeds.iter().zip(slots.iter()).enumerate() {
                scope.execute(move || {
                    let outcome = self.train_restart(restart, *seed);
                    *slot.lock().unwrap() = Some(outcome);
                });
            }
        });

        pool.shutdown();

        slots.into_iter()
            .map(|slot| {
                slot.into_inner()
                    .unwrap()
                    .unwrap_or_else(|| Err(RecoError::InvalidConfig(
                        "restart did not complete".to_string())))
            })
            .collect()
    }

    /// Trains the mapping with all restarts and keeps the best restart per latent feature. The
    /// returned mapping is frozen.
    pub fn train<R: Rng>(&self, rng: &mut R) -> Result<AttributeToFeatureMapping> {
        let start = Instant::now();

        let outcomes = self.train_restarts(rng)?;

        let selection = select_best_columns(&outcomes).ok_or_else(|| RecoError::InvalidConfig(
            "no restart outcomes to select from".to_string()))?;

        info!("Learned attribute mapping from {} restarts in {}ms, chosen restarts per feature: {:?}",
            outcomes.len(), utils::to_millis(start.elapsed()), selection.chosen_restarts);

        let mut mapping = AttributeToFeatureMapping::from_weights(selection.weights)?;
        mapping.freeze();

        Ok(mapping)
    }
}

/// Scores items through their mapped attributes instead of their own factors, for items without
/// directly trained factors.
pub struct MappedFeatureRecommender {
    model: LatentFactorModel,
    item_attributes: SparseBinaryRelation,
    mapping: AttributeToFeatureMapping,
}

impl MappedFeatureRecommender {

    pub fn new(
        model: LatentFactorModel,
        item_attributes: SparseBinaryRelation,
        mapping: AttributeToFeatureMapping,
    ) -> Self {
        MappedFeatureRecommender { model, item_attributes, mapping }
    }

    /// Learns the mapping for a trained model. `item_interactions` holds the number of observed
    /// interactions per item.
    pub fn train<R: Rng>(
        model: LatentFactorModel,
        item_attributes: SparseBinaryRelation,
        item_interactions: &[u32],
        config: MappingConfig,
        rng: &mut R,
    ) -> Result<Self> {

        let num_attributes = item_attributes.num_columns();

        let mapping = AttributeToFeatureMappingTrainer::new(
            config, &model.item_factors, &item_attributes, item_interactions, num_attributes,
        ).train(rng)?;

        Ok(MappedFeatureRecommender::new(model, item_attributes, mapping))
    }

    pub fn model(&self) -> &LatentFactorModel {
        &self.model
    }

    pub fn mapping(&self) -> &AttributeToFeatureMapping {
        &self.mapping
    }

    pub fn mapped_features(&self, item: u32) -> Vec<f64> {
        self.mapping.map(item, self.item_attributes.attributes(item))
    }

    /// Dot product of the user's factors with the item's mapped features, `UNKNOWN_SCORE` if the
    /// user or the item are outside of the trained factors.
    pub fn predict(&self, user: u32, item: u32) -> f64 {
        if !self.model.knows_user(user) || !self.model.knows_item(item) {
            return UNKNOWN_SCORE;
        }

        utils::dot(self.model.user_factors.row(user as usize), &self.mapped_features(item))
    }
}
