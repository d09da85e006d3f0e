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

use rand::Rng;
use rand::seq::SliceRandom;
use serde_derive::{Deserialize, Serialize};

use crate::error::Result;
use crate::evaluation::{self, EvaluationResults};
use crate::training::IterativeModel;
use crate::types::DenseMatrix;
use crate::utils;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rating {
    pub user: u32,
    pub item: u32,
    pub value: f64,
}

/// Observed ratings over internal user and item indices.
#[derive(Debug, Clone, Default)]
pub struct Ratings {
    ratings: Vec<Rating>,
    num_users: usize,
    num_items: usize,
}

impl Ratings {

    pub fn new() -> Self {
        Ratings { ratings: Vec::new(), num_users: 0, num_items: 0 }
    }

    pub fn push(&mut self, user: u32, item: u32, value: f64) {
        self.num_users = self.num_users.max(user as usize + 1);
        self.num_items = self.num_items.max(item as usize + 1);
        self.ratings.push(Rating { user, item, value });
    }

    pub fn len(&self) -> usize {
        self.ratings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ratings.is_empty()
    }

    pub fn num_users(&self) -> usize {
        self.num_users
    }

    pub fn num_items(&self) -> usize {
        self.num_items
    }

    pub fn get(&self, index: usize) -> &Rating {
        &self.ratings[index]
    }

    pub fn iter(&self) -> impl Iterator<Item=&Rating> {
        self.ratings.iter()
    }

    pub fn mean(&self) -> f64 {
        if self.ratings.is_empty() {
            0.0
        } else {
            self.ratings.iter().map(|rating| rating.value).sum::<f64>() / self.ratings.len() as f64
        }
    }

    /// Number of observed ratings per item, for all items `0..num_items`.
    pub fn item_counts(&self) -> Vec<u32> {
        let mut counts = vec![0; self.num_items];
        for rating in self.ratings.iter() {
            counts[rating.item as usize] += 1;
        }
        counts
    }
}

/// Dense user and item factors plus biases. Predictions are
/// `global_bias + user_bias[u] + item_bias[i] + <user_factors[u], item_factors[i]>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatentFactorModel {
    pub global_bias: f64,
    pub user_bias: Vec<f64>,
    pub item_bias: Vec<f64>,
    pub user_factors: DenseMatrix,
    pub item_factors: DenseMatrix,
}

impl LatentFactorModel {

    pub fn new(num_users: usize, num_items: usize, num_features: usize) -> Self {
        LatentFactorModel {
            global_bias: 0.0,
            user_bias: vec![0.0; num_users],
            item_bias: vec![0.0; num_items],
            user_factors: DenseMatrix::new(num_users, num_features),
            item_factors: DenseMatrix::new(num_items, num_features),
        }
    }

    pub fn num_users(&self) -> usize {
        self.user_factors.num_rows()
    }

    pub fn num_items(&self) -> usize {
        self.item_factors.num_rows()
    }

    pub fn num_features(&self) -> usize {
        self.user_factors.num_columns()
    }

    pub fn init_factors<R: Rng>(&mut self, mean: f64, stdev: f64, rng: &mut R) -> Result<()> {
        self.user_factors.init_normal(mean, stdev, rng)?;
        self.item_factors.init_normal(mean, stdev, rng)
    }

    pub fn knows_user(&self, user: u32) -> bool {
        (user as usize) < self.num_users()
    }

    pub fn knows_item(&self, item: u32) -> bool {
        (item as usize) < self.num_items()
    }

    /// Falls back to the biases that are known when the user or the item is unknown.
    pub fn predict(&self, user: u32, item: u32) -> f64 {
        let mut prediction = self.global_bias;

        if self.knows_user(user) {
            prediction += self.user_bias[user as usize];
        }

        if self.knows_item(item) {
            prediction += self.item_bias[item as usize];
        }

        if self.knows_user(user) && self.knows_item(item) {
            prediction += utils::dot(
                self.user_factors.row(user as usize),
                self.item_factors.row(item as usize));
        }

        prediction
    }
}

/// Access to the factor model held by a recommender, used to persist and restore checkpoints.
pub trait HasLatentFactors {
    fn factors(&self) -> &LatentFactorModel;
    fn factors_mut(&mut self) -> &mut LatentFactorModel;
}

impl HasLatentFactors for LatentFactorModel {
    fn factors(&self) -> &LatentFactorModel {
        self
    }

    fn factors_mut(&mut self) -> &mut LatentFactorModel {
        self
    }
}

#[derive(Debug, Clone)]
pub struct SgdConfig {
    pub num_features: usize,
    pub learn_rate: f64,
    pub regularization: f64,
    pub bias_learn_rate: f64,
    pub bias_regularization: f64,
    pub init_mean: f64,
    pub init_stdev: f64,
}

impl Default for SgdConfig {
    fn default() -> Self {
        SgdConfig {
            num_features: 10,
            learn_rate: 0.01,
            regularization: 0.015,
            bias_learn_rate: 0.01,
            bias_regularization: 0.01,
            init_mean: 0.0,
            init_stdev: 0.1,
        }
    }
}

/// Biased matrix factorization for rating prediction, trained with stochastic gradient descent.
/// Every call to `iterate` makes one pass over the training ratings in random order.
pub struct MatrixFactorization<R: Rng> {
    config: SgdConfig,
    model: LatentFactorModel,
    training: Ratings,
    order: Vec<usize>,
    rng: R,
}

impl<R: Rng> MatrixFactorization<R> {

    pub fn new(config: SgdConfig, training: Ratings, mut rng: R) -> Result<Self> {
        let mut model = LatentFactorModel::new(
            training.num_users(), training.num_items(), config.num_features);

        model.init_factors(config.init_mean, config.init_stdev, &mut rng)?;
        model.global_bias = training.mean();

        let order = (0..training.len()).collect();

        Ok(MatrixFactorization { config, model, training, order, rng })
    }

    pub fn model(&self) -> &LatentFactorModel {
        &self.model
    }

    pub fn training_data(&self) -> &Ratings {
        &self.training
    }

    pub fn into_model(self) -> LatentFactorModel {
        self.model
    }

    pub fn predict(&self, user: u32, item: u32) -> f64 {
        self.model.predict(user, item)
    }

    fn update(&mut self, index: usize) {
        let rating = *self.training.get(index);
        let user = rating.user as usize;
        let item = rating.item as usize;

        let error = rating.value - self.model.predict(rating.user, rating.item);

        let config = &self.config;
        let model = &mut self.model;

        model.user_bias[user] += config.bias_learn_rate *
            (error - config.bias_regularization * model.user_bias[user]);
        model.item_bias[item] += config.bias_learn_rate *
            (error - config.bias_regularization * model.item_bias[item]);

        for feature in 0..model.num_features() {
            let user_value = model.user_factors.get(user, feature);
            let item_value = model.item_factors.get(item, feature);

            model.user_factors.set(user, feature, user_value +
                config.learn_rate * (error * item_value - config.regularization * user_value));
            model.item_factors.set(item, feature, item_value +
                config.learn_rate * (error * user_value - config.regularization * item_value));
        }
    }
}

impl<R: Rng> IterativeModel for MatrixFactorization<R> {

    fn iterate(&mut self) {
        let mut order = std::mem::replace(&mut self.order, Vec::new());
        order.shuffle(&mut self.rng);

        for index in order.iter() {
            self.update(*index);
        }

        self.order = order;
    }

    fn compute_fit(&self) -> f64 {
        evaluation::evaluate_ratings(|user, item| self.predict(user, item), &self.training).rmse()
    }

    fn evaluate(&self, test: &Ratings) -> EvaluationResults {
        evaluation::evaluate_ratings(|user, item| self.predict(user, item), test)
    }
}

impl<R: Rng> HasLatentFactors for MatrixFactorization<R> {
    fn factors(&self) -> &LatentFactorModel {
        &self.model
    }

    fn factors_mut(&mut self) -> &mut LatentFactorModel {
        &mut self.model
    }
}

#[cfg(test)]
mod tests {

    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    use crate::model::{LatentFactorModel, MatrixFactorization, Ratings, SgdConfig};
    use crate::training::IterativeModel;

    fn toy_ratings() -> Ratings {
        let mut ratings = Ratings::new();
        for user in 0..6u32 {
            for item in 0..5u32 {
                if (user + item) % 3 != 0 {
                    let value = if user % 2 == item % 2 { 5.0 } else { 1.0 };
                    ratings.push(user, item, value);
                }
            }
        }
        ratings
    }

    #[test]
    fn ratings_statistics() {
        let mut ratings = Ratings::new();
        ratings.push(0, 2, 4.0);
        ratings.push(3, 2, 2.0);

        assert_eq!(ratings.len(), 2);
        assert_eq!(ratings.num_users(), 4);
        assert_eq!(ratings.num_items(), 3);
        assert_eq!(ratings.mean(), 3.0);
        assert_eq!(ratings.item_counts(), vec![0, 0, 2]);
    }

    #[test]
    fn prediction_with_unknown_entities() {
        let mut model = LatentFactorModel::new(2, 2, 1);
        model.global_bias = 3.0;
        model.user_bias[1] = 0.5;
        model.item_bias[0] = -1.0;
        model.user_factors.set(1, 0, 2.0);
        model.item_factors.set(0, 0, 0.25);

        assert_eq!(model.predict(1, 0), 3.0);
        assert_eq!(model.predict(1, 7), 3.5);
        assert_eq!(model.predict(9, 0), 2.0);
        assert_eq!(model.predict(9, 9), 3.0);
    }

    #[test]
    fn training_reduces_training_error() {
        let rng = XorShiftRng::seed_from_u64(7);
        let config = SgdConfig { num_features: 4, learn_rate: 0.05, ..SgdConfig::default() };
        let mut recommender = MatrixFactorization::new(config, toy_ratings(), rng).unwrap();

        let initial_fit = recommender.compute_fit();
        for _ in 0..50 {
            recommender.iterate();
        }

        assert!(recommender.compute_fit() < initial_fit);
        assert_eq!(recommender.model().num_users(), 6);
        assert_eq!(recommender.model().num_items(), 5);
        assert_eq!(recommender.model().num_features(), 4);
    }
}
