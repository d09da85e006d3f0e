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

use std::collections::BTreeMap;

use serde_derive::Serialize;

use crate::model::Ratings;

pub const RMSE: &str = "RMSE";
pub const MAE: &str = "MAE";

/// Named evaluation measures. Results produced by `evaluate_ratings` always carry `RMSE` and
/// `MAE`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvaluationResults {
    measures: BTreeMap<String, f64>,
}

impl EvaluationResults {

    pub fn new(rmse: f64, mae: f64) -> Self {
        let mut measures = BTreeMap::new();
        measures.insert(RMSE.to_string(), rmse);
        measures.insert(MAE.to_string(), mae);
        EvaluationResults { measures }
    }

    pub fn insert(&mut self, name: &str, value: f64) {
        self.measures.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.measures.get(name).cloned()
    }

    pub fn rmse(&self) -> f64 {
        self.get(RMSE).unwrap_or(std::f64::NAN)
    }

    pub fn mae(&self) -> f64 {
        self.get(MAE).unwrap_or(std::f64::NAN)
    }

    pub fn iter(&self) -> impl Iterator<Item=(&String, &f64)> {
        self.measures.iter()
    }
}

/// Root mean squared error and mean absolute error of `predict` over all ratings in `test`. An
/// empty test set yields NaN for both.
pub fn evaluate_ratings<F>(predict: F, test: &Ratings) -> EvaluationResults
    where F: Fn(u32, u32) -> f64 {

    let mut squared_error = 0.0;
    let mut absolute_error = 0.0;

    for rating in test.iter() {
        let error = predict(rating.user, rating.item) - rating.value;
        squared_error += error * error;
        absolute_error += error.abs();
    }

    let num_ratings = test.len() as f64;

    EvaluationResults::new((squared_error / num_ratings).sqrt(), absolute_error / num_ratings)
}

#[cfg(test)]
mod tests {

    use crate::evaluation::{self, EvaluationResults};
    use crate::model::Ratings;

    #[test]
    fn rmse_and_mae() {
        let mut test = Ratings::new();
        test.push(0, 0, 3.0);
        test.push(0, 1, 5.0);

        let results = evaluation::evaluate_ratings(|_, _| 4.0, &test);

        assert_eq!(results.rmse(), 1.0);
        assert_eq!(results.mae(), 1.0);
        assert_eq!(results.get("RMSE"), Some(1.0));
        assert_eq!(results.iter().count(), 2);
    }

    #[test]
    fn empty_test_set() {
        let results = evaluation::evaluate_ratings(|_, _| 4.0, &Ratings::new());
        assert!(results.rmse().is_nan());
        assert!(results.mae().is_nan());
    }

    #[test]
    fn missing_measures() {
        let mut results = EvaluationResults::default();
        assert!(results.rmse().is_nan());
        results.insert("RMSE", 0.5);
        assert_eq!(results.rmse(), 0.5);
    }
}
