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

#[cfg(test)]
mod tests {

    use std::io::Cursor;

    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    use crate::io;
    use crate::{Cosine, EntityMapping, IdMapping, JsonCheckpointStore, MappedFeatureRecommender,
        MappingConfig, MatrixFactorization, Ratings, SgdConfig, TrainingConfig,
        TrainingController, TrainingState, UNKNOWN_SCORE};

    #[test]
    fn programmatic_usage() {

        /* Our input data comprises of observed ratings between users and items, and of binary
           attributes of the items. External identifiers are mapped to consecutive internal
           indices in the order in which we first see them. */
        let mut users = EntityMapping::new();
        let mut items = EntityMapping::new();
        let mut attributes = EntityMapping::new();

        let item_attribute_pairs = "100 1\n100 2\n101 2\n102 3\n\n103 1\n103 3\n104 2\n";

        let item_attributes = io::read_bipartite_relation(
            Cursor::new(item_attribute_pairs), &mut items, &mut attributes).unwrap();

        let mut training = Ratings::new();
        let mut test = Ratings::new();

        for user in 0..8u64 {
            for item in 100..104u64 {
                let value = if (user + item) % 2 == 0 { 4.0 } else { 2.0 };
                let user_index = users.to_internal_id(user);
                let item_index = items.to_internal_id(item);

                if (user * 3 + item) % 5 == 0 {
                    test.push(user_index, item_index, value);
                } else {
                    training.push(user_index, item_index, value);
                }
            }
        }

        /* Items sharing attributes are similar to each other. */
        let similarities = crate::row_similarities(&item_attributes, &Cosine, 2);
        assert_eq!(similarities.num_entities(), items.num_entities());
        let apple = items.internal_id(100).unwrap();
        let pear = items.internal_id(101).unwrap();
        assert!(similarities.get(apple, pear) > 0.0);
        assert_eq!(similarities.get(apple, apple), 1.0);

        /* We train a factorization model iteratively, evaluating on the held-out ratings every
           two iterations and keeping checkpoints of the model. */
        let checkpoints = tempfile::tempdir().unwrap();
        let store = JsonCheckpointStore::new(checkpoints.path().join("model"));

        let recommender = MatrixFactorization::new(
            SgdConfig { num_features: 3, ..SgdConfig::default() },
            training.clone(),
            XorShiftRng::seed_from_u64(42),
        ).unwrap();

        let config = TrainingConfig { find_iter: 2, max_iter: 10, ..TrainingConfig::default() };
        let mut controller = TrainingController::new(config, recommender, store, &test);

        assert_eq!(controller.run().unwrap(), TrainingState::MaxIterReached);

        let report = controller.report();
        println!("Trained for {} iterations, best RMSE {:?}, {}ms per iteration",
            report.iterations, report.best_rmse, report.iteration_times.mean_millis);
        assert_eq!(report.num_evaluations, 5);

        let mut history = Vec::new();
        io::write_evaluation_history(controller.history(), &mut history).unwrap();
        assert_eq!(String::from_utf8(history).unwrap().lines().count(), 5);

        /* Finally, we learn to map item attributes into the latent space, which allows us to
           score items through their attributes. */
        let (recommender, _) = controller.into_parts();
        let item_interactions = training.item_counts();

        let mapped = MappedFeatureRecommender::train(
            recommender.into_model(),
            item_attributes,
            &item_interactions,
            MappingConfig { num_init_mapping: 3, num_iter_mapping: 5, ..MappingConfig::default() },
            &mut XorShiftRng::seed_from_u64(7),
        ).unwrap();

        let user = users.internal_id(0).unwrap();
        assert!(mapped.predict(user, apple).is_finite());
        assert_ne!(mapped.predict(user, apple), UNKNOWN_SCORE);

        /* Item 104 never received a rating, so it has no trained factors. */
        let unrated = items.internal_id(104).unwrap();
        assert_eq!(mapped.predict(user, unrated), UNKNOWN_SCORE);
    }
}
