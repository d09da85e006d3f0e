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

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde_derive::{Deserialize, Serialize};

use crate::error::Result;
use crate::evaluation::EvaluationResults;
use crate::model::{HasLatentFactors, LatentFactorModel, Ratings};

/// A recommender which is trained one iteration at a time.
pub trait IterativeModel {

    /// Runs a single training iteration.
    fn iterate(&mut self);

    /// Error on the training data.
    fn compute_fit(&self) -> f64;

    /// Error on held-out data, must report at least `RMSE` and `MAE`.
    fn evaluate(&self, test: &Ratings) -> EvaluationResults;
}

/// Identifies a persisted model snapshot. Both variants carry the number of completed
/// iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointTag {
    Iteration(usize),
    Final(usize),
}

impl CheckpointTag {
    pub fn iteration(&self) -> usize {
        match *self {
            CheckpointTag::Iteration(iteration) => iteration,
            CheckpointTag::Final(iteration) => iteration,
        }
    }
}

/// Persists and restores model state for a controller.
pub trait CheckpointStore<M> {

    fn save(&mut self, model: &M, tag: CheckpointTag) -> Result<()>;

    /// Restores a checkpoint into `model` and returns the number of iterations it had
    /// completed. `None` restores the final checkpoint, `Some(n)` the one written after
    /// iteration `n`.
    fn load(&mut self, model: &mut M, iteration: Option<usize>) -> Result<usize>;
}

#[derive(Serialize)]
struct CheckpointRef<'a> {
    iteration: usize,
    model: &'a LatentFactorModel,
}

#[derive(Deserialize)]
struct Checkpoint {
    iteration: usize,
    model: LatentFactorModel,
}

/// Stores checkpoints as JSON files, `<prefix>-it-<n>.json` for intermediate checkpoints and
/// `<prefix>.json` for the final one.
#[derive(Debug, Clone)]
pub struct JsonCheckpointStore {
    prefix: PathBuf,
}

impl JsonCheckpointStore {

    pub fn new<P: Into<PathBuf>>(prefix: P) -> Self {
        JsonCheckpointStore { prefix: prefix.into() }
    }

    pub fn path_for(&self, tag: CheckpointTag) -> PathBuf {
        let prefix = self.prefix.to_string_lossy();
        match tag {
            CheckpointTag::Iteration(iteration) =>
                PathBuf::from(format!("{}-it-{}.json", prefix, iteration)),
            CheckpointTag::Final(_) => PathBuf::from(format!("{}.json", prefix)),
        }
    }

    /// The highest iteration with an intermediate checkpoint on disk, if any. This is the
    /// checkpoint to continue from after an interrupted run, which writes no final one.
    pub fn latest_iteration(&self) -> Result<Option<usize>> {
        let directory = match self.prefix.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let file_prefix = match self.prefix.file_name() {
            Some(name) => format!("{}-it-", name.to_string_lossy()),
            None => return Ok(None),
        };

        let mut latest = None;

        for entry in fs::read_dir(&directory)? {
            let file_name = entry?.file_name();
            let file_name = file_name.to_string_lossy();

            let iteration = file_name.strip_prefix(file_prefix.as_str())
                .and_then(|rest| rest.strip_suffix(".json"))
                .and_then(|number| number.parse::<usize>().ok());

            if let Some(iteration) = iteration {
                latest = latest.max(Some(iteration));
            }
        }

        Ok(latest)
    }

    fn read<M: HasLatentFactors>(&self, model: &mut M, path: PathBuf) -> Result<usize> {
        let file = File::open(&path)?;
        let checkpoint: Checkpoint = serde_json::from_reader(BufReader::new(file))?;

        *model.factors_mut() = checkpoint.model;

        info!("Restored model after {} iterations from {}",
            checkpoint.iteration, path.display());

        Ok(checkpoint.iteration)
    }
}

impl<M: HasLatentFactors> CheckpointStore<M> for JsonCheckpointStore {

    fn save(&mut self, model: &M, tag: CheckpointTag) -> Result<()> {
        let file = File::create(self.path_for(tag))?;

        let checkpoint = CheckpointRef { iteration: tag.iteration(), model: model.factors() };
        serde_json::to_writer(BufWriter::new(file), &checkpoint)?;

        Ok(())
    }

    fn load(&mut self, model: &mut M, iteration: Option<usize>) -> Result<usize> {
        let tag = match iteration {
            Some(iteration) => CheckpointTag::Iteration(iteration),
            None => CheckpointTag::Final(0),
        };
        let path = self.path_for(tag);
        self.read(model, path)
    }
}

#[derive(Debug, Clone)]
pub struct TrainingConfig {
    /// Evaluate and checkpoint every `find_iter` iterations, zero disables the controller.
    pub find_iter: usize,
    pub max_iter: usize,
    /// Stop once RMSE exceeds the best RMSE seen so far by more than `epsilon`, zero disables.
    pub epsilon: f64,
    pub rmse_cutoff: f64,
    pub mae_cutoff: f64,
    /// Also compute the error on the training data at every evaluation.
    pub compute_fit: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            find_iter: 1,
            max_iter: 100,
            epsilon: 0.0,
            rmse_cutoff: std::f64::MAX,
            mae_cutoff: std::f64::MAX,
            compute_fit: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrainingState {
    NotStarted,
    Training,
    /// RMSE rose more than `epsilon` above the best RMSE seen so far.
    Converged,
    /// RMSE or MAE exceeded its configured cutoff.
    CutoffReached,
    MaxIterReached,
    /// Stopped from the outside between two iterations.
    Interrupted,
}

impl TrainingState {
    pub fn is_halted(&self) -> bool {
        match *self {
            TrainingState::NotStarted | TrainingState::Training => false,
            _ => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EvaluationRecord {
    pub iteration: usize,
    pub fit: Option<f64>,
    pub fit_time: Option<Duration>,
    pub results: EvaluationResults,
    pub evaluation_time: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct TimingSummary {
    pub count: usize,
    pub min_millis: f64,
    pub max_millis: f64,
    pub mean_millis: f64,
}

impl TimingSummary {

    pub fn from_durations<'a, I>(durations: I) -> Self
        where I: Iterator<Item=&'a Duration> {

        let mut summary = TimingSummary {
            count: 0,
            min_millis: std::f64::MAX,
            max_millis: 0.0,
            mean_millis: 0.0,
        };

        let mut total_millis = 0.0;

        for duration in durations {
            let millis = duration.as_secs_f64() * 1_000.0;
            summary.count += 1;
            summary.min_millis = summary.min_millis.min(millis);
            summary.max_millis = summary.max_millis.max(millis);
            total_millis += millis;
        }

        if summary.count == 0 {
            return TimingSummary::default();
        }

        summary.mean_millis = total_millis / summary.count as f64;
        summary
    }
}

/// Snapshot of a training run, available at any point, also after an interruption.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub state: TrainingState,
    pub iterations: usize,
    pub num_evaluations: usize,
    pub best_rmse: Option<f64>,
    pub iteration_times: TimingSummary,
    pub evaluation_times: TimingSummary,
    pub fit_times: TimingSummary,
}

/// Drives an `IterativeModel` one iteration at a time, evaluates it on held-out data every
/// `find_iter` iterations, persists checkpoints and decides when to stop.
pub struct TrainingController<'a, M, C> {
    config: TrainingConfig,
    model: M,
    store: C,
    evaluation_data: &'a Ratings,
    iteration: usize,
    state: TrainingState,
    iteration_times: Vec<Duration>,
    history: Vec<EvaluationRecord>,
}

impl<'a, M, C> TrainingController<'a, M, C>
    where M: IterativeModel, C: CheckpointStore<M> {

    pub fn new(config: TrainingConfig, model: M, store: C, evaluation_data: &'a Ratings) -> Self {
        TrainingController {
            config,
            model,
            store,
            evaluation_data,
            iteration: 0,
            state: TrainingState::NotStarted,
            iteration_times: Vec::new(),
            history: Vec::new(),
        }
    }

    /// Restores the model from the store's final checkpoint, training continues with the
    /// iteration after the restored one.
    pub fn resume(&mut self) -> Result<usize> {
        self.restore(None)
    }

    /// Restores the model from the checkpoint written after `iteration`, e.g. the last one of an
    /// interrupted run.
    pub fn resume_from(&mut self, iteration: usize) -> Result<usize> {
        self.restore(Some(iteration))
    }

    fn restore(&mut self, iteration: Option<usize>) -> Result<usize> {
        let restored = self.store.load(&mut self.model, iteration)?;
        self.iteration = restored;
        self.state = TrainingState::NotStarted;
        info!("Resuming training after iteration {}", restored);
        Ok(restored)
    }

    pub fn state(&self) -> TrainingState {
        self.state
    }

    /// Number of completed iterations, including those restored by `resume`.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn store(&self) -> &C {
        &self.store
    }

    pub fn history(&self) -> &[EvaluationRecord] {
        &self.history
    }

    pub fn into_parts(self) -> (M, C) {
        (self.model, self.store)
    }

    fn is_inert(&self) -> bool {
        self.config.find_iter == 0
    }

    /// Advances training by one iteration, evaluating and checkpointing if due. Does nothing
    /// once training halted.
    pub fn step(&mut self) -> Result<TrainingState> {

        if self.is_inert() || self.state.is_halted() {
            return Ok(self.state);
        }

        if self.iteration >= self.config.max_iter {
            self.finish(TrainingState::MaxIterReached)?;
            return Ok(self.state);
        }

        self.state = TrainingState::Training;

        let iteration_start = Instant::now();
        self.model.iterate();
        self.iteration_times.push(iteration_start.elapsed());
        self.iteration += 1;

        if self.iteration % self.config.find_iter == 0 {
            if let Some(halt) = self.evaluate()? {
                self.finish(halt)?;
                return Ok(self.state);
            }
        }

        if self.iteration >= self.config.max_iter {
            self.finish(TrainingState::MaxIterReached)?;
        }

        Ok(self.state)
    }

    /// Trains until one of the stopping rules applies.
    pub fn run(&mut self) -> Result<TrainingState> {
        if self.is_inert() {
            warn!("find_iter is zero, not training");
            return Ok(self.state);
        }

        while !self.state.is_halted() {
            self.step()?;
        }

        Ok(self.state)
    }

    /// Like `run`, but checks `stop` before every iteration and halts as `Interrupted` once it
    /// is set. No checkpoint is written for an interrupted run.
    pub fn run_until(&mut self, stop: &AtomicBool) -> Result<TrainingState> {
        if self.is_inert() {
            warn!("find_iter is zero, not training");
            return Ok(self.state);
        }

        while !self.state.is_halted() {
            if stop.load(Ordering::SeqCst) {
                self.state = TrainingState::Interrupted;
                info!("Interrupted after {} iterations", self.iteration);
                break;
            }
            self.step()?;
        }

        Ok(self.state)
    }

    pub fn report(&self) -> TrainingReport {
        let best_rmse = self.history.iter()
            .map(|record| record.results.rmse())
            .fold(None, |best: Option<f64>, rmse| match best {
                Some(best) if best <= rmse => Some(best),
                _ => Some(rmse),
            });

        TrainingReport {
            state: self.state,
            iterations: self.iteration,
            num_evaluations: self.history.len(),
            best_rmse,
            iteration_times: TimingSummary::from_durations(self.iteration_times.iter()),
            evaluation_times: TimingSummary::from_durations(
                self.history.iter().map(|record| &record.evaluation_time)),
            fit_times: TimingSummary::from_durations(
                self.history.iter().filter_map(|record| record.fit_time.as_ref())),
        }
    }

    /// Evaluates the model, records the result and writes a checkpoint. Returns the state to
    /// halt in if a stopping rule applies.
    fn evaluate(&mut self) -> Result<Option<TrainingState>> {

        let (fit, fit_time) = if self.config.compute_fit {
            let fit_start = Instant::now();
            let fit = self.model.compute_fit();
            (Some(fit), Some(fit_start.elapsed()))
        } else {
            (None, None)
        };

        let evaluation_start = Instant::now();
        let results = self.model.evaluate(self.evaluation_data);
        let evaluation_time = evaluation_start.elapsed();

        let rmse = results.rmse();
        let mae = results.mae();

        debug!("Iteration {}: RMSE {} MAE {} fit {:?} ({}ms)", self.iteration, rmse, mae, fit,
            evaluation_time.as_millis());

        let best_previous_rmse = self.history.iter()
            .map(|record| record.results.rmse())
            .fold(std::f64::INFINITY, f64::min);

        self.history.push(EvaluationRecord {
            iteration: self.iteration,
            fit,
            fit_time,
            results,
            evaluation_time,
        });

        self.store.save(&self.model, CheckpointTag::Iteration(self.iteration))?;

        if rmse > self.config.rmse_cutoff || mae > self.config.mae_cutoff {
            info!("Reached cutoff after {} iterations: RMSE {} MAE {}", self.iteration, rmse, mae);
            return Ok(Some(TrainingState::CutoffReached));
        }

        if self.config.epsilon > 0.0 && rmse > best_previous_rmse + self.config.epsilon {
            info!("Reached convergence after {} iterations: RMSE {} >> {}",
                self.iteration, rmse, best_previous_rmse);
            return Ok(Some(TrainingState::Converged));
        }

        Ok(None)
    }

    fn finish(&mut self, state: TrainingState) -> Result<()> {
        self.store.save(&self.model, CheckpointTag::Final(self.iteration))?;
        self.state = state;
        info!("Training halted after {} iterations: {:?}", self.iteration, state);
        Ok(())
    }
}
