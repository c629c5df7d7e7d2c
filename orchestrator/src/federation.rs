use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use aggregator::{
    Aggregation, Contribution, Evaluation, Evaluator, FedAvg, GlobalModel, OptimizerPolicy,
    broadcast,
};
use log::{debug, info, warn};
use machine_learning::{
    Dataset,
    arch::{Model, loss::LossFn},
    optimization::Optimizer,
};
use rayon::prelude::*;
use worker::{LocalReport, LocalTrainer, Partition, WorkerId, WorkerState};

use crate::{
    availability::{AvailabilityMask, AvailabilitySampler},
    checkpoint,
    error::{OrchestratorError, Result},
};

/// A worker's report, or its id if it diverged.
type TrainOutcome = std::result::Result<LocalReport, WorkerId>;

/// Where the orchestrator stands in the run, the initialization happens in
/// `RoundOrchestrator::new`.
///
/// Between calls to `run_round` the orchestrator is either waiting on the next round, done or
/// aborted. The other phases are only held while a round is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    SampleAvailability,
    LocalTrain,
    Aggregate,
    Evaluate,
    Done,
    /// A round failed with a fatal error, no more rounds can run.
    Aborted,
}

/// The knobs of the round loop.
#[derive(Debug, Clone)]
pub struct RoundSettings {
    pub local_epochs: usize,
    pub global_rounds: usize,
    /// Train the available workers on rayon's thread pool.
    pub parallel: bool,
    pub optimizer_policy: OptimizerPolicy,
    /// Where to save the final global model, if anywhere.
    pub output: Option<PathBuf>,
}

/// Everything the orchestrator needs before the first round.
pub struct Federation<M, O, L> {
    /// The shared architecture, every worker and the evaluator get their own clone.
    pub model: M,
    /// The initial global parameters.
    pub params: Vec<f32>,
    /// One optimizer per worker, indexed by worker id.
    pub optimizers: Vec<O>,
    pub partition: Partition,
    pub test: Dataset,
    pub trainer: LocalTrainer<L>,
    pub evaluator: Evaluator<M, L>,
    pub sampler: AvailabilitySampler,
    pub aggregator: FedAvg,
    pub settings: RoundSettings,
}

/// What happened in a single global round.
#[derive(Debug, Clone)]
pub struct RoundRecord {
    /// Starts at `1`, round `0` is the evaluation before training.
    pub round: usize,
    pub mask: AvailabilityMask,
    /// The workers whose parameters made it into the global model.
    pub contributors: Vec<WorkerId>,
    pub aggregated: bool,
    /// The synchronized step count of the round.
    pub steps: usize,
    pub evaluation: Evaluation,
    pub elapsed: Duration,
}

/// The outcome of a whole run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub initial: Evaluation,
    pub records: Vec<RoundRecord>,
    pub elapsed: Duration,
    pub global: GlobalModel,
    pub saved_to: Option<PathBuf>,
}

impl RunSummary {
    /// Returns the evaluation of the final global model.
    pub fn last_evaluation(&self) -> &Evaluation {
        self.records
            .last()
            .map(|record| &record.evaluation)
            .unwrap_or(&self.initial)
    }
}

/// Drives the global rounds of a federated run.
///
/// Each round samples which workers are available, trains them locally, averages their
/// parameters into the global model, broadcasts it back to every worker and evaluates it.
pub struct RoundOrchestrator<M, O, L> {
    phase: Phase,
    round: usize,
    workers: Vec<WorkerState<M, O>>,
    partition: Partition,
    test: Dataset,
    trainer: LocalTrainer<L>,
    evaluator: Evaluator<M, L>,
    sampler: AvailabilitySampler,
    aggregator: FedAvg,
    global: GlobalModel,
    settings: RoundSettings,
    initial: Evaluation,
    records: Vec<RoundRecord>,
    started: Instant,
}

impl<M, O, L> RoundOrchestrator<M, O, L>
where
    M: Model,
    O: Optimizer,
    L: LossFn,
{
    /// Creates a new `RoundOrchestrator`.
    ///
    /// Builds one `WorkerState` per worker from the initial parameters and evaluates them, that
    /// evaluation is round `0`.
    ///
    /// # Arguments
    /// * `federation` - The workers' data, the capabilities and the settings of the run.
    ///
    /// # Returns
    /// A new orchestrator ready to run its first round, or an error if the pieces don't fit
    /// together.
    pub fn new(federation: Federation<M, O, L>) -> Result<Self> {
        let Federation {
            model,
            params,
            optimizers,
            partition,
            test,
            trainer,
            mut evaluator,
            sampler,
            aggregator,
            settings,
        } = federation;

        if optimizers.is_empty() {
            return Err(OrchestratorError::InvalidConfig(
                "at least one worker is required".into(),
            ));
        }

        if optimizers.len() != partition.num_workers() {
            return Err(OrchestratorError::InvalidConfig(format!(
                "{} workers but the data was partitioned among {}",
                optimizers.len(),
                partition.num_workers()
            )));
        }

        let workers = optimizers
            .into_iter()
            .enumerate()
            .map(|(id, optimizer)| WorkerState::new(id, model.clone(), params.clone(), optimizer))
            .collect::<worker::Result<Vec<_>>>()?;

        info!(
            "created {} workers with {} parameters each",
            workers.len(),
            params.len()
        );

        let global = GlobalModel::new(params);
        let initial = evaluator.evaluate(global.params(), &test)?;
        info!("Round 0 test set: {initial}");

        let phase = if settings.global_rounds == 0 {
            Phase::Done
        } else {
            Phase::SampleAvailability
        };

        Ok(Self {
            phase,
            round: 0,
            workers,
            partition,
            test,
            trainer,
            evaluator,
            sampler,
            aggregator,
            global,
            settings,
            initial,
            records: Vec::new(),
            started: Instant::now(),
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the amount of rounds already run.
    pub fn round(&self) -> usize {
        self.round
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    pub fn global(&self) -> &GlobalModel {
        &self.global
    }

    pub fn workers(&self) -> &[WorkerState<M, O>] {
        &self.workers
    }

    /// Returns the evaluation of the initial parameters.
    pub fn initial(&self) -> &Evaluation {
        &self.initial
    }

    pub fn records(&self) -> &[RoundRecord] {
        &self.records
    }

    /// Runs a single global round.
    ///
    /// # Returns
    /// The record of the round, `OrchestratorError::Finished` if every round was already run or
    /// an error that aborts the run. Worker failures are not errors, those workers are just left
    /// out of the aggregation.
    pub fn run_round(&mut self) -> Result<RoundRecord> {
        if matches!(self.phase, Phase::Done | Phase::Aborted) {
            return Err(OrchestratorError::Finished);
        }

        match self.advance(self.round + 1) {
            Ok(record) => {
                self.round = record.round;
                self.records.push(record.clone());
                self.phase = if self.round >= self.settings.global_rounds {
                    Phase::Done
                } else {
                    Phase::SampleAvailability
                };

                Ok(record)
            }
            Err(e) => {
                self.phase = Phase::Aborted;
                Err(e)
            }
        }
    }

    /// Walks the phases of round `round`.
    fn advance(&mut self, round: usize) -> Result<RoundRecord> {
        let start = Instant::now();

        self.phase = Phase::SampleAvailability;
        let mask = self.sampler.sample(self.workers.len());
        info!("Round {round} availability: {mask}");

        self.phase = Phase::LocalTrain;
        let steps = self.partition.synchronized_steps(mask.as_slice());
        let (reports, diverged) = self.train_available(round, &mask, steps);

        self.phase = Phase::Aggregate;
        let contributions: Vec<_> = reports
            .iter()
            .map(|report| Contribution {
                worker_id: report.worker_id,
                params: self.workers[report.worker_id].params(),
                samples: report.samples,
            })
            .collect();

        let aggregation = self.aggregator.aggregate(&mut self.global, &contributions)?;
        if !aggregation.is_updated() {
            warn!(
                round = round, version = self.global.version();
                "no worker contributed this round, keeping the previous global model"
            );
        }

        broadcast(
            &self.global,
            &mut self.workers,
            self.settings.optimizer_policy,
        )?;

        // The optimizer state of a diverged worker is no longer finite either.
        for &worker_id in &diverged {
            self.workers[worker_id].reset_optimizer();
        }

        self.phase = Phase::Evaluate;
        let evaluation = self.evaluator.evaluate(self.global.params(), &self.test)?;
        info!("Test set: {evaluation}");

        let (aggregated, contributors) = match aggregation {
            Aggregation::Updated { contributors } => (true, contributors),
            Aggregation::Skipped => (false, Vec::new()),
        };

        Ok(RoundRecord {
            round,
            mask,
            contributors,
            aggregated,
            steps,
            evaluation,
            elapsed: start.elapsed(),
        })
    }

    /// Runs every remaining round and wraps up, saving the final model if asked to.
    ///
    /// # Returns
    /// The summary of the run or the first error that aborted it.
    pub fn run(mut self) -> Result<RunSummary> {
        while !self.is_done() {
            self.run_round()?;
        }

        let elapsed = self.started.elapsed();
        info!("Training finished in {elapsed:.2?}");

        let saved_to = match self.settings.output.take() {
            Some(path) => {
                checkpoint::save(&self.global, &path)?;
                Some(path)
            }
            None => None,
        };

        Ok(RunSummary {
            initial: self.initial,
            records: self.records,
            elapsed,
            global: self.global,
            saved_to,
        })
    }

    /// Trains every available worker that has data.
    ///
    /// # Returns
    /// The reports of the workers that trained and the ids of the ones that diverged.
    fn train_available(
        &mut self,
        round: usize,
        mask: &AvailabilityMask,
        steps: usize,
    ) -> (Vec<LocalReport>, Vec<WorkerId>) {
        let local_epochs = self.settings.local_epochs;
        let trainer = &self.trainer;
        let partition = &self.partition;

        let selected = |state: &&mut WorkerState<M, O>| {
            mask.is_available(state.id()) && !partition.stream(state.id()).is_empty()
        };

        let train = |state: &mut WorkerState<M, O>| -> TrainOutcome {
            let worker_id = state.id();
            let stream = partition.stream(worker_id);

            let report = trainer
                .train_round(state, stream, local_epochs, steps)
                .map_err(|e| {
                    warn!(
                        round = round, worker_id = worker_id;
                        "leaving worker out of the aggregation: {e}"
                    );
                    worker_id
                })?;

            if report.skipped > 0 {
                warn!(
                    round = round, worker_id = worker_id;
                    "data underrun: {} batches for {steps} steps, skipped {} steps",
                    stream.len(),
                    report.skipped,
                );
            }

            debug!(
                round = round, worker_id = worker_id;
                "trained {} steps over {} samples, mean loss: {:.6}",
                report.steps,
                report.samples,
                report.mean_loss,
            );

            Ok(report)
        };

        let outcomes: Vec<_> = if self.settings.parallel {
            self.workers.par_iter_mut().filter(selected).map(train).collect()
        } else {
            self.workers.iter_mut().filter(selected).map(train).collect()
        };

        let mut reports = Vec::with_capacity(outcomes.len());
        let mut diverged = Vec::new();

        for outcome in outcomes {
            match outcome {
                Ok(report) => reports.push(report),
                Err(worker_id) => diverged.push(worker_id),
            }
        }

        (reports, diverged)
    }
}
