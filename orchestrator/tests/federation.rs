use std::{env, fs, num::NonZeroUsize};

use aggregator::{Evaluator, FedAvg, OptimizerPolicy, Weighting};
use machine_learning::{
    Dataset, MlErr,
    arch::{Model, Sequential, layers::Layer, loss::Mse},
    optimization::{GradientDescent, GradientDescentWithMomentum, Optimizer},
};
use ndarray::{Array2, ArrayView2, array};
use orchestrator::{
    AvailabilitySampler, Federation, OrchestratorError, Phase, RoundOrchestrator, RoundSettings,
    RunConfig, checkpoint,
    configs::{
        DatasetConfig, LayerConfig, LossFnConfig, ModelConfig, OptimizerConfig,
        OptimizerPolicyConfig, ParamGenConfig, PartitionConfig, TestConfig, WeightingConfig,
    },
    train,
};
use worker::{Batch, LocalTrainer, Partition};

/// Gradient descent, or a broken optimizer that poisons the parameters.
enum Flaky {
    Sound(GradientDescent),
    Poisoned,
    /// Momentum whose first update is fed a NaN gradient, leaving the velocity poisoned.
    Glitch {
        momentum: GradientDescentWithMomentum,
        glitched: bool,
    },
}

impl Flaky {
    fn glitch() -> Self {
        Flaky::Glitch {
            momentum: GradientDescentWithMomentum::new(2, 0.25, 0.5),
            glitched: false,
        }
    }
}

impl Optimizer for Flaky {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> machine_learning::Result<()> {
        match self {
            Flaky::Sound(optimizer) => optimizer.update_params(grad, params),
            Flaky::Poisoned => {
                params.fill(f32::NAN);
                Ok(())
            }
            Flaky::Glitch { momentum, glitched } if !*glitched => {
                *glitched = true;
                momentum.update_params(&vec![f32::NAN; grad.len()], params)
            }
            Flaky::Glitch { momentum, .. } => momentum.update_params(grad, params),
        }
    }

    fn reset(&mut self) {
        if let Flaky::Glitch { momentum, .. } = self {
            momentum.reset();
        }
    }
}

/// A linear model that refuses to run with any parameter above `1.0`.
#[derive(Clone)]
struct Capped(Sequential);

impl Model for Capped {
    fn size(&self) -> usize {
        self.0.size()
    }

    fn forward(
        &mut self,
        params: &[f32],
        x: ArrayView2<f32>,
    ) -> machine_learning::Result<Array2<f32>> {
        if params.iter().any(|p| *p > 1.0) {
            return Err(MlErr::InvalidInput("parameter above the cap"));
        }

        self.0.forward(params, x)
    }

    fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: Array2<f32>,
    ) -> machine_learning::Result<()> {
        self.0.backward(params, grad, d)
    }
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn linear_config(p_available: f64) -> RunConfig {
    RunConfig {
        worker_count: 4,
        local_epochs: 1,
        global_rounds: 2,
        batch_size: 1,
        p_available,
        learning_rate: 0.05,
        seed: 3,
        save_final_model: false,
        test_batch_size: 1000,
        log_interval: 1,
        partition: PartitionConfig::Shuffled,
        weighting: WeightingConfig::Uniform,
        optimizer_policy: OptimizerPolicyConfig::Reset,
        parallel: false,
        output: env::temp_dir().join("fedsim-federation.safetensors"),
        model: ModelConfig::Sequential {
            layers: vec![LayerConfig::Dense {
                dim: (1, 1),
                init: ParamGenConfig::Const { value: 0.0 },
                act_fn: None,
            }],
        },
        optimizer: OptimizerConfig::GradientDescent,
        loss: LossFnConfig::Mse,
        dataset: DatasetConfig::Inline {
            data: vec![1.0, 2.0, 2.0, 4.0],
            x_size: 1,
            y_size: 1,
        },
        test: TestConfig::Inline {
            data: vec![1.0, 2.0, 2.0, 4.0],
        },
    }
}

fn single_sample_batch(worker_id: usize, x: f32, y: f32) -> Batch {
    Batch {
        worker_id,
        x: array![[x]],
        y: array![[y]],
    }
}

fn flaky_federation(global_rounds: usize) -> Federation<Sequential, Flaky, Mse> {
    let model = Sequential::new([Layer::dense((1, 1), None)]);
    let partition = Partition::from_streams(vec![
        vec![single_sample_batch(0, 1.0, 2.0)],
        vec![single_sample_batch(1, 2.0, 4.0)],
    ]);

    Federation {
        model: model.clone(),
        params: vec![0.0, 0.0],
        optimizers: vec![Flaky::Sound(GradientDescent::new(0.25)), Flaky::Poisoned],
        partition,
        test: Dataset::new(vec![1.0, 2.0, 2.0, 4.0], 1, 1).unwrap(),
        trainer: LocalTrainer::new(Mse),
        evaluator: Evaluator::new(model, Mse, NonZeroUsize::MIN),
        sampler: AvailabilitySampler::new(1.0, 0).unwrap(),
        aggregator: FedAvg::new(Weighting::Uniform),
        settings: RoundSettings {
            local_epochs: 1,
            global_rounds,
            parallel: false,
            optimizer_policy: OptimizerPolicy::Reset,
            output: None,
        },
    }
}

#[test]
fn two_full_rounds_reduce_the_test_loss() {
    init_logger();

    let summary = train(&linear_config(1.0)).unwrap();

    assert_eq!(summary.records.len(), 2);
    assert_eq!(summary.records[0].round, 1);
    assert_eq!(summary.records[1].round, 2);

    for record in &summary.records {
        assert!(record.aggregated);
        assert_eq!(record.mask.count(), 4);
        // Two samples among four workers, only two of them hold data.
        assert_eq!(record.contributors.len(), 2);
        assert_eq!(record.steps, 1);
    }

    assert!(summary.records[1].evaluation.loss < summary.initial.loss);
    assert_eq!(summary.global.version(), 2);
    assert!(summary.saved_to.is_none());
}

#[test]
fn parallel_training_matches_sequential_training() {
    let sequential = train(&linear_config(0.5)).unwrap();

    let mut config = linear_config(0.5);
    config.parallel = true;
    let parallel = train(&config).unwrap();

    assert_eq!(sequential.global, parallel.global);
}

#[test]
fn no_availability_keeps_the_initial_model() {
    let summary = train(&linear_config(0.0)).unwrap();

    for record in &summary.records {
        assert!(!record.aggregated);
        assert!(record.contributors.is_empty());
        assert_eq!(record.steps, 0);
        assert_eq!(record.evaluation, summary.initial);
    }

    assert_eq!(summary.global.version(), 0);
    assert_eq!(summary.global.params(), [0.0, 0.0]);
}

#[test]
fn diverged_worker_is_left_out() {
    init_logger();

    let mut orchestrator = RoundOrchestrator::new(flaky_federation(1)).unwrap();
    let record = orchestrator.run_round().unwrap();

    assert_eq!(record.contributors, [0]);

    // Only worker 0 counts: d = 2 * (0 - 2) = -4, so w = b = 0.25 * 4.
    let global = orchestrator.global();
    assert_eq!(global.params(), [1.0, 1.0]);

    for state in orchestrator.workers() {
        assert_eq!(state.params(), global.params());
    }
}

#[test]
fn rounds_after_the_last_one_fail() {
    let mut orchestrator = RoundOrchestrator::new(flaky_federation(1)).unwrap();
    assert_eq!(orchestrator.phase(), Phase::SampleAvailability);

    orchestrator.run_round().unwrap();

    assert_eq!(orchestrator.phase(), Phase::Done);
    assert_eq!(orchestrator.round(), 1);
    assert!(matches!(
        orchestrator.run_round(),
        Err(OrchestratorError::Finished)
    ));
}

#[test]
fn mismatched_workers_and_partition_are_rejected() {
    let mut federation = flaky_federation(1);
    federation.optimizers.pop();

    assert!(matches!(
        RoundOrchestrator::new(federation),
        Err(OrchestratorError::InvalidConfig(_))
    ));
}

#[test]
fn final_model_is_saved_and_restored() {
    let mut config = linear_config(1.0);
    config.save_final_model = true;
    config.output = env::temp_dir().join("fedsim-final-model.safetensors");

    let summary = train(&config).unwrap();
    assert_eq!(summary.saved_to.as_deref(), Some(config.output.as_path()));

    let restored = checkpoint::load(&config.output).unwrap();
    fs::remove_file(&config.output).ok();

    assert_eq!(restored, summary.global);
}

#[test]
fn diverged_worker_rejoins_under_preserved_optimizer_state() {
    init_logger();

    let mut federation = flaky_federation(2);
    federation.optimizers[1] = Flaky::glitch();
    federation.settings.optimizer_policy = OptimizerPolicy::Preserve;

    let mut orchestrator = RoundOrchestrator::new(federation).unwrap();

    let first = orchestrator.run_round().unwrap();
    assert_eq!(first.contributors, [0]);

    let second = orchestrator.run_round().unwrap();
    assert_eq!(second.contributors, [0, 1]);
    assert!(orchestrator.global().params().iter().all(|p| p.is_finite()));
}

#[test]
fn fatal_error_aborts_the_run() {
    init_logger();

    let model = Capped(Sequential::new([Layer::dense((1, 1), None)]));
    let partition = Partition::from_streams(vec![vec![single_sample_batch(0, 1.0, 4.0)]]);

    // The only step moves both parameters to 2.0, past the evaluator's cap.
    let federation = Federation {
        model: model.clone(),
        params: vec![0.0, 0.0],
        optimizers: vec![GradientDescent::new(0.25)],
        partition,
        test: Dataset::new(vec![1.0, 4.0], 1, 1).unwrap(),
        trainer: LocalTrainer::new(Mse),
        evaluator: Evaluator::new(model, Mse, NonZeroUsize::MIN),
        sampler: AvailabilitySampler::new(1.0, 0).unwrap(),
        aggregator: FedAvg::new(Weighting::Uniform),
        settings: RoundSettings {
            local_epochs: 1,
            global_rounds: 3,
            parallel: false,
            optimizer_policy: OptimizerPolicy::Reset,
            output: None,
        },
    };

    let mut orchestrator = RoundOrchestrator::new(federation).unwrap();

    assert!(orchestrator.run_round().is_err());
    assert_eq!(orchestrator.phase(), Phase::Aborted);
    assert_eq!(orchestrator.round(), 0);
    assert!(orchestrator.records().is_empty());
    assert!(matches!(
        orchestrator.run_round(),
        Err(OrchestratorError::Finished)
    ));
}
