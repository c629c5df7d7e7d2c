use std::{env, fs};

use orchestrator::{Adapter, OrchestratorError, RunConfig};

const CONFIG: &str = r#"{
    "worker_count": 3,
    "local_epochs": 2,
    "global_rounds": 5,
    "batch_size": 2,
    "p_available": 0.5,
    "learning_rate": 0.1,
    "seed": 11,
    "loss": "cross_entropy",
    "optimizer": { "adam": {} },
    "model": {
        "sequential": {
            "layers": [
                { "dense": { "dim": [2, 3], "act_fn": { "sigmoid": { "amp": 1.0 } } } },
                { "dense": { "dim": [3, 2], "init": "kaiming" } }
            ]
        }
    },
    "dataset": {
        "inline": {
            "data": [
                0.0, 0.0, 1.0, 0.0,
                0.0, 1.0, 1.0, 0.0,
                1.0, 0.0, 1.0, 0.0,
                1.0, 1.0, 0.0, 1.0,
                0.0, 0.0, 1.0, 0.0,
                0.0, 1.0, 1.0, 0.0,
                1.0, 0.0, 1.0, 0.0,
                1.0, 1.0, 0.0, 1.0,
                0.0, 0.0, 1.0, 0.0,
                1.0, 1.0, 0.0, 1.0
            ],
            "x_size": 2,
            "y_size": 2
        }
    },
    "test": { "split": { "fraction": 0.2 } }
}"#;

fn config() -> RunConfig {
    serde_json::from_str(CONFIG).unwrap()
}

fn assert_invalid(config: &RunConfig, field: &str) {
    match config.validate() {
        Err(OrchestratorError::InvalidConfig(msg)) => {
            assert!(msg.contains(field), "'{msg}' doesn't name '{field}'")
        }
        other => panic!("expected an invalid config naming '{field}', got {other:?}"),
    }
}

#[test]
fn valid_config_is_accepted() {
    assert!(config().validate().is_ok());
}

#[test]
fn zero_counts_are_rejected() {
    let mut c = config();
    c.worker_count = 0;
    assert_invalid(&c, "worker_count");

    let mut c = config();
    c.local_epochs = 0;
    assert_invalid(&c, "local_epochs");

    let mut c = config();
    c.global_rounds = 0;
    assert_invalid(&c, "global_rounds");

    let mut c = config();
    c.batch_size = 0;
    assert_invalid(&c, "batch_size");
}

#[test]
fn probability_out_of_range_is_rejected() {
    for p in [-0.1, 1.01, f64::NAN] {
        let mut c = config();
        c.p_available = p;
        assert_invalid(&c, "p_available");
    }
}

#[test]
fn non_positive_learning_rate_is_rejected() {
    for lr in [0.0, -1.0, f32::INFINITY] {
        let mut c = config();
        c.learning_rate = lr;
        assert_invalid(&c, "learning_rate");
    }
}

#[test]
fn model_must_fit_the_dataset() {
    let mut c = config();
    c.dataset = serde_json::from_str(
        r#"{ "inline": { "data": [0.0, 1.0, 2.0, 3.0, 4.0], "x_size": 3, "y_size": 2 } }"#,
    )
    .unwrap();
    assert_invalid(&c, "x_size");
}

#[test]
fn mismatched_layers_are_rejected() {
    let mut c = config();
    c.model = serde_json::from_str(
        r#"{ "sequential": { "layers": [
            { "dense": { "dim": [2, 3] } },
            { "dense": { "dim": [4, 2] } }
        ] } }"#,
    )
    .unwrap();
    assert_invalid(&c, "layer 1");
}

#[test]
fn ragged_dataset_is_rejected() {
    let mut c = config();
    c.dataset = serde_json::from_str(
        r#"{ "inline": { "data": [0.0, 1.0, 2.0], "x_size": 2, "y_size": 2 } }"#,
    )
    .unwrap();
    assert_invalid(&c, "dataset");
}

#[test]
fn degenerate_test_split_is_rejected() {
    let mut c = config();
    c.test = serde_json::from_str(r#"{ "split": { "fraction": 1.0 } }"#).unwrap();
    assert_invalid(&c, "fraction");
}

#[test]
fn adapting_is_reproducible() {
    let first = Adapter::new().adapt(&config()).unwrap();
    let second = Adapter::new().adapt(&config()).unwrap();

    // 2 * 3 + 3 weights and biases, then 3 * 2 + 2.
    assert_eq!(first.params.len(), 17);
    assert_eq!(first.params, second.params);
    assert_eq!(first.optimizers.len(), 3);
    assert_eq!(first.test.len(), 2);
    assert_eq!(
        first.partition.sample_counts(),
        second.partition.sample_counts()
    );
    assert_eq!(first.partition.sample_counts().iter().sum::<usize>(), 8);
}

#[test]
fn config_is_read_from_a_json_file() {
    let path = env::temp_dir().join("fedsim-config-test.json");
    fs::write(&path, CONFIG).unwrap();

    let loaded = RunConfig::from_json_file(&path).unwrap();
    fs::remove_file(&path).ok();

    assert_eq!(loaded, config());
}

#[test]
fn missing_csv_dataset_is_an_io_error() {
    let mut c = config();
    c.dataset = serde_json::from_str(
        r#"{ "csv": { "path": "/definitely/not/here.csv", "x_size": 2, "y_size": 2 } }"#,
    )
    .unwrap();

    assert!(c.validate().is_ok());
    assert!(matches!(
        Adapter::new().adapt(&c),
        Err(OrchestratorError::Io { .. })
    ));
}

#[test]
fn invalid_initializer_names_the_layer() {
    let mut c = config();
    c.model = serde_json::from_str(
        r#"{ "sequential": { "layers": [
            { "dense": { "dim": [2, 3], "init": { "const": { "value": 0.0 } } } },
            { "dense": { "dim": [3, 2], "init": { "uniform": { "low": 1.0, "high": -1.0 } } } }
        ] } }"#,
    )
    .unwrap();

    match Adapter::new().adapt(&c) {
        Err(OrchestratorError::InvalidConfig(msg)) => assert!(msg.contains("layer 1"), "{msg}"),
        Err(e) => panic!("expected an invalid config, got {e}"),
        Ok(_) => panic!("expected an invalid config"),
    }
}
