use std::{env, process};

use anyhow::{Context, Result};
use log::info;
use orchestrator::{RunConfig, RunSummary, train};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <config.json>", args[0]);
        process::exit(1);
    }

    let path = &args[1];
    let config = RunConfig::from_json_file(path)
        .with_context(|| format!("failed to load config from {path}"))?;

    info!("loaded config from {path}");

    let summary = train(&config).context("training failed")?;
    print_summary(&config, &summary);

    Ok(())
}

fn print_summary(config: &RunConfig, summary: &RunSummary) {
    println!("Round 0: {}", summary.initial);

    for record in &summary.records {
        println!(
            "Round {}: {} {}/{} workers contributed, {}",
            record.round,
            record.mask,
            record.contributors.len(),
            config.worker_count,
            record.evaluation
        );
    }

    println!(
        "Trained {} rounds in {:.2?}, final global model v{}: {}",
        summary.records.len(),
        summary.elapsed,
        summary.global.version(),
        summary.last_evaluation()
    );

    if let Some(path) = &summary.saved_to {
        println!("Saved the global model to {}", path.display());
    }
}
