mod audio;
mod cli;
mod config;
mod timing;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::MultiProgress;
use rayon::prelude::*;
use serde::Serialize;

use audio::analysis::analyze_input;
use audio::features::AnalysisResult;
use audio::progress::Spinner;
use cli::{AnalyzeArgs, Cli, Command};
use config::{Config, TempoMethod};
use timing::{timing_table, TimingTable};

#[derive(Serialize)]
struct Report<'a> {
    input: &'a str,
    #[serde(flatten)]
    result: &'a AnalysisResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    timing: Option<TimingTable>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let mut cfg = Config::default();
    if let Some(path) = config::find_config(cli.config.as_deref()) {
        if let Some(loaded) = config::load_config(&path) {
            log::info!("Loaded config from {}", path.display());
            cfg = loaded;
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }

    match cli.command {
        Command::Timing { bpm } => {
            let table = timing_table(bpm)?;
            print!("{}", table.render());
            Ok(())
        }
        Command::Analyze(args) => {
            apply_args(&mut cfg, &args);
            cfg.validate().context("Invalid analysis settings")?;
            run_analyze(&args, &cfg)
        }
    }
}

/// Config values apply only where the flag was left at its default.
fn apply_args(cfg: &mut Config, args: &AnalyzeArgs) {
    if args.tempo_method != TempoMethod::Autocorrelation {
        cfg.tempo.method = args.tempo_method;
    }
    if args.confidence_floor != 0.15 {
        cfg.key.confidence_floor = args.confidence_floor;
    }
    if args.no_ambiguity {
        cfg.key.report_ambiguity = false;
    }
    if args.json {
        cfg.output.json = true;
    }
    if args.timing {
        cfg.output.timing = true;
    }
}

fn run_analyze(args: &AnalyzeArgs, cfg: &Config) -> Result<()> {
    if let Some(jobs) = args.jobs {
        if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(jobs).build_global() {
            log::warn!("Could not size worker pool to {} threads: {}", jobs, e);
        }
    }

    log::info!(
        "Analysing {} input(s), tempo method {:?}",
        args.inputs.len(),
        cfg.tempo.method
    );

    let multi = MultiProgress::new();
    let outcomes: Vec<(&str, Result<AnalysisResult>)> = args
        .inputs
        .par_iter()
        .map(|input| {
            let spinner = Spinner::new(&multi, input);
            let outcome = analyze_input(input, cfg, &spinner);
            match &outcome {
                Ok(result) => spinner.finish(result.to_string()),
                Err(_) => spinner.finish("failed".to_string()),
            }
            (input.as_str(), outcome)
        })
        .collect();

    let mut failed = 0;
    for (input, outcome) in &outcomes {
        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                log::error!("{}: {:#}", input, e);
                failed += 1;
                continue;
            }
        };

        let timing = match (cfg.output.timing, result.bpm) {
            (true, Some(bpm)) => Some(timing_table(bpm as f32)?),
            _ => None,
        };

        if cfg.output.json {
            let report = Report {
                input,
                result,
                timing,
            };
            println!("{}", serde_json::to_string(&report)?);
        } else {
            println!("{}: {}", input, result);
            if let Some(table) = timing {
                print!("{}", table.render());
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} input(s) failed", failed, outcomes.len());
    }
    Ok(())
}
