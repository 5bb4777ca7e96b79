//! AMS mini-app

mod models;

use ams_compute::MemoryBroker;
use ams_core::{EvaluationConfig, Real};
use ams_workflow::{
    EosFields, EvaluationReport, Evaluator, FieldTensor, IndicatorMatrix, MaterialSlot,
    MemoryStore, Strategy,
};
use anyhow::{Result, bail};
use clap::{Parser, ValueEnum};
use models::{BiasedSurrogate, DensityWindow, IdealGas};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Device {
    Cpu,
    Cuda,
}

#[derive(Parser)]
#[command(name = "ams-miniapp")]
#[command(about = "AMS mini-app - adaptive surrogate/physics material evaluation")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: tracing::Level,

    /// Execution target [default: cpu, or the config file's `device_execution`]
    #[arg(long, value_enum)]
    device: Option<Device>,

    /// Number of evaluation cycles
    #[arg(long, default_value = "10")]
    stop_cycle: usize,

    /// Number of materials
    #[arg(long, default_value = "5")]
    num_mats: usize,

    /// Number of elements
    #[arg(long, default_value = "10000")]
    num_elems: usize,

    /// Quadrature points per element
    #[arg(long, default_value = "64")]
    num_qpts: usize,

    /// Fraction of empty elements per material; -1 draws one at random each cycle
    #[arg(long, default_value = "-1", allow_negative_numbers = true)]
    empty_element_ratio: f64,

    /// Random seed
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Pack partially-populated materials (default unless the config file says otherwise)
    #[arg(long, overrides_with = "no_pack_sparse")]
    pack_sparse: bool,

    /// Evaluate every material densely
    #[arg(long, overrides_with = "pack_sparse")]
    no_pack_sparse: bool,

    /// Evaluation config (JSON); overrides the shape options. Explicit
    /// `--device` / `--[no-]pack-sparse` flags still take precedence.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Keep every evaluated sample in an in-memory offline store
    #[arg(long)]
    store: bool,

    /// Output file for the run summary (pretty JSON). Defaults to stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    let config = build_config(&cli)?;
    cmd_run(&cli, config)
}

fn build_config(cli: &Cli) -> Result<EvaluationConfig> {
    if cli.empty_element_ratio >= 1.0
        || (cli.empty_element_ratio < 0.0 && cli.empty_element_ratio != -1.0)
    {
        bail!("--empty-element-ratio must be -1 or in [0, 1), got {}", cli.empty_element_ratio);
    }
    let mut config = match &cli.config {
        Some(path) => EvaluationConfig::from_json_path(path)?,
        None => EvaluationConfig::with_shape(cli.num_mats, cli.num_elems, cli.num_qpts),
    };
    if let Some(device) = cli.device {
        config.device_execution = device == Device::Cuda;
    }
    if cli.pack_sparse {
        config.pack_sparse = true;
    } else if cli.no_pack_sparse {
        config.pack_sparse = false;
    }
    config.validate()?;
    Ok(config)
}

/// Synthetic inputs for one material: density scales with the material index.
fn fill_inputs(rng: &mut StdRng, density: &mut FieldTensor, energy: &mut FieldTensor) {
    let (_, _, num_mats) = density.shape();
    for m in 0..num_mats {
        let scale = 1.0 + m as Real;
        for v in density.material_mut(m) {
            *v = scale * rng.gen_range(0.5..2.0);
        }
        for v in energy.material_mut(m) {
            *v = rng.gen_range(1.0..10.0);
        }
    }
}

fn fill_indicators(rng: &mut StdRng, indicators: &mut IndicatorMatrix, ratio: f64) {
    for m in 0..indicators.num_materials() {
        let empty = if ratio < 0.0 { rng.gen_range(0.0..1.0) } else { ratio };
        for flag in indicators.column_mut(m) {
            *flag = !rng.gen_bool(empty);
        }
    }
}

fn material_slots(config: &EvaluationConfig, stores: &[MemoryStore]) -> Vec<MaterialSlot> {
    (0..config.num_materials)
        .map(|m| {
            let scale = 1.0 + m as Real;
            let law = IdealGas {
                gamma: 1.4 + 0.05 * m as Real,
                cv: 1.0 + 0.5 * m as Real,
                budget_bytes: config.partition_budget_bytes,
            };
            let slot = MaterialSlot::new(
                Box::new(DensityWindow { lo: 0.6 * scale, hi: 1.8 * scale }),
                Box::new(BiasedSurrogate { law: law.clone(), bias: 1e-3 }),
                Box::new(law),
            );
            match stores.get(m) {
                Some(store) => slot.with_store(Box::new(store.clone())),
                None => slot,
            }
        })
        .collect()
}

fn cmd_run(cli: &Cli, config: EvaluationConfig) -> Result<()> {
    let broker = MemoryBroker::new(config.device_execution)?;
    let stores: Vec<MemoryStore> = if cli.store {
        (0..config.num_materials).map(|_| MemoryStore::new()).collect()
    } else {
        Vec::new()
    };
    let mut evaluator = Evaluator::new(config.clone(), broker, material_slots(&config, &stores))?;

    let (q, e, m) = (config.num_qpts, config.num_elements, config.num_materials);
    let mut rng = StdRng::seed_from_u64(cli.seed);
    let mut density = FieldTensor::zeros(q, e, m);
    let mut energy = FieldTensor::zeros(q, e, m);
    let mut indicators = IndicatorMatrix::new(e, m);
    let mut outputs = EosFields::filled(q, e, m, 0.0);

    let start = Instant::now();
    let mut reports: Vec<EvaluationReport> = Vec::with_capacity(cli.stop_cycle);
    for cycle in 0..cli.stop_cycle {
        fill_inputs(&mut rng, &mut density, &mut energy);
        fill_indicators(&mut rng, &mut indicators, cli.empty_element_ratio);
        let report = evaluator.evaluate(&density, &energy, &indicators, &mut outputs)?;
        tracing::info!(
            cycle,
            sparse = report.count(Strategy::Sparse),
            dense = report.count(Strategy::Dense),
            skipped = report.count(Strategy::Skipped),
            "cycle complete"
        );
        reports.push(report);
    }
    let elapsed = start.elapsed().as_secs_f64();

    let strategy_totals = |s: Strategy| reports.iter().map(|r| r.count(s)).sum::<usize>();
    let output_json = serde_json::json!({
        "config": config,
        "seed": cli.seed,
        "cycles": reports.len(),
        "sparse_evaluations": strategy_totals(Strategy::Sparse),
        "dense_evaluations": strategy_totals(Strategy::Dense),
        "skipped_evaluations": strategy_totals(Strategy::Skipped),
        "active_elements": reports.iter().map(EvaluationReport::active_elements).sum::<usize>(),
        "scratch_allocations": evaluator.broker().allocation_count(),
        "stored_samples": stores.iter().map(MemoryStore::samples).sum::<usize>(),
        "pressure_sum": outputs.pressure.as_slice().iter().sum::<Real>(),
        "last_cycle": reports.last(),
        "elapsed_s": elapsed,
    });
    write_json(cli.output.as_ref(), output_json)
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
