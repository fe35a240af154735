use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};

use crate::config::loader::AccountingConfig;
use crate::config::presets::BudgetPresets;
use crate::config::types::{CostLane, CostLimits, UnitStatus};
use crate::config::validator;
use crate::core::accountant;
use crate::core::host::{HostConfig, SandboxHost};
use crate::observability::{audit, metrics};
use crate::verdict::VerdictClassifier;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Append audit events as JSON lines to this file
    #[arg(long, global = true)]
    audit_log: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective limits and their envelope id
    Limits {
        /// Budget preset to start from
        #[arg(long)]
        preset: Option<String>,
        /// JSON budget file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List registered budget presets
    Presets,
    /// Validate a budget file
    Validate {
        /// JSON budget file
        #[arg(long)]
        config: PathBuf,
    },
    /// Run a synthetic unit that issues N charges on one lane
    Simulate {
        /// Lane to charge (allocation, jump, invocation, throw)
        #[arg(long)]
        lane: CostLane,
        /// Number of accounting calls the unit makes
        #[arg(long)]
        ops: u64,
        /// Element size of each array allocation (allocation lane only)
        #[arg(long, default_value_t = 1)]
        element_size: u32,
        /// Budget preset to start from
        #[arg(long)]
        preset: Option<String>,
        /// JSON budget file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print Prometheus metrics after the run
        #[arg(long)]
        metrics: bool,
    },
}

pub fn run() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let presets = BudgetPresets::new();

    match cli.command {
        Commands::Limits { preset, config } => {
            let config = resolve_config(config.as_deref(), preset)?;
            let limits = config.effective_limits(&presets)?;
            print_json(&json!({
                "preset": config.preset_id(),
                "limits": limits,
                "envelope_id": limits.envelope_id(),
            }))
        }
        Commands::Presets => {
            let listing: Vec<_> = presets
                .list()
                .into_iter()
                .filter_map(|id| presets.get(id))
                .map(|envelope| {
                    json!({
                        "id": envelope.id,
                        "name": envelope.name,
                        "version": envelope.version,
                        "limits": envelope.limits,
                        "envelope_id": envelope.limits.envelope_id(),
                        "description": envelope.description,
                    })
                })
                .collect();
            print_json(&json!(listing))
        }
        Commands::Validate { config: path } => {
            let config = AccountingConfig::from_file(&path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            init_audit(cli.audit_log.or_else(|| config.audit_log.clone()))?;

            // Report every finding; the exit status carries the verdict.
            let result = validator::validate_config(
                &AccountingConfig {
                    strict_mode: false,
                    ..config.clone()
                },
                &presets,
            )?;
            print_json(&json!({
                "config": path,
                "valid": result.is_valid(),
                "strict_mode": config.strict_mode,
                "errors": result.errors,
                "warnings": result.warnings,
            }))?;
            if !result.is_valid() {
                anyhow::bail!("{} failed validation", path.display());
            }
            Ok(())
        }
        Commands::Simulate {
            lane,
            ops,
            element_size,
            preset,
            config,
            metrics: print_metrics,
        } => {
            let config = resolve_config(config.as_deref(), preset)?;
            init_audit(cli.audit_log.or_else(|| config.audit_log.clone()))?;
            let limits = config.effective_limits(&presets)?;
            validator::validate_limits(&limits, config.strict_mode)?;

            let status = simulate(limits, lane, ops, element_size)?;
            if print_metrics {
                print!("{}", metrics::global().export_prometheus());
            }
            if status == UnitStatus::BudgetExceeded {
                anyhow::bail!("unit terminated on the {} lane", lane);
            }
            Ok(())
        }
    }
}

fn resolve_config(path: Option<&Path>, preset: Option<String>) -> Result<AccountingConfig> {
    let mut config = match path {
        Some(path) => AccountingConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => AccountingConfig::default(),
    };
    if preset.is_some() {
        config.preset = preset;
    }
    Ok(config)
}

fn init_audit(path: Option<PathBuf>) -> Result<()> {
    audit::init_audit_log(path).context("failed to initialize audit log")
}

fn simulate(limits: CostLimits, lane: CostLane, ops: u64, element_size: u32) -> Result<UnitStatus> {
    let host = SandboxHost::start(HostConfig {
        limits,
        workers: 1,
        ..HostConfig::default()
    })?;

    let report = host
        .submit(move || {
            for _ in 0..ops {
                match lane {
                    CostLane::Allocation if element_size != 1 => {
                        accountant::record_array_allocation(1, element_size)
                    }
                    CostLane::Allocation => accountant::record_allocation("SimulatedObject"),
                    CostLane::Jump => accountant::record_jump(),
                    CostLane::Invocation => accountant::record_method_call(),
                    CostLane::Throw => accountant::record_throw(),
                }
            }
            ops
        })?
        .wait()?;

    let (status, provenance) = VerdictClassifier::classify(&report);
    print_json(&json!({
        "unit_id": report.unit_id,
        "status": status,
        "outcome": report.outcome,
        "provenance": provenance,
    }))?;
    Ok(status)
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
