//! `selfmask-cli` – robot self filter for point-cloud files.
//!
//! ```text
//! selfmask <cloud.json> [--config <path>] [--output <path>]
//! ```
//!
//! 1. Loads `~/.selfmask/config.toml` (or `--config`), the robot description
//!    it names, and its static transforms.
//! 2. Reads the cloud and labels every point inside / outside / shadow.
//!    Shadow labelling needs a sensor frame or position in the config;
//!    without one only containment is checked.
//! 3. Writes the JSON result to stdout (or `--output`) and a summary to
//!    stderr.

mod cloud;
mod config;

use std::path::{Path, PathBuf};

use colored::Colorize;
use selfmask_filter::{RobotDescription, SelfMask};
use selfmask_types::LinkInfo;
use tracing::{info, warn};

use crate::cloud::MaskOutput;
use crate::config::Config;

const USAGE: &str = "usage: selfmask <cloud.json> [--config <path>] [--output <path>]";

fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG selects the level (default "info"); SELFMASK_LOG_FORMAT=json
    // switches to newline-delimited JSON.  Logs go to stderr so stdout stays
    // a clean JSON result.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("SELFMASK_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }

    let result = parse_args(std::env::args().skip(1)).and_then(|args| {
        let (cfg, config_dir) = config::load(args.config.as_deref())?;
        let output = run(&cfg, config_dir.as_deref(), &args)?;
        Ok((args, output))
    });

    match result {
        Ok((args, output)) => print_summary(&args, &output),
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            std::process::exit(1);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Arguments
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct Args {
    cloud: PathBuf,
    config: Option<PathBuf>,
    output: Option<PathBuf>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args, String> {
    let mut cloud = None;
    let mut config = None;
    let mut output = None;
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "--output" => {
                let value = args
                    .next()
                    .ok_or_else(|| format!("{} needs a path\n{}", arg, USAGE))?;
                if arg == "--config" {
                    config = Some(PathBuf::from(value));
                } else {
                    output = Some(PathBuf::from(value));
                }
            }
            "-h" | "--help" => return Err(USAGE.to_string()),
            flag if flag.starts_with("--") => {
                return Err(format!("unknown option {}\n{}", flag, USAGE));
            }
            _ if cloud.is_none() => cloud = Some(PathBuf::from(arg)),
            _ => return Err(format!("unexpected argument {}\n{}", arg, USAGE)),
        }
    }

    Ok(Args {
        cloud: cloud.ok_or_else(|| USAGE.to_string())?,
        config,
        output,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Masking
// ─────────────────────────────────────────────────────────────────────────────

fn run(cfg: &Config, config_dir: Option<&Path>, args: &Args) -> Result<MaskOutput, String> {
    if cfg.description.as_os_str().is_empty() {
        return Err(
            "No robot description configured (set `description` or SELFMASK_DESCRIPTION)"
                .to_string(),
        );
    }
    let description_path = cfg.description_path(config_dir);
    let robot = RobotDescription::load(&description_path).map_err(|e| e.to_string())?;

    // Without an explicit link list every link of the description is masked.
    let links: Vec<LinkInfo> = if cfg.links.is_empty() {
        robot
            .links
            .iter()
            .map(|l| LinkInfo::new(l.name.clone(), 1.0, 0.0))
            .collect()
    } else {
        cfg.links.clone()
    };

    let mut mask = SelfMask::new(cfg.transform_buffer()).with_lookup_timeout(cfg.lookup_timeout());
    let report = mask.configure(&links, &robot).map_err(|e| e.to_string())?;
    if report.is_degraded() {
        warn!(description = %description_path.display(), "no bodies configured; every point will be outside");
    }

    let cloud = cloud::read_cloud(&args.cloud)?;
    let mut shadow_points = Vec::new();
    let labels = match cfg.sensor_origin() {
        Some(sensor) => mask.mask_intersection(&cloud, &sensor, cfg.min_sensor_distance, |hit| {
            shadow_points.push(hit)
        }),
        None => mask.mask_containment(&cloud),
    };
    info!(
        points = labels.len(),
        bodies = report.body_count,
        diagnostics = mask.last_diagnostics().len(),
        "cloud processed"
    );

    let output = MaskOutput::new(&labels, shadow_points);
    if let Some(json) = cloud::write_output(&output, args.output.as_deref())? {
        println!("{}", json);
    }
    Ok(output)
}

fn print_summary(args: &Args, output: &MaskOutput) {
    let c = output.counts;
    eprintln!(
        "  {} {} points: {} inside, {} outside, {} shadow",
        "✓".green().bold(),
        output.labels.len(),
        c.inside.to_string().red(),
        c.outside.to_string().green(),
        c.shadow.to_string().yellow(),
    );
    if let Some(path) = &args.output {
        eprintln!("  Result written to {}", path.display().to_string().bold());
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
