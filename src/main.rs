mod campaign;
mod config;
mod error;
mod external;
mod fitting;
mod geometry;
mod io;
mod pool;
mod runtpm;
mod spin;
mod trial;


use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use crate::external::ProcessRunner;
use crate::fitting::{FitMode, FitOptions, Model};

#[derive(Parser, Debug)]
#[command(name = "neomir-tpm")]
#[command(version)]
#[command(about = "NEOMIR thermophysical-model campaign: Monte Carlo spin poles over runtpm, diameters via fittm")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the TPM campaign over all geometries and thermal inertias
    Run {
        /// Observation files
        #[arg(long, num_args = 1..)]
        obs: Vec<PathBuf>,
        /// Ephemeris files, one per observation file
        #[arg(long, num_args = 1..)]
        eph: Vec<PathBuf>,
        /// Object (shape) file
        #[arg(long)]
        obj: Option<PathBuf>,
        /// Thermal inertia values
        #[arg(long, num_args = 1..)]
        gamma: Vec<u32>,
        /// Rotation period in hours
        #[arg(long)]
        rot_period_hr: Option<f64>,
        /// Directory for per-trial spin files
        #[arg(long)]
        spindir: Option<PathBuf>,
        /// Directory for result tables
        #[arg(long)]
        outdir: Option<PathBuf>,
        /// Trials per cycle, run in parallel
        #[arg(long)]
        workers: Option<usize>,
        /// Cycles per thermal inertia
        #[arg(long)]
        cycles: Option<usize>,
        /// Spin sampler seed
        #[arg(long)]
        seed: Option<u64>,
        /// Write a JSON campaign manifest next to the tables
        #[arg(long)]
        json: bool,
    },
    /// Write obs/eph files from a pipe-separated position table (km)
    Geometry {
        #[arg(long, default_value = "position.txt")]
        pos: PathBuf,
        #[arg(long, default_value = "ephemfile")]
        outeph: PathBuf,
        #[arg(long, default_value = "obsfile")]
        outobs: PathBuf,
        /// Mirror every object through the observer
        #[arg(long)]
        pseudo: bool,
    },
    /// Fit diameters to campaign results with fittm
    Fit {
        /// Geometry labels (object indices) to fit
        #[arg(long, num_args = 1.., default_values_t = [1u32])]
        idx_obj: Vec<u32>,
        /// Fit every label found in the result directory
        #[arg(long)]
        all: bool,
        #[arg(long, value_enum, default_value = "neatm")]
        model: Model,
        /// Fit eta (NEATM only, uses the 5 and 8 micron bands)
        #[arg(long)]
        fit_eta: bool,
        /// Beaming parameter
        #[arg(long)]
        eta: Option<f64>,
        /// Band (micron) used when eta is fixed
        #[arg(long, default_value = "8")]
        band: u32,
        /// Thermal inertia tables to read (defaults to the campaign list)
        #[arg(long, num_args = 1..)]
        gamma: Vec<u32>,
        #[arg(long, default_value = "tpmresult")]
        resdir: PathBuf,
        #[arg(long, default_value = "NEATM_res.txt")]
        out: String,
        #[arg(long, default_value = "data")]
        outdir: PathBuf,
    },
    /// Validate a configuration file
    Validate,
    /// Print version information
    Version,
}

fn load_config(path: Option<&PathBuf>) -> Result<config::Root> {
    let cfg = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str(&text)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => config::Root::default(),
    };
    Ok(cfg)
}

fn validate_config(path: Option<&PathBuf>) -> Result<()> {
    let path = path.context("--config required for validate")?;
    let cfg = load_config(Some(path))?;
    cfg.validate()?;

    info!("config valid: {}", path.display());
    info!(
        "  campaign: Gamma={:?} P={} h, {} workers x {} cycles, seed={:?}",
        cfg.campaign.thermal_inertia,
        cfg.campaign.rot_period_hr,
        cfg.campaign.workers,
        cfg.campaign.cycles,
        cfg.campaign.seed
    );
    info!(
        "  geometry: {} obs / {} eph files, obj={}",
        cfg.paths.obs.len(),
        cfg.paths.eph.len(),
        cfg.paths.obj.display()
    );
    info!(
        "  runtpm: D={} km, emissivity={}, A={}",
        cfg.runtpm.diameter_km, cfg.runtpm.emissivity, cfg.runtpm.bond_albedo
    );
    Ok(())
}

fn print_version() {
    println!("neomir-tpm {}", env!("CARGO_PKG_VERSION"));
    println!("  Platform:      {}", std::env::consts::OS);
    println!("  Architecture:  {}", std::env::consts::ARCH);
    println!("  Bands (um):    {:?}", trial::BANDS);
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            print_version();
            Ok(())
        }
        Commands::Validate => validate_config(args.config.as_ref()),
        Commands::Geometry {
            pos,
            outeph,
            outobs,
            pseudo,
        } => {
            let files = geometry::generate_geometry_files(&pos, &outeph, &outobs, pseudo)?;
            for f in &files {
                info!("  {} {}", f.obs.display(), f.eph.display());
            }
            info!("wrote {} obs/eph pairs", files.len());
            Ok(())
        }
        Commands::Run {
            obs,
            eph,
            obj,
            gamma,
            rot_period_hr,
            spindir,
            outdir,
            workers,
            cycles,
            seed,
            json,
        } => {
            let mut cfg = load_config(args.config.as_ref())?;
            if !obs.is_empty() {
                cfg.paths.obs = obs;
            }
            if !eph.is_empty() {
                cfg.paths.eph = eph;
            }
            if !gamma.is_empty() {
                cfg.campaign.thermal_inertia = gamma;
            }
            if let Some(obj) = obj {
                cfg.paths.obj = obj;
            }
            if let Some(p) = rot_period_hr {
                cfg.campaign.rot_period_hr = p;
            }
            if let Some(dir) = spindir {
                cfg.paths.spindir = dir;
            }
            if let Some(dir) = outdir {
                cfg.paths.outdir = dir;
            }
            if let Some(n) = workers {
                cfg.campaign.workers = n;
            }
            if let Some(m) = cycles {
                cfg.campaign.cycles = m;
            }
            if seed.is_some() {
                cfg.campaign.seed = seed;
            }
            cfg.validate()?;

            let report = campaign::run_campaign(&cfg, &ProcessRunner)?;
            info!(
                "campaign complete: {} tables, {} trials in {:.1} s (seed {})",
                report.tables.len(),
                report.trials,
                report.wall_time_ms / 1000.0,
                report.seed
            );
            if json {
                let path = campaign::write_manifest(&cfg.paths.outdir, &cfg, &report)?;
                info!("JSON manifest: {}", path.display());
            }
            Ok(())
        }
        Commands::Fit {
            idx_obj,
            all,
            model,
            fit_eta,
            eta,
            band,
            gamma,
            resdir,
            out,
            outdir,
        } => {
            let cfg = load_config(args.config.as_ref())?;
            cfg.validate()?;

            let opts = FitOptions {
                mode: FitMode::new(model, fit_eta)?,
                band,
                eta: eta.unwrap_or(cfg.fittm.eta),
            };
            let labels = if all {
                fitting::discover_labels(&resdir)?
            } else {
                idx_obj.iter().map(|i| format!("{:03}", i)).collect()
            };
            let gammas = if gamma.is_empty() {
                cfg.campaign.thermal_inertia.clone()
            } else {
                gamma
            };

            fs::create_dir_all(&outdir)
                .with_context(|| format!("failed to create {}", outdir.display()))?;
            let out_path = outdir.join(out);
            fitting::run_fits(&ProcessRunner, &cfg.fittm, &opts, &resdir, &labels, &gammas, &out_path)?;
            Ok(())
        }
    }
}
