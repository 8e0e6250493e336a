//! Campaign driver: geometry pairs x thermal inertia x cycles of parallel trials.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;

use crate::config;
use crate::error::TpmError;
use crate::external::CommandRunner;
use crate::io::{result_table_name, write_result_table};
use crate::pool::WorkerPool;
use crate::runtpm::{run_trial, TrialArgs, TrialContext};
use crate::spin::{SpinSample, SpinSampler};
use crate::trial::TrialRecord;

pub const MANIFEST_NAME: &str = "campaign_manifest.json";

#[derive(Debug, Clone, Serialize)]
pub struct CampaignReport {
    pub seed: u64,
    pub tables: Vec<PathBuf>,
    pub trials: usize,
    pub wall_time_ms: f64,
}

#[derive(Serialize)]
struct Manifest<'a> {
    tool_version: &'static str,
    timestamp_unix: u64,
    platform: &'static str,
    report: &'a CampaignReport,
    config_snapshot: &'a config::Root,
}

/// Runs `cycles` sequential batches of `pool.size()`-bounded trials over pre-drawn spins.
///
/// `samples` holds the whole cycle-major sample set; batch `c` consumes
/// `samples[c * workers..(c + 1) * workers]`. Trial indices restart at 0 in
/// every cycle. Records come back cycle-major, trial-minor.
pub fn run_cycles<R: CommandRunner + ?Sized>(
    runner: &R,
    pool: &WorkerPool,
    ctx: &TrialContext<'_>,
    samples: &[SpinSample],
    workers: usize,
    cycles: usize,
) -> Result<Vec<TrialRecord>, TpmError> {
    if workers == 0 || samples.len() != workers * cycles {
        return Err(TpmError::Config(format!(
            "{} spin samples cannot fill {} cycles of {} trials",
            samples.len(),
            cycles,
            workers
        )));
    }

    let mut results = Vec::with_capacity(samples.len());
    for (cycle, batch) in samples.chunks(workers).enumerate() {
        let args: Vec<TrialArgs> = batch
            .iter()
            .enumerate()
            .map(|(index, &spin)| TrialArgs { index, spin })
            .collect();

        let records = pool.run_batch(&args, |a| run_trial(runner, ctx, *a))?;
        results.extend(records);
        info!(
            "Cycle {}/{} for Gamma = {} ({}) completed.",
            cycle + 1,
            cycles,
            ctx.gamma,
            ctx.label
        );
    }
    Ok(results)
}

/// Runs the full campaign described by `cfg`.
///
/// Result tables of earlier (geometry, Γ) combinations stay on disk when a
/// later one fails.
pub fn run_campaign<R: CommandRunner + ?Sized>(cfg: &config::Root, runner: &R) -> Result<CampaignReport> {
    let paths = &cfg.paths;
    let campaign = &cfg.campaign;
    if paths.obs.len() != paths.eph.len() {
        return Err(TpmError::Config(format!(
            "got {} observation files but {} ephemeris files",
            paths.obs.len(),
            paths.eph.len()
        ))
        .into());
    }
    if paths.obs.is_empty() {
        warn!("no observation/ephemeris pairs given, nothing to run");
    }

    fs::create_dir_all(&paths.outdir)
        .with_context(|| format!("failed to create output dir {}", paths.outdir.display()))?;
    fs::create_dir_all(&paths.spindir)
        .with_context(|| format!("failed to create spin dir {}", paths.spindir.display()))?;

    let start = Instant::now();
    let mut sampler = SpinSampler::new(campaign.seed);
    info!("spin sampler seed = {}", sampler.seed());
    let pool = WorkerPool::new(campaign.workers)?;
    info!("worker pool: {} workers x {} cycles", pool.size(), campaign.cycles);
    let per_table = campaign.workers * campaign.cycles;

    let mut tables = Vec::new();
    for (n, (obs, eph)) in paths.obs.iter().zip(&paths.eph).enumerate() {
        let label = format!("{:03}", n + 1);
        for &gamma in &campaign.thermal_inertia {
            info!("Running simulations for Gamma = {} on {} ({})", gamma, obs.display(), label);
            let samples = sampler.draw(per_table);
            let ctx = TrialContext {
                settings: &cfg.runtpm,
                obj: &paths.obj,
                obs,
                eph,
                spindir: &paths.spindir,
                label: &label,
                gamma,
                rot_period_hr: campaign.rot_period_hr,
            };

            let records = run_cycles(runner, &pool, &ctx, &samples, campaign.workers, campaign.cycles)
                .with_context(|| format!("TPM run failed for Gamma = {}, geometry {}", gamma, label))?;

            let path = paths.outdir.join(result_table_name(gamma, &label));
            write_result_table(&path, &records)?;
            info!("{} trials written to {}", records.len(), path.display());
            tables.push(path);
        }
    }

    Ok(CampaignReport {
        seed: sampler.seed(),
        trials: tables.len() * per_table,
        tables,
        wall_time_ms: start.elapsed().as_secs_f64() * 1000.0,
    })
}

pub fn write_manifest(outdir: &Path, cfg: &config::Root, report: &CampaignReport) -> Result<PathBuf> {
    let manifest = Manifest {
        tool_version: env!("CARGO_PKG_VERSION"),
        timestamp_unix: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
        platform: std::env::consts::OS,
        report,
        config_snapshot: cfg,
    };
    let path = outdir.join(MANIFEST_NAME);
    let json = serde_json::to_string_pretty(&manifest)?;
    fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}
