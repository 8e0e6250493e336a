//! Diameter fitting of campaign results with `fittm` (NEATM / FRM).
//!
//! Single-threaded: one `fittm` call per result-table row.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use log::info;

use crate::config::FittmSection;
use crate::error::TpmError;
use crate::external::{marker_tokens, token_f64, CommandRunner, Invocation};
use crate::geometry::Aspect;
use crate::io::{parse_result_table_name, read_result_table, result_table_name, FitTableWriter};
use crate::trial::{TrialRecord, MICRO};

const DIAMETER_TOKEN: usize = 1;
const ETA_TOKEN: usize = 5;
const PROGRESS_EVERY: usize = 1000;

/// Bands used when eta is fitted: 5 µm then 8 µm.
pub const FIT_ETA_BANDS: [u32; 2] = [5, 8];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Model {
    Neatm,
    Frm,
}

/// fittm model switch (`-m`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitMode {
    NeatmFitEta,
    NeatmFixedEta,
    /// FRM has no beaming parameter; fittm reports eta = 1.
    Frm,
}

impl FitMode {
    pub fn new(model: Model, fit_eta: bool) -> Result<Self, TpmError> {
        match (model, fit_eta) {
            (Model::Neatm, true) => Ok(FitMode::NeatmFitEta),
            (Model::Neatm, false) => Ok(FitMode::NeatmFixedEta),
            (Model::Frm, false) => Ok(FitMode::Frm),
            (Model::Frm, true) => Err(TpmError::Config("eta cannot be fitted with FRM".into())),
        }
    }

    pub fn model_id(self) -> u8 {
        match self {
            FitMode::NeatmFitEta => 0,
            FitMode::NeatmFixedEta => 1,
            FitMode::Frm => 3,
        }
    }

    pub fn model_name(self) -> &'static str {
        match self {
            FitMode::Frm => "FRM",
            _ => "NEATM",
        }
    }

    pub fn fits_eta(self) -> bool {
        self == FitMode::NeatmFitEta
    }
}

#[derive(Debug, Clone)]
pub struct FitOptions {
    pub mode: FitMode,
    /// Band (µm) used by the single-band modes
    pub band: u32,
    pub eta: f64,
}

impl FitOptions {
    pub fn bands(&self) -> Vec<u32> {
        if self.mode.fits_eta() {
            FIT_ETA_BANDS.to_vec()
        } else {
            vec![self.band]
        }
    }
}

/// One fitted trial.
#[derive(Debug, Clone, PartialEq)]
pub struct FitRow {
    pub label: String,
    pub gamma: u32,
    pub index: usize,
    pub lam: f64,
    pub beta: f64,
    pub flux5: f64,
    pub flux8: f64,
    pub aspect: Aspect,
    pub diameter_km: f64,
    pub d_true_km: f64,
    pub model: &'static str,
    pub eta: f64,
    pub eta_fitted: bool,
}

/// `fittm -m <id>` fed `<H> <G> <emissivity> <eta> <pv> <r> <delta> <alpha>` then
/// `<wavelength> <flux Jy> <error Jy>` per band.
pub fn build_fit_invocation(
    settings: &FittmSection,
    mode: FitMode,
    eta: f64,
    aspect: &Aspect,
    bands: &[(u32, f64)],
) -> Invocation {
    let mut stdin = format!(
        "{} {} {} {} {} {} {} {}",
        settings.h_mag,
        settings.slope,
        settings.emissivity,
        eta,
        settings.albedo,
        aspect.r,
        aspect.delta,
        aspect.alpha
    );
    for &(band, flux_ujy) in bands {
        let flux = flux_ujy / MICRO;
        let err = flux * settings.flux_err_frac;
        stdin.push_str(&format!(" {} {} {}", band as f64, flux, err));
    }
    Invocation {
        program: settings.program.clone(),
        args: vec!["-m".to_string(), mode.model_id().to_string()],
        stdin,
    }
}

/// Returns (diameter km, eta) from fittm stdout.
pub fn parse_fit_output(
    stdout: &str,
    marker: &str,
    invocation: &Invocation,
) -> Result<(f64, f64), TpmError> {
    let tokens = marker_tokens(stdout, marker);
    if tokens.is_empty() {
        return Err(TpmError::EmptyOutput {
            command: invocation.to_string(),
        });
    }
    let diameter = token_f64(&tokens, DIAMETER_TOKEN, invocation)?;
    let eta = token_f64(&tokens, ETA_TOKEN, invocation)?;
    Ok((diameter, eta))
}

pub fn fit_record<R: CommandRunner + ?Sized>(
    runner: &R,
    settings: &FittmSection,
    opts: &FitOptions,
    label: &str,
    gamma: u32,
    record: &TrialRecord,
) -> Result<FitRow, TpmError> {
    let aspect = record.geometry.aspect();
    let bands = opts
        .bands()
        .into_iter()
        .map(|band| {
            record
                .flux(band)
                .map(|f| (band, f))
                .ok_or_else(|| TpmError::Config(format!("no {} µm band in result tables", band)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let invocation = build_fit_invocation(settings, opts.mode, opts.eta, &aspect, &bands);
    let output = runner.run(&invocation)?;
    let (diameter_km, eta) = parse_fit_output(&output.stdout, &settings.marker, &invocation)?;

    Ok(FitRow {
        label: label.to_string(),
        gamma,
        index: record.index,
        lam: record.lam,
        beta: record.beta,
        flux5: record.flux(5).unwrap_or(f64::NAN),
        flux8: record.flux(8).unwrap_or(f64::NAN),
        aspect,
        diameter_km,
        d_true_km: settings.d_true_km,
        model: opts.mode.model_name(),
        eta,
        eta_fitted: opts.mode.fits_eta(),
    })
}

/// Geometry labels for which `resdir` holds at least one result table, sorted.
pub fn discover_labels(resdir: &Path) -> Result<Vec<String>, TpmError> {
    let mut labels = BTreeSet::new();
    for entry in fs::read_dir(resdir).map_err(|e| TpmError::io(resdir, e))? {
        let entry = entry.map_err(|e| TpmError::io(resdir, e))?;
        if let Some((_, label)) = entry.file_name().to_str().and_then(parse_result_table_name) {
            labels.insert(label);
        }
    }
    Ok(labels.into_iter().collect())
}

/// Fits every row of every (label, Γ) table and writes one combined table to `out`.
#[allow(clippy::too_many_arguments)]
pub fn run_fits<R: CommandRunner + ?Sized>(
    runner: &R,
    settings: &FittmSection,
    opts: &FitOptions,
    resdir: &Path,
    labels: &[String],
    gammas: &[u32],
    out: &Path,
) -> Result<usize> {
    let mut tables: Vec<(String, u32, Vec<TrialRecord>)> = Vec::new();
    for label in labels {
        info!("READ results of OBJ{}", label);
        for &gamma in gammas {
            let path: PathBuf = resdir.join(result_table_name(gamma, label));
            let records = read_result_table(&path)?;
            tables.push((label.clone(), gamma, records));
        }
    }

    let total: usize = tables.iter().map(|(_, _, r)| r.len()).sum();
    info!(
        "Fitting {} rows with {} (H={}, eta={}, fit eta: {})",
        total,
        opts.mode.model_name(),
        settings.h_mag,
        opts.eta,
        opts.mode.fits_eta()
    );

    let mut w = FitTableWriter::create(out)?;
    w.write_header()?;
    let mut done = 0;
    for (label, gamma, records) in &tables {
        for record in records {
            if done % PROGRESS_EVERY == 0 {
                info!("  {}/{}", done, total);
            }
            let row = fit_record(runner, settings, opts, label, *gamma, record)
                .with_context(|| format!("fit failed for {} (Gamma = {}, trial {})", label, gamma, record.index))?;
            w.write_row(&row)?;
            done += 1;
        }
    }
    w.flush()?;
    info!("{} fitted rows written to {}", done, out.display());
    Ok(done)
}
