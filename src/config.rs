use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Root {
    pub campaign: CampaignSection,
    pub paths: PathsSection,
    pub runtpm: RuntpmSection,
    pub fittm: FittmSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CampaignSection {
    /// Thermal inertia values, J m^-2 s^-1/2 K^-1
    pub thermal_inertia: Vec<u32>,
    /// Rotation period in hours
    pub rot_period_hr: f64,
    /// Trials per cycle, run concurrently (N)
    pub workers: usize,
    /// Sequential cycles per thermal inertia (M)
    pub cycles: usize,
    /// Spin sampler seed; drawn at random and logged when absent
    pub seed: Option<u64>,
}

impl Default for CampaignSection {
    fn default() -> Self {
        Self {
            thermal_inertia: vec![0, 50, 150, 300, 500, 1000],
            rot_period_hr: 0.0968,
            workers: 30,
            cycles: 10,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsSection {
    pub obj: PathBuf,
    pub obs: Vec<PathBuf>,
    pub eph: Vec<PathBuf>,
    /// Scratch directory for per-trial spin files
    pub spindir: PathBuf,
    pub outdir: PathBuf,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            obj: PathBuf::from("obj.txt"),
            obs: Vec::new(),
            eph: Vec::new(),
            spindir: PathBuf::from("spinfile"),
            outdir: PathBuf::from("tpmresult"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntpmSection {
    pub program: String,
    /// Record marker of flux lines in runtpm output
    pub marker: String,
    /// Body diameter passed with `-s`. Fluxes scale with D^2, so 1 km avoids losing digits.
    pub diameter_km: f64,
    pub emissivity: f64,
    pub bond_albedo: f64,
    pub crater_coverage: f64,
    pub crater_ratio: f64,
}

impl Default for RuntpmSection {
    fn default() -> Self {
        Self {
            program: "runtpm".to_string(),
            marker: "f>".to_string(),
            diameter_km: 1.0,
            emissivity: 0.9,
            bond_albedo: 0.039,
            crater_coverage: 0.0,
            crater_ratio: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FittmSection {
    pub program: String,
    pub marker: String,
    /// Absolute magnitude matching `d_true_km` at `albedo` (D=1 km, pv=0.1 -> H=18.118)
    pub h_mag: f64,
    pub slope: f64,
    pub emissivity: f64,
    /// Beaming parameter; the starting value when eta is fitted
    pub eta: f64,
    /// Geometric albedo
    pub albedo: f64,
    /// Flux uncertainty as a fraction of the flux
    pub flux_err_frac: f64,
    pub d_true_km: f64,
}

impl Default for FittmSection {
    fn default() -> Self {
        Self {
            program: "fittm".to_string(),
            marker: "o>".to_string(),
            h_mag: 18.118,
            slope: 0.15,
            emissivity: 0.9,
            eta: 1.0,
            albedo: 0.1,
            flux_err_frac: 0.1,
            d_true_km: 1.0,
        }
    }
}

impl Root {
    pub fn validate(&self) -> Result<()> {
        let c = &self.campaign;
        if c.thermal_inertia.is_empty() {
            bail!("campaign.thermal_inertia must list at least one value");
        }
        let unique: HashSet<u32> = c.thermal_inertia.iter().copied().collect();
        if unique.len() != c.thermal_inertia.len() {
            bail!("campaign.thermal_inertia contains duplicates (result files would collide)");
        }
        if !(c.rot_period_hr > 0.0) {
            bail!("campaign.rot_period_hr must be positive");
        }
        if c.workers == 0 {
            bail!("campaign.workers must be >= 1");
        }
        if c.cycles == 0 {
            bail!("campaign.cycles must be >= 1");
        }

        let r = &self.runtpm;
        if r.program.is_empty() || r.marker.is_empty() {
            bail!("runtpm.program and runtpm.marker must be non-empty");
        }
        if !(r.diameter_km > 0.0) {
            bail!("runtpm.diameter_km must be positive");
        }
        if !(0.0..=1.0).contains(&r.emissivity) {
            bail!("runtpm.emissivity must be in [0, 1]");
        }
        if !(0.0..=1.0).contains(&r.bond_albedo) {
            bail!("runtpm.bond_albedo must be in [0, 1]");
        }
        if !(0.0..=1.0).contains(&r.crater_coverage) {
            bail!("runtpm.crater_coverage must be in [0, 1]");
        }
        if r.crater_ratio < 0.0 {
            bail!("runtpm.crater_ratio must be non-negative");
        }

        let f = &self.fittm;
        if f.program.is_empty() || f.marker.is_empty() {
            bail!("fittm.program and fittm.marker must be non-empty");
        }
        if !(0.0..=1.0).contains(&f.emissivity) {
            bail!("fittm.emissivity must be in [0, 1]");
        }
        if !(0.0..=1.0).contains(&f.albedo) {
            bail!("fittm.albedo must be in [0, 1]");
        }
        if !(f.eta > 0.0) {
            bail!("fittm.eta must be positive");
        }
        if f.flux_err_frac < 0.0 {
            bail!("fittm.flux_err_frac must be non-negative");
        }

        Ok(())
    }
}
