use std::fmt;
use std::str::FromStr;

use crate::geometry::{ObservationGeometry, Vec3};

/// Wavelength-band indices (µm) listed in every observation file.
pub const BANDS: [u32; 16] = [5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20];

/// Raw simulator flux (Jy) to persisted flux (µJy).
pub const MICRO: f64 = 1e6;

/// Column header of a result table.
pub fn header() -> String {
    let mut cols = vec![
        "idx", "D_km", "lam", "beta", "x1", "y1", "z1", "x2", "y2", "z2",
    ]
    .into_iter()
    .map(str::to_string)
    .collect::<Vec<_>>();
    cols.extend(BANDS.iter().map(|b| format!("flux{}", b)));
    cols.join(" ")
}

/// One completed Monte Carlo trial. Only ever built from a fully parsed simulator run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialRecord {
    pub index: usize,
    pub diameter_km: f64,
    pub lam: f64,
    pub beta: f64,
    pub geometry: ObservationGeometry,
    /// Per-band flux in µJy, ordered as [`BANDS`]
    pub fluxes: Vec<f64>,
}

impl TrialRecord {
    pub fn flux(&self, band: u32) -> Option<f64> {
        BANDS
            .iter()
            .position(|&b| b == band)
            .and_then(|k| self.fluxes.get(k).copied())
    }
}

impl fmt::Display for TrialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (a, o) = (self.geometry.asteroid, self.geometry.observer);
        write!(
            f,
            "{} {} {} {} {} {} {} {} {} {}",
            self.index, self.diameter_km, self.lam, self.beta, a.x, a.y, a.z, o.x, o.y, o.z
        )?;
        for flux in &self.fluxes {
            write!(f, " {}", flux)?;
        }
        Ok(())
    }
}

impl FromStr for TrialRecord {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let expected = 10 + BANDS.len();
        if tokens.len() != expected {
            return Err(format!("expected {} columns, got {}", expected, tokens.len()));
        }
        let index = tokens[0]
            .parse::<usize>()
            .map_err(|_| format!("bad trial index `{}`", tokens[0]))?;
        let values = tokens[1..]
            .iter()
            .map(|t| t.parse::<f64>().map_err(|_| format!("`{}` is not a number", t)))
            .collect::<Result<Vec<f64>, String>>()?;

        Ok(TrialRecord {
            index,
            diameter_km: values[0],
            lam: values[1],
            beta: values[2],
            geometry: ObservationGeometry {
                asteroid: Vec3::new(values[3], values[4], values[5]),
                observer: Vec3::new(values[6], values[7], values[8]),
            },
            fluxes: values[9..].to_vec(),
        })
    }
}
