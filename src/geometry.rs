//! Observation/ephemeris geometry files.
//!
//! The observation file carries the Sun-asteroid vector on its fourth line and
//! the asteroid-observer vector on its fifth line; trial records copy both from
//! there rather than from the simulator output.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;
use serde::Deserialize;

use crate::error::TpmError;
use crate::trial::BANDS;

/// Astronomical unit in km.
pub const AU_KM: f64 = 149_597_870.7;

/// Epochs written into the ephemeris file. The observation sits at `EPOCH_OBS`
/// with a margin on both sides for the simulator's interpolation.
const EPOCH_OBS: f64 = 5.0;
const EPOCH_END: f64 = 5.0001;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(&self, other: &Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn scale(&self, k: f64) -> Vec3 {
        Vec3::new(self.x * k, self.y * k, self.z * k)
    }

    pub fn sub(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

/// Asteroid and observer vectors of one observation, in au.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ObservationGeometry {
    pub asteroid: Vec3,
    pub observer: Vec3,
}

/// Heliocentric distance, observer distance and phase angle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aspect {
    pub r: f64,
    pub delta: f64,
    /// Phase angle in degrees
    pub alpha: f64,
}

impl ObservationGeometry {
    pub fn aspect(&self) -> Aspect {
        let r = self.asteroid.norm();
        let delta = self.observer.norm();
        let cos_alpha = (self.asteroid.dot(&self.observer) / (r * delta)).clamp(-1.0, 1.0);
        Aspect {
            r,
            delta,
            alpha: cos_alpha.acos().to_degrees(),
        }
    }

    /// Object mirrored through the observer: same observer distance, opposite side.
    pub fn pseudo(&self) -> Self {
        Self {
            asteroid: self.asteroid.sub(&self.observer.scale(2.0)),
            observer: self.observer.scale(-1.0),
        }
    }
}

fn parse_vector_line(path: &Path, lines: &[&str], index: usize) -> Result<Vec3, TpmError> {
    let line = lines.get(index).ok_or_else(|| {
        TpmError::format(path, format!("missing line {} (found {} lines)", index + 1, lines.len()))
    })?;
    let values = line
        .split_whitespace()
        .map(|tok| {
            tok.parse::<f64>().map_err(|_| {
                TpmError::format(path, format!("line {}: `{}` is not a number", index + 1, tok))
            })
        })
        .collect::<Result<Vec<f64>, TpmError>>()?;
    match values.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => Err(TpmError::format(
            path,
            format!("line {}: expected 3 components, got {}", index + 1, values.len()),
        )),
    }
}

/// Reads the two position vectors back from an observation file.
pub fn read_observation_geometry(path: &Path) -> Result<ObservationGeometry, TpmError> {
    let text = fs::read_to_string(path).map_err(|e| TpmError::io(path, e))?;
    let lines: Vec<&str> = text.lines().collect();
    Ok(ObservationGeometry {
        asteroid: parse_vector_line(path, &lines, 3)?,
        observer: parse_vector_line(path, &lines, 4)?,
    })
}

pub fn write_ephemeris_file(path: &Path, asteroid: Vec3) -> Result<(), TpmError> {
    let write = || -> std::io::Result<()> {
        let mut w = BufWriter::new(fs::File::create(path)?);
        for t in [0.0, EPOCH_OBS, EPOCH_END] {
            writeln!(w, "{} {} {} {}", t, asteroid.x, asteroid.y, asteroid.z)?;
        }
        w.flush()
    };
    write().map_err(|e| TpmError::io(path, e))
}

/// One observation with a placeholder `<band> 1 1` line per wavelength band.
pub fn write_observation_file(path: &Path, geometry: &ObservationGeometry) -> Result<(), TpmError> {
    let write = || -> std::io::Result<()> {
        let mut w = BufWriter::new(fs::File::create(path)?);
        let (a, o) = (geometry.asteroid, geometry.observer);
        writeln!(w, "1")?;
        writeln!(w)?;
        writeln!(w, "{} {}", EPOCH_OBS, BANDS.len())?;
        writeln!(w, "{} {} {}", a.x, a.y, a.z)?;
        writeln!(w, "{} {} {}", o.x, o.y, o.z)?;
        for band in BANDS {
            writeln!(w, "{} 1 1", band)?;
        }
        w.flush()
    };
    write().map_err(|e| TpmError::io(path, e))
}

/// One row of the pipe-separated position table, in km.
#[derive(Debug, Deserialize)]
struct PositionRecord {
    #[serde(rename = "X")]
    x: f64,
    #[serde(rename = "Y")]
    y: f64,
    #[serde(rename = "Z")]
    z: f64,
    #[serde(rename = "MirX")]
    mir_x: f64,
    #[serde(rename = "MirY")]
    mir_y: f64,
    #[serde(rename = "MirZ")]
    mir_z: f64,
}

/// Reads the position table: first line is a banner, second the header.
pub fn read_positions(path: &Path) -> Result<Vec<ObservationGeometry>, TpmError> {
    let text = fs::read_to_string(path).map_err(|e| TpmError::io(path, e))?;
    let body = text.split_once('\n').map(|(_, rest)| rest).unwrap_or("");

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'|')
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(body.as_bytes());

    reader
        .deserialize::<PositionRecord>()
        .map(|row| {
            let row = row.map_err(|e| TpmError::format(path, e.to_string()))?;
            Ok(ObservationGeometry {
                asteroid: Vec3::new(row.x, row.y, row.z).scale(1.0 / AU_KM),
                observer: Vec3::new(row.mir_x, row.mir_y, row.mir_z).scale(1.0 / AU_KM),
            })
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct GeometryFiles {
    pub obs: PathBuf,
    pub eph: PathBuf,
}

/// Writes `eph_NNN.txt` / `obs_NNN.txt` for every row of the position table.
pub fn generate_geometry_files(
    positions: &Path,
    outeph: &Path,
    outobs: &Path,
    pseudo: bool,
) -> Result<Vec<GeometryFiles>, TpmError> {
    fs::create_dir_all(outeph).map_err(|e| TpmError::io(outeph, e))?;
    fs::create_dir_all(outobs).map_err(|e| TpmError::io(outobs, e))?;

    let rows = read_positions(positions)?;
    let mut written = Vec::with_capacity(rows.len());
    for (idx, geometry) in rows.iter().enumerate() {
        let geometry = if pseudo { geometry.pseudo() } else { *geometry };
        let label = format!("{:03}", idx + 1);
        info!(
            "obs & eph files {}: ast=({}, {}, {}) obs=({}, {}, {})",
            label,
            geometry.asteroid.x,
            geometry.asteroid.y,
            geometry.asteroid.z,
            geometry.observer.x,
            geometry.observer.y,
            geometry.observer.z
        );

        let files = GeometryFiles {
            obs: outobs.join(format!("obs_{}.txt", label)),
            eph: outeph.join(format!("eph_{}.txt", label)),
        };
        write_ephemeris_file(&files.eph, geometry.asteroid)?;
        write_observation_file(&files.obs, &geometry)?;
        written.push(files);
    }
    Ok(written)
}
