use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::TpmError;
use crate::fitting::FitRow;
use crate::trial::{self, TrialRecord};

/// `TI<Γ>_res_<label>.txt`
pub fn result_table_name(gamma: u32, label: &str) -> String {
    format!("TI{}_res_{}.txt", gamma, label)
}

/// Inverse of [`result_table_name`].
pub fn parse_result_table_name(name: &str) -> Option<(u32, String)> {
    let stem = name.strip_suffix(".txt")?;
    let (ti, label) = stem.split_once("_res_")?;
    let gamma = ti.strip_prefix("TI")?.parse().ok()?;
    if label.is_empty() {
        return None;
    }
    Some((gamma, label.to_string()))
}

/// Space-separated writer for one result table. Creating it truncates any earlier file.
pub struct ResultTableWriter {
    w: BufWriter<File>,
    path: PathBuf,
}

impl ResultTableWriter {
    pub fn create(path: &Path) -> Result<Self, TpmError> {
        let f = File::create(path).map_err(|e| TpmError::io(path, e))?;
        Ok(Self {
            w: BufWriter::new(f),
            path: path.to_path_buf(),
        })
    }

    pub fn write_header(&mut self) -> Result<(), TpmError> {
        writeln!(self.w, "{}", trial::header()).map_err(|e| TpmError::io(&self.path, e))
    }

    pub fn write_row(&mut self, record: &TrialRecord) -> Result<(), TpmError> {
        writeln!(self.w, "{}", record).map_err(|e| TpmError::io(&self.path, e))
    }

    pub fn flush(&mut self) -> Result<(), TpmError> {
        self.w.flush().map_err(|e| TpmError::io(&self.path, e))
    }
}

/// Writes a complete table (header plus one row per record, in order).
pub fn write_result_table(path: &Path, records: &[TrialRecord]) -> Result<(), TpmError> {
    let mut w = ResultTableWriter::create(path)?;
    w.write_header()?;
    for record in records {
        w.write_row(record)?;
    }
    w.flush()
}

pub fn read_result_table(path: &Path) -> Result<Vec<TrialRecord>, TpmError> {
    let text = fs::read_to_string(path).map_err(|e| TpmError::io(path, e))?;
    text.lines()
        .enumerate()
        .skip(1)
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            line.parse::<TrialRecord>()
                .map_err(|msg| TpmError::format(path, format!("line {}: {}", n + 1, msg)))
        })
        .collect()
}

pub const FIT_HEADER: &str =
    "objid TI idx lam beta flux5 flux8 r delta alpha D_fit D_true model eta etafit";

pub struct FitTableWriter {
    w: BufWriter<File>,
    path: PathBuf,
}

impl FitTableWriter {
    pub fn create(path: &Path) -> Result<Self, TpmError> {
        let f = File::create(path).map_err(|e| TpmError::io(path, e))?;
        Ok(Self {
            w: BufWriter::new(f),
            path: path.to_path_buf(),
        })
    }

    pub fn write_header(&mut self) -> Result<(), TpmError> {
        writeln!(self.w, "{}", FIT_HEADER).map_err(|e| TpmError::io(&self.path, e))
    }

    pub fn write_row(&mut self, row: &FitRow) -> Result<(), TpmError> {
        writeln!(
            self.w,
            "{} {} {} {} {} {} {} {} {} {} {} {} {} {} {}",
            row.label,
            row.gamma,
            row.index,
            row.lam,
            row.beta,
            row.flux5,
            row.flux8,
            row.aspect.r,
            row.aspect.delta,
            row.aspect.alpha,
            row.diameter_km,
            row.d_true_km,
            row.model,
            row.eta,
            u8::from(row.eta_fitted)
        )
        .map_err(|e| TpmError::io(&self.path, e))
    }

    pub fn flush(&mut self) -> Result<(), TpmError> {
        self.w.flush().map_err(|e| TpmError::io(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{ObservationGeometry, Vec3};
    use tempfile::TempDir;

    fn record(index: usize) -> TrialRecord {
        TrialRecord {
            index,
            diameter_km: 1.0,
            lam: 10.0 * index as f64,
            beta: -5.0,
            geometry: ObservationGeometry {
                asteroid: Vec3::new(1.0, 0.0, 0.0),
                observer: Vec3::new(0.0, 0.1, 0.0),
            },
            fluxes: vec![100.0; 16],
        }
    }

    #[test]
    fn test_table_name_round_trip() {
        assert_eq!(result_table_name(150, "012"), "TI150_res_012.txt");
        assert_eq!(parse_result_table_name("TI150_res_012.txt"), Some((150, "012".to_string())));
        assert_eq!(parse_result_table_name("TI0_res_001.txt"), Some((0, "001".to_string())));
        assert_eq!(parse_result_table_name("spin000_TI0_001.txt"), None);
        assert_eq!(parse_result_table_name("TIx_res_001.txt"), None);
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(result_table_name(0, "001"));
        let records: Vec<TrialRecord> = (0..3).map(record).collect();
        write_result_table(&path, &records).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 4);
        assert_eq!(text.lines().next().unwrap(), trial::header());
        assert_eq!(read_result_table(&path).unwrap(), records);
    }

    #[test]
    fn test_rewrite_truncates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(result_table_name(50, "001"));
        let many: Vec<TrialRecord> = (0..5).map(record).collect();
        write_result_table(&path, &many).unwrap();
        write_result_table(&path, &many[..1]).unwrap();
        assert_eq!(read_result_table(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_bad_row_reports_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("TI0_res_001.txt");
        fs::write(&path, format!("{}\n0 1 2\n", trial::header())).unwrap();
        let err = read_result_table(&path).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
