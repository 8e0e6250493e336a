//! One Monte Carlo trial: spin file, `runtpm` call, flux extraction.

use std::path::{Path, PathBuf};

use log::debug;

use crate::config::RuntpmSection;
use crate::error::TpmError;
use crate::external::{marker_tokens, token_f64, CommandRunner, Invocation};
use crate::geometry::read_observation_geometry;
use crate::spin::{write_spin_file, SpinSample};
use crate::trial::{TrialRecord, BANDS, MICRO};

/// Token index of the first band's flux in the marker-filtered output.
const FLUX_OFFSET: usize = 7;
/// Fewer tokens than this means runtpm did not print a flux record at all.
pub const MIN_TOKENS: usize = 8;

/// Tokens per band record in runtpm output. The Γ = 0 branch of runtpm prints
/// one column less than the conductive branch.
pub fn flux_stride(gamma: u32) -> usize {
    if gamma == 0 {
        10
    } else {
        11
    }
}

/// Per-geometry inputs shared by all trials of a cycle.
#[derive(Debug, Clone)]
pub struct TrialContext<'a> {
    pub settings: &'a RuntpmSection,
    pub obj: &'a Path,
    pub obs: &'a Path,
    pub eph: &'a Path,
    pub spindir: &'a Path,
    pub label: &'a str,
    pub gamma: u32,
    pub rot_period_hr: f64,
}

/// Per-trial arguments handed to a worker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialArgs {
    pub index: usize,
    pub spin: SpinSample,
}

pub fn build_invocation(ctx: &TrialContext<'_>, spin_file: &Path) -> Invocation {
    let s = ctx.settings;
    Invocation {
        program: s.program.clone(),
        args: vec![
            "-o".to_string(),
            ctx.obs.display().to_string(),
            "-S".to_string(),
            spin_file.display().to_string(),
            "-s".to_string(),
            s.diameter_km.to_string(),
        ],
        stdin: format!(
            "{} {} {} {} {} {} {}",
            ctx.obj.display(),
            ctx.eph.display(),
            s.emissivity,
            ctx.gamma,
            s.bond_albedo,
            s.crater_coverage,
            s.crater_ratio
        ),
    }
}

/// Extracts the per-band fluxes (µJy) from raw runtpm stdout.
pub fn parse_fluxes(
    stdout: &str,
    marker: &str,
    gamma: u32,
    invocation: &Invocation,
) -> Result<Vec<f64>, TpmError> {
    let tokens = marker_tokens(stdout, marker);
    if tokens.is_empty() {
        return Err(TpmError::EmptyOutput {
            command: invocation.to_string(),
        });
    }
    if tokens.len() < MIN_TOKENS {
        return Err(TpmError::MalformedOutput {
            command: invocation.to_string(),
            expected: MIN_TOKENS,
            found: tokens.len(),
            output: tokens.join(" "),
        });
    }

    let stride = flux_stride(gamma);
    (0..BANDS.len())
        .map(|k| token_f64(&tokens, FLUX_OFFSET + k * stride, invocation).map(|f| f * MICRO))
        .collect()
}

/// Runs one trial end to end. Any failure discards the whole trial.
pub fn run_trial<R: CommandRunner + ?Sized>(
    runner: &R,
    ctx: &TrialContext<'_>,
    args: TrialArgs,
) -> Result<TrialRecord, TpmError> {
    let spin_file: PathBuf = write_spin_file(
        ctx.spindir,
        args.index,
        ctx.gamma,
        ctx.label,
        args.spin,
        ctx.rot_period_hr,
    )?;

    let invocation = build_invocation(ctx, &spin_file);
    debug!("trial {}: {}", args.index, invocation);
    let output = runner.run(&invocation)?;
    let fluxes = parse_fluxes(&output.stdout, &ctx.settings.marker, ctx.gamma, &invocation)?;
    let geometry = read_observation_geometry(ctx.obs)?;

    Ok(TrialRecord {
        index: args.index,
        diameter_km: ctx.settings.diameter_km,
        lam: args.spin.lam,
        beta: args.spin.beta,
        geometry,
        fluxes,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Simulator stdout with one marked record per band, laid out like runtpm does for `gamma`.
    /// Band k carries `base * (k + 1)` Jy.
    pub(crate) fn fake_runtpm_output(gamma: u32, base: f64) -> String {
        let mut out = String::from("# runtpm\n# object loaded\n");
        for k in 0..BANDS.len() {
            // marker, epoch, band, five auxiliary columns fill up to the flux at offset 7
            let mut cols: Vec<String> = vec![
                "f>".into(),
                "5".into(),
                BANDS[k].to_string(),
                "1".into(),
                "1".into(),
                "0.5".into(),
                "0.25".into(),
            ];
            cols.push(format!("{:e}", base * (k as f64 + 1.0)));
            let width = flux_stride(gamma);
            while cols.len() < width {
                cols.push("0".into());
            }
            out.push_str(&cols.join(" "));
            out.push('\n');
        }
        out
    }

    fn invocation() -> Invocation {
        Invocation {
            program: "runtpm".into(),
            args: vec![],
            stdin: String::new(),
        }
    }

    #[test]
    fn test_stride_rule() {
        assert_eq!(flux_stride(0), 10);
        assert_eq!(flux_stride(50), 11);
        assert_eq!(flux_stride(1000), 11);
    }

    #[test]
    fn test_parse_zero_inertia_layout() {
        let out = fake_runtpm_output(0, 2.5e-4);
        let fluxes = parse_fluxes(&out, "f>", 0, &invocation()).unwrap();
        assert_eq!(fluxes.len(), 16);
        for (k, f) in fluxes.iter().enumerate() {
            assert_eq!(*f, 2.5e-4 * (k as f64 + 1.0) * 1e6);
        }
    }

    #[test]
    fn test_parse_conductive_layout() {
        let out = fake_runtpm_output(150, 3.0e-5);
        let fluxes = parse_fluxes(&out, "f>", 150, &invocation()).unwrap();
        assert_eq!(fluxes.len(), 16);
        for (k, f) in fluxes.iter().enumerate() {
            assert_eq!(*f, 3.0e-5 * (k as f64 + 1.0) * 1e6);
        }
    }

    #[test]
    fn test_wrong_stride_hits_record_markers() {
        // Γ > 0 layout read with the Γ = 0 stride drifts onto a marker token by band 7
        let out = fake_runtpm_output(50, 1.0e-3);
        let err = parse_fluxes(&out, "f>", 0, &invocation()).unwrap_err();
        assert!(matches!(err, TpmError::InvalidNumber { ref token, .. } if token == "f>"));
    }

    #[test]
    fn test_unit_conversion_exact() {
        for raw in [1.0e-3, 1.234_567_891e-7, 3.3, 0.0, -2.0e-9] {
            let mut out = String::new();
            for _ in 0..BANDS.len() {
                out.push_str(&format!("f> 5 5 1 1 0.5 0.25 {} 0 0\n", raw));
            }
            let fluxes = parse_fluxes(&out, "f>", 0, &invocation()).unwrap();
            assert!(fluxes.iter().all(|f| *f == raw * 1e6));
            // And the persisted text parses back to the same value
            let text = fluxes[0].to_string();
            assert_eq!(text.parse::<f64>().unwrap(), raw * 1e6);
        }
    }

    #[test]
    fn test_empty_output_is_fatal() {
        let err = parse_fluxes("", "f>", 0, &invocation()).unwrap_err();
        assert!(matches!(err, TpmError::EmptyOutput { .. }));

        // Output without the marker is empty after filtering
        let err = parse_fluxes("# only comments\n", "f>", 0, &invocation()).unwrap_err();
        assert!(matches!(err, TpmError::EmptyOutput { .. }));
    }

    #[test]
    fn test_short_output_is_fatal() {
        let err = parse_fluxes("f> 1 2 3 4 5 6\n", "f>", 50, &invocation()).unwrap_err();
        assert!(matches!(err, TpmError::MalformedOutput { expected: 8, found: 7, .. }));
    }

    #[test]
    fn test_truncated_band_list_is_fatal() {
        let out: String = fake_runtpm_output(50, 1.0e-3).lines().take(4).collect::<Vec<_>>().join("\n");
        let err = parse_fluxes(&out, "f>", 50, &invocation()).unwrap_err();
        assert!(matches!(err, TpmError::MalformedOutput { .. }));
    }

    #[test]
    fn test_invocation_contract() {
        let settings = RuntpmSection::default();
        let ctx = TrialContext {
            settings: &settings,
            obj: Path::new("obj.txt"),
            obs: Path::new("obs_001.txt"),
            eph: Path::new("eph_001.txt"),
            spindir: Path::new("spinfile"),
            label: "001",
            gamma: 50,
            rot_period_hr: 0.0968,
        };
        let inv = build_invocation(&ctx, Path::new("spinfile/spin000_TI50_001.txt"));
        assert_eq!(inv.program, "runtpm");
        assert_eq!(
            inv.args,
            vec!["-o", "obs_001.txt", "-S", "spinfile/spin000_TI50_001.txt", "-s", "1"]
        );
        assert_eq!(inv.stdin, "obj.txt eph_001.txt 0.9 50 0.039 0 0");
    }
}
