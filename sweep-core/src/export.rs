//! # Export Module
//!
//! Writes finished sweeps to disk: CSV files of frequency/level pairs for
//! spreadsheets and plotting tools, and a JSON report that can be loaded
//! back for later comparison.
//!
//! ## Files
//! - `<stem>_<mode>_vs_f.csv` level curve, or long-form noise-floor spectrum
//! - `<stem>_snr_vs_f.csv` SNR curve (SNR mode only)
//! - `<stem>_<mode>_report.json` complete `SweepReport`
//!
//! `<stem>` is `ProjectInfo::file_stem`. Frequencies in CSV files are given
//! in the display unit; the JSON report always stores Hz.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use log::info;

use crate::config::{FrequencyUnit, ProjectInfo, SweepMode};
use crate::results::{BinStatus, Curve, ReportedSeries, SpectrumRow, SweepReport};

fn mode_slug(mode: &SweepMode) -> &'static str {
    match mode {
        SweepMode::NoiseFloor => "noise_floor",
        SweepMode::Harmonic { .. } => "harmonic",
        SweepMode::Snr { .. } => "snr_noise_floor",
    }
}

/// Writes a level curve as `frequency,level` records, one per bin.
///
/// Skipped bins are written with their zero fill.
pub fn write_level_csv<W: Write>(writer: W, curve: &Curve, unit: FrequencyUnit) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record([format!("Frequency ({})", unit), curve.label.clone()])?;
    for (&freq_hz, &level) in curve.frequencies_hz.iter().zip(&curve.levels_db) {
        csv.write_record([unit.from_hz(freq_hz).to_string(), level.to_string()])?;
    }
    csv.flush()?;
    Ok(())
}

/// Writes noise-floor rows in long form, one record per spectrum point.
///
/// Only measured bins are written; a skipped bin has no frequency axis.
pub fn write_noise_floor_csv<W: Write>(
    writer: W,
    label: &str,
    rows: &[SpectrumRow],
    bins: &[BinStatus],
    unit: FrequencyUnit,
) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record([format!("Frequency ({})", unit), label.to_string()])?;
    for (row, status) in rows.iter().zip(bins) {
        if *status != BinStatus::Measured {
            continue;
        }
        for (&freq_hz, &level) in row.frequencies_hz.iter().zip(&row.levels_db) {
            csv.write_record([unit.from_hz(freq_hz).to_string(), level.to_string()])?;
        }
    }
    csv.flush()?;
    Ok(())
}

/// Writes the SNR curve of an SNR-mode report.
pub fn write_snr_csv<W: Write>(writer: W, report: &SweepReport, unit: FrequencyUnit) -> Result<()> {
    let Some(snr) = report.snr.as_ref() else {
        bail!("{} sweep has no SNR values", report.mode.name());
    };
    write_level_csv(writer, snr, unit)
}

/// Saves the report as pretty-printed JSON.
pub fn save_report(report: &SweepReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("serializing sweep report")?;
    let mut file =
        File::create(path).with_context(|| format!("creating {}", path.display()))?;
    file.write_all(json.as_bytes())
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Loads a report previously written by `save_report`.
pub fn load_report(path: &Path) -> Result<SweepReport> {
    let mut file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut data = String::new();
    file.read_to_string(&mut data)
        .with_context(|| format!("reading {}", path.display()))?;
    let report = serde_json::from_str(&data)
        .with_context(|| format!("parsing sweep report {}", path.display()))?;
    Ok(report)
}

fn create_csv(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    Ok(BufWriter::new(file))
}

/// Writes every file for `report` into `dir`, creating it if needed.
///
/// # Returns
/// * `Ok(paths)` - The files written, in order
/// * `Err` - Directory creation, I/O or serialization failure
pub fn export_report(
    dir: &Path,
    project: &ProjectInfo,
    report: &SweepReport,
    unit: FrequencyUnit,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let stem = project.file_stem();
    let slug = mode_slug(&report.mode);
    let mut written = Vec::new();

    let levels_path = dir.join(format!("{}_{}_vs_f.csv", stem, slug));
    let writer = create_csv(&levels_path)?;
    match &report.levels {
        ReportedSeries::Rows { label, rows } => {
            write_noise_floor_csv(writer, label, rows, &report.bins, unit)?
        }
        ReportedSeries::Curve(curve) => write_level_csv(writer, curve, unit)?,
    }
    written.push(levels_path);

    if report.snr.is_some() {
        let snr_path = dir.join(format!("{}_snr_vs_f.csv", stem));
        write_snr_csv(create_csv(&snr_path)?, report, unit)?;
        written.push(snr_path);
    }

    let json_path = dir.join(format!("{}_{}_report.json", stem, slug));
    save_report(report, &json_path)?;
    written.push(json_path);

    for path in &written {
        info!("[EXPORT] Wrote {}", path.display());
    }
    Ok(written)
}
