//! Atomic artifact writes
//!
//! Every staged artifact is written into a temporary file created next to
//! its final location and moved into place only after the whole table has
//! been flushed. A stage that fails halfway therefore never leaves a
//! truncated file where the next stage would read it.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::{PipelineError, Result};

fn temp_file_beside(path: &Path) -> Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    Ok(NamedTempFile::new_in(dir)?)
}

fn commit(tmp: NamedTempFile, path: &Path) -> Result<()> {
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    log::debug!("Wrote {}", path.display());
    Ok(())
}

/// Write a CSV artifact through `fill`, replacing `path` atomically
pub fn write_csv_atomic<P, F>(path: P, fill: F) -> Result<()>
where
    P: AsRef<Path>,
    F: FnOnce(&mut csv::Writer<&mut File>) -> Result<()>,
{
    let path = path.as_ref();
    let mut tmp = temp_file_beside(path)?;
    {
        let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
        fill(&mut writer)?;
        writer.flush()?;
    }
    commit(tmp, path)
}

/// Write a value as pretty JSON, replacing `path` atomically
pub fn write_json_atomic<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> Result<()> {
    let path = path.as_ref();
    let mut tmp = temp_file_beside(path)?;
    serde_json::to_writer_pretty(tmp.as_file_mut(), value)?;
    tmp.as_file_mut().write_all(b"\n")?;
    commit(tmp, path)
}

/// Fixed textual form of a float: lossless, `NA` for missing values
pub fn format_f64(x: f64) -> String {
    if x.is_nan() {
        "NA".to_string()
    } else if x.is_infinite() {
        if x > 0.0 { "Inf".to_string() } else { "-Inf".to_string() }
    } else if x != 0.0 && (x.abs() < 1e-4 || x.abs() >= 1e15) {
        format!("{:e}", x)
    } else {
        format!("{}", x)
    }
}

/// Inverse of [`format_f64`]
pub fn parse_f64(raw: &str) -> Option<f64> {
    match raw.trim() {
        "NA" | "NaN" | "nan" | "" => Some(f64::NAN),
        "Inf" | "inf" => Some(f64::INFINITY),
        "-Inf" | "-inf" => Some(f64::NEG_INFINITY),
        s => s.parse().ok(),
    }
}

/// Guard used by readers of staged artifacts
pub(crate) fn require_file(path: &Path, context: &str) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(PipelineError::schema(
            context,
            format!("artifact {} does not exist", path.display()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_csv_written_and_replaced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("table.csv");

        write_csv_atomic(&path, |w| {
            w.write_record(["a", "b"])?;
            w.write_record(["1", "2"])?;
            Ok(())
        })
        .unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a,b\n1,2\n");

        write_csv_atomic(&path, |w| {
            w.write_record(["c"])?;
            Ok(())
        })
        .unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "c\n");
    }

    #[test]
    fn test_failed_fill_leaves_previous_artifact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("table.csv");
        fs::write(&path, "old\n").unwrap();

        let result = write_csv_atomic(&path, |w| {
            w.write_record(["partial"])?;
            Err(PipelineError::InvalidInput {
                reason: "aborted".to_string(),
            })
        });
        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "old\n");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_float_format() {
        assert_eq!(format_f64(f64::NAN), "NA");
        assert_eq!(format_f64(0.0), "0");
        assert_eq!(format_f64(12.5), "12.5");
        assert_eq!(format_f64(1.5e-30), "1.5e-30");
        for x in [0.1 + 0.2, 3.0e-7, 123456.789, -2.25] {
            assert_eq!(parse_f64(&format_f64(x)), Some(x));
        }
        assert!(parse_f64("NA").unwrap().is_nan());
    }
}
