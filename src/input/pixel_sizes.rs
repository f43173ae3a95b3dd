use std::collections::BTreeMap;
use std::path::Path;

use crate::input::InputError;
use crate::model::sample::SampleSet;

pub const SAMPLE_COLUMN: &str = "Sample";
pub const PIXEL_SIZE_COLUMN: &str = "Pixel Size";

#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRow {
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PixelSizeTable {
    pub sizes: BTreeMap<String, f64>,
    pub rejected: Vec<RejectedRow>,
}

/// Imports `Sample,Pixel Size`. A bad row is rejected on its own; only a
/// missing header column fails the import.
pub fn load_pixel_sizes(path: &Path) -> Result<PixelSizeTable, InputError> {
    if !path.is_file() {
        return Err(InputError::MissingFile(path.to_path_buf()));
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                InputError::InvalidInput(format!(
                    "{} has no '{}' column",
                    path.display(),
                    name
                ))
            })
    };
    let sample_col = column(SAMPLE_COLUMN)?;
    let size_col = column(PIXEL_SIZE_COLUMN)?;

    let mut table = PixelSizeTable::default();
    for (idx, record) in reader.records().enumerate() {
        // header is line 1
        let line = idx + 2;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                table.rejected.push(RejectedRow {
                    line,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        let sample = record.get(sample_col).unwrap_or("");
        let raw_size = record.get(size_col).unwrap_or("");
        if sample.is_empty() {
            table.rejected.push(RejectedRow {
                line,
                reason: "empty sample name".to_string(),
            });
            continue;
        }
        match raw_size.parse::<f64>() {
            Ok(size) if size.is_finite() && size > 0.0 => {
                if table.sizes.insert(sample.to_string(), size).is_some() {
                    tracing::warn!(sample, line, "duplicate pixel size row; later row wins");
                }
            }
            _ => table.rejected.push(RejectedRow {
                line,
                reason: format!("invalid pixel size '{raw_size}' for sample {sample}"),
            }),
        }
    }

    for rejected in &table.rejected {
        tracing::warn!(line = rejected.line, reason = %rejected.reason, "pixel size row rejected");
    }
    tracing::info!(
        samples = table.sizes.len(),
        rejected = table.rejected.len(),
        "imported custom pixel sizes"
    );
    Ok(table)
}

/// Writes a table listing every sample with the default size, for the user to edit.
pub fn write_pixel_size_template(
    path: &Path,
    samples: &SampleSet,
    default_size: f64,
) -> Result<(), InputError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([SAMPLE_COLUMN, PIXEL_SIZE_COLUMN])?;
    for sample in samples.iter() {
        writer.write_record([sample.name.as_str(), &default_size.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/src_inline/input/pixel_sizes.rs"]
mod tests;
