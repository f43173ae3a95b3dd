use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto};
use flate2::read::MultiGzDecoder;

use crate::input::InputError;
use crate::model::matrix::{Matrix, Unit};

pub fn open_maybe_gz(path: &Path) -> Result<Box<dyn Read>, InputError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(InputError::MissingFile(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };
    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(Box::new(MultiGzDecoder::new(BufReader::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Reads one element map. Accepts either a pixel grid (one line per map row)
/// or a long table with `X`, `Y` and per-element value columns, as delimited
/// text (optionally gzipped) or as the first sheet of an `.xlsx` workbook.
pub fn read_matrix(path: &Path, element: &str, unit: Unit) -> Result<Matrix, InputError> {
    if is_spreadsheet(path) {
        let records = read_spreadsheet(path)?;
        return parse_records(records, element, unit).map_err(|reason| parse_error(path, reason));
    }
    let mut text = String::new();
    open_maybe_gz(path)?
        .read_to_string(&mut text)
        .map_err(|e| parse_error(path, format!("unreadable ({e}); file may be incomplete")))?;
    parse_matrix_text(&text, element, unit).map_err(|reason| parse_error(path, reason))
}

fn parse_error(path: &Path, reason: String) -> InputError {
    InputError::MatrixParse {
        path: path.to_path_buf(),
        reason,
    }
}

fn is_spreadsheet(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xlsx"))
}

/// First worksheet as trimmed text cells. Cells keep their numeric value;
/// everything else goes through the same missing-pixel rules as text input.
fn read_spreadsheet(path: &Path) -> Result<Vec<Vec<String>>, InputError> {
    if !path.is_file() {
        return Err(InputError::MissingFile(path.to_path_buf()));
    }
    let mut workbook = open_workbook_auto(path).map_err(|e| {
        parse_error(path, format!("unreadable workbook ({e}); file may be incomplete"))
    })?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| parse_error(path, "workbook has no sheets".to_string()))?
        .map_err(|e| parse_error(path, format!("unreadable sheet ({e})")))?;
    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect::<Vec<_>>())
        .filter(|row| row.iter().any(|f| !f.is_empty()))
        .collect())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::Float(v) => v.to_string(),
        Data::Int(v) => v.to_string(),
        other => other.to_string().trim().to_string(),
    }
}

pub fn parse_matrix_text(text: &str, element: &str, unit: Unit) -> Result<Matrix, String> {
    let Some(first_line) = text.lines().find(|l| !l.trim().is_empty()) else {
        return Err("file is empty or not fully synced".to_string());
    };
    let delimiter = detect_delimiter(first_line);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| format!("malformed record: {e}"))?;
        let fields = record
            .iter()
            .map(|s| s.trim().to_string())
            .collect::<Vec<_>>();
        if fields.iter().all(|f| f.is_empty()) {
            continue;
        }
        records.push(fields);
    }
    parse_records(records, element, unit)
}

fn parse_records(records: Vec<Vec<String>>, element: &str, unit: Unit) -> Result<Matrix, String> {
    if records.is_empty() {
        return Err("no data rows".to_string());
    }
    if let Some((x_col, y_col)) = coordinate_columns(&records[0]) {
        return parse_long_table(&records, x_col, y_col, element, unit);
    }
    parse_grid(records, unit)
}

fn detect_delimiter(line: &str) -> u8 {
    if line.contains('\t') {
        b'\t'
    } else if line.contains(';') && !line.contains(',') {
        b';'
    } else {
        b','
    }
}

/// Missing, non-numeric, negative and non-finite cells are all missing pixels.
fn parse_cell(cell: &str) -> f64 {
    match cell.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => v,
        _ => f64::NAN,
    }
}

fn coordinate_columns(header: &[String]) -> Option<(usize, usize)> {
    let find = |name: &str| header.iter().position(|h| h.eq_ignore_ascii_case(name));
    Some((find("x")?, find("y")?))
}

fn parse_grid(mut records: Vec<Vec<String>>, unit: Unit) -> Result<Matrix, String> {
    let header_like = records[0]
        .iter()
        .all(|f| !f.is_empty() && f.parse::<f64>().is_err());
    if header_like {
        records.remove(0);
    }
    if records.is_empty() {
        return Err("no data rows".to_string());
    }
    let width = records[0].len();
    let n_rows = records.len();
    for (idx, row) in records.iter().enumerate() {
        if row.len() != width {
            let hint = if idx + 1 == n_rows && row.len() < width {
                " (truncated file?)"
            } else {
                ""
            };
            return Err(format!(
                "row {} has {} values, expected {}{}",
                idx + 1,
                row.len(),
                width,
                hint
            ));
        }
    }
    let rows = records
        .iter()
        .map(|r| r.iter().map(|c| parse_cell(c)).collect::<Vec<_>>())
        .collect::<Vec<_>>();
    Matrix::from_rows(rows, unit).ok_or_else(|| "inconsistent row lengths".to_string())
}

fn value_column(header: &[String], x_col: usize, y_col: usize, element: &str) -> Option<usize> {
    let candidates = (0..header.len())
        .filter(|&i| i != x_col && i != y_col)
        .collect::<Vec<_>>();
    let exact = candidates
        .iter()
        .copied()
        .find(|&i| header[i].eq_ignore_ascii_case(element));
    if exact.is_some() {
        return exact;
    }
    let prefixed = candidates.iter().copied().find(|&i| {
        let h = &header[i];
        h.len() > element.len()
            && h.get(..element.len())
                .is_some_and(|p| p.eq_ignore_ascii_case(element))
            && !h.as_bytes()[element.len()].is_ascii_alphanumeric()
    });
    if prefixed.is_some() {
        return prefixed;
    }
    if candidates.len() == 1 {
        return Some(candidates[0]);
    }
    None
}

fn parse_long_table(
    records: &[Vec<String>],
    x_col: usize,
    y_col: usize,
    element: &str,
    unit: Unit,
) -> Result<Matrix, String> {
    let header = &records[0];
    let v_col = value_column(header, x_col, y_col, element)
        .ok_or_else(|| format!("no value column for element {element}"))?;

    let mut pixels = Vec::with_capacity(records.len() - 1);
    for (idx, row) in records.iter().enumerate().skip(1) {
        let coord = |col: usize| -> Result<f64, String> {
            row.get(col)
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|v| v.is_finite())
                .map(|v| v + 0.0)
                .ok_or_else(|| format!("line {}: bad coordinate", idx + 1))
        };
        if row.len() <= v_col {
            return Err(format!(
                "line {}: row has {} values, expected at least {} (truncated file?)",
                idx + 1,
                row.len(),
                v_col + 1
            ));
        }
        let x = coord(x_col)?;
        let y = coord(y_col)?;
        let v = parse_cell(&row[v_col]);
        pixels.push((x, y, v));
    }
    if pixels.is_empty() {
        return Err("no pixel rows".to_string());
    }

    let xs = axis_index(pixels.iter().map(|p| p.0));
    let ys = axis_index(pixels.iter().map(|p| p.1));
    let cols = xs.len();
    let rows = ys.len();
    let mut values = vec![f64::NAN; rows * cols];
    for (x, y, v) in pixels {
        let c = xs[&x.to_bits()];
        let r = ys[&y.to_bits()];
        values[r * cols + c] = v;
    }
    Matrix::new(rows, cols, values, unit).ok_or_else(|| "inconsistent pixel grid".to_string())
}

/// Sorted distinct coordinates mapped to their grid index.
fn axis_index(coords: impl Iterator<Item = f64>) -> BTreeMap<u64, usize> {
    let mut distinct = coords.collect::<Vec<_>>();
    distinct.sort_by(|a, b| a.total_cmp(b));
    distinct.dedup();
    distinct
        .into_iter()
        .enumerate()
        .map(|(i, v)| (v.to_bits(), i))
        .collect()
}

#[cfg(test)]
#[path = "../../tests/src_inline/input/matrix.rs"]
mod tests;
