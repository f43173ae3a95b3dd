pub mod artifacts;
pub mod colormap;
pub mod json;
pub mod render;
pub mod statistics;
pub mod text;

use std::io::Write;
use std::path::Path;

/// Rounds to five significant digits and prints the shortest exact form.
pub fn format_sig5(v: f64) -> String {
    if !v.is_finite() {
        return "NaN".to_string();
    }
    let rounded = format!("{:.4e}", v).parse::<f64>().unwrap_or(v);
    format!("{}", rounded)
}

pub fn write_text(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut f = std::io::BufWriter::new(std::fs::File::create(path)?);
    f.write_all(contents.as_bytes())?;
    f.flush()
}
