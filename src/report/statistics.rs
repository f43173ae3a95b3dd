use std::path::Path;

use crate::pipeline::stage5_batch::SamplePanel;
use crate::report::format_sig5;

pub const STATISTICS_HEADER: [&str; 8] =
    ["Sample", "Alias", "p25", "p50", "p75", "p99", "IQR", "Mean"];

/// One row per sample, statistics rounded to five significant digits.
pub fn write_statistics_csv(path: &Path, panels: &[SamplePanel]) -> Result<(), csv::Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(STATISTICS_HEADER)?;
    for panel in panels {
        let s = &panel.stats;
        writer.write_record([
            panel.sample.clone(),
            panel.label.clone(),
            format_sig5(s.p25),
            format_sig5(s.p50),
            format_sig5(s.p75),
            format_sig5(s.p99),
            format_sig5(s.iqr),
            format_sig5(s.mean),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
