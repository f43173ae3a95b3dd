use std::collections::BTreeMap;
use std::path::Path;

use crate::input::InputError;
use crate::model::sample::{SampleCommand, SampleSet};

pub const ALIASES_FILE: &str = "sample_aliases.csv";

/// Display aliases kept next to the outputs. A missing file means no aliases.
pub fn load_aliases(out_dir: &Path) -> Result<BTreeMap<String, String>, InputError> {
    let path = out_dir.join(ALIASES_FILE);
    let mut aliases = BTreeMap::new();
    if !path.is_file() {
        return Ok(aliases);
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(&path)?;
    for record in reader.records() {
        let record = record?;
        let (Some(sample), Some(alias)) = (record.get(0), record.get(1)) else {
            continue;
        };
        if !sample.is_empty() && !alias.is_empty() {
            aliases.insert(sample.to_string(), alias.to_string());
        }
    }
    Ok(aliases)
}

pub fn save_aliases(out_dir: &Path, samples: &SampleSet) -> Result<(), InputError> {
    std::fs::create_dir_all(out_dir)?;
    let mut writer = csv::Writer::from_path(out_dir.join(ALIASES_FILE))?;
    writer.write_record(["Sample", "Alias"])?;
    for sample in samples.iter() {
        if let Some(alias) = &sample.alias {
            writer.write_record([sample.name.as_str(), alias.as_str()])?;
        }
    }
    writer.flush()?;
    Ok(())
}

pub fn apply_aliases(samples: &mut SampleSet, aliases: &BTreeMap<String, String>) {
    for (sample, alias) in aliases {
        let applied = samples.apply(&SampleCommand::SetAlias {
            sample: sample.clone(),
            alias: alias.clone(),
        });
        if !applied {
            tracing::debug!(sample = %sample, "alias for unknown sample ignored");
        }
    }
}
