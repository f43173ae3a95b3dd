mod error;
mod input;
mod logging;
mod model;
mod pipeline;
mod report;

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::input::aliases::{apply_aliases, load_aliases, save_aliases};
use crate::input::pixel_sizes::{load_pixel_sizes, write_pixel_size_template};
use crate::input::{DirectorySource, discover_matrix_files};
use crate::model::config::{BatchConfig, ColorMap, LayoutConfig};
use crate::model::matrix::{ElementKey, Unit};
use crate::model::sample::{SampleCommand, SampleSet};
use crate::model::scale::{ScaleConfig, ScaleMode};
use crate::model::progress::ProgressStatus;
use crate::pipeline::stage4_progress::{ProgressTracker, status_counts};
use crate::pipeline::stage5_batch::{BatchController, CancelFlag, ProgressReporter};
use crate::report::artifacts::ArtifactLayout;
use crate::report::json::render_summary_json;
use crate::report::render::FileRenderer;
use crate::report::text::{render_progress_table, render_summary_text};
use crate::report::write_text;

#[derive(Debug, Parser)]
#[command(name = "kira-elemaps", version, about = "Shared-scale composites of elemental maps")]
struct Cli {
    /// Debug logging. KIRA_LOG overrides.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Render every pending element composite.
    Run(RunArgs),
    /// Print the per-sample, per-element progress table.
    Status(DirArgs),
    /// Write an editable pixel-size table for the discovered samples.
    PixelTemplate(TemplateArgs),
    /// Set or clear a sample's display alias.
    Alias(AliasArgs),
}

#[derive(Debug, Clone, Args)]
struct DirArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ScaleModeArg {
    Auto,
    Fixed,
    Log,
    Ecdf,
}

impl From<ScaleModeArg> for ScaleMode {
    fn from(arg: ScaleModeArg) -> Self {
        match arg {
            ScaleModeArg::Auto => ScaleMode::AutoPercentile,
            ScaleModeArg::Fixed => ScaleMode::UserFixed,
            ScaleModeArg::Log => ScaleMode::Log,
            ScaleModeArg::Ecdf => ScaleMode::Ecdf,
        }
    }
}

#[derive(Debug, Clone, Args)]
struct RunArgs {
    #[command(flatten)]
    dirs: DirArgs,
    /// Element to process, `Fe56_ppm` or bare `Fe56`. Repeatable; default is all.
    #[arg(long = "element")]
    elements: Vec<String>,
    #[arg(long, value_enum, default_value = "auto")]
    scale_mode: ScaleModeArg,
    /// Ceiling for `fixed`; optional override for `log` and `ecdf`.
    #[arg(long)]
    scale_max: Option<f64>,
    /// Fixed number of grid rows.
    #[arg(long)]
    rows: Option<usize>,
    /// Reject a row count above the sample count instead of clamping it.
    #[arg(long)]
    no_row_fallback: bool,
    #[arg(long, default_value_t = 1.3)]
    aspect: f64,
    /// Global pixel size in micrometres.
    #[arg(long, default_value_t = 6.0)]
    pixel_size: f64,
    /// Per-sample pixel sizes (`Sample,Pixel Size`).
    #[arg(long)]
    pixel_sizes: Option<PathBuf>,
    /// Sample to leave out. Repeatable.
    #[arg(long = "exclude")]
    excluded: Vec<String>,
    /// Render only these samples. Repeatable; `--exclude` still applies.
    #[arg(long = "only")]
    only: Vec<String>,
    /// Pixel size for one sample, `SAMPLE=UM`. Repeatable; a `--pixel-sizes`
    /// table entry wins.
    #[arg(long = "sample-pixel-size", value_parser = parse_sample_pixel_size)]
    sample_pixel_sizes: Vec<(String, f64)>,
    #[arg(long, default_value_t = 500.0)]
    scale_bar_um: f64,
    #[arg(long, default_value = "jet")]
    colormap: String,
    #[arg(long)]
    no_subplots: bool,
}

#[derive(Debug, Clone, Args)]
struct TemplateArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    out: PathBuf,
    #[arg(long, default_value_t = 6.0)]
    pixel_size: f64,
}

#[derive(Debug, Clone, Args)]
struct AliasArgs {
    #[command(flatten)]
    dirs: DirArgs,
    #[arg(long)]
    sample: String,
    /// New alias; omit to clear.
    #[arg(long)]
    alias: Option<String>,
}

fn parse_sample_pixel_size(arg: &str) -> Result<(String, f64), String> {
    let (sample, size) = arg
        .rsplit_once('=')
        .ok_or_else(|| format!("expected SAMPLE=UM, got {arg}"))?;
    let size = size
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("bad pixel size in {arg}: {e}"))?;
    Ok((sample.trim().to_string(), size))
}

fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);
    if let Err(err) = run(cli) {
        tracing::error!("{err}");
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Command::Run(args) => run_batch(&args),
        Command::Status(args) => print_status(&args),
        Command::PixelTemplate(args) => pixel_template(&args),
        Command::Alias(args) => set_alias(&args),
    }
}

fn open_input(input_dir: &Path, out_dir: &Path) -> Result<(DirectorySource, SampleSet), String> {
    let files = discover_matrix_files(input_dir).map_err(|e| e.to_string())?;
    if files.is_empty() {
        return Err(format!(
            "no matrix files found in {} (expected `<sample> <elem>_<ppm|CPS> matrix.csv`)",
            input_dir.display()
        ));
    }
    let source = DirectorySource::from_files(&files);
    let mut samples = source.samples();
    let aliases = load_aliases(out_dir).map_err(|e| e.to_string())?;
    apply_aliases(&mut samples, &aliases);
    tracing::info!(
        files = files.len(),
        samples = samples.len(),
        elements = source.elements().len(),
        "input discovered"
    );
    Ok((source, samples))
}

/// Accepts `Fe56_ppm` for one channel or `Fe56` for every unit of that symbol.
fn select_elements(requested: &[String], available: &[ElementKey]) -> Result<Vec<ElementKey>, String> {
    let mut selected = Vec::new();
    for name in requested {
        let exact = name
            .rsplit_once('_')
            .and_then(|(symbol, unit)| Unit::parse(unit).map(|u| ElementKey::new(symbol, u)));
        let matches = available
            .iter()
            .filter(|e| match &exact {
                Some(key) => *e == key,
                None => e.symbol == *name,
            })
            .cloned()
            .collect::<Vec<_>>();
        if matches.is_empty() {
            return Err(format!("element {name} not found in input"));
        }
        for key in matches {
            if !selected.contains(&key) {
                selected.push(key);
            }
        }
    }
    selected.sort();
    Ok(selected)
}

fn build_config(args: &RunArgs, elements: Vec<ElementKey>) -> Result<BatchConfig, String> {
    let colormap = ColorMap::parse(&args.colormap)
        .ok_or_else(|| format!("unknown colormap {} (jet, viridis, hot, gray)", args.colormap))?;
    let mode = ScaleMode::from(args.scale_mode);
    if mode == ScaleMode::UserFixed && args.scale_max.is_none() {
        return Err("--scale-mode fixed requires --scale-max".to_string());
    }
    if !(args.pixel_size.is_finite() && args.pixel_size > 0.0) {
        return Err(format!("--pixel-size must be positive, got {}", args.pixel_size));
    }

    let mut config = BatchConfig {
        scale: ScaleConfig {
            mode,
            value: args.scale_max,
        },
        layout: LayoutConfig {
            user_rows: args.rows,
            auto_fallback: !args.no_row_fallback,
            target_aspect: args.aspect,
        },
        pixel_size_um: args.pixel_size,
        scale_bar_um: args.scale_bar_um,
        elements,
        colormap,
        ..BatchConfig::default()
    };

    if let Some(path) = &args.pixel_sizes {
        config.custom_pixel_sizes = load_pixel_sizes(path).map_err(|e| e.to_string())?.sizes;
    }
    Ok(config)
}

/// `--only`, then `--exclude`, then per-sample pixel sizes.
fn apply_sample_args(args: &RunArgs, samples: &mut SampleSet) -> Result<(), String> {
    if !args.only.is_empty() {
        let names = samples.iter().map(|s| s.name.clone()).collect::<Vec<_>>();
        for name in names {
            samples.apply(&SampleCommand::Exclude(name));
        }
        for name in &args.only {
            if !samples.apply(&SampleCommand::Include(name.clone())) {
                return Err(format!("sample {name} not found in input"));
            }
        }
    }
    for name in &args.excluded {
        if !samples.apply(&SampleCommand::Exclude(name.clone())) {
            tracing::warn!(sample = %name, "excluded sample not found in input");
        }
    }
    for (sample, pixel_size) in &args.sample_pixel_sizes {
        let command = SampleCommand::SetPixelSize {
            sample: sample.clone(),
            pixel_size: *pixel_size,
        };
        if !samples.apply(&command) {
            return Err(format!("cannot set pixel size {pixel_size} for sample {sample}"));
        }
    }
    Ok(())
}

fn run_batch(args: &RunArgs) -> Result<(), String> {
    let (source, mut samples) = open_input(&args.dirs.input, &args.dirs.out)?;
    apply_sample_args(args, &mut samples)?;
    let available = source.elements();
    let elements = select_elements(&args.elements, &available)?;
    let config = build_config(args, elements)?;

    std::fs::create_dir_all(&args.dirs.out).map_err(|e| e.to_string())?;
    let artifacts = ArtifactLayout::new(&args.dirs.out);
    tracing::info!(out = %artifacts.root().display(), "writing artifacts");
    let mut renderer = FileRenderer::new(artifacts.clone());
    renderer.write_subplots = !args.no_subplots;

    let cancel = CancelFlag::new();
    let on_interrupt = cancel.clone();
    if let Err(err) = ctrlc::set_handler(move || on_interrupt.cancel()) {
        tracing::warn!(reason = %err, "Ctrl-C handler not installed; batch cannot be interrupted cleanly");
    }

    let reporter = ProgressReporter::new(config.progress_interval, |event| {
        tracing::info!(
            element = %event.element.dir_name(),
            sample = event.sample.as_deref().unwrap_or("-"),
            "{:>5.1}%",
            event.fraction() * 100.0
        );
    });
    let mut controller =
        BatchController::new(&config, &source, &samples, &available, &artifacts, renderer)
            .with_cancel_flag(cancel)
            .with_progress(reporter);
    let summary = controller.process_all_elements();
    if summary.cancelled {
        tracing::warn!("batch interrupted; rerun to finish the remaining elements");
    }

    let json = render_summary_json(&summary).map_err(|e| e.to_string())?;
    write_text(&artifacts.summary(), &json).map_err(|e| e.to_string())?;
    print!("{}", render_summary_text(&summary));
    Ok(())
}

fn print_status(args: &DirArgs) -> Result<(), String> {
    let (source, samples) = open_input(&args.input, &args.out)?;
    let elements = source.elements();
    let artifacts = ArtifactLayout::new(&args.out);
    let map = ProgressTracker::new(&artifacts, &source, &samples, &elements).refresh();
    let [missing, partial, complete] = status_counts(&map);
    print!("{}", render_progress_table(&map, &samples, &elements));
    let counts = [
        (ProgressStatus::Complete, complete),
        (ProgressStatus::Partial, partial),
        (ProgressStatus::Missing, missing),
    ]
    .map(|(status, n)| format!("{}: {n}", status.as_str()));
    println!("\n{}", counts.join("  "));
    Ok(())
}

fn pixel_template(args: &TemplateArgs) -> Result<(), String> {
    let files = discover_matrix_files(&args.input).map_err(|e| e.to_string())?;
    let samples = DirectorySource::from_files(&files).samples();
    if samples.is_empty() {
        return Err(format!("no samples found in {}", args.input.display()));
    }
    write_pixel_size_template(&args.out, &samples, args.pixel_size).map_err(|e| e.to_string())?;
    println!("wrote {} samples to {}", samples.len(), args.out.display());
    Ok(())
}

fn set_alias(args: &AliasArgs) -> Result<(), String> {
    let (_, mut samples) = open_input(&args.dirs.input, &args.dirs.out)?;
    let command = match &args.alias {
        Some(alias) => SampleCommand::SetAlias {
            sample: args.sample.clone(),
            alias: alias.clone(),
        },
        None => SampleCommand::ClearAlias(args.sample.clone()),
    };
    if !samples.apply(&command) {
        return Err(format!("sample {} not found in input", args.sample));
    }
    save_aliases(&args.dirs.out, &samples).map_err(|e| e.to_string())
}

#[cfg(test)]
#[path = "../tests/src_inline/main_inline.rs"]
mod tests;
