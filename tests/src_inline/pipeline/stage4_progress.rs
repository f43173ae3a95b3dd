use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::*;
use crate::input::{DirectorySource, discover_matrix_files};
use crate::model::matrix::Unit;
use crate::model::sample::SampleCommand;
use crate::model::scale::ScaleMode;

static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn make_temp_dir() -> PathBuf {
    let mut dir = std::env::temp_dir();
    let id = DIR_COUNTER.fetch_add(1, Ordering::SeqCst);
    dir.push(format!("kira_elemaps_progress_{}_{}", std::process::id(), id));
    fs::create_dir_all(&dir).unwrap();
    dir
}

struct Fixture {
    input: PathBuf,
    artifacts: ArtifactLayout,
    source: DirectorySource,
    samples: SampleSet,
}

fn fixture(files: &[&str]) -> Fixture {
    let root = make_temp_dir();
    let input = root.join("input");
    fs::create_dir_all(&input).unwrap();
    for name in files {
        fs::write(input.join(name), "1,2\n3,4\n").unwrap();
    }
    let source = DirectorySource::from_files(&discover_matrix_files(&input).unwrap());
    let samples = source.samples();
    Fixture {
        input,
        artifacts: ArtifactLayout::new(root.join("out")),
        source,
        samples,
    }
}

fn write(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn status_of(f: &Fixture, sample: &str, element: &ElementKey) -> ProgressStatus {
    let elements = [element.clone()];
    let map = ProgressTracker::new(&f.artifacts, &f.source, &f.samples, &elements).refresh();
    map[&(sample.to_string(), element.clone())].status
}

fn complete(f: &Fixture, element: &ElementKey) -> bool {
    let elements = [element.clone()];
    ProgressTracker::new(&f.artifacts, &f.source, &f.samples, &elements).element_complete(element)
}

fn manifest(samples: &[&str]) -> String {
    let listed = samples
        .iter()
        .map(|s| format!(r#"{{"name":"{s}"}}"#))
        .collect::<Vec<_>>()
        .join(",");
    format!(r#"{{"samples":[{listed}],"scale_config":{{"mode":"auto_percentile","value":null}}}}"#)
}

fn fe() -> ElementKey {
    ElementKey::new("Fe56", Unit::Ppm)
}

#[test]
fn test_status_follows_output_folder() {
    let f = fixture(&["S1 Fe56_ppm matrix.csv"]);
    let fe = fe();
    assert_eq!(status_of(&f, "S1", &fe), ProgressStatus::Missing);

    write(&f.artifacts.histogram(&fe, "S1"), "bin_start\tbin_end\tcount\n0\t1\t4\n");
    assert_eq!(status_of(&f, "S1", &fe), ProgressStatus::Partial);

    write(&f.artifacts.manifest(&fe), r#"{"samples":[{"name":"S1"}]}"#);
    write(&f.artifacts.composite(&fe), "png");
    assert_eq!(status_of(&f, "S1", &fe), ProgressStatus::Complete);

    fs::remove_file(f.artifacts.composite(&fe)).unwrap();
    assert_eq!(status_of(&f, "S1", &fe), ProgressStatus::Partial);
}

#[test]
fn test_statistics_row_counts_as_partial() {
    let f = fixture(&["S1 Fe56_ppm matrix.csv", "S2 Fe56_ppm matrix.csv"]);
    let fe = fe();
    write(
        &f.artifacts.statistics(&fe),
        "Sample,Alias,p25,p50,p75,p99,IQR,Mean\nS2,S2,1,2,3,4,2,2.5\n",
    );
    assert_eq!(status_of(&f, "S1", &fe), ProgressStatus::Missing);
    assert_eq!(status_of(&f, "S2", &fe), ProgressStatus::Partial);
}

#[test]
fn test_empty_composite_is_not_complete() {
    let f = fixture(&["S1 Fe56_ppm matrix.csv"]);
    let fe = fe();
    write(&f.artifacts.composite(&fe), "");
    assert_eq!(status_of(&f, "S1", &fe), ProgressStatus::Missing);
}

#[test]
fn test_manifest_must_list_exactly_the_included_samples() {
    let f = fixture(&["S1 Fe56_ppm matrix.csv", "S2 Fe56_ppm matrix.csv"]);
    let fe = fe();
    write(&f.artifacts.manifest(&fe), &manifest(&["S1"]));
    write(&f.artifacts.composite(&fe), "png");
    assert_eq!(status_of(&f, "S1", &fe), ProgressStatus::Missing);
    assert_eq!(status_of(&f, "S2", &fe), ProgressStatus::Missing);

    write(&f.artifacts.manifest(&fe), &manifest(&["S1", "S2"]));
    assert_eq!(status_of(&f, "S1", &fe), ProgressStatus::Complete);
    assert_eq!(status_of(&f, "S2", &fe), ProgressStatus::Complete);

    write(&f.artifacts.manifest(&fe), "{ not json");
    assert_eq!(status_of(&f, "S1", &fe), ProgressStatus::Missing);
}

#[test]
fn test_input_newer_than_composite_is_stale() {
    let f = fixture(&["S1 Fe56_ppm matrix.csv"]);
    let fe = fe();
    write(&f.artifacts.manifest(&fe), &manifest(&["S1"]));
    write(&f.artifacts.composite(&fe), "png");
    let composite = fs::File::options()
        .write(true)
        .open(f.artifacts.composite(&fe))
        .unwrap();
    composite
        .set_modified(SystemTime::now() - Duration::from_secs(3600))
        .unwrap();
    assert_eq!(status_of(&f, "S1", &fe), ProgressStatus::Missing);

    composite
        .set_modified(SystemTime::now() + Duration::from_secs(3600))
        .unwrap();
    assert_eq!(status_of(&f, "S1", &fe), ProgressStatus::Complete);
    assert!(f.input.join("S1 Fe56_ppm matrix.csv").is_file());
}

#[test]
fn test_composite_without_manifest_not_complete() {
    let f = fixture(&["S1 Fe56_ppm matrix.csv"]);
    let fe = fe();
    write(&f.artifacts.composite(&fe), "png");
    assert_eq!(status_of(&f, "S1", &fe), ProgressStatus::Missing);
    assert!(!complete(&f, &fe));
}

#[test]
fn test_no_input_is_missing_and_ignored_for_completion() {
    let f = fixture(&["S1 Fe56_ppm matrix.csv", "S2 Cu63_ppm matrix.csv"]);
    let fe = fe();
    write(&f.artifacts.manifest(&fe), &manifest(&["S1"]));
    write(&f.artifacts.composite(&fe), "png");

    assert_eq!(status_of(&f, "S2", &fe), ProgressStatus::Missing);
    assert!(complete(&f, &fe));
}

#[test]
fn test_excluding_a_rendered_sample_makes_composite_stale() {
    let mut f = fixture(&["S1 Fe56_ppm matrix.csv", "S2 Fe56_ppm matrix.csv"]);
    let fe = fe();
    write(&f.artifacts.manifest(&fe), &manifest(&["S1", "S2"]));
    write(&f.artifacts.composite(&fe), "png");
    assert!(complete(&f, &fe));

    f.samples.apply(&SampleCommand::Exclude("S2".to_string()));
    let elements = [fe.clone()];
    let map = ProgressTracker::new(&f.artifacts, &f.source, &f.samples, &elements).refresh();
    assert!(!map[&("S2".to_string(), fe.clone())].included);
    assert_eq!(map[&("S1".to_string(), fe.clone())].status, ProgressStatus::Missing);
    assert!(!complete(&f, &fe));

    // a composite re-rendered without S2 is current again
    write(&f.artifacts.manifest(&fe), &manifest(&["S1"]));
    assert!(complete(&f, &fe));
}

#[test]
fn test_scale_config_change_makes_composite_stale() {
    let f = fixture(&["S1 Fe56_ppm matrix.csv"]);
    let fe = fe();
    let elements = [fe.clone()];
    write(&f.artifacts.manifest(&fe), &manifest(&["S1"]));
    write(&f.artifacts.composite(&fe), "png");

    let tracker = |scale: ScaleConfig| {
        ProgressTracker::new(&f.artifacts, &f.source, &f.samples, &elements).with_scale(scale)
    };
    assert!(tracker(ScaleConfig::default()).element_complete(&fe));
    let log = ScaleConfig {
        mode: ScaleMode::Log,
        value: None,
    };
    assert!(!tracker(log).element_complete(&fe));
    let fixed = ScaleConfig {
        mode: ScaleMode::UserFixed,
        value: Some(250.0),
    };
    assert!(!tracker(fixed).element_complete(&fe));

    // manifests from before the scale was recorded cannot be trusted
    write(&f.artifacts.manifest(&fe), r#"{"samples":[{"name":"S1"}]}"#);
    assert!(!tracker(ScaleConfig::default()).element_complete(&fe));
    assert!(complete(&f, &fe));
}

#[test]
fn test_unparseable_input_is_missing() {
    let f = fixture(&["S1 Fe56_ppm matrix.csv", "S2 Fe56_ppm matrix.csv"]);
    let fe = fe();
    write(&f.artifacts.histogram(&fe, "S2"), "bin_start\tbin_end\tcount\n0\t1\t4\n");
    write(&f.artifacts.manifest(&fe), &manifest(&["S1", "S2"]));
    write(&f.artifacts.composite(&fe), "png");
    let composite = fs::File::options()
        .write(true)
        .open(f.artifacts.composite(&fe))
        .unwrap();
    composite
        .set_modified(SystemTime::now() + Duration::from_secs(3600))
        .unwrap();
    assert_eq!(status_of(&f, "S2", &fe), ProgressStatus::Complete);

    // partially synced: last row cut short
    fs::write(f.input.join("S2 Fe56_ppm matrix.csv"), "1,2\n3").unwrap();
    assert_eq!(status_of(&f, "S2", &fe), ProgressStatus::Missing);
    // the composite still shows S2, so S1 is stale too
    assert_eq!(status_of(&f, "S1", &fe), ProgressStatus::Missing);
    assert!(!complete(&f, &fe));

    write(&f.artifacts.manifest(&fe), &manifest(&["S1"]));
    assert_eq!(status_of(&f, "S1", &fe), ProgressStatus::Complete);
    assert!(complete(&f, &fe));
}

#[test]
fn test_element_without_relevant_samples_is_not_complete() {
    let f = fixture(&["S1 Cu63_ppm matrix.csv"]);
    let fe = fe();
    assert!(!complete(&f, &fe));
}

#[test]
fn test_status_counts() {
    let f = fixture(&["S1 Fe56_ppm matrix.csv", "S2 Fe56_ppm matrix.csv", "S3 Fe56_ppm matrix.csv"]);
    let fe = fe();
    let elements = [fe.clone()];
    write(&f.artifacts.histogram(&fe, "S2"), "x");
    let map = ProgressTracker::new(&f.artifacts, &f.source, &f.samples, &elements).refresh();
    assert_eq!(status_counts(&map), [2, 1, 0]);
    assert_eq!(map.len(), 3);
}
