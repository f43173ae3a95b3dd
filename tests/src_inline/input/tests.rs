use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::aliases::{ALIASES_FILE, apply_aliases, load_aliases, save_aliases};
use super::*;
use crate::model::sample::SampleCommand;

static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn make_temp_dir() -> PathBuf {
    let mut dir = std::env::temp_dir();
    let id = DIR_COUNTER.fetch_add(1, Ordering::SeqCst);
    dir.push(format!("kira_elemaps_input_{}_{}", std::process::id(), id));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_file(path: &Path, contents: &str) {
    let mut f = BufWriter::new(File::create(path).unwrap());
    f.write_all(contents.as_bytes()).unwrap();
}

#[test]
fn test_parse_unit_tagged_filename() {
    let (sample, element) = parse_matrix_filename("S1 Fe56_ppm matrix.csv").unwrap();
    assert_eq!(sample, "S1");
    assert_eq!(element, ElementKey::new("Fe56", Unit::Ppm));

    let (sample, element) = parse_matrix_filename("Granite_B_Cu63_CPS matrix.txt.gz").unwrap();
    assert_eq!(sample, "Granite_B");
    assert_eq!(element, ElementKey::new("Cu63", Unit::Cps));
}

#[test]
fn test_parse_spreadsheet_filename() {
    let (sample, element) = parse_matrix_filename("MS2 Zn66_ppm matrix.xlsx").unwrap();
    assert_eq!(sample, "MS2");
    assert_eq!(element, ElementKey::new("Zn66", Unit::Ppm));

    let (sample, element) = parse_matrix_filename("MS2 Zn66 matrix.xlsx").unwrap();
    assert_eq!(sample, "MS2");
    assert_eq!(element.unit, Unit::Counts);
}

#[test]
fn test_parse_raw_counts_filename() {
    let (sample, element) = parse_matrix_filename("core 12 Pb208 matrix.tsv").unwrap();
    assert_eq!(sample, "core 12");
    assert_eq!(element, ElementKey::new("Pb208", Unit::Counts));
    assert_eq!(element.dir_name(), "Pb208_raw");
}

#[test]
fn test_parse_rejects_unrelated_names() {
    assert!(parse_matrix_filename("notes.csv").is_none());
    assert!(parse_matrix_filename("S1 Fe56_ppm matrix.xlsx.gz").is_none());
    assert!(parse_matrix_filename("S1 Fe56_ppm matrix.xls").is_none());
    assert!(parse_matrix_filename("S1 Fe56_ppm.csv").is_none());
    assert!(parse_matrix_filename("S1 Fe56_wt matrix.csv").is_none());
}

#[test]
fn test_discover_sorted_by_element_then_sample() {
    let dir = make_temp_dir();
    write_file(&dir.join("S2 Fe56_ppm matrix.csv"), "1,2\n3,4\n");
    write_file(&dir.join("S1 Fe56_ppm matrix.csv"), "1,2\n3,4\n");
    write_file(&dir.join("S1 Cu63_ppm matrix.csv"), "1,2\n3,4\n");
    write_file(&dir.join("readme.txt"), "ignore me");
    fs::create_dir_all(dir.join("S3 Fe56_ppm matrix.csv.d")).unwrap();

    let files = discover_matrix_files(&dir).unwrap();
    let found = files
        .iter()
        .map(|f| (f.element.symbol.as_str(), f.sample.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(found, vec![("Cu63", "S1"), ("Fe56", "S1"), ("Fe56", "S2")]);
}

#[test]
fn test_discover_missing_dir() {
    let dir = make_temp_dir().join("does_not_exist");
    assert!(matches!(
        discover_matrix_files(&dir),
        Err(InputError::MissingFile(_))
    ));
}

#[test]
fn test_directory_source_keeps_first_duplicate() {
    let dir = make_temp_dir();
    write_file(&dir.join("S1 Fe56_ppm matrix.csv"), "1,2\n3,4\n");
    write_file(&dir.join("S1 Fe56_ppm matrix.txt"), "9,9\n9,9\n");
    let files = discover_matrix_files(&dir).unwrap();
    assert_eq!(files.len(), 2);

    let source = DirectorySource::from_files(&files);
    let element = ElementKey::new("Fe56", Unit::Ppm);
    assert_eq!(
        source.input_path("S1", &element).unwrap(),
        dir.join("S1 Fe56_ppm matrix.csv")
    );
    let matrix = source.load("S1", &element).unwrap();
    assert_eq!(matrix.get(1, 1), Some(4.0));
    assert_eq!(source.samples().len(), 1);
    assert_eq!(source.elements(), vec![element]);
}

#[test]
fn test_directory_source_unknown_pair() {
    let source = DirectorySource::default();
    let element = ElementKey::new("Fe56", Unit::Ppm);
    assert!(!source.has_input("S1", &element));
    assert!(matches!(
        source.load("S1", &element),
        Err(InputError::MissingFile(_))
    ));
}

#[test]
fn test_matrix_store_as_source() {
    let element = ElementKey::new("Fe56", Unit::Ppm);
    let mut store = MatrixStore::new(SampleSet::from_names(["S1", "S2", "S3"]));
    store.insert_from(
        "S1",
        element.clone(),
        Matrix::from_rows(vec![vec![1.0, 2.0]], Unit::Ppm).unwrap(),
        Some(PathBuf::from("S1 Fe56_ppm matrix.csv")),
    );
    store.insert(
        "S3",
        element.clone(),
        Matrix::from_rows(vec![vec![f64::NAN, f64::NAN]], Unit::Ppm).unwrap(),
    );
    assert!(store.has_input("S1", &element));
    assert!(!store.has_input("S2", &element));
    assert!(store.load("S1", &element).is_ok());
    assert!(store.load("S2", &element).is_err());
    assert_eq!(
        store.input_path("S1", &element),
        Some(PathBuf::from("S1 Fe56_ppm matrix.csv"))
    );
    assert!(store.readable("S1", &element));
    // present but without one valid pixel
    assert!(store.has_input("S3", &element));
    assert!(!store.readable("S3", &element));
}

#[test]
fn test_directory_source_unparseable_file_not_readable() {
    let dir = make_temp_dir();
    write_file(&dir.join("S1 Fe56_ppm matrix.csv"), "1,2\n3,4\n");
    write_file(&dir.join("S2 Fe56_ppm matrix.csv"), "1,2,3\n4,5");
    let source = DirectorySource::from_files(&discover_matrix_files(&dir).unwrap());
    let element = ElementKey::new("Fe56", Unit::Ppm);
    assert!(source.readable("S1", &element));
    assert!(source.has_input("S2", &element));
    assert!(!source.readable("S2", &element));
}

#[test]
fn test_aliases_saved_and_reloaded() {
    let dir = make_temp_dir();
    assert!(load_aliases(&dir).unwrap().is_empty());

    let mut samples = SampleSet::from_names(["S1", "S2"]);
    samples.apply(&SampleCommand::SetAlias {
        sample: "S2".to_string(),
        alias: "Basalt, upper".to_string(),
    });
    save_aliases(&dir, &samples).unwrap();
    assert!(dir.join(ALIASES_FILE).is_file());

    let aliases = load_aliases(&dir).unwrap();
    assert_eq!(aliases.len(), 1);
    assert_eq!(aliases["S2"], "Basalt, upper");

    let mut fresh = SampleSet::from_names(["S1", "S2"]);
    apply_aliases(&mut fresh, &aliases);
    assert_eq!(fresh.get("S2").unwrap().label(), "Basalt, upper");
    assert_eq!(fresh.get("S1").unwrap().label(), "S1");
}
